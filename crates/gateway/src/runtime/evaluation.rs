//! Evaluation assembler — the final scored artifact per interview.
//!
//! Runs on the session's terminal transition: averages the per-turn
//! quality scores, folds in the coding round, subtracts the proctoring
//! penalty, renders the HTML report, and persists the evaluation.
//! Assembly is idempotent; a second run replaces the stored row.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use candor_domain::error::{Error, Result};
use candor_domain::session::{
    CodingSubmission, DimensionScores, Evaluation, ProctoringSummary, SessionSnapshot,
};
use candor_providers::{ChatMessage, ChatRequest, LlmProvider};

use super::classify;
use crate::report;
use crate::storage::Storage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One evaluation per interview, stored at
/// `evaluations/{interview_id}.json`. Writes replace in place.
pub struct EvaluationStore {
    dir: PathBuf,
    cache: RwLock<HashMap<Uuid, Evaluation>>,
}

impl EvaluationStore {
    pub fn new(state_path: &std::path::Path) -> Result<Self> {
        let dir = state_path.join("evaluations");
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub async fn save(&self, evaluation: Evaluation) -> Result<()> {
        let path = self.dir.join(format!("{}.json", evaluation.interview_id));
        let json = serde_json::to_string_pretty(&evaluation)?;
        self.cache
            .write()
            .await
            .insert(evaluation.interview_id, evaluation);
        tokio::task::spawn_blocking(move || std::fs::write(&path, json))
            .await
            .map_err(|e| Error::Internal(format!("evaluation write task: {e}")))??;
        Ok(())
    }

    pub async fn get(&self, interview_id: &Uuid) -> Option<Evaluation> {
        if let Some(found) = self.cache.read().await.get(interview_id).cloned() {
            return Some(found);
        }
        let path = self.dir.join(format!("{interview_id}.json"));
        let raw = std::fs::read_to_string(path).ok()?;
        let evaluation: Evaluation = serde_json::from_str(&raw).ok()?;
        self.cache
            .write()
            .await
            .insert(*interview_id, evaluation.clone());
        Some(evaluation)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Score math
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `min(3.0, 0.3 × warnings)`.
pub fn proctoring_penalty(warning_count: u32) -> f32 {
    (0.3 * warning_count as f32).min(3.0)
}

/// Overall + per-dimension scores on the 0..10 scale.
pub fn compute_scores(
    turn_scores: &[f32],
    coding_score: Option<u32>,
    warning_count: u32,
) -> (f32, DimensionScores, f32) {
    let dialogue10 = if turn_scores.is_empty() {
        0.0
    } else {
        turn_scores.iter().sum::<f32>() / turn_scores.len() as f32 * 10.0
    };
    let penalty = proctoring_penalty(warning_count);

    let (base, technical) = match coding_score {
        Some(c) => {
            let coding10 = c as f32 / 10.0;
            (dialogue10 * 0.6 + coding10 * 0.4, coding10)
        }
        None => (dialogue10, dialogue10),
    };

    let overall = (base - penalty).clamp(0.0, 10.0);
    let dims = DimensionScores {
        technical,
        communication: dialogue10,
        problem_solving: (technical + dialogue10) / 2.0,
    };
    (overall, dims, penalty)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Assembler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct SummaryWire {
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    summary: String,
}

pub struct EvaluationAssembler {
    llm: Arc<dyn LlmProvider>,
    llm_deadline: Duration,
    store: Arc<EvaluationStore>,
    storage: Arc<Storage>,
}

impl EvaluationAssembler {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        llm_deadline_s: u64,
        store: Arc<EvaluationStore>,
        storage: Arc<Storage>,
    ) -> Self {
        Self {
            llm,
            llm_deadline: Duration::from_secs(llm_deadline_s),
            store,
            storage,
        }
    }

    /// Assemble and persist the evaluation from a terminal snapshot.
    pub async fn assemble(
        &self,
        candidate_name: &str,
        snapshot: &SessionSnapshot,
        coding: Option<&CodingSubmission>,
    ) -> Result<Evaluation> {
        let warning_count = snapshot.warnings.len() as u32;
        let (overall, per_dimension, penalty) = compute_scores(
            &snapshot.turn_scores,
            coding.map(|c| c.combined_score),
            warning_count,
        );

        let (strengths, weaknesses, summary) = self.summarize(snapshot, overall).await;

        let proctoring_summary = ProctoringSummary {
            warning_count,
            by_kind: count_by_kind(&snapshot.warnings),
            penalty,
        };

        let html = report::build_report(
            candidate_name,
            snapshot,
            coding,
            overall,
            &per_dimension,
            &proctoring_summary,
            &summary,
        );
        let report_ref = self
            .storage
            .write_report(snapshot.interview_id, html)
            .await?;

        let evaluation = Evaluation {
            interview_id: snapshot.interview_id,
            overall_score: overall,
            per_dimension,
            strengths,
            weaknesses,
            recommend: overall >= 6.0,
            proctoring_summary,
            report_ref,
            created_at: chrono::Utc::now(),
        };
        self.store.save(evaluation.clone()).await?;
        tracing::info!(
            interview_id = %snapshot.interview_id,
            overall = evaluation.overall_score,
            recommend = evaluation.recommend,
            "evaluation assembled"
        );
        Ok(evaluation)
    }

    /// Strengths/weaknesses/summary from the LLM, degrading to a
    /// score-derived summary on failure.
    async fn summarize(
        &self,
        snapshot: &SessionSnapshot,
        overall: f32,
    ) -> (Vec<String>, Vec<String>, String) {
        let transcript: String = snapshot
            .turns
            .iter()
            .map(|t| format!("{:?}: {}\n", t.role, t.text))
            .collect();
        let prompt = format!(
            "Summarize this interview transcript for the hiring team.\n{transcript}\n\
             Reply with JSON: {{\"strengths\": [..], \"weaknesses\": [..], \"summary\": \"...\"}}."
        );
        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            temperature: Some(0.3),
            max_tokens: Some(512),
            json_mode: true,
            model: None,
        };

        let attempt = tokio::time::timeout(self.llm_deadline, self.llm.chat(req)).await;
        if let Ok(Ok(resp)) = attempt {
            if let Ok(wire) =
                serde_json::from_str::<SummaryWire>(classify::extract_json(&resp.content))
            {
                return (wire.strengths, wire.weaknesses, wire.summary);
            }
        }
        tracing::warn!(
            interview_id = %snapshot.interview_id,
            "ai summary unavailable, using score-derived text"
        );
        (
            vec![],
            vec![],
            format!("Overall score {overall:.1}/10 across {} answers.", snapshot.turn_scores.len()),
        )
    }
}

fn count_by_kind(
    warnings: &[candor_domain::warning::WarningEvent],
) -> Vec<(candor_domain::warning::WarningKind, u32)> {
    let mut counts: HashMap<candor_domain::warning::WarningKind, u32> = HashMap::new();
    for w in warnings {
        *counts.entry(w.kind).or_default() += 1;
    }
    let mut out: Vec<_> = counts.into_iter().collect();
    out.sort_by_key(|(_, n)| std::cmp::Reverse(*n));
    out
}
