//! Coding round evaluator: sandboxed test execution plus LLM review.
//!
//! Each test case runs the candidate source through the configured
//! per-language runner with stdin piped in, a wall-clock budget
//! standing in for the CPU cap, and kill-on-drop cleanup. The memory
//! cap and network isolation are properties of the configured runner
//! command (a ulimit/nsjail wrapper in deployment).

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use candor_domain::config::CodingConfig;
use candor_domain::error::{Error, Result};
use candor_domain::session::{CodingQuestion, CodingSubmission, TestCase, TestRunResult};
use candor_providers::{ChatMessage, ChatRequest, LlmProvider};

use super::classify;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Question bank
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Coding questions with their bound test cases, loaded from
/// `coding_questions.json` under the state path.
pub struct CodingQuestionBank {
    questions: HashMap<Uuid, CodingQuestion>,
}

impl CodingQuestionBank {
    pub fn load(state_path: &std::path::Path) -> Result<Self> {
        let path = state_path.join("coding_questions.json");
        let questions = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let rows: Vec<CodingQuestion> = serde_json::from_str(&raw)?;
            tracing::info!(count = rows.len(), "coding question bank loaded");
            rows.into_iter().map(|q| (q.id, q)).collect()
        } else {
            tracing::warn!("no coding_questions.json, coding round bank is empty");
            HashMap::new()
        };
        Ok(Self { questions })
    }

    pub fn get(&self, id: &Uuid) -> Option<&CodingQuestion> {
        self.questions.get(id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sandbox runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_ok: bool,
    pub runtime_ms: u64,
    pub timed_out: bool,
}

/// Executes candidate code against one stdin. Trait boundary so tests
/// run without interpreters installed.
#[async_trait::async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, language: &str, source: &str, stdin: &str) -> Result<RunOutput>;
}

/// Spawns the configured per-language command with the source file
/// substituted for `{source}`.
pub struct ProcessRunner {
    cfg: CodingConfig,
}

impl ProcessRunner {
    pub fn new(cfg: CodingConfig) -> Self {
        Self { cfg }
    }

    fn command_for(&self, language: &str, source_path: &PathBuf) -> Result<(String, Vec<String>)> {
        let template = self
            .cfg
            .runners
            .get(&language.to_lowercase())
            .ok_or_else(|| {
                Error::Validation(format!("unsupported coding language: {language}"))
            })?;
        let mut parts = template.iter().map(|p| {
            p.replace("{source}", &source_path.display().to_string())
                .replace("{memory_mb}", &self.cfg.memory_mb.to_string())
        });
        let bin = parts
            .next()
            .ok_or_else(|| Error::Validation(format!("empty runner for {language}")))?;
        Ok((bin, parts.collect()))
    }

    fn source_file_name(language: &str) -> &'static str {
        match language.to_lowercase().as_str() {
            "python" => "main.py",
            "javascript" => "main.js",
            "java" => "Main.java",
            _ => "main.txt",
        }
    }
}

#[async_trait::async_trait]
impl CodeRunner for ProcessRunner {
    async fn run(&self, language: &str, source: &str, stdin: &str) -> Result<RunOutput> {
        let workdir = tempfile::tempdir()?;
        let source_path = workdir.path().join(Self::source_file_name(language));
        std::fs::write(&source_path, source)?;

        let (bin, args) = self.command_for(language, &source_path)?;
        let started = std::time::Instant::now();

        let mut child = tokio::process::Command::new(&bin)
            .args(&args)
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Internal(format!("spawn {bin}: {e}")))?;

        if let Some(mut handle) = child.stdin.take() {
            let input = stdin.to_string();
            // Writer failure just means the child exited early.
            let _ = handle.write_all(input.as_bytes()).await;
            drop(handle);
        }

        let budget = Duration::from_secs(self.cfg.cpu_time_s) + Duration::from_millis(500);
        match tokio::time::timeout(budget, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.map_err(|e| Error::Internal(format!("wait: {e}")))?;
                Ok(RunOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_ok: output.status.success(),
                    runtime_ms: started.elapsed().as_millis() as u64,
                    timed_out: false,
                })
            }
            Err(_) => Ok(RunOutput {
                stdout: String::new(),
                stderr: format!("time limit exceeded ({} s)", self.cfg.cpu_time_s),
                exit_ok: false,
                runtime_ms: started.elapsed().as_millis() as u64,
                timed_out: true,
            }),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Evaluator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CodingEvaluator {
    bank: Arc<CodingQuestionBank>,
    runner: Arc<dyn CodeRunner>,
    llm: Arc<dyn LlmProvider>,
    llm_deadline: Duration,
}

/// `trim + collapse internal whitespace`, for output comparison.
pub fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `round(pass_ratio * 60 + llm_review_score * 0.4)`, 0..100.
pub fn combined_score(passed: usize, total: usize, llm_review_score: u32) -> u32 {
    let pass_ratio = if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64
    };
    (pass_ratio * 60.0 + llm_review_score as f64 * 0.4).round() as u32
}

#[derive(Deserialize)]
struct ReviewWire {
    score: u32,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
    #[serde(default)]
    feedback: String,
}

impl CodingEvaluator {
    pub fn new(
        bank: Arc<CodingQuestionBank>,
        runner: Arc<dyn CodeRunner>,
        llm: Arc<dyn LlmProvider>,
        llm_deadline_s: u64,
    ) -> Self {
        Self {
            bank,
            runner,
            llm,
            llm_deadline: Duration::from_secs(llm_deadline_s),
        }
    }

    /// Run the submission against its question's test cases and request
    /// the LLM review. Review failures degrade to a tests-only score.
    pub async fn evaluate(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        language: &str,
        source: &str,
    ) -> Result<CodingSubmission> {
        let question = self
            .bank
            .get(&question_id)
            .ok_or_else(|| Error::NotFound(format!("coding question {question_id}")))?;

        let mut run_results = Vec::with_capacity(question.test_cases.len());
        for case in &question.test_cases {
            run_results.push(self.run_case(language, source, case).await);
        }
        let passed = run_results.iter().filter(|r| r.passed).count();

        let (llm_review_score, feedback_text) = match self.review(question, source).await {
            Ok(review) => {
                let mut feedback = review.feedback;
                if !review.strengths.is_empty() {
                    feedback.push_str("\nStrengths: ");
                    feedback.push_str(&review.strengths.join("; "));
                }
                if !review.improvements.is_empty() {
                    feedback.push_str("\nImprovements: ");
                    feedback.push_str(&review.improvements.join("; "));
                }
                (review.score.min(100), feedback)
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "llm code review unavailable");
                (0, "automated review unavailable".to_string())
            }
        };

        let submission = CodingSubmission {
            session_id,
            question_id,
            language: language.to_string(),
            source: source.to_string(),
            combined_score: combined_score(passed, run_results.len(), llm_review_score),
            run_results,
            llm_review_score,
            feedback_text,
            created_at: chrono::Utc::now(),
        };
        tracing::info!(
            %session_id,
            %question_id,
            passed,
            total = submission.run_results.len(),
            combined = submission.combined_score,
            "coding submission evaluated"
        );
        Ok(submission)
    }

    async fn run_case(&self, language: &str, source: &str, case: &TestCase) -> TestRunResult {
        match self.runner.run(language, source, &case.stdin).await {
            Ok(out) => TestRunResult {
                test_id: case.id.clone(),
                passed: out.exit_ok
                    && normalize(&out.stdout) == normalize(&case.expected_stdout),
                stdout: out.stdout,
                stderr: out.stderr,
                runtime_ms: out.runtime_ms,
            },
            Err(e) => TestRunResult {
                test_id: case.id.clone(),
                passed: false,
                stdout: String::new(),
                stderr: e.to_string(),
                runtime_ms: 0,
            },
        }
    }

    async fn review(&self, question: &CodingQuestion, source: &str) -> Result<ReviewWire> {
        let prompt = format!(
            "Review this interview coding submission.\n\
             Problem: {problem}\n\
             Submission:\n```\n{source}\n```\n\n\
             Reply with JSON: {{\"score\": <0-100>, \"strengths\": [..], \
             \"improvements\": [..], \"feedback\": \"...\"}}.",
            problem = question.prompt,
        );
        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            temperature: Some(0.2),
            max_tokens: Some(512),
            json_mode: true,
            model: None,
        };
        let resp = tokio::time::timeout(self.llm_deadline, self.llm.chat(req))
            .await
            .map_err(|_| Error::Timeout("code review deadline".into()))??;
        Ok(serde_json::from_str(classify::extract_json(&resp.content))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candor_providers::ChatResponse;

    #[test]
    fn normalize_trims_and_collapses() {
        assert_eq!(normalize("  a   b\nc  "), "a b c");
        assert_eq!(normalize("42\n"), "42");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn combined_score_formula() {
        // All tests pass + perfect review.
        assert_eq!(combined_score(4, 4, 100), 100);
        // Half the tests, review 50: 30 + 20.
        assert_eq!(combined_score(2, 4, 50), 50);
        // No tests defined: review only.
        assert_eq!(combined_score(0, 0, 80), 32);
        assert_eq!(combined_score(3, 4, 70), 73);
    }

    struct EchoRunner {
        out: &'static str,
        exit_ok: bool,
    }

    #[async_trait::async_trait]
    impl CodeRunner for EchoRunner {
        async fn run(&self, _l: &str, _s: &str, _stdin: &str) -> Result<RunOutput> {
            Ok(RunOutput {
                stdout: self.out.to_string(),
                stderr: String::new(),
                exit_ok: self.exit_ok,
                runtime_ms: 12,
                timed_out: false,
            })
        }
    }

    struct ReviewLlm;

    #[async_trait::async_trait]
    impl LlmProvider for ReviewLlm {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: r#"{"score": 70, "strengths": ["clear"],
                             "improvements": ["edge cases"], "feedback": "solid"}"#
                    .into(),
                model: "review".into(),
            })
        }

        fn provider_id(&self) -> &str {
            "review"
        }
    }

    fn bank_with_question(dir: &tempfile::TempDir) -> (Arc<CodingQuestionBank>, Uuid) {
        let qid = Uuid::new_v4();
        let questions = vec![CodingQuestion {
            id: qid,
            title: "sum".into(),
            prompt: "read two ints, print their sum".into(),
            test_cases: vec![
                TestCase {
                    id: "t1".into(),
                    stdin: "1 2\n".into(),
                    expected_stdout: "3\n".into(),
                },
                TestCase {
                    id: "t2".into(),
                    stdin: "10 -4\n".into(),
                    expected_stdout: "6\n".into(),
                },
            ],
        }];
        std::fs::write(
            dir.path().join("coding_questions.json"),
            serde_json::to_string(&questions).unwrap(),
        )
        .unwrap();
        (
            Arc::new(CodingQuestionBank::load(dir.path()).unwrap()),
            qid,
        )
    }

    #[tokio::test]
    async fn whitespace_differences_still_pass() {
        let dir = tempfile::tempdir().unwrap();
        let (bank, qid) = bank_with_question(&dir);
        // Runner prints "3" for every case: t1 passes despite the
        // missing newline, t2 fails on value.
        let evaluator = CodingEvaluator::new(
            bank,
            Arc::new(EchoRunner {
                out: "3",
                exit_ok: true,
            }),
            Arc::new(ReviewLlm),
            20,
        );

        let submission = evaluator
            .evaluate(Uuid::new_v4(), qid, "python", "print(3)")
            .await
            .unwrap();
        assert_eq!(submission.run_results.len(), 2);
        assert!(submission.run_results[0].passed);
        assert!(!submission.run_results[1].passed);
        assert_eq!(submission.llm_review_score, 70);
        // 1/2 * 60 + 70 * 0.4 = 58.
        assert_eq!(submission.combined_score, 58);
        assert!(submission.feedback_text.contains("solid"));
    }

    #[tokio::test]
    async fn nonzero_exit_fails_even_with_matching_output() {
        let dir = tempfile::tempdir().unwrap();
        let (bank, qid) = bank_with_question(&dir);
        let evaluator = CodingEvaluator::new(
            bank,
            Arc::new(EchoRunner {
                out: "3",
                exit_ok: false,
            }),
            Arc::new(ReviewLlm),
            20,
        );
        let submission = evaluator
            .evaluate(Uuid::new_v4(), qid, "python", "boom")
            .await
            .unwrap();
        assert!(submission.run_results.iter().all(|r| !r.passed));
    }

    #[tokio::test]
    async fn unknown_question_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (bank, _qid) = bank_with_question(&dir);
        let evaluator = CodingEvaluator::new(
            bank,
            Arc::new(EchoRunner {
                out: "",
                exit_ok: true,
            }),
            Arc::new(ReviewLlm),
            20,
        );
        assert!(matches!(
            evaluator
                .evaluate(Uuid::new_v4(), Uuid::new_v4(), "python", "x")
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn runner_command_substitution() {
        let runner = ProcessRunner::new(CodingConfig::default());
        let path = PathBuf::from("/tmp/work/main.py");
        let (bin, args) = runner.command_for("python", &path).unwrap();
        assert_eq!(bin, "python3");
        assert_eq!(args, vec!["/tmp/work/main.py".to_string()]);
        assert!(runner.command_for("cobol", &path).is_err());
    }
}
