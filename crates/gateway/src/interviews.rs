//! Interview store — persistent interview rows.
//!
//! JSON-file-backed like the slot store. Interviews reference their
//! session by id only; runtime joins go through the session registry.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use candor_domain::error::{Error, Result};
use candor_domain::interview::{AccessTokenRecord, Interview, InterviewStatus};

pub struct InterviewStore {
    inner: RwLock<HashMap<Uuid, Interview>>,
    persist_path: PathBuf,
}

impl InterviewStore {
    pub fn new(state_path: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(state_path)?;
        let persist_path = state_path.join("interviews.json");

        let map = if persist_path.exists() {
            let raw = std::fs::read_to_string(&persist_path)?;
            let rows: Vec<Interview> = serde_json::from_str(&raw).unwrap_or_default();
            let count = rows.len();
            let map: HashMap<Uuid, Interview> =
                rows.into_iter().map(|i| (i.id, i)).collect();
            tracing::info!(count, "loaded interviews from disk");
            map
        } else {
            HashMap::new()
        };

        Ok(Self {
            inner: RwLock::new(map),
            persist_path,
        })
    }

    async fn persist(&self) {
        let map = self.inner.read().await;
        let rows: Vec<&Interview> = map.values().collect();
        if let Ok(json) = serde_json::to_string_pretty(&rows) {
            let path = self.persist_path.clone();
            let _ = tokio::task::spawn_blocking(move || {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::warn!(error = %e, "failed to persist interviews");
                }
            })
            .await;
        }
    }

    pub async fn create(
        &self,
        candidate_name: String,
        candidate_id: Uuid,
        job_id: Uuid,
        job_description: String,
        candidate_resume: String,
    ) -> Interview {
        let now = Utc::now();
        let interview = Interview {
            id: Uuid::new_v4(),
            candidate_id,
            job_id,
            candidate_name,
            job_description,
            candidate_resume,
            scheduled_start_utc: None,
            scheduled_end_utc: None,
            status: InterviewStatus::Scheduled,
            session_id: None,
            access_token: None,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .await
            .insert(interview.id, interview.clone());
        self.persist().await;
        interview
    }

    pub async fn get(&self, id: &Uuid) -> Option<Interview> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Interview> {
        self.inner.read().await.values().cloned().collect()
    }

    async fn update(&self, id: &Uuid, f: impl FnOnce(&mut Interview)) -> Result<Interview> {
        let mut map = self.inner.write().await;
        let interview = map
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("interview {id}")))?;
        f(interview);
        interview.updated_at = Utc::now();
        let out = interview.clone();
        drop(map);
        self.persist().await;
        Ok(out)
    }

    /// Copy the booked slot's window onto the interview.
    pub async fn set_schedule(
        &self,
        id: &Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Interview> {
        self.update(id, |i| {
            i.scheduled_start_utc = Some(start);
            i.scheduled_end_utc = Some(end);
        })
        .await
    }

    pub async fn set_status(&self, id: &Uuid, status: InterviewStatus) -> Result<Interview> {
        self.update(id, |i| i.status = status).await
    }

    /// Attach the session id on first redemption. Idempotent — an
    /// already-attached session id is left in place.
    pub async fn attach_session(
        &self,
        id: &Uuid,
        session_id: Uuid,
        redeemed_at: DateTime<Utc>,
    ) -> Result<Interview> {
        self.update(id, |i| {
            if i.session_id.is_none() {
                i.session_id = Some(session_id);
            }
            if let Some(record) = i.access_token.as_mut() {
                if record.redeemed_at.is_none() {
                    record.redeemed_at = Some(redeemed_at);
                }
            }
        })
        .await
    }

    pub async fn set_token_record(&self, id: &Uuid, record: AccessTokenRecord) -> Result<()> {
        self.update(id, |i| i.access_token = Some(record)).await?;
        Ok(())
    }

    pub async fn cancel_token(&self, id: &Uuid) -> Result<()> {
        self.update(id, |i| {
            if let Some(record) = i.access_token.as_mut() {
                record.canceled = true;
            }
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attach_session_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = InterviewStore::new(dir.path()).unwrap();
        let interview = store
            .create(
                "Jane".into(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                String::new(),
                String::new(),
            )
            .await;

        let first_session = Uuid::new_v4();
        let now = Utc::now();
        store
            .attach_session(&interview.id, first_session, now)
            .await
            .unwrap();
        // A second attach (resume) must not replace the binding.
        let after = store
            .attach_session(&interview.id, Uuid::new_v4(), now)
            .await
            .unwrap();
        assert_eq!(after.session_id, Some(first_session));
    }

    #[tokio::test]
    async fn rows_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = InterviewStore::new(dir.path()).unwrap();
            let i = store
                .create(
                    "Jo".into(),
                    Uuid::new_v4(),
                    Uuid::new_v4(),
                    "jd".into(),
                    "cv".into(),
                )
                .await;
            store
                .set_status(&i.id, InterviewStatus::Live)
                .await
                .unwrap();
            i.id
        };

        let reloaded = InterviewStore::new(dir.path()).unwrap();
        let row = reloaded.get(&id).await.unwrap();
        assert_eq!(row.status, InterviewStatus::Live);
        assert_eq!(row.candidate_name, "Jo");
    }
}
