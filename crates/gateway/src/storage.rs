//! File storage for recordings, snapshots, TTS audio, and reports.
//!
//! Writes are content-addressed (the filename carries a hash or a
//! random token) so concurrent writers never collide; overwrites are
//! never permitted. References handed out are relative to the root so
//! they survive relocation.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use candor_domain::error::{Error, Result};

#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the storage layout. Called once at startup.
    pub fn ensure_layout(&self) -> Result<()> {
        for sub in ["recordings", "snapshots", "tts", "reports"] {
            std::fs::create_dir_all(self.root.join(sub))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative storage reference to an absolute path.
    pub fn absolute(&self, storage_ref: &str) -> PathBuf {
        self.root.join(storage_ref)
    }

    /// Directory holding one session's recording files.
    pub fn recordings_dir(&self, session_id: Uuid) -> PathBuf {
        self.root.join("recordings").join(session_id.to_string())
    }

    /// Write a proctoring snapshot: `snapshots/{session_id}/{warning_id}.jpg`.
    pub async fn write_snapshot(
        &self,
        session_id: Uuid,
        warning_id: Uuid,
        jpeg: Vec<u8>,
    ) -> Result<String> {
        let rel = format!("snapshots/{session_id}/{warning_id}.jpg");
        self.write_new(&rel, jpeg).await?;
        Ok(rel)
    }

    /// Write synthesized audio keyed by its content hash. An existing
    /// file for the same key is the same content — return it untouched.
    pub async fn write_tts(&self, key_hash: &str, audio: Vec<u8>) -> Result<String> {
        let rel = format!("tts/{key_hash}.mp3");
        let path = self.absolute(&rel);
        if path.exists() {
            return Ok(rel);
        }
        self.write_new(&rel, audio).await?;
        Ok(rel)
    }

    /// Write an evaluation report with a random filename token.
    pub async fn write_report(&self, interview_id: Uuid, html: String) -> Result<String> {
        let token = Uuid::new_v4().simple().to_string();
        let rel = format!("reports/{interview_id}-{token}.html");
        self.write_new(&rel, html.into_bytes()).await?;
        Ok(rel)
    }

    /// Write a file that must not already exist.
    async fn write_new(&self, rel: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.absolute(rel);
        let rel_owned = rel.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if path.exists() {
                return Err(Error::Internal(format!(
                    "refusing to overwrite existing artifact: {rel_owned}"
                )));
            }
            std::fs::write(&path, bytes)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("storage write task: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_layout_and_no_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        storage.ensure_layout().unwrap();

        let sid = Uuid::new_v4();
        let wid = Uuid::new_v4();
        let rel = storage
            .write_snapshot(sid, wid, vec![0xff, 0xd8])
            .await
            .unwrap();
        assert_eq!(rel, format!("snapshots/{sid}/{wid}.jpg"));
        assert!(storage.absolute(&rel).exists());

        // Same warning id again must be refused.
        let err = storage.write_snapshot(sid, wid, vec![1]).await.unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));
    }

    #[tokio::test]
    async fn tts_is_idempotent_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        storage.ensure_layout().unwrap();

        let a = storage.write_tts("abc123", vec![1, 2, 3]).await.unwrap();
        let b = storage.write_tts("abc123", vec![1, 2, 3]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(std::fs::read(storage.absolute(&a)).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn report_filenames_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        storage.ensure_layout().unwrap();

        let id = Uuid::new_v4();
        let a = storage.write_report(id, "<html/>".into()).await.unwrap();
        let b = storage.write_report(id, "<html/>".into()).await.unwrap();
        assert_ne!(a, b);
    }
}
