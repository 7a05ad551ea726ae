//! Recording upload and the A/V mux.
//!
//! Chunked uploads append into one growing file per track. Finalize
//! merges video + (mic + TTS) audio into `final.mp4`, verifies the
//! result probes to exactly one audio stream, and only then deletes the
//! unmerged original. Mux failures never block session termination.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use candor_domain::config::RecordingConfig;
use candor_domain::error::{Error, Result};
use candor_domain::session::RecordingArtifact;

use crate::storage::Storage;

/// Mux attempts before giving up and keeping the original.
const MAX_MUX_ATTEMPTS: u32 = 2;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Media runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// External media tooling boundary (ffmpeg/ffprobe in production).
#[async_trait::async_trait]
pub trait MediaRunner: Send + Sync {
    /// Merge `video` with the optional mic/TTS tracks into `out`.
    async fn mux(
        &self,
        video: &Path,
        mic: Option<&Path>,
        tts: Option<&Path>,
        out: &Path,
        mic_gain: f32,
        tts_gain: f32,
    ) -> Result<()>;

    /// Number of audio streams in a container.
    async fn audio_stream_count(&self, path: &Path) -> Result<u32>;

    /// Container duration in milliseconds.
    async fn duration_ms(&self, path: &Path) -> Result<u64>;
}

/// Drives the ffmpeg/ffprobe binaries.
pub struct FfmpegRunner {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegRunner {
    pub fn new(cfg: &RecordingConfig) -> Self {
        Self {
            ffmpeg: cfg.ffmpeg_bin.clone(),
            ffprobe: cfg.ffprobe_bin.clone(),
        }
    }

    async fn run(&self, bin: &str, args: &[String]) -> Result<String> {
        let output = tokio::process::Command::new(bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Internal(format!("{bin}: {e}")))?;
        if !output.status.success() {
            return Err(Error::Internal(format!(
                "{bin} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn video_codec(&self, path: &Path) -> Result<String> {
        let out = self
            .run(
                &self.ffprobe,
                &[
                    "-v".into(),
                    "error".into(),
                    "-select_streams".into(),
                    "v:0".into(),
                    "-show_entries".into(),
                    "stream=codec_name".into(),
                    "-of".into(),
                    "csv=p=0".into(),
                    path.display().to_string(),
                ],
            )
            .await?;
        Ok(out.trim().to_string())
    }
}

#[async_trait::async_trait]
impl MediaRunner for FfmpegRunner {
    async fn mux(
        &self,
        video: &Path,
        mic: Option<&Path>,
        tts: Option<&Path>,
        out: &Path,
        mic_gain: f32,
        tts_gain: f32,
    ) -> Result<()> {
        // Passthrough when the source is already H.264.
        let vcodec = match self.video_codec(video).await.as_deref() {
            Ok("h264") => "copy",
            _ => "libx264",
        };

        let mut args: Vec<String> = vec!["-y".into(), "-i".into(), video.display().to_string()];
        let mut audio_inputs = Vec::new();
        if let Some(mic) = mic {
            args.push("-i".into());
            args.push(mic.display().to_string());
            audio_inputs.push(mic_gain);
        }
        if let Some(tts) = tts {
            args.push("-i".into());
            args.push(tts.display().to_string());
            audio_inputs.push(tts_gain);
        }

        args.push("-map".into());
        args.push("0:v:0".into());

        match audio_inputs.len() {
            0 => {
                // No external tracks: carry the original audio.
                args.push("-map".into());
                args.push("0:a:0".into());
            }
            1 => {
                let filter = format!("[1:a]volume={}[aout]", audio_inputs[0]);
                args.push("-filter_complex".into());
                args.push(filter);
                args.push("-map".into());
                args.push("[aout]".into());
            }
            _ => {
                let filter = format!(
                    "[1:a]volume={}[a1];[2:a]volume={}[a2];[a1][a2]amix=inputs=2:duration=longest[aout]",
                    audio_inputs[0], audio_inputs[1]
                );
                args.push("-filter_complex".into());
                args.push(filter);
                args.push("-map".into());
                args.push("[aout]".into());
            }
        }

        args.extend([
            "-c:v".into(),
            vcodec.into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-ac".into(),
            "2".into(),
            out.display().to_string(),
        ]);

        self.run(&self.ffmpeg, &args).await?;
        Ok(())
    }

    async fn audio_stream_count(&self, path: &Path) -> Result<u32> {
        let out = self
            .run(
                &self.ffprobe,
                &[
                    "-v".into(),
                    "error".into(),
                    "-select_streams".into(),
                    "a".into(),
                    "-show_entries".into(),
                    "stream=codec_type".into(),
                    "-of".into(),
                    "csv=p=0".into(),
                    path.display().to_string(),
                ],
            )
            .await?;
        Ok(out.lines().filter(|l| !l.trim().is_empty()).count() as u32)
    }

    async fn duration_ms(&self, path: &Path) -> Result<u64> {
        let out = self
            .run(
                &self.ffprobe,
                &[
                    "-v".into(),
                    "error".into(),
                    "-show_entries".into(),
                    "format=duration".into(),
                    "-of".into(),
                    "csv=p=0".into(),
                    path.display().to_string(),
                ],
            )
            .await?;
        let secs: f64 = out.trim().parse().unwrap_or(0.0);
        Ok((secs * 1000.0) as u64)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recording store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkKind {
    Video,
    Mic,
}

pub struct RecordingStore {
    storage: Arc<Storage>,
    runner: Arc<dyn MediaRunner>,
    cfg: RecordingConfig,
}

impl RecordingStore {
    pub fn new(storage: Arc<Storage>, runner: Arc<dyn MediaRunner>, cfg: RecordingConfig) -> Self {
        Self {
            storage,
            runner,
            cfg,
        }
    }

    fn track_path(&self, session_id: Uuid, kind: ChunkKind) -> PathBuf {
        let name = match kind {
            ChunkKind::Video => "upload.webm",
            ChunkKind::Mic => "mic.webm",
        };
        self.storage.recordings_dir(session_id).join(name)
    }

    /// Append one uploaded chunk to the session's track file.
    pub async fn append_chunk(
        &self,
        session_id: Uuid,
        kind: ChunkKind,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let path = self.track_path(session_id, kind);
        tokio::task::spawn_blocking(move || -> Result<()> {
            use std::io::Write;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            file.write_all(&bytes)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("chunk write task: {e}")))?
    }

    /// Merge the session's tracks into the final artifact.
    ///
    /// On verified success the unmerged original (and the mic track)
    /// are deleted; only `final.mp4` remains. On failure the original
    /// is kept and the artifact references it with a diagnostic.
    pub async fn finalize(
        &self,
        session_id: Uuid,
        tts_track: Option<PathBuf>,
        question_timeline: Vec<(u32, u64)>,
    ) -> Result<RecordingArtifact> {
        let video = self.track_path(session_id, ChunkKind::Video);
        if !video.exists() {
            return Err(Error::NotFound(format!(
                "no uploaded video for session {session_id}"
            )));
        }
        let mic = self.track_path(session_id, ChunkKind::Mic);
        let mic = mic.exists().then_some(mic);

        let original_had_audio = self
            .runner
            .audio_stream_count(&video)
            .await
            .map(|n| n > 0)
            .unwrap_or(false);

        let final_path = self.storage.recordings_dir(session_id).join("final.mp4");
        let final_ref = format!("recordings/{session_id}/final.mp4");

        // Step 1: video already carries audio and no mic track exists —
        // remux as-is (container normalization only).
        let (mic_in, tts_in) = if mic.is_none() && original_had_audio && tts_track.is_none() {
            (None, None)
        } else {
            (mic.as_deref(), tts_track.as_deref())
        };

        let mut mux_ok = false;
        for attempt in 1..=MAX_MUX_ATTEMPTS {
            match self
                .runner
                .mux(
                    &video,
                    mic_in,
                    tts_in,
                    &final_path,
                    self.cfg.mic_gain,
                    self.cfg.tts_gain,
                )
                .await
            {
                Ok(()) => {
                    mux_ok = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(%session_id, attempt, error = %e, "mux attempt failed");
                }
            }
        }

        if !mux_ok {
            tracing::error!(%session_id, "mux failed twice, keeping original");
            let duration_ms = self.runner.duration_ms(&video).await.unwrap_or(0);
            return Ok(RecordingArtifact {
                session_id,
                final_merged_ref: format!("recordings/{session_id}/upload.webm"),
                duration_ms,
                has_audio: false,
                question_timeline,
            });
        }

        // Verify: the merged output must have exactly one audio stream.
        let verified = matches!(self.runner.audio_stream_count(&final_path).await, Ok(1));
        if !verified {
            tracing::warn!(%session_id, "mux verification failed, keeping original");
            let _ = std::fs::remove_file(&final_path);
            let duration_ms = self.runner.duration_ms(&video).await.unwrap_or(0);
            return Ok(RecordingArtifact {
                session_id,
                final_merged_ref: format!("recordings/{session_id}/upload.webm"),
                duration_ms,
                has_audio: original_had_audio,
                question_timeline,
            });
        }

        // Verified success: the unmerged files go away.
        std::fs::remove_file(&video)?;
        if let Some(mic) = &mic {
            let _ = std::fs::remove_file(mic);
        }

        let duration_ms = self.runner.duration_ms(&final_path).await.unwrap_or(0);
        tracing::info!(%session_id, duration_ms, "recording finalized");
        Ok(RecordingArtifact {
            session_id,
            final_merged_ref: final_ref,
            duration_ms,
            has_audio: true,
            question_timeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted runner: configurable mux success, audio counts.
    struct StubRunner {
        mux_calls: AtomicU32,
        mux_fails: u32,
        original_audio_streams: u32,
        merged_audio_streams: u32,
    }

    #[async_trait::async_trait]
    impl MediaRunner for StubRunner {
        async fn mux(
            &self,
            _video: &Path,
            _mic: Option<&Path>,
            _tts: Option<&Path>,
            out: &Path,
            _mic_gain: f32,
            _tts_gain: f32,
        ) -> Result<()> {
            let call = self.mux_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.mux_fails {
                return Err(Error::Internal("simulated mux failure".into()));
            }
            std::fs::write(out, b"merged")?;
            Ok(())
        }

        async fn audio_stream_count(&self, path: &Path) -> Result<u32> {
            if path.file_name().and_then(|n| n.to_str()) == Some("final.mp4") {
                Ok(self.merged_audio_streams)
            } else {
                Ok(self.original_audio_streams)
            }
        }

        async fn duration_ms(&self, _path: &Path) -> Result<u64> {
            Ok(600_000)
        }
    }

    async fn store_with(
        runner: StubRunner,
    ) -> (RecordingStore, Arc<Storage>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(dir.path()));
        storage.ensure_layout().unwrap();
        let store = RecordingStore::new(
            storage.clone(),
            Arc::new(runner),
            RecordingConfig::default(),
        );
        (store, storage, dir)
    }

    #[tokio::test]
    async fn silent_video_plus_mic_merges_and_deletes_original() {
        let (store, storage, _dir) = store_with(StubRunner {
            mux_calls: AtomicU32::new(0),
            mux_fails: 0,
            original_audio_streams: 0,
            merged_audio_streams: 1,
        })
        .await;

        let sid = Uuid::new_v4();
        store
            .append_chunk(sid, ChunkKind::Video, vec![1, 2, 3])
            .await
            .unwrap();
        store
            .append_chunk(sid, ChunkKind::Mic, vec![4, 5])
            .await
            .unwrap();

        let artifact = store.finalize(sid, None, vec![]).await.unwrap();
        assert!(artifact.has_audio);
        assert_eq!(
            artifact.final_merged_ref,
            format!("recordings/{sid}/final.mp4")
        );
        assert!(storage.absolute(&artifact.final_merged_ref).exists());
        // Unmerged tracks are gone.
        assert!(!storage
            .recordings_dir(sid)
            .join("upload.webm")
            .exists());
        assert!(!storage.recordings_dir(sid).join("mic.webm").exists());
    }

    #[tokio::test]
    async fn chunks_append_in_order() {
        let (store, storage, _dir) = store_with(StubRunner {
            mux_calls: AtomicU32::new(0),
            mux_fails: 0,
            original_audio_streams: 1,
            merged_audio_streams: 1,
        })
        .await;

        let sid = Uuid::new_v4();
        store
            .append_chunk(sid, ChunkKind::Video, b"abc".to_vec())
            .await
            .unwrap();
        store
            .append_chunk(sid, ChunkKind::Video, b"def".to_vec())
            .await
            .unwrap();
        let data =
            std::fs::read(storage.recordings_dir(sid).join("upload.webm")).unwrap();
        assert_eq!(data, b"abcdef");
    }

    #[tokio::test]
    async fn first_failure_retries_then_succeeds() {
        let (store, _storage, _dir) = store_with(StubRunner {
            mux_calls: AtomicU32::new(0),
            mux_fails: 1,
            original_audio_streams: 0,
            merged_audio_streams: 1,
        })
        .await;

        let sid = Uuid::new_v4();
        store
            .append_chunk(sid, ChunkKind::Video, vec![1])
            .await
            .unwrap();
        let artifact = store.finalize(sid, None, vec![]).await.unwrap();
        assert!(artifact.has_audio);
    }

    #[tokio::test]
    async fn two_failures_keep_original_without_audio() {
        let (store, storage, _dir) = store_with(StubRunner {
            mux_calls: AtomicU32::new(0),
            mux_fails: 2,
            original_audio_streams: 1,
            merged_audio_streams: 1,
        })
        .await;

        let sid = Uuid::new_v4();
        store
            .append_chunk(sid, ChunkKind::Video, vec![1])
            .await
            .unwrap();
        let artifact = store.finalize(sid, None, vec![]).await.unwrap();
        assert!(!artifact.has_audio);
        assert_eq!(
            artifact.final_merged_ref,
            format!("recordings/{sid}/upload.webm")
        );
        assert!(storage.recordings_dir(sid).join("upload.webm").exists());
    }

    #[tokio::test]
    async fn failed_verification_keeps_original_audio_flag() {
        let (store, storage, _dir) = store_with(StubRunner {
            mux_calls: AtomicU32::new(0),
            mux_fails: 0,
            original_audio_streams: 1,
            // Mux produced a broken container with two audio streams.
            merged_audio_streams: 2,
        })
        .await;

        let sid = Uuid::new_v4();
        store
            .append_chunk(sid, ChunkKind::Video, vec![1])
            .await
            .unwrap();
        store
            .append_chunk(sid, ChunkKind::Mic, vec![2])
            .await
            .unwrap();
        let artifact = store.finalize(sid, None, vec![]).await.unwrap();
        // Original had audio, so the flag reflects it.
        assert!(artifact.has_audio);
        assert!(storage.recordings_dir(sid).join("upload.webm").exists());
        assert!(!storage.recordings_dir(sid).join("final.mp4").exists());
    }

    #[tokio::test]
    async fn finalize_without_upload_is_not_found() {
        let (store, _storage, _dir) = store_with(StubRunner {
            mux_calls: AtomicU32::new(0),
            mux_fails: 0,
            original_audio_streams: 0,
            merged_audio_streams: 1,
        })
        .await;
        assert!(matches!(
            store.finalize(Uuid::new_v4(), None, vec![]).await,
            Err(Error::NotFound(_))
        ));
    }
}
