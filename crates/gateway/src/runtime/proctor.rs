//! Proctoring loop — the per-session vision pipeline.
//!
//! Frames arrive on a bounded channel (the upload handler drops frames
//! when the loop is behind). Each frame runs through the detector
//! (primary model, then the fast fallback), is classified into warning
//! conditions, debounced against a per-kind hold window, deduped by the
//! warning log, and — when a warning fires — snapshotted to storage.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use candor_domain::clock::Clock;
use candor_domain::config::ProctorConfig;
use candor_domain::warning::WarningKind;
use candor_providers::{Detection, DetectionLabel, FrameDetector};
use candor_sessions::SessionHandle;

use crate::storage::Storage;

/// Consecutive detector failures before the session is flagged degraded.
const DEGRADED_AFTER_FAILURES: u32 = 3;

/// One camera frame from the candidate browser.
pub struct Frame {
    pub jpeg: Vec<u8>,
    pub at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frame classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Warning conditions present in one frame. Conditions are independent:
/// a frame can show both a phone and a second person.
pub(crate) fn classify_frame(detections: &[Detection], cfg: &ProctorConfig) -> Vec<WarningKind> {
    let persons: Vec<&Detection> = detections
        .iter()
        .filter(|d| d.label == DetectionLabel::Person && d.confidence >= cfg.person_conf)
        .collect();
    let phone = detections
        .iter()
        .any(|d| d.label == DetectionLabel::Phone && d.confidence >= cfg.phone_conf);

    let mut kinds = Vec::new();
    match persons.len() {
        0 => kinds.push(WarningKind::NoPerson),
        1 => {
            let deviation = (persons[0].center_x() - 0.5).abs();
            if deviation > cfg.attention_deviation {
                kinds.push(WarningKind::LowAttention);
            }
        }
        _ => kinds.push(WarningKind::MultiplePeople),
    }
    if phone {
        kinds.push(WarningKind::PhoneDetected);
    }
    kinds
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hold tracking (debounce)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A warning is emitted only once its condition has held for the
/// configured duration; a frame without the condition resets the timer.
pub(crate) struct HoldTracker {
    since: HashMap<WarningKind, DateTime<Utc>>,
    verdict_hold: Duration,
    attention_hold: Duration,
}

impl HoldTracker {
    pub(crate) fn new(cfg: &ProctorConfig) -> Self {
        Self {
            since: HashMap::new(),
            verdict_hold: Duration::seconds(cfg.verdict_hold_s as i64),
            attention_hold: Duration::seconds(cfg.attention_hold_s as i64),
        }
    }

    fn required_hold(&self, kind: WarningKind) -> Duration {
        // LowAttention carries its own longer persistence requirement.
        if kind == WarningKind::LowAttention {
            self.attention_hold
        } else {
            self.verdict_hold
        }
    }

    /// Feed one frame's conditions; returns the kinds whose hold window
    /// just completed.
    pub(crate) fn observe(&mut self, present: &[WarningKind], at: DateTime<Utc>) -> Vec<WarningKind> {
        self.since.retain(|kind, _| present.contains(kind));

        let mut ready = Vec::new();
        for &kind in present {
            let since = *self.since.entry(kind).or_insert(at);
            if at - since >= self.required_hold(kind) {
                ready.push(kind);
            }
        }
        ready
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProctorLoop;

impl ProctorLoop {
    /// Spawn the per-session vision task. Returns the frame sender; the
    /// task exits when the sender side closes or the session cancels.
    pub fn spawn(
        handle: Arc<SessionHandle>,
        primary: Arc<dyn FrameDetector>,
        fallback: Arc<dyn FrameDetector>,
        cfg: ProctorConfig,
        storage: Arc<Storage>,
        clock: Arc<dyn Clock>,
    ) -> mpsc::Sender<Frame> {
        let (tx, mut rx) = mpsc::channel::<Frame>(8);

        tokio::spawn(async move {
            let mut hold = HoldTracker::new(&cfg);
            let mut consecutive_failures: u32 = 0;
            let mut degraded_notified = false;
            let stale = Duration::milliseconds(cfg.stale_frame_ms as i64);

            while let Some(frame) = rx.recv().await {
                if handle.cancel.is_cancelled() {
                    break;
                }
                // Skip frames when behind.
                if clock.now_utc() - frame.at > stale {
                    continue;
                }

                let detections = match primary.detect(&frame.jpeg).await {
                    Ok(d) => {
                        consecutive_failures = 0;
                        d
                    }
                    Err(primary_err) => match fallback.detect(&frame.jpeg).await {
                        Ok(d) => {
                            tracing::debug!(
                                session_id = %handle.id,
                                error = %primary_err,
                                "primary detector failed, fallback answered"
                            );
                            consecutive_failures = 0;
                            d
                        }
                        Err(fallback_err) => {
                            consecutive_failures += 1;
                            tracing::warn!(
                                session_id = %handle.id,
                                consecutive_failures,
                                primary = %primary_err,
                                fallback = %fallback_err,
                                "detector failed, frame dropped"
                            );
                            if consecutive_failures >= DEGRADED_AFTER_FAILURES
                                && !degraded_notified
                            {
                                degraded_notified = true;
                                let mut state = handle.state.lock().await;
                                state
                                    .turns
                                    .record_system("proctoring degraded", frame.at);
                                tracing::error!(
                                    session_id = %handle.id,
                                    "proctoring degraded after repeated detector failures"
                                );
                            }
                            continue;
                        }
                    },
                };

                let present = classify_frame(&detections, &cfg);
                let ready = hold.observe(&present, frame.at);
                if ready.is_empty() {
                    continue;
                }

                for kind in ready {
                    let event = {
                        let mut state = handle.state.lock().await;
                        state.warnings.try_record(kind, frame.at, None)
                    };
                    let Some(event) = event else { continue };

                    match storage
                        .write_snapshot(handle.id, event.id, frame.jpeg.clone())
                        .await
                    {
                        Ok(snapshot_ref) => {
                            let mut state = handle.state.lock().await;
                            state.warnings.attach_snapshot(event.id, snapshot_ref);
                        }
                        Err(e) => {
                            tracing::warn!(
                                session_id = %handle.id,
                                error = %e,
                                "warning snapshot write failed"
                            );
                        }
                    }
                    tracing::info!(
                        session_id = %handle.id,
                        kind = ?kind,
                        at = %frame.at,
                        "proctoring warning"
                    );
                }
            }
            tracing::debug!(session_id = %handle.id, "proctor loop ended");
        });

        tx
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-session frame senders, created lazily on the first frame.
pub struct ProctorManager {
    primary: Arc<dyn FrameDetector>,
    fallback: Arc<dyn FrameDetector>,
    cfg: ProctorConfig,
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    channels: parking_lot::Mutex<HashMap<Uuid, mpsc::Sender<Frame>>>,
}

impl ProctorManager {
    pub fn new(
        primary: Arc<dyn FrameDetector>,
        fallback: Arc<dyn FrameDetector>,
        cfg: ProctorConfig,
        storage: Arc<Storage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            primary,
            fallback,
            cfg,
            storage,
            clock,
            channels: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Feed a frame to the session's loop; drops the frame when the
    /// loop is behind (bounded channel, no buffering past the budget).
    pub fn submit_frame(&self, handle: &Arc<SessionHandle>, frame: Frame) {
        let tx = {
            let mut channels = self.channels.lock();
            channels
                .entry(handle.id)
                .or_insert_with(|| {
                    ProctorLoop::spawn(
                        handle.clone(),
                        self.primary.clone(),
                        self.fallback.clone(),
                        self.cfg.clone(),
                        self.storage.clone(),
                        self.clock.clone(),
                    )
                })
                .clone()
        };
        if tx.try_send(frame).is_err() {
            tracing::trace!(session_id = %handle.id, "proctor behind, frame dropped");
        }
    }

    /// Drop a session's channel (its loop exits once drained).
    pub fn detach(&self, session_id: &Uuid) {
        self.channels.lock().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candor_domain::clock::ManualClock;
    use candor_domain::error::Result;
    use candor_domain::slot::{AiType, Difficulty};
    use candor_sessions::JobContext;
    use chrono::TimeZone;

    fn det(label: DetectionLabel, confidence: f32, center_x: f32) -> Detection {
        Detection {
            label,
            confidence,
            x: center_x - 0.05,
            y: 0.1,
            width: 0.1,
            height: 0.4,
        }
    }

    fn cfg() -> ProctorConfig {
        ProctorConfig::default()
    }

    #[test]
    fn classification_thresholds() {
        let c = cfg();
        // Low-confidence person does not count.
        let kinds = classify_frame(&[det(DetectionLabel::Person, 0.4, 0.5)], &c);
        assert_eq!(kinds, vec![WarningKind::NoPerson]);

        // Two confident persons.
        let kinds = classify_frame(
            &[
                det(DetectionLabel::Person, 0.8, 0.3),
                det(DetectionLabel::Person, 0.7, 0.7),
            ],
            &c,
        );
        assert_eq!(kinds, vec![WarningKind::MultiplePeople]);

        // Phone at 0.4 confidence counts, independent of persons.
        let kinds = classify_frame(
            &[
                det(DetectionLabel::Person, 0.9, 0.5),
                det(DetectionLabel::Phone, 0.4, 0.5),
            ],
            &c,
        );
        assert_eq!(kinds, vec![WarningKind::PhoneDetected]);

        // Centered single person: clean frame.
        let kinds = classify_frame(&[det(DetectionLabel::Person, 0.9, 0.52)], &c);
        assert!(kinds.is_empty());

        // Far off-center person: low attention.
        let kinds = classify_frame(&[det(DetectionLabel::Person, 0.9, 0.05)], &c);
        assert_eq!(kinds, vec![WarningKind::LowAttention]);
    }

    #[test]
    fn hold_requires_two_seconds() {
        let c = cfg();
        let mut hold = HoldTracker::new(&c);
        let t0 = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();

        assert!(hold.observe(&[WarningKind::NoPerson], t0).is_empty());
        assert!(hold
            .observe(&[WarningKind::NoPerson], t0 + Duration::seconds(1))
            .is_empty());
        let ready = hold.observe(&[WarningKind::NoPerson], t0 + Duration::seconds(2));
        assert_eq!(ready, vec![WarningKind::NoPerson]);
    }

    #[test]
    fn hold_resets_when_condition_clears() {
        let c = cfg();
        let mut hold = HoldTracker::new(&c);
        let t0 = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();

        hold.observe(&[WarningKind::MultiplePeople], t0);
        // Clean frame in between resets the timer.
        hold.observe(&[], t0 + Duration::seconds(1));
        assert!(hold
            .observe(&[WarningKind::MultiplePeople], t0 + Duration::seconds(2))
            .is_empty());
    }

    #[test]
    fn low_attention_needs_three_seconds() {
        let c = cfg();
        let mut hold = HoldTracker::new(&c);
        let t0 = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();

        hold.observe(&[WarningKind::LowAttention], t0);
        assert!(hold
            .observe(&[WarningKind::LowAttention], t0 + Duration::seconds(2))
            .is_empty());
        assert_eq!(
            hold.observe(&[WarningKind::LowAttention], t0 + Duration::seconds(3)),
            vec![WarningKind::LowAttention]
        );
    }

    // ── End-to-end loop test with a stubbed detector ───────────────

    struct TwoPeople;

    #[async_trait::async_trait]
    impl FrameDetector for TwoPeople {
        async fn detect(&self, _frame: &[u8]) -> Result<Vec<Detection>> {
            Ok(vec![
                det(DetectionLabel::Person, 0.9, 0.3),
                det(DetectionLabel::Person, 0.9, 0.7),
            ])
        }

        fn provider_id(&self) -> &str {
            "two-people"
        }
    }

    fn session() -> Arc<SessionHandle> {
        SessionHandle::new(
            Uuid::new_v4(),
            JobContext {
                candidate_name: "Jane".into(),
                company: "acme".into(),
                role: "backend".into(),
                job_description: String::new(),
                candidate_resume: String::new(),
                ai_type: AiType::Technical,
                difficulty: Difficulty::Medium,
                language: "en".into(),
            },
            6,
            10,
            Utc::now(),
            Utc::now() + Duration::minutes(30),
        )
    }

    #[tokio::test]
    async fn loop_debounces_and_dedups_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(dir.path()));
        storage.ensure_layout().unwrap();

        let t0 = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let clock = ManualClock::at(t0);
        let handle = session();
        let detector: Arc<dyn FrameDetector> = Arc::new(TwoPeople);

        let tx = ProctorLoop::spawn(
            handle.clone(),
            detector.clone(),
            detector,
            cfg(),
            storage.clone(),
            clock,
        );

        // 1 fps for 14 seconds: warning at t+2 (2 s hold) and t+12
        // (first frame past the 10 s dedup window), nothing between.
        for s in 0..14 {
            tx.send(Frame {
                jpeg: vec![0xff, 0xd8, s as u8],
                at: t0 + Duration::seconds(s),
            })
            .await
            .unwrap();
        }
        drop(tx);

        // Let the loop drain.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let state = handle.state.lock().await;
        let warnings = state.warnings.all();
        assert_eq!(warnings.len(), 2, "got: {warnings:?}");
        assert_eq!(warnings[0].kind, WarningKind::MultiplePeople);
        assert_eq!(warnings[0].at, t0 + Duration::seconds(2));
        assert_eq!(warnings[1].at, t0 + Duration::seconds(12));

        // Snapshots were written with the warning id in the filename.
        for w in warnings {
            let r = w.snapshot_ref.as_ref().unwrap();
            assert!(r.contains(&w.id.to_string()));
            assert!(storage.absolute(r).exists());
        }
    }
}
