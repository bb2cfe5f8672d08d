use std::thread::sleep;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::audit::{AuditEntry, AuditLog, AuthThrottle};
use crate::capture::FrameSource;
use crate::errors::AppResult;
use crate::faces::extractor::{crop_face, FaceDetector, FaceEmbedder};
use crate::faces::matcher::verify;
use crate::faces::store::TemplateStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthDecision {
    pub identity: String,
    pub distance: f64,
    pub accepted: bool,
    /// Whether an AUTH entry was written for this decision.
    pub logged: bool,
}

/// Matches probes against the store and records throttled AUTH entries.
#[derive(Debug, Clone)]
pub struct Authenticator {
    threshold: f64,
    throttle: AuthThrottle,
    audit: AuditLog,
}

impl Authenticator {
    pub fn new(threshold: f64, log_interval: Duration, audit: AuditLog) -> Self {
        Self {
            threshold,
            throttle: AuthThrottle::new(log_interval),
            audit,
        }
    }

    pub fn authenticate(&mut self, probe: &[f64], store: &TemplateStore) -> AppResult<AuthDecision> {
        self.authenticate_at(probe, store, Instant::now())
    }

    pub fn authenticate_at(
        &mut self,
        probe: &[f64],
        store: &TemplateStore,
        now: Instant,
    ) -> AppResult<AuthDecision> {
        let decision = verify(probe, store, self.threshold);
        let accepted = decision.is_known();

        let logged = if self.throttle.is_due(&decision.identity, now) {
            self.audit
                .append(&AuditEntry::auth(&decision.identity, accepted, decision.distance))?;
            self.throttle.mark(&decision.identity, now);
            true
        } else {
            false
        };

        debug!(
            identity = %decision.identity,
            distance = decision.distance,
            accepted,
            logged,
            "probe verified"
        );
        Ok(AuthDecision {
            identity: decision.identity,
            distance: decision.distance,
            accepted,
            logged,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LiveAuthConfig {
    pub timeout: Duration,
    pub frame_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthFailureReason {
    NoTemplates,
    NoFaceDetected,
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveAuthOutcome {
    pub decision: Option<AuthDecision>,
    pub frames: usize,
    pub best_distance: f64,
    pub failure_reason: Option<AuthFailureReason>,
    #[serde(skip)]
    pub logs: Vec<String>,
}

impl LiveAuthOutcome {
    fn failure(reason: AuthFailureReason, best_distance: f64, frames: usize, logs: Vec<String>) -> Self {
        Self {
            decision: None,
            frames,
            best_distance,
            failure_reason: Some(reason),
            logs,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.decision.is_some()
    }
}

/// Authenticates every face seen until one is accepted or `config.timeout`
/// elapses.
pub fn run_live_authentication<F, D, E>(
    authenticator: &mut Authenticator,
    store: &TemplateStore,
    frames: &mut F,
    detector: &D,
    embedder: &E,
    config: &LiveAuthConfig,
) -> AppResult<LiveAuthOutcome>
where
    F: FrameSource + ?Sized,
    D: FaceDetector + ?Sized,
    E: FaceEmbedder + ?Sized,
{
    let mut logs = Vec::new();
    if store.is_empty() {
        logs.push("no templates enrolled; every face will be rejected".to_string());
    }

    let deadline = Instant::now() + config.timeout;
    let mut frame_count = 0usize;
    let mut best_distance = f64::INFINITY;
    let mut saw_face = false;
    let mut retry_hint_sent = false;

    while Instant::now() < deadline {
        if let Some(frame) = frames.next_frame()? {
            frame_count += 1;
            let faces = detector.detect(&frame)?;
            if faces.is_empty() && !saw_face && !retry_hint_sent {
                logs.push("no face detected yet; retrying".to_string());
                retry_hint_sent = true;
            }

            for bbox in &faces {
                saw_face = true;
                let Some(probe) = crop_face(&frame, bbox).and_then(|face| embedder.embed(&face))
                else {
                    continue;
                };
                let decision = authenticator.authenticate(&probe, store)?;
                if decision.distance < best_distance {
                    best_distance = decision.distance;
                }
                if decision.accepted {
                    logs.push(format!(
                        "matched {} (distance={:.4}) after {frame_count} frame(s)",
                        decision.identity, decision.distance
                    ));
                    info!(identity = %decision.identity, frames = frame_count, "live authentication accepted");
                    return Ok(LiveAuthOutcome {
                        decision: Some(decision),
                        frames: frame_count,
                        best_distance,
                        failure_reason: None,
                        logs,
                    });
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let pause = config.frame_interval.min(remaining);
        if !pause.is_zero() {
            sleep(pause);
        }
    }

    let reason = if store.is_empty() {
        AuthFailureReason::NoTemplates
    } else if saw_face {
        AuthFailureReason::NoMatch
    } else {
        AuthFailureReason::NoFaceDetected
    };
    logs.push(format!("no match after {frame_count} frame(s)"));
    info!(frames = frame_count, ?reason, "live authentication rejected");
    Ok(LiveAuthOutcome::failure(reason, best_distance, frame_count, logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::extractor::BoundingBox;
    use crate::faces::store::EmbeddingVector;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    struct Frames(Vec<RgbImage>);

    impl FrameSource for Frames {
        fn next_frame(&mut self) -> AppResult<Option<RgbImage>> {
            Ok(if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            })
        }
    }

    /// One face per frame unless the red channel is zero.
    struct Detector;

    impl FaceDetector for Detector {
        fn detect(&self, frame: &RgbImage) -> AppResult<Vec<BoundingBox>> {
            if frame.get_pixel(0, 0)[0] == 0 {
                return Ok(Vec::new());
            }
            Ok(vec![BoundingBox {
                left: 0,
                top: 0,
                right: 4,
                bottom: 4,
            }])
        }
    }

    struct Embedder;

    impl FaceEmbedder for Embedder {
        fn embed(&self, face: &RgbImage) -> Option<EmbeddingVector> {
            let pixel = face.get_pixel(0, 0);
            Some(vec![f64::from(pixel[1]), f64::from(pixel[2])])
        }
    }

    /// Replays a scripted sequence where `None` is a missed frame.
    struct ScriptedFrames(Vec<Option<RgbImage>>);

    impl FrameSource for ScriptedFrames {
        fn next_frame(&mut self) -> AppResult<Option<RgbImage>> {
            Ok(if self.0.is_empty() {
                None
            } else {
                self.0.remove(0)
            })
        }
    }

    fn face_frame(x: u8, y: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([1, x, y]))
    }

    fn store() -> TemplateStore {
        vec![("alice".to_string(), vec![1.0, 0.0])].into_iter().collect()
    }

    fn live_config() -> LiveAuthConfig {
        LiveAuthConfig {
            timeout: Duration::from_millis(60),
            frame_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn repeated_attempts_are_throttled_per_label() {
        let tmp = TempDir::new().unwrap();
        let audit = AuditLog::in_dir(tmp.path());
        let mut auth = Authenticator::new(0.4, Duration::from_secs(1), audit.clone());
        let store = store();
        let start = Instant::now();

        for offset in [0, 200, 400, 600, 800] {
            let decision = auth
                .authenticate_at(&[1.0, 0.0], &store, start + Duration::from_millis(offset))
                .unwrap();
            assert!(decision.accepted);
            assert_eq!(decision.logged, offset == 0);
        }
        let unknown = auth
            .authenticate_at(&[0.0, 1.0], &store, start + Duration::from_millis(900))
            .unwrap();
        assert!(!unknown.accepted);
        assert!(unknown.logged);

        let later = auth
            .authenticate_at(&[1.0, 0.0], &store, start + Duration::from_millis(1000))
            .unwrap();
        assert!(later.logged);

        let entries = audit.entries().unwrap();
        let labels: Vec<_> = entries.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(labels, ["alice", "Unknown", "alice"]);
        assert_eq!(entries[1].outcome, "fail");
    }

    #[test]
    fn empty_store_logs_unknown_with_infinite_distance() {
        let tmp = TempDir::new().unwrap();
        let audit = AuditLog::in_dir(tmp.path());
        let mut auth = Authenticator::new(0.4, Duration::from_secs(1), audit.clone());

        let decision = auth.authenticate(&[0.5, 0.5], &TemplateStore::new()).unwrap();
        assert_eq!(decision.identity, "Unknown");
        assert!(decision.distance.is_infinite());
        assert_eq!(audit.entries().unwrap()[0].detail, "inf");
    }

    #[test]
    fn live_loop_stops_at_first_accepted_face() {
        let tmp = TempDir::new().unwrap();
        let mut auth = Authenticator::new(0.4, Duration::from_secs(1), AuditLog::in_dir(tmp.path()));
        let mut frames = Frames(vec![
            RgbImage::new(4, 4),
            face_frame(0, 9),
            face_frame(9, 0),
            face_frame(9, 0),
        ]);

        let outcome =
            run_live_authentication(&mut auth, &store(), &mut frames, &Detector, &Embedder, &live_config())
                .unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(outcome.frames, 3);
        assert_eq!(outcome.decision.unwrap().identity, "alice");
        assert_eq!(frames.0.len(), 1);
    }

    #[test]
    fn live_loop_reports_why_it_failed() {
        let tmp = TempDir::new().unwrap();
        let mut auth = Authenticator::new(0.4, Duration::from_secs(1), AuditLog::in_dir(tmp.path()));

        let outcome = run_live_authentication(
            &mut auth,
            &TemplateStore::new(),
            &mut Frames(vec![]),
            &Detector,
            &Embedder,
            &live_config(),
        )
        .unwrap();
        assert_eq!(outcome.failure_reason, Some(AuthFailureReason::NoTemplates));

        let outcome = run_live_authentication(
            &mut auth,
            &store(),
            &mut Frames(vec![RgbImage::new(4, 4)]),
            &Detector,
            &Embedder,
            &live_config(),
        )
        .unwrap();
        assert_eq!(outcome.failure_reason, Some(AuthFailureReason::NoFaceDetected));

        let outcome = run_live_authentication(
            &mut auth,
            &store(),
            &mut Frames(vec![face_frame(0, 9)]),
            &Detector,
            &Embedder,
            &live_config(),
        )
        .unwrap();
        assert_eq!(outcome.failure_reason, Some(AuthFailureReason::NoMatch));
        assert!((outcome.best_distance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_store_still_audits_every_detected_face() {
        let tmp = TempDir::new().unwrap();
        let audit = AuditLog::in_dir(tmp.path());
        let mut auth = Authenticator::new(0.4, Duration::from_secs(1), audit.clone());
        let mut frames = Frames(vec![face_frame(3, 4), face_frame(3, 4)]);

        let outcome = run_live_authentication(
            &mut auth,
            &TemplateStore::new(),
            &mut frames,
            &Detector,
            &Embedder,
            &live_config(),
        )
        .unwrap();
        assert_eq!(outcome.failure_reason, Some(AuthFailureReason::NoTemplates));
        assert_eq!(outcome.frames, 2);

        let entries = audit.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subject, "Unknown");
        assert_eq!(entries[0].outcome, "fail");
        assert_eq!(entries[0].detail, "inf");
    }

    #[test]
    fn retry_hint_survives_a_missed_first_frame() {
        let tmp = TempDir::new().unwrap();
        let mut auth = Authenticator::new(0.4, Duration::from_secs(1), AuditLog::in_dir(tmp.path()));
        let mut frames = ScriptedFrames(vec![None, Some(RgbImage::new(4, 4)), Some(RgbImage::new(4, 4))]);

        let outcome =
            run_live_authentication(&mut auth, &store(), &mut frames, &Detector, &Embedder, &live_config())
                .unwrap();
        assert_eq!(outcome.failure_reason, Some(AuthFailureReason::NoFaceDetected));
        let hints = outcome
            .logs
            .iter()
            .filter(|line| line.starts_with("no face detected yet"))
            .count();
        assert_eq!(hints, 1);
    }
}
