use std::fs;
use std::sync::mpsc;
use std::time::Duration;

use facegate_core::audit::AuditKind;
use facegate_core::capture::FrameSource;
use facegate_core::errors::{AppError, AppResult};
use facegate_core::faces::{
    drive, BoundingBox, CancelToken, EmbeddingVector, EnrollmentEvent, EnrollmentStatus,
    EnrollmentTask, FaceDetector, FaceEmbedder, FaceStore, FilesystemFaceStore, TemplateStore,
    UNKNOWN_IDENTITY,
};
use facegate_core::{FaceGate, GateSettings};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

struct EndlessFrames {
    next: u8,
}

impl FrameSource for EndlessFrames {
    fn next_frame(&mut self) -> AppResult<Option<RgbImage>> {
        self.next = self.next.wrapping_add(1);
        Ok(Some(RgbImage::from_pixel(6, 6, Rgb([self.next, 10, 20]))))
    }
}

struct SingleFace;

impl FaceDetector for SingleFace {
    fn detect(&self, frame: &RgbImage) -> AppResult<Vec<BoundingBox>> {
        Ok(vec![BoundingBox {
            left: 1,
            top: 1,
            right: i64::from(frame.width()) - 1,
            bottom: i64::from(frame.height()) - 1,
        }])
    }
}

/// Embeds the first pixel; a red channel of 0 is treated as "no face".
struct PixelEmbedder;

impl FaceEmbedder for PixelEmbedder {
    fn embed(&self, face: &RgbImage) -> Option<EmbeddingVector> {
        let [r, g, b] = face.get_pixel(0, 0).0;
        if r == 0 {
            return None;
        }
        Some(vec![f64::from(r), f64::from(g), f64::from(b)])
    }
}

fn unlocked_gate(tmp: &TempDir) -> FaceGate {
    let mut gate = FaceGate::open(tmp.path(), GateSettings::default()).unwrap();
    gate.setup_admin("s3cret").unwrap();
    gate
}

#[test]
fn empty_store_identifies_nobody() {
    let tmp = TempDir::new().unwrap();
    let mut gate = FaceGate::open(tmp.path(), GateSettings::default()).unwrap();

    let decision = gate.authenticate(&[0.3, 0.1, 0.9]).unwrap();
    assert_eq!(decision.identity, UNKNOWN_IDENTITY);
    assert!(decision.distance.is_infinite());
    assert!(!decision.accepted);
}

#[test]
fn exact_template_probe_is_accepted() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemFaceStore::in_dir(tmp.path());
    let templates = [vec![1.0, 2.0, 3.0], vec![-1.0, 0.5, 2.0], vec![0.0, 4.0, 1.0]];
    for template in &templates {
        store.add_template("alice", template.clone()).unwrap();
    }

    let mut gate = FaceGate::open(tmp.path(), GateSettings::default()).unwrap();
    let decision = gate.authenticate(&templates[1]).unwrap();
    assert_eq!(decision.identity, "alice");
    assert!(decision.distance.abs() < 1e-12);
}

#[test]
fn camera_enrollment_collects_target_samples() {
    let tmp = TempDir::new().unwrap();
    let mut gate = unlocked_gate(&tmp);

    let mut session = gate
        .begin_camera_enrollment("bob", 5, EndlessFrames { next: 0 }, SingleFace, PixelEmbedder)
        .unwrap();
    let mut ticks = 0;
    let mut last = None;
    while !session.is_finished() {
        last = Some(session.step().unwrap());
        ticks += 1;
    }
    drop(session);

    assert_eq!(ticks, 5);
    let report = last.unwrap().report().cloned().unwrap();
    assert_eq!(report.status, EnrollmentStatus::Complete);
    assert_eq!(gate.templates().templates("bob").len(), 5);
    assert_eq!(gate.identities().unwrap()[0].templates, 5);

    let entries = gate.read_audit_log().unwrap();
    let enrolls: Vec<_> = entries
        .iter()
        .filter(|e| e.kind == AuditKind::Enroll)
        .collect();
    assert_eq!(enrolls.len(), 1);
    assert_eq!(enrolls[0].subject, "bob");
    assert_eq!(enrolls[0].outcome, "camera");
    assert_eq!(enrolls[0].samples(), Some(5));
}

#[test]
fn folder_enrollment_skips_unusable_images() {
    let tmp = TempDir::new().unwrap();
    let folder = tmp.path().join("photos");
    fs::create_dir(&folder).unwrap();
    for (name, red) in [("a.png", 5u8), ("b.png", 0), ("c.png", 7), ("d.jpeg", 200)] {
        RgbImage::from_pixel(8, 8, Rgb([red, 1, 1]))
            .save(folder.join(name))
            .unwrap();
    }

    let mut gate = unlocked_gate(&tmp);
    let mut session = gate
        .begin_folder_enrollment("carol", &folder, PixelEmbedder)
        .unwrap();
    let (tx, rx) = mpsc::channel();
    let report = drive(&mut session, Duration::ZERO, &CancelToken::new(), &tx).unwrap();
    drop(session);

    assert_eq!((report.added, report.skipped), (3, 1));
    let events: Vec<EnrollmentEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 4);
    assert_eq!(gate.templates().templates("carol").len(), 3);

    let entries = gate.read_audit_log().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, "upload-folder");
    assert_eq!(entries[0].samples(), Some(3));
}

#[test]
fn failed_admin_logins_block_enrollment() {
    let tmp = TempDir::new().unwrap();
    {
        let mut gate = FaceGate::open(tmp.path(), GateSettings::default()).unwrap();
        gate.setup_admin("s3cret").unwrap();
    }

    let mut gate = FaceGate::open(tmp.path(), GateSettings::default()).unwrap();
    for _ in 0..2 {
        assert!(matches!(
            gate.admin_login("guess"),
            Err(AppError::AuthenticationFailure)
        ));
        assert!(!gate.is_admin());
    }

    let err = gate
        .begin_camera_enrollment("dave", 3, EndlessFrames { next: 0 }, SingleFace, PixelEmbedder)
        .err()
        .unwrap();
    match err {
        AppError::Validation { message } => assert_eq!(message, "admin login required"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(FilesystemFaceStore::in_dir(tmp.path()).load().unwrap(), TemplateStore::new());
}
