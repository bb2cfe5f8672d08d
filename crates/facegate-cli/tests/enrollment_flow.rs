use std::fs;
use std::path::Path;
use std::time::Duration;

use facegate_cli::admin::run_admin_setup_with;
use facegate_cli::cli::{
    AdminSetupArgs, AuthArgs, CameraEnrollArgs, IdentifyArgs, LogArgs, ModelArgs, StoreArgs,
    UploadEnrollArgs,
};
use facegate_cli::config::CliContext;
use facegate_cli::enrollment::{run_camera_enrollment_with, run_folder_enrollment_with};
use facegate_cli::errors::{AppError, AppResult};
use facegate_cli::identify::{run_identify_with, run_live_auth_with};
use facegate_cli::records::{run_audit_log_with, run_identities_with};
use facegate_config::ResolvedConfig;
use facegate_core::audit::AuditKind;
use facegate_core::auth::AuthFailureReason;
use facegate_core::capture::FrameSource;
use facegate_core::faces::{BoundingBox, EmbeddingVector, EnrollmentStatus, FaceDetector, FaceEmbedder};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

const SECRET: &str = "s3cret";

struct StaticFrames {
    faces: u8,
}

impl FrameSource for StaticFrames {
    fn next_frame(&mut self) -> AppResult<Option<RgbImage>> {
        Ok(Some(RgbImage::from_pixel(4, 4, Rgb([self.faces, 3, 4]))))
    }
}

/// Reports as many faces as the red channel says.
struct RedChannelDetector;

impl FaceDetector for RedChannelDetector {
    fn detect(&self, frame: &RgbImage) -> AppResult<Vec<BoundingBox>> {
        let faces = frame.get_pixel(0, 0)[0] as usize;
        let bbox = BoundingBox {
            left: 0,
            top: 0,
            right: 4,
            bottom: 4,
        };
        Ok(vec![bbox; faces])
    }
}

/// Embeds green/blue; images with a zero red channel are declined.
struct ChannelEmbedder;

impl FaceEmbedder for ChannelEmbedder {
    fn embed(&self, face: &RgbImage) -> Option<EmbeddingVector> {
        let [r, g, b] = face.get_pixel(0, 0).0;
        (r != 0).then(|| vec![f64::from(g), f64::from(b)])
    }
}

fn context(data_dir: &Path) -> CliContext {
    let config = ResolvedConfig {
        capture_interval: Duration::ZERO,
        upload_interval: Duration::ZERO,
        frame_interval: Duration::from_millis(1),
        ..ResolvedConfig::default()
    };
    CliContext::new(config, Some(data_dir))
}

fn store_args(data_dir: &Path) -> StoreArgs {
    StoreArgs {
        data_dir: Some(data_dir.to_path_buf()),
    }
}

fn model_args() -> ModelArgs {
    ModelArgs {
        landmark_model: None,
        encoder_model: None,
        jitters: None,
    }
}

fn setup_admin(data_dir: &Path) {
    let args = AdminSetupArgs {
        secret: SECRET.into(),
        current_secret: None,
        store: store_args(data_dir),
    };
    run_admin_setup_with(&args, context(data_dir)).unwrap();
}

fn camera_args(data_dir: &Path, secret: &str, timeout_secs: u64) -> CameraEnrollArgs {
    CameraEnrollArgs {
        user: "bob".into(),
        samples: Some(4),
        admin_secret: secret.into(),
        device: None,
        timeout_secs,
        models: model_args(),
        store: store_args(data_dir),
    }
}

#[test]
fn camera_enrollment_then_identify() {
    let tmp = TempDir::new().unwrap();
    setup_admin(tmp.path());

    let outcome = run_camera_enrollment_with(
        &camera_args(tmp.path(), SECRET, 30),
        context(tmp.path()),
        StaticFrames { faces: 1 },
        RedChannelDetector,
        ChannelEmbedder,
    )
    .unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.report.added, 4);
    assert!(outcome.logs.iter().any(|line| line.contains("captured frame #1")));

    let identities = run_identities_with(context(tmp.path())).unwrap();
    assert_eq!(identities.identities.len(), 1);
    assert_eq!(identities.identities[0].templates, 4);

    let identify = IdentifyArgs {
        probe: "[3.0, 4.0]".into(),
        store: store_args(tmp.path()),
    };
    let outcome = run_identify_with(&identify, context(tmp.path())).unwrap();
    assert!(outcome.decision.accepted);
    assert_eq!(outcome.decision.identity, "bob");
}

#[test]
fn camera_enrollment_times_out_without_faces() {
    let tmp = TempDir::new().unwrap();
    setup_admin(tmp.path());

    let outcome = run_camera_enrollment_with(
        &camera_args(tmp.path(), SECRET, 0),
        context(tmp.path()),
        StaticFrames { faces: 0 },
        RedChannelDetector,
        ChannelEmbedder,
    )
    .unwrap();
    assert_eq!(outcome.report.status, EnrollmentStatus::Cancelled);
    assert_eq!(outcome.report.added, 0);
}

#[test]
fn camera_enrollment_requires_admin_secret() {
    let tmp = TempDir::new().unwrap();
    setup_admin(tmp.path());

    let err = run_camera_enrollment_with(
        &camera_args(tmp.path(), "wrong", 30),
        context(tmp.path()),
        StaticFrames { faces: 1 },
        RedChannelDetector,
        ChannelEmbedder,
    )
    .unwrap_err();
    assert!(matches!(err, AppError::AuthenticationFailure));
}

#[test]
fn folder_without_usable_faces_is_an_extraction_error() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");
    let folder = tmp.path().join("photos");
    fs::create_dir(&folder).unwrap();
    RgbImage::from_pixel(4, 4, Rgb([0, 1, 1]))
        .save(folder.join("a.png"))
        .unwrap();
    fs::write(folder.join("b.jpg"), b"not a jpeg").unwrap();

    let args = UploadEnrollArgs {
        user: "carol".into(),
        folder: folder.clone(),
        admin_secret: "admin".into(),
        models: model_args(),
        store: store_args(&data_dir),
    };
    let err = run_folder_enrollment_with(&args, context(&data_dir), ChannelEmbedder).unwrap_err();
    match err {
        AppError::EmbeddingExtraction { message } => {
            assert!(message.starts_with("no valid faces found"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!data_dir.join("auth.log").exists());
}

#[test]
fn folder_enrollment_adds_usable_images() {
    let tmp = TempDir::new().unwrap();
    let folder = tmp.path().join("photos");
    fs::create_dir(&folder).unwrap();
    RgbImage::from_pixel(4, 4, Rgb([9, 1, 2]))
        .save(folder.join("a.png"))
        .unwrap();
    RgbImage::from_pixel(4, 4, Rgb([0, 1, 1]))
        .save(folder.join("b.png"))
        .unwrap();

    let args = UploadEnrollArgs {
        user: "carol".into(),
        folder,
        admin_secret: "admin".into(),
        models: model_args(),
        store: store_args(tmp.path()),
    };
    let outcome = run_folder_enrollment_with(&args, context(tmp.path()), ChannelEmbedder).unwrap();
    assert_eq!((outcome.report.added, outcome.report.skipped), (1, 1));
    assert!(outcome.logs.iter().any(|line| line.contains("Found 2 image(s)")));
}

#[test]
fn live_auth_without_templates_audits_unknown_faces() {
    let tmp = TempDir::new().unwrap();
    let args = AuthArgs {
        device: None,
        timeout_secs: Some(1),
        models: model_args(),
        store: store_args(tmp.path()),
    };
    let report = run_live_auth_with(
        &args,
        context(tmp.path()),
        &mut StaticFrames { faces: 1 },
        &RedChannelDetector,
        &ChannelEmbedder,
    )
    .unwrap();
    assert!(!report.outcome.is_accepted());
    assert!(report.outcome.frames > 0);
    assert_eq!(
        report.outcome.failure_reason,
        Some(AuthFailureReason::NoTemplates)
    );

    let log = LogArgs {
        tail: None,
        store: store_args(tmp.path()),
    };
    let entries = run_audit_log_with(&log, context(tmp.path())).unwrap().entries;
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|entry| entry.kind == AuditKind::Auth
        && entry.subject == "Unknown"
        && entry.outcome == "fail"
        && entry.detail == "inf"));
}
