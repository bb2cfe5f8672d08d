use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use facegate_core::capture::FrameSource;
use facegate_core::faces::{
    drive, CancelToken, EnrollmentEvent, EnrollmentReport, EnrollmentStatus, EnrollmentTask,
    FaceDetector, FaceEmbedder,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{CameraEnrollArgs, EnrollCommands, UploadEnrollArgs};
use crate::config::CliContext;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct EnrollOutcome {
    #[serde(flatten)]
    pub report: EnrollmentReport,
    pub data_dir: PathBuf,
    #[serde(skip)]
    pub logs: Vec<String>,
}

impl EnrollOutcome {
    pub fn is_complete(&self) -> bool {
        self.report.status == EnrollmentStatus::Complete
    }
}

pub fn run_enroll(command: &EnrollCommands) -> AppResult<EnrollOutcome> {
    match command {
        EnrollCommands::Camera(args) => run_camera_enrollment(args),
        EnrollCommands::Upload(args) => run_folder_enrollment(args),
    }
}

#[cfg(feature = "hardware")]
fn run_camera_enrollment(args: &CameraEnrollArgs) -> AppResult<EnrollOutcome> {
    use facegate_core::faces::BoundedEmbedder;

    let context = crate::config::load_context(&args.store)?;
    let models = crate::backend::open_models(&context, &args.models)?;
    let frames = crate::backend::open_camera(&context, args.device.as_deref());
    let embedder = BoundedEmbedder::new(&models, context.config.embed_timeout);
    run_camera_enrollment_with(args, context, frames, &models, embedder)
}

#[cfg(not(feature = "hardware"))]
fn run_camera_enrollment(_args: &CameraEnrollArgs) -> AppResult<EnrollOutcome> {
    Err(crate::backend::hardware_unavailable("camera enrollment"))
}

#[cfg(feature = "hardware")]
fn run_folder_enrollment(args: &UploadEnrollArgs) -> AppResult<EnrollOutcome> {
    use facegate_core::faces::BoundedEmbedder;

    let context = crate::config::load_context(&args.store)?;
    let models = crate::backend::open_models(&context, &args.models)?;
    let embedder = BoundedEmbedder::new(&models, context.config.embed_timeout);
    run_folder_enrollment_with(args, context, embedder)
}

#[cfg(not(feature = "hardware"))]
fn run_folder_enrollment(_args: &UploadEnrollArgs) -> AppResult<EnrollOutcome> {
    Err(crate::backend::hardware_unavailable("folder enrollment"))
}

pub fn run_camera_enrollment_with<F, D, E>(
    args: &CameraEnrollArgs,
    context: CliContext,
    frames: F,
    detector: D,
    embedder: E,
) -> AppResult<EnrollOutcome>
where
    F: FrameSource,
    D: FaceDetector,
    E: FaceEmbedder,
{
    let target = args
        .samples
        .unwrap_or(context.config.default_sample_target) as usize;
    let mut gate = context.open_gate()?;
    gate.admin_login(&args.admin_secret)?;

    let mut logs = context.logs;
    logs.push(format!("Collecting {target} sample(s) for {}", args.user));

    let cancel = CancelToken::new();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let watchdog = spawn_watchdog(cancel.clone(), Duration::from_secs(args.timeout_secs), done_rx);

    let result = gate
        .begin_camera_enrollment(&args.user, target, frames, detector, embedder)
        .and_then(|mut session| run_session(&mut session, context.config.capture_interval, &cancel));
    drop(done_tx);
    let _ = watchdog.join();

    let (report, events) = result?;
    logs.extend(events);
    finish(report, context.data_dir, logs)
}

pub fn run_folder_enrollment_with<E>(
    args: &UploadEnrollArgs,
    context: CliContext,
    embedder: E,
) -> AppResult<EnrollOutcome>
where
    E: FaceEmbedder,
{
    let mut gate = context.open_gate()?;
    gate.admin_login(&args.admin_secret)?;

    let mut logs = context.logs;
    let (report, events) = {
        let mut session = gate.begin_folder_enrollment(&args.user, &args.folder, embedder)?;
        logs.push(format!(
            "Found {} image(s) in {}",
            session.files().len(),
            args.folder.display()
        ));
        run_session(&mut session, context.config.upload_interval, &CancelToken::new())?
    };
    logs.extend(events);
    finish(report, context.data_dir, logs)
}

fn finish(report: EnrollmentReport, data_dir: PathBuf, logs: Vec<String>) -> AppResult<EnrollOutcome> {
    if report.status == EnrollmentStatus::NoValidFaces {
        return Err(AppError::EmbeddingExtraction {
            message: format!("no valid faces found ({} image(s) skipped)", report.skipped),
        });
    }
    Ok(EnrollOutcome {
        report,
        data_dir,
        logs,
    })
}

/// Drives `task` while a helper thread reports progress as it arrives.
fn run_session<T: EnrollmentTask + ?Sized>(
    task: &mut T,
    period: Duration,
    cancel: &CancelToken,
) -> AppResult<(EnrollmentReport, Vec<String>)> {
    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || report_progress(rx));
    let report = drive(task, period, cancel, &tx);
    drop(tx);
    let messages = printer.join().unwrap_or_default();
    Ok((report?, messages))
}

fn report_progress(events: Receiver<EnrollmentEvent>) -> Vec<String> {
    let mut messages = Vec::new();
    for event in events {
        let message = event.message();
        match event.feedback_error() {
            Some(err) => warn!(target: "enroll.progress", error = %err, "{message}"),
            None => info!(target: "enroll.progress", "{message}"),
        }
        messages.push(message);
    }
    messages
}

fn spawn_watchdog(cancel: CancelToken, timeout: Duration, done: Receiver<()>) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = done.recv_timeout(timeout) {
            info!(target: "enroll.progress", "enrollment timed out; cancelling");
            cancel.cancel();
        }
    })
}
