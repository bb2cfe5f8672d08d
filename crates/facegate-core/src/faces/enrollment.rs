use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLog};
use crate::capture::FrameSource;
use crate::errors::{AppError, AppResult};
use crate::faces::extractor::{crop_face, load_rgb_image, FaceDetector, FaceEmbedder};
use crate::faces::matcher::UNKNOWN_IDENTITY;
use crate::faces::store::{FaceStore, TemplateStore};

pub const CAMERA_CHANNEL: &str = "camera";
pub const UPLOAD_CHANNEL: &str = "upload-folder";
const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrollmentProgress {
    pub added: usize,
    pub skipped: usize,
    pub target: usize,
}

impl EnrollmentProgress {
    pub fn processed(&self) -> usize {
        self.added + self.skipped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnrollmentStatus {
    Complete,
    Cancelled,
    NoValidFaces,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentReport {
    pub identity: String,
    pub channel: String,
    pub added: usize,
    pub skipped: usize,
    pub target: usize,
    pub status: EnrollmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EnrollmentEvent {
    FrameUnavailable,
    NoFace,
    MultipleFaces {
        faces: usize,
    },
    Skipped {
        source: String,
        progress: EnrollmentProgress,
    },
    Added {
        source: String,
        progress: EnrollmentProgress,
    },
    Complete(EnrollmentReport),
    Cancelled(EnrollmentReport),
    NoValidFaces(EnrollmentReport),
}

impl EnrollmentEvent {
    /// The final report, present only on the event that ends a session.
    pub fn report(&self) -> Option<&EnrollmentReport> {
        match self {
            EnrollmentEvent::Complete(report)
            | EnrollmentEvent::Cancelled(report)
            | EnrollmentEvent::NoValidFaces(report) => Some(report),
            _ => None,
        }
    }

    /// The recoverable error behind a tick that made no progress.
    pub fn feedback_error(&self) -> Option<AppError> {
        match self {
            EnrollmentEvent::NoFace => Some(AppError::DetectionAmbiguity { faces: 0 }),
            EnrollmentEvent::MultipleFaces { faces } => {
                Some(AppError::DetectionAmbiguity { faces: *faces })
            }
            EnrollmentEvent::Skipped { source, .. } => Some(AppError::EmbeddingExtraction {
                message: format!("no embedding for {source}"),
            }),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            EnrollmentEvent::FrameUnavailable => "camera frame unavailable".into(),
            EnrollmentEvent::NoFace => "no face detected".into(),
            EnrollmentEvent::MultipleFaces { faces } => {
                format!("multiple faces detected ({faces})")
            }
            EnrollmentEvent::Skipped { source, progress } => format!(
                "skipped {source} (added {}, skipped {}, target {})",
                progress.added, progress.skipped, progress.target
            ),
            EnrollmentEvent::Added { source, progress } => format!(
                "captured {source} ({}/{})",
                progress.added, progress.target
            ),
            EnrollmentEvent::Complete(report) => format!(
                "{} template(s) enrolled for {} via {} ({} skipped)",
                report.added, report.identity, report.channel, report.skipped
            ),
            EnrollmentEvent::Cancelled(report) => format!(
                "enrollment cancelled for {} after {} template(s)",
                report.identity, report.added
            ),
            EnrollmentEvent::NoValidFaces(report) => format!(
                "no valid faces found for {} ({} skipped)",
                report.identity, report.skipped
            ),
        }
    }
}

/// One enrollment attempt advanced a tick at a time.
pub trait EnrollmentTask {
    /// Performs one tick. Terminal events carry an [`EnrollmentReport`].
    fn step(&mut self) -> AppResult<EnrollmentEvent>;
    fn cancel(&mut self) -> AppResult<EnrollmentEvent>;
    fn is_finished(&self) -> bool;
}

impl<T: EnrollmentTask + ?Sized> EnrollmentTask for &mut T {
    fn step(&mut self) -> AppResult<EnrollmentEvent> {
        (**self).step()
    }

    fn cancel(&mut self) -> AppResult<EnrollmentEvent> {
        (**self).cancel()
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }
}

pub fn validate_identity(identity: &str) -> AppResult<String> {
    let identity = identity.trim();
    if identity.is_empty() {
        return Err(AppError::validation("identity must not be empty"));
    }
    if identity == UNKNOWN_IDENTITY {
        return Err(AppError::validation(format!(
            "\"{UNKNOWN_IDENTITY}\" is reserved for rejected matches"
        )));
    }
    Ok(identity.to_string())
}

/// Lists the regular image files directly inside `dir`, sorted by file name.
pub fn collect_image_files(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|err| {
        AppError::validation(format!("cannot read folder {}: {err}", dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            AppError::validation(format!("cannot read folder {}: {err}", dir.display()))
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false);
        if supported {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Shared flag checked by [`drive`] at every tick boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs `task` until it reports, sleeping `period` between ticks and
/// forwarding every event to `events`. A dropped receiver does not stop the
/// session.
pub fn drive<T: EnrollmentTask + ?Sized>(
    task: &mut T,
    period: Duration,
    cancel: &CancelToken,
    events: &Sender<EnrollmentEvent>,
) -> AppResult<EnrollmentReport> {
    loop {
        let event = if cancel.is_cancelled() {
            task.cancel()?
        } else {
            task.step()?
        };
        let report = event.report().cloned();
        let _ = events.send(event);
        if let Some(report) = report {
            return Ok(report);
        }
        if !period.is_zero() {
            thread::sleep(period);
        }
    }
}

/// Shared bookkeeping for the two session kinds.
struct SessionLedger<'a, S> {
    identity: String,
    channel: &'static str,
    target: usize,
    added: usize,
    skipped: usize,
    finished: bool,
    store: &'a S,
    audit: &'a AuditLog,
    cache: Option<&'a mut TemplateStore>,
}

impl<'a, S: FaceStore> SessionLedger<'a, S> {
    fn ensure_active(&self) -> AppResult<()> {
        if self.finished {
            return Err(AppError::validation("enrollment session already finished"));
        }
        Ok(())
    }

    fn progress(&self) -> EnrollmentProgress {
        EnrollmentProgress {
            added: self.added,
            skipped: self.skipped,
            target: self.target,
        }
    }

    fn persist(&mut self, vector: Vec<f64>) -> AppResult<usize> {
        let count = self.store.add_template(&self.identity, vector)?;
        self.added += 1;
        Ok(count)
    }

    /// Ends the session after a failed tick. Templates already persisted
    /// stay and are recorded on the `<channel>-failed` ENROLL entry.
    fn abort(&mut self, err: AppError) -> AppError {
        if self.finished {
            return err;
        }
        self.finished = true;
        warn!(
            identity = %self.identity,
            channel = self.channel,
            added = self.added,
            error = %err,
            "enrollment session failed"
        );
        if self.added == 0 {
            return err;
        }

        let channel = format!("{}-failed", self.channel);
        if let Err(audit_err) = self
            .audit
            .append(&AuditEntry::enroll(&self.identity, &channel, self.added))
        {
            warn!(error = %audit_err, "failed to record partial enrollment");
        }
        if let Some(cache) = self.cache.as_deref_mut() {
            match self.store.load() {
                Ok(store) => *cache = store,
                Err(load_err) => warn!(error = %load_err, "failed to reload templates"),
            }
        }
        err
    }

    fn finish(&mut self, status: EnrollmentStatus) -> AppResult<EnrollmentEvent> {
        self.finished = true;
        let report = EnrollmentReport {
            identity: self.identity.clone(),
            channel: self.channel.to_string(),
            added: self.added,
            skipped: self.skipped,
            target: self.target,
            status,
        };

        match status {
            EnrollmentStatus::Complete => {
                self.audit
                    .append(&AuditEntry::enroll(&self.identity, self.channel, self.added))?;
            }
            EnrollmentStatus::Cancelled => {
                let channel = format!("{}-cancelled", self.channel);
                self.audit
                    .append(&AuditEntry::enroll(&self.identity, &channel, self.added))?;
            }
            EnrollmentStatus::NoValidFaces => {}
        }

        if self.added > 0 {
            if let Some(cache) = self.cache.as_deref_mut() {
                *cache = self.store.load()?;
            }
        }

        info!(
            identity = %report.identity,
            channel = %report.channel,
            added = report.added,
            skipped = report.skipped,
            status = ?report.status,
            "enrollment session finished"
        );
        Ok(match status {
            EnrollmentStatus::Complete => EnrollmentEvent::Complete(report),
            EnrollmentStatus::Cancelled => EnrollmentEvent::Cancelled(report),
            EnrollmentStatus::NoValidFaces => EnrollmentEvent::NoValidFaces(report),
        })
    }
}

/// Collects `target` templates from live frames, one face per frame.
pub struct CaptureSession<'a, S, F, D, E> {
    ledger: SessionLedger<'a, S>,
    frames: F,
    detector: D,
    embedder: E,
    frame_count: usize,
}

impl<'a, S, F, D, E> CaptureSession<'a, S, F, D, E>
where
    S: FaceStore,
    F: FrameSource,
    D: FaceDetector,
    E: FaceEmbedder,
{
    pub fn new(
        identity: &str,
        target: usize,
        store: &'a S,
        audit: &'a AuditLog,
        frames: F,
        detector: D,
        embedder: E,
    ) -> AppResult<Self> {
        let identity = validate_identity(identity)?;
        if target == 0 {
            return Err(AppError::validation("sample target must be positive"));
        }
        debug!(%identity, target, "camera enrollment started");
        Ok(Self {
            ledger: SessionLedger {
                identity,
                channel: CAMERA_CHANNEL,
                target,
                added: 0,
                skipped: 0,
                finished: false,
                store,
                audit,
                cache: None,
            },
            frames,
            detector,
            embedder,
            frame_count: 0,
        })
    }

    /// Reloads `cache` from the store when the session ends with new templates.
    pub fn with_cache(mut self, cache: &'a mut TemplateStore) -> Self {
        self.ledger.cache = Some(cache);
        self
    }

    pub fn identity(&self) -> &str {
        &self.ledger.identity
    }

    pub fn progress(&self) -> EnrollmentProgress {
        self.ledger.progress()
    }
}

impl<'a, S, F, D, E> EnrollmentTask for CaptureSession<'a, S, F, D, E>
where
    S: FaceStore,
    F: FrameSource,
    D: FaceDetector,
    E: FaceEmbedder,
{
    fn step(&mut self) -> AppResult<EnrollmentEvent> {
        self.ledger.ensure_active()?;
        self.capture_once().map_err(|err| self.ledger.abort(err))
    }

    fn cancel(&mut self) -> AppResult<EnrollmentEvent> {
        self.ledger.ensure_active()?;
        self.ledger.finish(EnrollmentStatus::Cancelled)
    }

    fn is_finished(&self) -> bool {
        self.ledger.finished
    }
}

impl<'a, S, F, D, E> CaptureSession<'a, S, F, D, E>
where
    S: FaceStore,
    F: FrameSource,
    D: FaceDetector,
    E: FaceEmbedder,
{
    fn capture_once(&mut self) -> AppResult<EnrollmentEvent> {
        let Some(frame) = self.frames.next_frame()? else {
            return Ok(EnrollmentEvent::FrameUnavailable);
        };
        self.frame_count += 1;
        let source = format!("frame #{}", self.frame_count);

        let faces = self.detector.detect(&frame)?;
        let bbox = match faces.as_slice() {
            [] => return Ok(EnrollmentEvent::NoFace),
            [bbox] => *bbox,
            many => return Ok(EnrollmentEvent::MultipleFaces { faces: many.len() }),
        };

        let embedding = crop_face(&frame, &bbox).and_then(|face| self.embedder.embed(&face));
        let Some(vector) = embedding else {
            self.ledger.skipped += 1;
            debug!(%source, "embedder declined frame");
            return Ok(EnrollmentEvent::Skipped {
                source,
                progress: self.ledger.progress(),
            });
        };

        let templates = self.ledger.persist(vector)?;
        debug!(
            identity = %self.ledger.identity,
            templates,
            collected = self.ledger.added,
            "camera sample stored"
        );
        if self.ledger.added >= self.ledger.target {
            return self.ledger.finish(EnrollmentStatus::Complete);
        }
        Ok(EnrollmentEvent::Added {
            source,
            progress: self.ledger.progress(),
        })
    }
}

/// Enrolls every usable image from a folder, one file per tick.
pub struct UploadSession<'a, S, E> {
    ledger: SessionLedger<'a, S>,
    files: Vec<PathBuf>,
    embedder: E,
}

impl<'a, S, E> UploadSession<'a, S, E>
where
    S: FaceStore,
    E: FaceEmbedder,
{
    pub fn new(
        identity: &str,
        folder: &Path,
        store: &'a S,
        audit: &'a AuditLog,
        embedder: E,
    ) -> AppResult<Self> {
        let identity = validate_identity(identity)?;
        let files = collect_image_files(folder)?;
        if files.is_empty() {
            return Err(AppError::validation(format!(
                "no image files found in {}",
                folder.display()
            )));
        }
        debug!(%identity, files = files.len(), folder = %folder.display(), "folder enrollment started");
        Ok(Self {
            ledger: SessionLedger {
                identity,
                channel: UPLOAD_CHANNEL,
                target: files.len(),
                added: 0,
                skipped: 0,
                finished: false,
                store,
                audit,
                cache: None,
            },
            files,
            embedder,
        })
    }

    pub fn with_cache(mut self, cache: &'a mut TemplateStore) -> Self {
        self.ledger.cache = Some(cache);
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn progress(&self) -> EnrollmentProgress {
        self.ledger.progress()
    }

    fn embed_file(&self, path: &Path) -> Option<Vec<f64>> {
        match load_rgb_image(path) {
            Ok(image) => self.embedder.embed(&image),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping undecodable image");
                None
            }
        }
    }
}

impl<'a, S, E> EnrollmentTask for UploadSession<'a, S, E>
where
    S: FaceStore,
    E: FaceEmbedder,
{
    fn step(&mut self) -> AppResult<EnrollmentEvent> {
        self.ledger.ensure_active()?;
        self.process_next_file().map_err(|err| self.ledger.abort(err))
    }

    fn cancel(&mut self) -> AppResult<EnrollmentEvent> {
        self.ledger.ensure_active()?;
        self.ledger.finish(EnrollmentStatus::Cancelled)
    }

    fn is_finished(&self) -> bool {
        self.ledger.finished
    }
}

impl<'a, S, E> UploadSession<'a, S, E>
where
    S: FaceStore,
    E: FaceEmbedder,
{
    fn process_next_file(&mut self) -> AppResult<EnrollmentEvent> {
        let index = self.ledger.progress().processed();
        let path = self.files[index].clone();
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let event = match self.embed_file(&path) {
            Some(vector) => {
                self.ledger.persist(vector)?;
                EnrollmentEvent::Added {
                    source,
                    progress: self.ledger.progress(),
                }
            }
            None => {
                self.ledger.skipped += 1;
                EnrollmentEvent::Skipped {
                    source,
                    progress: self.ledger.progress(),
                }
            }
        };

        if self.ledger.progress().processed() < self.files.len() {
            return Ok(event);
        }
        if self.ledger.added > 0 {
            self.ledger.finish(EnrollmentStatus::Complete)
        } else {
            self.ledger.finish(EnrollmentStatus::NoValidFaces)
        }
    }
}
