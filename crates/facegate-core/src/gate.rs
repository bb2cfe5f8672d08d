use std::path::{Path, PathBuf};
use std::time::Duration;

use facegate_config::ResolvedConfig;
use tracing::{debug, info, warn};

use crate::admin::AdminCredentials;
use crate::audit::{AuditEntry, AuditLog};
use crate::auth::{run_live_authentication, AuthDecision, Authenticator, LiveAuthConfig, LiveAuthOutcome};
use crate::capture::FrameSource;
use crate::errors::{AppError, AppResult};
use crate::faces::enrollment::{CaptureSession, UploadSession};
use crate::faces::extractor::{FaceDetector, FaceEmbedder};
use crate::faces::store::{FaceStore, FilesystemFaceStore, IdentitySummary, TemplateStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSettings {
    pub match_threshold: f64,
    pub auth_log_interval: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self::from(&ResolvedConfig::default())
    }
}

impl From<&ResolvedConfig> for GateSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            match_threshold: config.match_threshold,
            auth_log_interval: config.auth_log_interval,
        }
    }
}

/// Everything one deployment needs: the template store, the admin gate, the
/// audit log and an in-memory copy of the templates used for matching.
///
/// Enrollment sessions borrow the gate mutably, so only one can be alive at
/// a time.
pub struct FaceGate<S = FilesystemFaceStore> {
    data_dir: PathBuf,
    store: S,
    audit: AuditLog,
    credentials: AdminCredentials,
    authenticator: Authenticator,
    cache: TemplateStore,
    admin: bool,
}

impl FaceGate<FilesystemFaceStore> {
    pub fn open(data_dir: &Path, settings: GateSettings) -> AppResult<Self> {
        Self::with_store(data_dir, FilesystemFaceStore::in_dir(data_dir), settings)
    }
}

impl<S: FaceStore> FaceGate<S> {
    pub fn with_store(data_dir: &Path, store: S, settings: GateSettings) -> AppResult<Self> {
        let audit = AuditLog::in_dir(data_dir);
        let cache = store.load()?;
        debug!(
            data_dir = %data_dir.display(),
            identities = cache.identity_count(),
            templates = cache.template_count(),
            "template store loaded"
        );
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            authenticator: Authenticator::new(
                settings.match_threshold,
                settings.auth_log_interval,
                audit.clone(),
            ),
            audit,
            credentials: AdminCredentials::in_dir(data_dir),
            store,
            cache,
            admin: false,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// True until the first admin secret is stored.
    pub fn needs_setup(&self) -> bool {
        !self.credentials.is_set()
    }

    pub fn admin_login(&mut self, secret: &str) -> AppResult<()> {
        if self.credentials.verify(secret)? {
            self.admin = true;
            info!("admin logged in");
            Ok(())
        } else {
            self.admin = false;
            warn!("admin login rejected");
            Err(AppError::AuthenticationFailure)
        }
    }

    pub fn logout(&mut self) {
        self.admin = false;
    }

    /// Stores a new admin secret. Once a secret exists, replacing it needs
    /// an admin login first.
    pub fn setup_admin(&mut self, secret: &str) -> AppResult<()> {
        if self.credentials.is_set() {
            self.require_admin()?;
        }
        self.credentials.set(secret)?;
        self.admin = true;
        Ok(())
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.admin {
            Ok(())
        } else {
            Err(AppError::admin_required())
        }
    }

    pub fn begin_camera_enrollment<F, D, E>(
        &mut self,
        identity: &str,
        target: usize,
        frames: F,
        detector: D,
        embedder: E,
    ) -> AppResult<CaptureSession<'_, S, F, D, E>>
    where
        F: FrameSource,
        D: FaceDetector,
        E: FaceEmbedder,
    {
        self.require_admin()?;
        let session = CaptureSession::new(
            identity,
            target,
            &self.store,
            &self.audit,
            frames,
            detector,
            embedder,
        )?;
        Ok(session.with_cache(&mut self.cache))
    }

    pub fn begin_folder_enrollment<E>(
        &mut self,
        identity: &str,
        folder: &Path,
        embedder: E,
    ) -> AppResult<UploadSession<'_, S, E>>
    where
        E: FaceEmbedder,
    {
        self.require_admin()?;
        let session = UploadSession::new(identity, folder, &self.store, &self.audit, embedder)?;
        Ok(session.with_cache(&mut self.cache))
    }

    pub fn authenticate(&mut self, probe: &[f64]) -> AppResult<AuthDecision> {
        self.authenticator.authenticate(probe, &self.cache)
    }

    pub fn authenticate_live<F, D, E>(
        &mut self,
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
        run_live_authentication(
            &mut self.authenticator,
            &self.cache,
            frames,
            detector,
            embedder,
            config,
        )
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.cache
    }

    pub fn identities(&self) -> AppResult<Vec<IdentitySummary>> {
        Ok(self.store.load()?.summaries())
    }

    pub fn read_audit_log(&self) -> AppResult<Vec<AuditEntry>> {
        self.audit.entries()
    }
}
