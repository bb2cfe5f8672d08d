use std::path::{Path, PathBuf};

use facegate_config::{self as config_loader, ResolvedConfig};
use facegate_core::faces::{DataDirResolver, EnvDataDirResolver, FaceModelPaths};
use facegate_core::{FaceGate, GateSettings};

use crate::cli::{ModelArgs, StoreArgs};
use crate::errors::AppResult;

/// Configuration and data directory shared by every command.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: ResolvedConfig,
    pub data_dir: PathBuf,
    pub logs: Vec<String>,
}

impl CliContext {
    /// Builds a context from an already resolved configuration; the data
    /// directory comes from `--data-dir`, then `$FACEGATE_DATA_DIR`, then
    /// the configuration.
    pub fn new(config: ResolvedConfig, data_dir_override: Option<&Path>) -> Self {
        let resolver = EnvDataDirResolver::new(config.data_dir.clone());
        let data_dir = resolver.resolve(data_dir_override);
        let logs = vec![format!("Resolved data directory: {}", data_dir.display())];
        Self {
            config,
            data_dir,
            logs,
        }
    }

    pub fn open_gate(&self) -> AppResult<FaceGate> {
        FaceGate::open(&self.data_dir, GateSettings::from(&self.config))
    }

    pub fn model_paths(&self, args: &ModelArgs) -> AppResult<FaceModelPaths> {
        FaceModelPaths::resolve(
            args.landmark_model
                .clone()
                .or_else(|| self.config.landmark_model.clone()),
            args.encoder_model
                .clone()
                .or_else(|| self.config.encoder_model.clone()),
        )
    }

    pub fn jitters(&self, args: &ModelArgs) -> u32 {
        args.jitters.unwrap_or(self.config.jitters)
    }
}

/// Loads the configuration files and resolves the data directory for `store`.
pub fn load_context(store: &StoreArgs) -> AppResult<CliContext> {
    let loaded = config_loader::load_resolved_config()?;
    let mut context = CliContext::new(loaded.resolved, store.data_dir.as_deref());
    let source_line = match loaded.source {
        Some(path) => format!("Loaded configuration from {}", path.display()),
        None => "No configuration file found; using built-in defaults".to_string(),
    };
    context.logs.insert(0, source_line);
    Ok(context)
}
