use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use facegate_config::ConfigError;
use image::ImageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String },

    #[error("expected exactly one face but detected {faces}")]
    DetectionAmbiguity { faces: usize },

    #[error("embedding extraction failed: {message}")]
    EmbeddingExtraction { message: String },

    #[error("admin authentication failed")]
    AuthenticationFailure,

    #[error("failed to read {path}: {source}")]
    StorageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("store file {path} is invalid: {message}")]
    InvalidStoreFile { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: ImageError,
    },

    #[error("missing {kind} model; provide {flag} or set it in the configuration file")]
    MissingModel {
        kind: &'static str,
        flag: &'static str,
    },

    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("failed to open video device {device}: {source}")]
    DeviceOpen {
        device: String,
        #[source]
        source: io::Error,
    },

    #[error("device capability error: {0}")]
    Capability(String),

    #[error("failed processing frame data: {0}")]
    FrameProcessing(String),

    #[error("{0}")]
    HardwareUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
        }
    }

    pub fn admin_required() -> Self {
        Self::validation("admin login required")
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::Validation { .. } => ExitCode::from(2),
            AppError::DetectionAmbiguity { .. } => ExitCode::from(3),
            AppError::EmbeddingExtraction { .. } => ExitCode::from(3),
            AppError::AuthenticationFailure => ExitCode::from(3),
            AppError::StorageRead { .. } => ExitCode::from(2),
            AppError::InvalidStoreFile { .. } => ExitCode::from(2),
            AppError::ConfigRead { .. } => ExitCode::from(2),
            AppError::ConfigParse { .. } => ExitCode::from(2),
            AppError::ImageDecode { .. } => ExitCode::from(2),
            AppError::MissingModel { .. } => ExitCode::from(2),
            AppError::ModelLoad { .. } => ExitCode::from(2),
            AppError::HardwareUnavailable(_) => ExitCode::from(2),
            AppError::DeviceOpen { .. } => ExitCode::from(4),
            AppError::Capability(_) => ExitCode::from(4),
            _ => ExitCode::from(1),
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read { path, source } => AppError::ConfigRead { path, source },
            ConfigError::Parse { path, message } => AppError::ConfigParse { path, message },
        }
    }
}
