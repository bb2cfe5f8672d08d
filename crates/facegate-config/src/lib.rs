use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/facegate/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/facegate/config.toml";
pub const DEFAULT_DATA_DIR: &str = "/var/lib/facegate";
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.4;
pub const DEFAULT_AUTH_LOG_INTERVAL_MILLIS: u64 = 1000;
pub const DEFAULT_FRAME_INTERVAL_MILLIS: u64 = 30;
pub const DEFAULT_CAPTURE_INTERVAL_MILLIS: u64 = 300;
pub const DEFAULT_UPLOAD_INTERVAL_MILLIS: u64 = 100;
pub const DEFAULT_SAMPLE_TARGET: u32 = 5;
pub const DEFAULT_EMBED_TIMEOUT_MILLIS: u64 = 5000;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_VIDEO_DEVICE: &str = "/dev/video0";
pub const DEFAULT_PIXEL_FORMAT: &str = "YUYV";
pub const DEFAULT_WARMUP_FRAMES: u32 = 0;
pub const DEFAULT_JITTERS: u32 = 1;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    pub data_dir: Option<PathBuf>,
    pub match_threshold: Option<f64>,
    pub auth_log_interval_millis: Option<u64>,
    pub frame_interval_millis: Option<u64>,
    pub capture_interval_millis: Option<u64>,
    pub upload_interval_millis: Option<u64>,
    pub default_sample_target: Option<u32>,
    pub embed_timeout_millis: Option<u64>,
    pub auth_timeout_secs: Option<u64>,
    pub video_device: Option<String>,
    pub pixel_format: Option<String>,
    pub warmup_frames: Option<u32>,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub match_threshold: f64,
    pub auth_log_interval: Duration,
    pub frame_interval: Duration,
    pub capture_interval: Duration,
    pub upload_interval: Duration,
    pub default_sample_target: u32,
    pub embed_timeout: Duration,
    pub auth_timeout: Duration,
    pub video_device: String,
    pub pixel_format: String,
    pub warmup_frames: u32,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: u32,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            data_dir: raw
                .data_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            match_threshold: raw.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD),
            auth_log_interval: Duration::from_millis(
                raw.auth_log_interval_millis
                    .unwrap_or(DEFAULT_AUTH_LOG_INTERVAL_MILLIS),
            ),
            frame_interval: Duration::from_millis(
                raw.frame_interval_millis
                    .unwrap_or(DEFAULT_FRAME_INTERVAL_MILLIS),
            ),
            capture_interval: Duration::from_millis(
                raw.capture_interval_millis
                    .unwrap_or(DEFAULT_CAPTURE_INTERVAL_MILLIS),
            ),
            upload_interval: Duration::from_millis(
                raw.upload_interval_millis
                    .unwrap_or(DEFAULT_UPLOAD_INTERVAL_MILLIS),
            ),
            default_sample_target: raw
                .default_sample_target
                .unwrap_or(DEFAULT_SAMPLE_TARGET)
                .max(1),
            embed_timeout: Duration::from_millis(
                raw.embed_timeout_millis
                    .unwrap_or(DEFAULT_EMBED_TIMEOUT_MILLIS)
                    .max(1),
            ),
            auth_timeout: Duration::from_secs(
                raw.auth_timeout_secs
                    .unwrap_or(DEFAULT_AUTH_TIMEOUT_SECS)
                    .max(1),
            ),
            video_device: raw
                .video_device
                .unwrap_or_else(|| DEFAULT_VIDEO_DEVICE.to_string()),
            pixel_format: raw
                .pixel_format
                .unwrap_or_else(|| DEFAULT_PIXEL_FORMAT.to_string()),
            warmup_frames: raw.warmup_frames.unwrap_or(DEFAULT_WARMUP_FRAMES),
            landmark_model: raw.landmark_model,
            encoder_model: raw.encoder_model,
            jitters: raw.jitters.unwrap_or(DEFAULT_JITTERS),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

pub fn default_sources() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

pub fn load_resolved_config() -> Result<ResolvedConfigWithSource, ConfigError> {
    load_resolved_from_paths(&default_sources())
}

pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig::new(parsed, path.clone())));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => {
            let path = entry.source.clone();
            Ok(ResolvedConfigWithSource {
                resolved: ResolvedConfig::from_raw(entry.contents),
                source: Some(path),
            })
        }
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}
