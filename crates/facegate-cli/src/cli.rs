use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "facegate",
    about = "Enroll faces and identify people against enrolled templates",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage the admin secret that gates enrollment
    #[command(subcommand)]
    Admin(AdminCommands),
    /// Enroll templates for an identity
    #[command(subcommand)]
    Enroll(EnrollCommands),
    /// Identify a precomputed embedding against the template store
    ///
    /// Each run starts with a fresh AUTH throttle, so every run writes its
    /// entry. Throttling only spaces entries within one process, as in `auth`.
    Identify(IdentifyArgs),
    /// Authenticate whoever is in front of the camera
    Auth(AuthArgs),
    /// List enrolled identities and their template counts
    Identities(StoreArgs),
    /// Print the audit log
    Log(LogArgs),
}

#[derive(Debug, Subcommand)]
pub enum AdminCommands {
    /// Store the admin secret (first run, or replace it with --current-secret)
    Setup(AdminSetupArgs),
    /// Verify an admin secret without changing anything
    Check(AdminCheckArgs),
}

#[derive(Debug, Subcommand)]
pub enum EnrollCommands {
    /// Capture samples from the camera until the target is reached
    Camera(CameraEnrollArgs),
    /// Enroll every usable image in a folder
    Upload(UploadEnrollArgs),
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Data directory holding templates, the admin secret and the audit log
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct AdminSetupArgs {
    /// New admin secret
    #[arg(long)]
    pub secret: String,

    /// Current admin secret, required once a secret has been stored
    #[arg(long)]
    pub current_secret: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct AdminCheckArgs {
    /// Admin secret to verify
    #[arg(long)]
    pub secret: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Path to the dlib landmark predictor model
    #[arg(long)]
    pub landmark_model: Option<PathBuf>,

    /// Path to the dlib face recognition network
    #[arg(long)]
    pub encoder_model: Option<PathBuf>,

    /// Number of image jitters to run before encoding
    #[arg(long)]
    pub jitters: Option<u32>,
}

#[derive(Debug, Clone, Args)]
pub struct CameraEnrollArgs {
    /// Identity to enroll
    #[arg(long)]
    pub user: String,

    /// Number of samples to collect (defaults to the configured target)
    #[arg(long)]
    pub samples: Option<u32>,

    /// Admin secret authorizing the enrollment
    #[arg(long)]
    pub admin_secret: String,

    /// Video device path (e.g. /dev/video2) or index (e.g. 0)
    #[arg(long)]
    pub device: Option<String>,

    /// Give up after this many seconds; collected samples are kept
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    #[command(flatten)]
    pub models: ModelArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct UploadEnrollArgs {
    /// Identity to enroll
    #[arg(long)]
    pub user: String,

    /// Folder containing .jpg, .jpeg or .png images
    #[arg(long)]
    pub folder: PathBuf,

    /// Admin secret authorizing the enrollment
    #[arg(long)]
    pub admin_secret: String,

    #[command(flatten)]
    pub models: ModelArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct IdentifyArgs {
    /// Embedding as a JSON array of numbers, e.g. '[0.1, -0.2, 0.3]'
    #[arg(long)]
    pub probe: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct AuthArgs {
    /// Video device path (e.g. /dev/video2) or index (e.g. 0)
    #[arg(long)]
    pub device: Option<String>,

    /// Seconds to keep trying before giving up (defaults to the configured timeout)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[command(flatten)]
    pub models: ModelArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    /// Only show the most recent N entries
    #[arg(long)]
    pub tail: Option<usize>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}
