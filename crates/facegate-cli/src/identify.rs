use facegate_core::auth::{AuthDecision, LiveAuthConfig, LiveAuthOutcome};
use facegate_core::capture::FrameSource;
use facegate_core::faces::{FaceDetector, FaceEmbedder};
use serde::Serialize;

use crate::cli::{AuthArgs, IdentifyArgs};
use crate::config::{load_context, CliContext};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct IdentifyOutcome {
    #[serde(flatten)]
    pub decision: AuthDecision,
    pub threshold: f64,
    #[serde(skip)]
    pub logs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LiveAuthReport {
    #[serde(flatten)]
    pub outcome: LiveAuthOutcome,
    pub threshold: f64,
}

pub fn parse_probe(raw: &str) -> AppResult<Vec<f64>> {
    let probe: Vec<f64> = serde_json::from_str(raw).map_err(|err| {
        AppError::validation(format!("probe must be a JSON array of numbers: {err}"))
    })?;
    if probe.is_empty() {
        return Err(AppError::validation("probe must not be empty"));
    }
    Ok(probe)
}

pub fn run_identify(args: &IdentifyArgs) -> AppResult<IdentifyOutcome> {
    run_identify_with(args, load_context(&args.store)?)
}

pub fn run_identify_with(args: &IdentifyArgs, context: CliContext) -> AppResult<IdentifyOutcome> {
    let probe = parse_probe(&args.probe)?;
    let mut gate = context.open_gate()?;
    let mut logs = context.logs;
    logs.push(format!(
        "Comparing probe against {} template(s)",
        gate.templates().template_count()
    ));

    let decision = gate.authenticate(&probe)?;
    Ok(IdentifyOutcome {
        decision,
        threshold: context.config.match_threshold,
        logs,
    })
}

#[cfg(feature = "hardware")]
pub fn run_live_auth(args: &AuthArgs) -> AppResult<LiveAuthReport> {
    use facegate_core::faces::BoundedEmbedder;

    let context = load_context(&args.store)?;
    let models = crate::backend::open_models(&context, &args.models)?;
    let mut frames = crate::backend::open_camera(&context, args.device.as_deref());
    let embedder = BoundedEmbedder::new(&models, context.config.embed_timeout);
    run_live_auth_with(args, context, &mut frames, &models, &embedder)
}

#[cfg(not(feature = "hardware"))]
pub fn run_live_auth(_args: &AuthArgs) -> AppResult<LiveAuthReport> {
    Err(crate::backend::hardware_unavailable("live authentication"))
}

pub fn run_live_auth_with<F, D, E>(
    args: &AuthArgs,
    context: CliContext,
    frames: &mut F,
    detector: &D,
    embedder: &E,
) -> AppResult<LiveAuthReport>
where
    F: FrameSource + ?Sized,
    D: FaceDetector + ?Sized,
    E: FaceEmbedder + ?Sized,
{
    let config = LiveAuthConfig {
        timeout: args
            .timeout_secs
            .map(std::time::Duration::from_secs)
            .unwrap_or(context.config.auth_timeout),
        frame_interval: context.config.frame_interval,
    };
    let mut gate = context.open_gate()?;
    let mut outcome = gate.authenticate_live(frames, detector, embedder, &config)?;

    let mut logs = context.logs;
    logs.append(&mut outcome.logs);
    outcome.logs = logs;
    Ok(LiveAuthReport {
        outcome,
        threshold: context.config.match_threshold,
    })
}
