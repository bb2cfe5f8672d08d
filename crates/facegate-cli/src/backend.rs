use facegate_core::capture::{CaptureConfig, DeviceLocator};

use crate::config::CliContext;
use crate::errors::AppError;

pub fn capture_config(context: &CliContext, device: Option<&str>) -> CaptureConfig {
    let device = device
        .map(str::to_string)
        .unwrap_or_else(|| context.config.video_device.clone());
    CaptureConfig {
        device: DeviceLocator::from_option(Some(device)),
        pixel_format: context.config.pixel_format.clone(),
        warmup_frames: context.config.warmup_frames,
    }
}

pub fn hardware_unavailable(operation: &str) -> AppError {
    AppError::HardwareUnavailable(format!(
        "{operation} needs the camera and face models; rebuild with `--features hardware`"
    ))
}

#[cfg(feature = "hardware")]
pub use hardware::{open_camera, open_models};

#[cfg(feature = "hardware")]
mod hardware {
    use facegate_core::capture::V4lFrameSource;
    use facegate_core::faces::DlibBackend;

    use super::capture_config;
    use crate::cli::ModelArgs;
    use crate::config::CliContext;
    use crate::errors::AppResult;

    pub fn open_models(context: &CliContext, args: &ModelArgs) -> AppResult<DlibBackend> {
        let paths = context.model_paths(args)?;
        DlibBackend::new(&paths, context.jitters(args))
    }

    pub fn open_camera(context: &CliContext, device: Option<&str>) -> V4lFrameSource {
        V4lFrameSource::new(capture_config(context, device))
    }
}
