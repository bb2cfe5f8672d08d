use std::path::PathBuf;

use image::{GrayImage, Rgb, RgbImage};

use crate::errors::AppResult;

/// Supplies live frames. `Ok(None)` means no frame was ready this tick.
pub trait FrameSource {
    fn next_frame(&mut self) -> AppResult<Option<RgbImage>>;
}

impl<T: FrameSource + ?Sized> FrameSource for &mut T {
    fn next_frame(&mut self) -> AppResult<Option<RgbImage>> {
        (**self).next_frame()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLocator {
    Index(u32),
    Path(PathBuf),
}

impl DeviceLocator {
    pub fn from_option(device: Option<String>) -> Self {
        match device {
            Some(text) => {
                if let Ok(index) = text.parse::<u32>() {
                    DeviceLocator::Index(index)
                } else {
                    DeviceLocator::Path(PathBuf::from(text))
                }
            }
            None => DeviceLocator::Index(0),
        }
    }

    pub fn display(&self) -> String {
        match self {
            DeviceLocator::Index(i) => format!("/dev/video{i}"),
            DeviceLocator::Path(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub device: DeviceLocator,
    pub pixel_format: String,
    pub warmup_frames: u32,
}

pub fn gray_to_rgb(image: &GrayImage) -> RgbImage {
    let mut rgb = RgbImage::new(image.width(), image.height());
    for (x, y, pixel) in rgb.enumerate_pixels_mut() {
        let v = image.get_pixel(x, y)[0];
        *pixel = Rgb([v, v, v]);
    }
    rgb
}

#[cfg(feature = "v4l")]
pub use device::V4lFrameSource;

#[cfg(feature = "v4l")]
mod device {
    use image::{GrayImage, RgbImage};
    use tracing::{debug, warn};
    use v4l::buffer::Type;
    use v4l::capability::Flags as CapabilityFlags;
    use v4l::format::{Format, FourCC};
    use v4l::io::mmap::Stream;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;

    use super::{gray_to_rgb, CaptureConfig, DeviceLocator, FrameSource};
    use crate::errors::{AppError, AppResult};

    /// Grabs one frame per call, reopening the device each time.
    pub struct V4lFrameSource {
        config: CaptureConfig,
    }

    impl V4lFrameSource {
        pub fn new(config: CaptureConfig) -> Self {
            Self { config }
        }

        fn open(&self) -> AppResult<v4l::Device> {
            let device = match &self.config.device {
                DeviceLocator::Index(index) => v4l::Device::new(*index as usize),
                DeviceLocator::Path(path) => v4l::Device::with_path(path),
            };
            device.map_err(|source| AppError::DeviceOpen {
                device: self.config.device.display(),
                source,
            })
        }
    }

    impl FrameSource for V4lFrameSource {
        fn next_frame(&mut self) -> AppResult<Option<RgbImage>> {
            let device = self.open()?;
            let caps = device.query_caps()?;
            if !caps.capabilities.contains(CapabilityFlags::VIDEO_CAPTURE) {
                return Err(AppError::Capability("missing VIDEO_CAPTURE".into()));
            }

            let fourcc = parse_fourcc(&self.config.pixel_format)?;
            let mut format = device.format()?;
            format.fourcc = fourcc;
            let format = device.set_format(&format)?;
            debug!(
                device = %self.config.device.display(),
                width = format.width,
                height = format.height,
                "negotiated capture format"
            );

            let mut stream = Stream::with_buffers(&device, Type::VideoCapture, 4)?;
            for _ in 0..self.config.warmup_frames {
                if let Err(err) = stream.next() {
                    warn!(error = %err, "failed to read warm-up frame");
                    return Ok(None);
                }
            }

            let data = match stream.next() {
                Ok((data, _)) => data.to_vec(),
                Err(err) => {
                    warn!(error = %err, "failed to read frame");
                    return Ok(None);
                }
            };
            let gray = convert_frame_to_image(&data, &format)?;
            Ok(Some(gray_to_rgb(&gray)))
        }
    }

    fn parse_fourcc(text: &str) -> AppResult<FourCC> {
        let bytes = text.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 {
            return Err(AppError::FrameProcessing(format!(
                "unsupported pixel format '{text}'"
            )));
        }
        let mut code = [b' '; 4];
        code[..bytes.len()].copy_from_slice(bytes);
        Ok(FourCC::new(&code))
    }

    fn convert_frame_to_image(data: &[u8], format: &Format) -> AppResult<GrayImage> {
        let pixels = format.width as usize * format.height as usize;
        let fourcc = format.fourcc.str().unwrap_or("????").trim().to_string();
        let buffer = match fourcc.as_str() {
            "GREY" | "Y08" => data.get(..pixels).map(<[u8]>::to_vec),
            "Y16" => data
                .get(..pixels * 2)
                .map(|raw| raw.chunks_exact(2).map(|px| px[1]).collect()),
            "YUYV" => data
                .get(..pixels * 2)
                .map(|raw| raw.chunks_exact(2).map(|px| px[0]).collect()),
            other => {
                return Err(AppError::FrameProcessing(format!(
                    "unsupported conversion from pixel format {other}"
                )))
            }
        };
        let buffer = buffer.ok_or_else(|| {
            AppError::FrameProcessing(format!(
                "frame too short for {fourcc} {}x{}",
                format.width, format.height
            ))
        })?;
        GrayImage::from_vec(format.width, format.height, buffer)
            .ok_or_else(|| AppError::FrameProcessing("failed to build image buffer".into()))
    }
}
