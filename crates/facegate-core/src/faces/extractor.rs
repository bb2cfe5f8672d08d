use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{AppError, AppResult};
use crate::faces::store::EmbeddingVector;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl BoundingBox {
    pub fn width(&self) -> i64 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.bottom - self.top).max(0)
    }
}

/// Locates faces in a frame. Boxes come back in no particular order.
pub trait FaceDetector {
    fn detect(&self, frame: &RgbImage) -> AppResult<Vec<BoundingBox>>;
}

/// Turns a face image into an embedding. `None` means the embedder declined
/// (for example when no face is confidently found); callers count it as a
/// skip.
pub trait FaceEmbedder {
    fn embed(&self, face: &RgbImage) -> Option<EmbeddingVector>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for &T {
    fn detect(&self, frame: &RgbImage) -> AppResult<Vec<BoundingBox>> {
        (**self).detect(frame)
    }
}

impl<T: FaceEmbedder + ?Sized> FaceEmbedder for &T {
    fn embed(&self, face: &RgbImage) -> Option<EmbeddingVector> {
        (**self).embed(face)
    }
}

/// Discards embeddings that took longer than `timeout`.
///
/// The wrapped call runs to completion; a late result is reported as a
/// declined extraction so a stalled model shows up as skips instead of
/// silently slowing enrollment.
#[derive(Debug, Clone)]
pub struct BoundedEmbedder<E> {
    inner: E,
    timeout: Duration,
}

impl<E: FaceEmbedder> BoundedEmbedder<E> {
    pub fn new(inner: E, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<E: FaceEmbedder> FaceEmbedder for BoundedEmbedder<E> {
    fn embed(&self, face: &RgbImage) -> Option<EmbeddingVector> {
        let started = Instant::now();
        let embedding = self.inner.embed(face);
        let elapsed = started.elapsed();
        if elapsed > self.timeout {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.timeout.as_millis() as u64,
                "embedding exceeded timeout; discarding result"
            );
            return None;
        }
        embedding
    }
}

/// Crops `bbox` out of `frame`, clamped to the frame bounds.
pub fn crop_face(frame: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let frame_width = i64::from(frame.width());
    let frame_height = i64::from(frame.height());
    let left = bbox.left.clamp(0, frame_width);
    let top = bbox.top.clamp(0, frame_height);
    let right = bbox.right.clamp(0, frame_width);
    let bottom = bbox.bottom.clamp(0, frame_height);
    if right <= left || bottom <= top {
        return None;
    }

    let crop = imageops::crop_imm(
        frame,
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    );
    Some(crop.to_image())
}

pub fn load_rgb_image(path: &Path) -> AppResult<RgbImage> {
    let image = image::open(path).map_err(|source| AppError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgb8())
}

#[derive(Debug, Clone)]
pub struct FaceModelPaths {
    pub landmark: PathBuf,
    pub encoder: PathBuf,
}

impl FaceModelPaths {
    pub fn resolve(landmark: Option<PathBuf>, encoder: Option<PathBuf>) -> AppResult<Self> {
        let landmark = landmark.ok_or(AppError::MissingModel {
            kind: "landmark predictor",
            flag: "--landmark-model",
        })?;
        let encoder = encoder.ok_or(AppError::MissingModel {
            kind: "face encoding network",
            flag: "--encoder-model",
        })?;
        Ok(Self { landmark, encoder })
    }
}

#[cfg(feature = "dlib")]
pub use dlib::DlibBackend;

#[cfg(feature = "dlib")]
mod dlib {
    use dlib_face_recognition::{
        FaceDetector as DlibDetector, FaceDetectorTrait, FaceEncoderNetwork, FaceEncoderTrait,
        ImageMatrix, LandmarkPredictor, LandmarkPredictorTrait,
    };
    use image::RgbImage;
    use tracing::debug;

    use super::{BoundingBox, FaceDetector, FaceEmbedder, FaceModelPaths};
    use crate::errors::{AppError, AppResult};
    use crate::faces::store::EmbeddingVector;

    pub struct DlibBackend {
        detector: DlibDetector,
        predictor: LandmarkPredictor,
        encoder: FaceEncoderNetwork,
        jitters: u32,
    }

    impl DlibBackend {
        pub fn new(models: &FaceModelPaths, jitters: u32) -> AppResult<Self> {
            debug!(path = %models.landmark.display(), "loading landmark model");
            let predictor =
                LandmarkPredictor::open(&models.landmark).map_err(|message| {
                    AppError::ModelLoad {
                        path: models.landmark.clone(),
                        message,
                    }
                })?;
            debug!(path = %models.encoder.display(), "loading encoder model");
            let encoder =
                FaceEncoderNetwork::open(&models.encoder).map_err(|message| {
                    AppError::ModelLoad {
                        path: models.encoder.clone(),
                        message,
                    }
                })?;

            Ok(Self {
                detector: DlibDetector::new(),
                predictor,
                encoder,
                jitters,
            })
        }
    }

    impl FaceDetector for DlibBackend {
        fn detect(&self, frame: &RgbImage) -> AppResult<Vec<BoundingBox>> {
            let matrix = ImageMatrix::from_image(frame);
            let locations = self.detector.face_locations(&matrix);
            Ok(locations
                .iter()
                .map(|rect| BoundingBox {
                    left: rect.left,
                    top: rect.top,
                    right: rect.right,
                    bottom: rect.bottom,
                })
                .collect())
        }
    }

    impl FaceEmbedder for DlibBackend {
        fn embed(&self, face: &RgbImage) -> Option<EmbeddingVector> {
            let matrix = ImageMatrix::from_image(face);
            let locations = self.detector.face_locations(&matrix);
            let rect = locations.iter().next()?;
            let landmarks = vec![self.predictor.face_landmarks(&matrix, rect)];
            let encodings = self
                .encoder
                .get_face_encodings(&matrix, &landmarks, self.jitters);
            encodings
                .iter()
                .next()
                .map(|encoding| encoding.as_ref().to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    struct SlowEmbedder(Duration);

    impl FaceEmbedder for SlowEmbedder {
        fn embed(&self, _face: &RgbImage) -> Option<EmbeddingVector> {
            sleep(self.0);
            Some(vec![1.0, 0.0])
        }
    }

    #[test]
    fn crop_is_clamped_to_frame() {
        let frame = RgbImage::new(10, 8);
        let bbox = BoundingBox {
            left: -4,
            top: 2,
            right: 6,
            bottom: 20,
        };
        let crop = crop_face(&frame, &bbox).unwrap();
        assert_eq!((crop.width(), crop.height()), (6, 6));
    }

    #[test]
    fn crop_outside_frame_is_rejected() {
        let frame = RgbImage::new(10, 8);
        let bbox = BoundingBox {
            left: 12,
            top: 0,
            right: 20,
            bottom: 4,
        };
        assert!(crop_face(&frame, &bbox).is_none());
    }

    #[test]
    fn bounded_embedder_discards_late_results() {
        let frame = RgbImage::new(2, 2);
        let slow = BoundedEmbedder::new(
            SlowEmbedder(Duration::from_millis(30)),
            Duration::from_millis(5),
        );
        assert!(slow.embed(&frame).is_none());

        let fast = BoundedEmbedder::new(SlowEmbedder(Duration::ZERO), Duration::from_secs(5));
        assert_eq!(fast.embed(&frame), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn missing_models_are_reported() {
        let err = FaceModelPaths::resolve(None, Some(PathBuf::from("encoder.dat"))).unwrap_err();
        assert!(matches!(
            err,
            AppError::MissingModel {
                kind: "landmark predictor",
                ..
            }
        ));
    }

    #[test]
    fn undecodable_image_is_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = load_rgb_image(&path).unwrap_err();
        assert!(matches!(err, AppError::ImageDecode { .. }));
    }
}
