pub mod enrollment;
pub mod extractor;
pub mod matcher;
pub mod store;

pub use enrollment::{
    collect_image_files, drive, validate_identity, CancelToken, CaptureSession,
    EnrollmentEvent, EnrollmentProgress, EnrollmentReport, EnrollmentStatus, EnrollmentTask,
    UploadSession, CAMERA_CHANNEL, UPLOAD_CHANNEL,
};

#[cfg(feature = "dlib")]
pub use extractor::DlibBackend;
pub use extractor::{
    crop_face, load_rgb_image, BoundedEmbedder, BoundingBox, FaceDetector, FaceEmbedder,
    FaceModelPaths,
};

pub use matcher::{cosine_distance, cosine_similarity, verify, MatchDecision, UNKNOWN_IDENTITY};

pub use store::{
    DataDirResolver, EmbeddingVector, EnvDataDirResolver, FaceStore, FilesystemFaceStore,
    IdentitySummary, TemplateStore,
};
