pub mod admin;
pub mod audit;
pub mod auth;
pub mod capture;
pub mod errors;
pub mod faces;
pub mod gate;

pub use errors::{AppError, AppResult};
pub use gate::{FaceGate, GateSettings};
