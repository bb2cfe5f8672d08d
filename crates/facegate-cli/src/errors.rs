pub use facegate_core::errors::*;
