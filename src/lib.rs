pub mod api;
pub mod core;
pub mod error;
pub mod input;
pub mod report;
pub mod telemetry;

pub use error::RoiError;
