//! Core types, errors, logging and camera

pub mod types;
pub mod error;
pub mod logging;
pub mod camera;

pub use types::*;
pub use error::{ConfigIssue, ConfigIssues, Error};
pub use camera::Camera;
