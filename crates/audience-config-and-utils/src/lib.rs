//! Core types, configuration, and utilities shared by the audience crates.

mod config;
mod error;
mod logging;
mod paths;
mod privacy;

pub use config::{Config, DEFAULT_LOG_LEVEL, DEFAULT_PLATFORM};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
pub use privacy::PrivacyStatus;
