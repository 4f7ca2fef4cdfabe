//! Infrastructure layer: job lifecycle, storage, queues, config, external services.

pub mod config;
pub mod external;
pub mod jobs;
pub mod queue;

pub use config::{AppConfig, ConfigError};
