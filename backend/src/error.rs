use std::path::PathBuf;

use crate::config::ConfigError;

/// Failures that stop the process before it starts serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Model file not found at {}", .0.display())]
    WeightsMissing(PathBuf),
    #[error("Model loading failed: {0}")]
    ModelLoad(String),
}
