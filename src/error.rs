use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for everything outside the core model.
///
/// The scheduling core itself never produces these: a full buffer is ordinary
/// back-pressure, and internal-consistency violations are asserted, not
/// returned.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("failed to read '{0}': {1}")]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("error parsing program: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;
