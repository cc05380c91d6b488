//! Configuration loading errors.

use thiserror::Error;

use crate::core::DefectError;

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("unsupported config format {0:?} (expected .toml or .json)")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Invalid(#[from] DefectError),
}
