//! Errors that abort a command.

use thiserror::Error;

use crate::config::ConfigLoadError;
use crate::core::DefectError;
use crate::io::{ImageryError, IngestError, PlotError};

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Defect(#[from] DefectError),

    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Imagery(#[from] ImageryError),

    #[error(transparent)]
    Plot(#[from] PlotError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no sample could be read")]
    NothingCombined,

    #[error("compare requires compare.before_state and compare.after_state")]
    MissingCompareStates,
}

impl AnalysisError {
    /// Whether the error comes from the configuration rather than the data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingCompareStates | Self::Defect(DefectError::InvalidConfiguration(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
