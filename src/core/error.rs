//! Errors raised while turning raw measurements into defect records.

use thiserror::Error;

/// Record-level and configuration errors.
///
/// `MalformedFovId` and `NonFiniteMeasurement` only ever exclude the
/// offending record. `InvalidConfiguration` is fatal and is raised before
/// any record is processed. `DuplicateRowId` rejects a whole table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefectError {
    #[error("malformed FOV id {fov_id:?}: {reason}")]
    MalformedFovId { fov_id: String, reason: String },

    #[error("non-finite {field} value: {value}")]
    NonFiniteMeasurement { field: &'static str, value: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("duplicate row id {0}")]
    DuplicateRowId(u64),
}

impl DefectError {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether this error only invalidates a single record.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            Self::MalformedFovId { .. } | Self::NonFiniteMeasurement { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DefectError>;
