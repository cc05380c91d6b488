//! Core foundation types.
//!
//! - [`types`]: defect records, raw measurement rows, tile indices
//! - [`error`]: record-level and configuration errors shared by every layer

pub mod error;
pub mod types;

pub use error::{DefectError, Result};
pub use types::{DefectRecord, RawRow, TileIndex, TopBottom};
