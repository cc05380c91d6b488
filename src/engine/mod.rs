//! Orchestration of an analysis run.
//!
//! - [`table`]: the unified defect table and record filters
//! - [`analysis`]: combine, crop, background, plot and compare commands
//! - [`run_summary`]: per-command success and failure bookkeeping
//! - [`error`]: errors that abort a command

pub mod analysis;
pub mod error;
pub mod run_summary;
pub mod table;

pub use analysis::{Analysis, CombineOutcome, CompareOutcome};
pub use error::{AnalysisError, Result};
pub use run_summary::{RunSummary, SampleFailure};
pub use table::{DefectTable, RecordFilter, RejectedRow, SizeRange, TableBuild};
