//! File-level plumbing around the core.
//!
//! - [`ingest`]: sample discovery and headerless measurement CSVs
//! - [`table_csv`]: unified table export and read-back
//! - [`imagery`]: raw image lookup, crops and composites
//! - [`plot`]: SVG position, change and summary plots
//! - [`report`]: top/bottom counts and the transition text report

mod csv;
pub mod imagery;
pub mod ingest;
pub mod plot;
pub mod report;
pub mod table_csv;

pub use imagery::{Channel, CropWindow, Direction, ImageLocator, ImageryError};
pub use ingest::{IngestError, SampleSource, discover_samples, find_sample_csv, load_sample};
pub use plot::{Panel, PlotError, PlotRenderer};
pub use report::{TopBottomCounts, TransitionReport};
pub use table_csv::{TableRead, read_table, write_table, write_table_with_links};
