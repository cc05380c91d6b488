//! Core algorithms.
//!
//! - [`normalization`]: tile-local pixels → whole-surface percentages
//! - [`matching`]: before/after correspondence (added, removed, stayed)
//! - [`classification`]: FM size classes used for plot markers

pub mod classification;
pub mod matching;
pub mod normalization;

pub use classification::{MarkerShape, SizeBin, SizeClass, SizeClasses};
pub use matching::{
    ChangeSet, MatchConfig, MatchedPair, OneSidedPartition, PartitionId, PartitionKey, Side,
    StateMatcher,
};
pub use normalization::{CoordinateNormalizer, SurfacePlacement, TileLayout, normalize_position};
