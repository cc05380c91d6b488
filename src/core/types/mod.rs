//! Record types for the unified defect table.

mod record;
mod tile;

pub use record::{DefectRecord, RawRow, TopBottom};
pub use tile::TileIndex;
