//! Tile (FOV) grid indices.

use std::fmt;

/// 1-based position of an imaged tile in the surface grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileIndex {
    /// Row in the tile grid (1 = top row).
    pub row: u32,
    /// Column in the tile grid (1 = leftmost column).
    pub column: u32,
}

impl TileIndex {
    /// Create a tile index. Both components are expected to be ≥ 1.
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}c{}", self.row, self.column)
    }
}
