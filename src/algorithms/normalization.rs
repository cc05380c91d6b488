//! Tile-to-surface coordinate normalization.
//!
//! The microscope images a foil as a grid of tiles (FOVs) and reports each
//! defect centroid in pixels local to its tile. A whole-surface position is
//! recovered from the tile indices encoded in the FOV id and the tile pitch:
//!
//! ```text
//!   x_pct      = ((column - 1) * pitch_x + pos_x) / surface_width
//!   y_pct      = ((row    - 1) * pitch_y + pos_y) / surface_height
//!   fov_number = (row - 1) * tiles_per_row + column
//!
//!   FOV id  "R_2_C_3"
//!              ^   ^
//!     offset   2   6   → row 2, column 3, fov_number 8
//! ```
//!
//! The defaults (13264 × 9180 px pitch, 5 tiles per row, 66320 × 55080 px
//! surface) match the existing inspection datasets.

use serde::{Deserialize, Serialize};

use crate::core::{DefectError, DefectRecord, RawRow, Result, TileIndex};

/// Geometry of the tile grid and the FOV id encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayout {
    /// Width of the logical full surface in pixels.
    pub surface_width_px: f64,
    /// Height of the logical full surface in pixels.
    pub surface_height_px: f64,
    /// Horizontal offset between adjacent tile origins.
    pub tile_pitch_x_px: f64,
    /// Vertical offset between adjacent tile origins.
    pub tile_pitch_y_px: f64,
    /// Tiles per grid row, used for linear FOV numbering.
    pub tiles_per_row: u32,
    /// Character offset of the row digit in the FOV id (0-based).
    pub row_digit_offset: usize,
    /// Character offset of the column digit in the FOV id (0-based).
    pub column_digit_offset: usize,
}

impl Default for TileLayout {
    fn default() -> Self {
        Self {
            surface_width_px: 66320.0,
            surface_height_px: 55080.0,
            tile_pitch_x_px: 13264.0,
            tile_pitch_y_px: 9180.0,
            tiles_per_row: 5,
            row_digit_offset: 2,
            column_digit_offset: 6,
        }
    }
}

impl TileLayout {
    /// Reject layouts that would divide by zero or produce garbage indices.
    pub fn validate(&self) -> Result<()> {
        require_positive("surface_width_px", self.surface_width_px)?;
        require_positive("surface_height_px", self.surface_height_px)?;
        require_positive("tile_pitch_x_px", self.tile_pitch_x_px)?;
        require_positive("tile_pitch_y_px", self.tile_pitch_y_px)?;
        if self.tiles_per_row == 0 {
            return Err(DefectError::invalid_config("tiles_per_row must be at least 1"));
        }
        // Decoded rows are single digits, so row 9 must still number in u32
        if self.tiles_per_row > MAX_TILES_PER_ROW {
            return Err(DefectError::invalid_config(format!(
                "tiles_per_row must be at most {MAX_TILES_PER_ROW}, got {}",
                self.tiles_per_row
            )));
        }
        if self.row_digit_offset == self.column_digit_offset {
            return Err(DefectError::invalid_config(format!(
                "row and column digit offsets must differ (both {})",
                self.row_digit_offset
            )));
        }
        Ok(())
    }
}

const MAX_TILES_PER_ROW: u32 = u32::MAX / 9;

pub(crate) fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DefectError::invalid_config(format!(
            "{name} must be a positive finite number, got {value}"
        )))
    }
}

/// Whole-surface placement of a defect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePlacement {
    pub x_pct: f64,
    pub y_pct: f64,
    pub fov_number: u32,
}

/// Compute the surface placement for a tile-local position.
///
/// Validates `layout` on every call; use [`CoordinateNormalizer`] when
/// placing many records.
pub fn normalize_position(
    tile: TileIndex,
    pos_x_px: f64,
    pos_y_px: f64,
    layout: &TileLayout,
) -> Result<SurfacePlacement> {
    layout.validate()?;
    Ok(place(layout, tile, pos_x_px, pos_y_px))
}

#[inline]
fn place(layout: &TileLayout, tile: TileIndex, pos_x_px: f64, pos_y_px: f64) -> SurfacePlacement {
    let surface_x = f64::from(tile.column.saturating_sub(1)) * layout.tile_pitch_x_px + pos_x_px;
    let surface_y = f64::from(tile.row.saturating_sub(1)) * layout.tile_pitch_y_px + pos_y_px;
    SurfacePlacement {
        x_pct: surface_x / layout.surface_width_px,
        y_pct: surface_y / layout.surface_height_px,
        fov_number: tile
            .row
            .saturating_sub(1)
            .saturating_mul(layout.tiles_per_row)
            .saturating_add(tile.column),
    }
}

/// Stateless converter from raw rows to [`DefectRecord`]s.
///
/// The layout is validated once at construction, so a normalizer that
/// exists always holds a usable layout.
#[derive(Debug, Clone)]
pub struct CoordinateNormalizer {
    layout: TileLayout,
}

impl CoordinateNormalizer {
    /// Create a normalizer, failing fast on an invalid layout.
    pub fn new(layout: TileLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    /// Decode the 1-based row and column tile indices from an FOV id.
    pub fn decode_fov_id(&self, fov_id: &str) -> Result<TileIndex> {
        let row = digit_at(fov_id, self.layout.row_digit_offset, "row")?;
        let column = digit_at(fov_id, self.layout.column_digit_offset, "column")?;
        if column > self.layout.tiles_per_row {
            log::debug!(
                "FOV {:?}: column {} exceeds {} tiles per row",
                fov_id,
                column,
                self.layout.tiles_per_row
            );
        }
        Ok(TileIndex::new(row, column))
    }

    /// Place a tile-local position on the surface.
    #[inline]
    pub fn place(&self, tile: TileIndex, pos_x_px: f64, pos_y_px: f64) -> SurfacePlacement {
        place(&self.layout, tile, pos_x_px, pos_y_px)
    }

    /// Build a normalized record from a raw row.
    pub fn normalize(&self, row_id: u64, row: RawRow) -> Result<DefectRecord> {
        require_finite("FM SIZE", row.fm_size)?;
        require_finite("POS X", row.pos_x_px)?;
        require_finite("POS Y", row.pos_y_px)?;

        let tile = self.decode_fov_id(&row.fov_id)?;
        let placement = self.place(tile, row.pos_x_px, row.pos_y_px);

        Ok(DefectRecord {
            row_id,
            fov_id: row.fov_id,
            tile_row_index: tile.row,
            tile_column_index: tile.column,
            pos_x_px: row.pos_x_px,
            pos_y_px: row.pos_y_px,
            fm_size: row.fm_size,
            state: row.state,
            group_key: row.group_key,
            top_bottom: row.top_bottom,
            x_pct: placement.x_pct,
            y_pct: placement.y_pct,
            fov_number: placement.fov_number,
        })
    }
}

fn require_finite(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DefectError::NonFiniteMeasurement { field, value })
    }
}

fn digit_at(fov_id: &str, offset: usize, axis: &str) -> Result<u32> {
    let malformed = |reason: String| DefectError::MalformedFovId {
        fov_id: fov_id.to_string(),
        reason,
    };

    let ch = fov_id.chars().nth(offset).ok_or_else(|| {
        malformed(format!("too short for {axis} digit at offset {offset}"))
    })?;
    let digit = ch.to_digit(10).ok_or_else(|| {
        malformed(format!("{axis} character {ch:?} at offset {offset} is not a digit"))
    })?;
    if digit == 0 {
        return Err(malformed(format!("{axis} index is 1-based, got 0")));
    }
    Ok(digit)
}
