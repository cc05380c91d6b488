//! Defect records and the raw rows they are built from.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Foil face a defect was attributed to during manual review.
///
/// Freshly ingested rows are always `Unknown`; operators fill in the
/// `TOP BOTTOM` column of the exported table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TopBottom {
    Top,
    Bottom,
    #[default]
    Unknown,
}

impl TopBottom {
    /// Parse a table cell. Anything other than `top`/`bottom` is `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "top" => Self::Top,
            "bottom" => Self::Bottom,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Unknown => "unknown",
        }
    }

    /// True for `Top` and `Bottom`.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for TopBottom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measurement row as delivered by a sample's CSV export, tagged with
/// the state and foil it was found under.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub fov_id: String,
    pub fm_size: f64,
    pub pos_x_px: f64,
    pub pos_y_px: f64,
    pub state: String,
    pub group_key: String,
    pub top_bottom: TopBottom,
}

/// A normalized row of the unified defect table.
///
/// Records are created once by the coordinate normalizer and only ever
/// handed out by shared reference afterwards. Added/removed/stayed is a
/// derived classification and is not stored here.
#[derive(Debug, Clone, PartialEq)]
pub struct DefectRecord {
    /// Unique id within the table, assigned at ingestion.
    pub row_id: u64,
    pub fov_id: String,
    pub tile_row_index: u32,
    pub tile_column_index: u32,
    /// Centroid position in pixels, local to the tile.
    pub pos_x_px: f64,
    pub pos_y_px: f64,
    pub fm_size: f64,
    pub state: String,
    /// Physical sample (foil) the record belongs to.
    pub group_key: String,
    pub top_bottom: TopBottom,
    /// Whole-surface position, nominally in [0, 1].
    pub x_pct: f64,
    pub y_pct: f64,
    /// Linear tile number within the surface grid (1-based).
    pub fov_number: u32,
}

impl DefectRecord {
    /// Normalized surface position as a spatial index point.
    #[inline]
    pub fn point(&self) -> [f64; 2] {
        [self.x_pct, self.y_pct]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_bottom_parse_is_lenient() {
        assert_eq!(TopBottom::parse("top"), TopBottom::Top);
        assert_eq!(TopBottom::parse(" Bottom "), TopBottom::Bottom);
        assert_eq!(TopBottom::parse("TOP"), TopBottom::Top);
        assert_eq!(TopBottom::parse(""), TopBottom::Unknown);
        assert_eq!(TopBottom::parse("background"), TopBottom::Unknown);
    }

    #[test]
    fn test_top_bottom_display_roundtrip() {
        for side in [TopBottom::Top, TopBottom::Bottom, TopBottom::Unknown] {
            assert_eq!(TopBottom::parse(&side.to_string()), side);
        }
        assert!(TopBottom::Top.is_known());
        assert!(!TopBottom::Unknown.is_known());
    }
}
