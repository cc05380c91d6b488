//! FM size classes.
//!
//! Plots draw each defect with a marker shape chosen by its size. Bins are
//! half-open `[min_size, max_size)` and checked in order; sizes that fall
//! in no bin get the fallback class.

use serde::{Deserialize, Serialize};

use crate::core::{DefectError, Result};

/// Marker glyph used for a size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerShape {
    Triangle,
    Square,
    Pentagon,
    Hexagon,
    Octagon,
    Circle,
}

impl MarkerShape {
    /// Number of polygon vertices, `None` for a circle.
    pub fn vertex_count(&self) -> Option<usize> {
        match self {
            Self::Triangle => Some(3),
            Self::Square => Some(4),
            Self::Pentagon => Some(5),
            Self::Hexagon => Some(6),
            Self::Octagon => Some(8),
            Self::Circle => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeBin {
    pub label: String,
    pub marker: MarkerShape,
    pub min_size: f64,
    pub max_size: f64,
}

impl SizeBin {
    pub fn new(label: &str, marker: MarkerShape, min_size: f64, max_size: f64) -> Self {
        Self {
            label: label.to_string(),
            marker,
            min_size,
            max_size,
        }
    }

    #[inline]
    pub fn contains(&self, fm_size: f64) -> bool {
        fm_size >= self.min_size && fm_size < self.max_size
    }
}

/// Result of classifying a single size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeClass<'a> {
    pub label: &'a str,
    pub marker: MarkerShape,
}

/// Ordered size bins plus a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeClasses {
    pub fallback_label: String,
    pub fallback_marker: MarkerShape,
    pub bins: Vec<SizeBin>,
}

impl Default for SizeClasses {
    fn default() -> Self {
        Self {
            fallback_label: ">600".to_string(),
            fallback_marker: MarkerShape::Circle,
            bins: vec![
                SizeBin::new("100-200", MarkerShape::Triangle, 100.0, 200.0),
                SizeBin::new("200-300", MarkerShape::Square, 200.0, 300.0),
                SizeBin::new("300-400", MarkerShape::Pentagon, 300.0, 400.0),
                SizeBin::new("400-500", MarkerShape::Hexagon, 400.0, 500.0),
                SizeBin::new("500-600", MarkerShape::Octagon, 500.0, 600.0),
            ],
        }
    }
}

impl SizeClasses {
    pub fn validate(&self) -> Result<()> {
        for bin in &self.bins {
            if !(bin.min_size.is_finite() && bin.max_size.is_finite())
                || bin.min_size >= bin.max_size
            {
                return Err(DefectError::invalid_config(format!(
                    "size bin {:?} has an empty range [{}, {})",
                    bin.label, bin.min_size, bin.max_size
                )));
            }
        }
        Ok(())
    }

    /// First bin containing `fm_size`, else the fallback.
    pub fn classify(&self, fm_size: f64) -> SizeClass<'_> {
        self.bins
            .iter()
            .find(|bin| bin.contains(fm_size))
            .map(|bin| SizeClass {
                label: &bin.label,
                marker: bin.marker,
            })
            .unwrap_or(SizeClass {
                label: &self.fallback_label,
                marker: self.fallback_marker,
            })
    }

    /// Legend entries in display order, fallback last.
    pub fn legend(&self) -> Vec<SizeClass<'_>> {
        self.bins
            .iter()
            .map(|bin| SizeClass {
                label: &bin.label,
                marker: bin.marker,
            })
            .chain(std::iter::once(SizeClass {
                label: &self.fallback_label,
                marker: self.fallback_marker,
            }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bins_are_half_open() {
        let classes = SizeClasses::default();
        assert_eq!(classes.classify(100.0).marker, MarkerShape::Triangle);
        assert_eq!(classes.classify(199.99).marker, MarkerShape::Triangle);
        assert_eq!(classes.classify(200.0).marker, MarkerShape::Square);
        assert_eq!(classes.classify(599.0).marker, MarkerShape::Octagon);
    }

    #[test]
    fn test_fallback() {
        let classes = SizeClasses::default();
        let big = classes.classify(600.0);
        assert_eq!(big.marker, MarkerShape::Circle);
        assert_eq!(big.label, ">600");
        // below the first bin also falls back
        assert_eq!(classes.classify(50.0).marker, MarkerShape::Circle);
    }

    #[test]
    fn test_legend_order() {
        let classes = SizeClasses::default();
        let legend = classes.legend();
        assert_eq!(legend.len(), 6);
        assert_eq!(legend[0].label, "100-200");
        assert_eq!(legend[5].marker, MarkerShape::Circle);
    }

    #[test]
    fn test_validate_rejects_empty_bin() {
        let mut classes = SizeClasses::default();
        classes.bins.push(SizeBin::new("bad", MarkerShape::Square, 700.0, 700.0));
        assert!(classes.validate().is_err());
        assert!(SizeClasses::default().validate().is_ok());
    }

    #[test]
    fn test_vertex_count() {
        assert_eq!(MarkerShape::Octagon.vertex_count(), Some(8));
        assert_eq!(MarkerShape::Circle.vertex_count(), None);
    }
}
