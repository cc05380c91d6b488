//! Before/after state correspondence.
//!
//! Classifies every defect observed in two processing states as
//! added, removed or stayed by spatial nearest-neighbour matching inside
//! exact-match partitions (by default: foil and top/bottom face).
//!
//! # Example
//!
//! ```ignore
//! use dakar_fm::algorithms::{MatchConfig, StateMatcher};
//!
//! let matcher = StateMatcher::new(MatchConfig::default())?;
//! let before = table.select(&RecordFilter::new().state("BeforeDetach"));
//! let after = table.select(&RecordFilter::new().state("AfterDetach"));
//!
//! let changes = matcher.classify(&before, &after);
//! println!("{} stayed, {} removed, {} added",
//!     changes.stayed.len(), changes.removed.len(), changes.added.len());
//! ```
//!
//! Matching is greedy and first-come: after-records are visited in input
//! order and each takes its single nearest before-record if that one is
//! within tolerance and still free. A later after-record that loses the
//! race is reported as added; it does not fall back to its second-nearest
//! neighbour.

mod kdtree;
mod partition;
mod state_matcher;

pub use partition::{PartitionId, partition};
pub use state_matcher::{ChangeSet, MatchedPair, OneSidedPartition, Side, StateMatcher};

use serde::{Deserialize, Serialize};

use crate::core::{DefectError, Result};

/// Categorical field used to split records before spatial matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKey {
    /// Physical sample (foil).
    GroupKey,
    /// Top/bottom face.
    TopBottom,
    /// Processing state. Only useful when both inputs mix states.
    State,
}

/// Configuration for [`StateMatcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Maximum distance, in normalized surface units, for two records to
    /// be the same defect. Inclusive.
    pub distance_tolerance: f64,

    /// Fields that must be equal for two records to be compared at all.
    pub partition_keys: Vec<PartitionKey>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            distance_tolerance: 0.02,
            partition_keys: vec![PartitionKey::GroupKey, PartitionKey::TopBottom],
        }
    }
}

impl MatchConfig {
    pub fn with_tolerance(mut self, distance_tolerance: f64) -> Self {
        self.distance_tolerance = distance_tolerance;
        self
    }

    pub fn with_partition_keys(mut self, keys: Vec<PartitionKey>) -> Self {
        self.partition_keys = keys;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.distance_tolerance.is_finite() && self.distance_tolerance > 0.0) {
            return Err(DefectError::invalid_config(format!(
                "distance_tolerance must be a positive finite number, got {}",
                self.distance_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MatchConfig::default();
        assert_eq!(config.distance_tolerance, 0.02);
        assert_eq!(
            config.partition_keys,
            vec![PartitionKey::GroupKey, PartitionKey::TopBottom]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_tolerance() {
        for tol in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            let config = MatchConfig::default().with_tolerance(tol);
            assert!(matches!(
                config.validate(),
                Err(DefectError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_partition_key_serde_names() {
        let json = serde_json::to_string(&PartitionKey::GroupKey).unwrap();
        assert_eq!(json, "\"group_key\"");
        let key: PartitionKey = serde_json::from_str("\"top_bottom\"").unwrap();
        assert_eq!(key, PartitionKey::TopBottom);
    }
}
