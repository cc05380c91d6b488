//! Greedy nearest-neighbour correspondence between two states.

use super::kdtree::PointIndex;
use super::partition::{PartitionId, partition};
use super::MatchConfig;
use crate::core::{DefectRecord, Result};

/// Which input a one-sided partition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

/// A partition that had records on one side only.
#[derive(Debug, Clone, PartialEq)]
pub struct OneSidedPartition {
    pub id: PartitionId,
    pub side: Side,
    pub count: usize,
}

/// A before-record and the after-record it was matched to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair {
    pub before_row_id: u64,
    pub after_row_id: u64,
    /// Distance in normalized surface units.
    pub distance: f64,
}

/// Outcome of a before/after classification.
///
/// `added` and `stayed` hold after-records in after-input order; `removed`
/// holds before-records in before-input order.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet<'a> {
    pub added: Vec<&'a DefectRecord>,
    pub removed: Vec<&'a DefectRecord>,
    /// After-record representative of every matched pair.
    pub stayed: Vec<&'a DefectRecord>,
    pub pairs: Vec<MatchedPair>,
    pub one_sided: Vec<OneSidedPartition>,
}

impl ChangeSet<'_> {
    /// Number of before-records consumed by a match.
    pub fn consumed_before(&self) -> usize {
        self.pairs.len()
    }
}

/// Classifies defects between two states.
#[derive(Debug, Clone)]
pub struct StateMatcher {
    config: MatchConfig,
}

impl StateMatcher {
    /// Create a matcher, failing fast on an invalid tolerance.
    pub fn new(config: MatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Classify `after` against `before`.
    ///
    /// Every after-record ends up in exactly one of `added`/`stayed`, and
    /// every before-record is either `removed` or consumed by a pair.
    pub fn classify<'a>(
        &self,
        before: &[&'a DefectRecord],
        after: &[&'a DefectRecord],
    ) -> ChangeSet<'a> {
        let keys = &self.config.partition_keys;
        let before_parts = partition(before, keys);
        let after_parts = partition(after, keys);

        let mut before_matched = vec![false; before.len()];
        let mut after_matched = vec![false; after.len()];
        let mut pairs = Vec::new();
        let mut one_sided = Vec::new();

        for (id, after_slots) in &after_parts {
            let Some(before_slots) = before_parts.get(id) else {
                log::info!(
                    "Partition {}: {} records only in after state, all added",
                    id,
                    after_slots.len()
                );
                one_sided.push(OneSidedPartition {
                    id: id.clone(),
                    side: Side::After,
                    count: after_slots.len(),
                });
                continue;
            };

            let index = PointIndex::build(before_slots.iter().map(|&slot| before[slot].point()));

            for &after_slot in after_slots {
                let candidate = after[after_slot];
                let Some(nearest) = index.nearest(&candidate.point()) else {
                    continue;
                };
                if nearest.distance > self.config.distance_tolerance {
                    continue;
                }
                let before_slot = before_slots[nearest.slot];
                if before_matched[before_slot] {
                    continue;
                }

                before_matched[before_slot] = true;
                after_matched[after_slot] = true;
                pairs.push(MatchedPair {
                    before_row_id: before[before_slot].row_id,
                    after_row_id: candidate.row_id,
                    distance: nearest.distance,
                });
            }
        }

        for (id, before_slots) in &before_parts {
            if !after_parts.contains_key(id) {
                log::info!(
                    "Partition {}: {} records only in before state, all removed",
                    id,
                    before_slots.len()
                );
                one_sided.push(OneSidedPartition {
                    id: id.clone(),
                    side: Side::Before,
                    count: before_slots.len(),
                });
            }
        }

        let mut changes = ChangeSet {
            pairs,
            one_sided,
            ..Default::default()
        };
        for (record, matched) in after.iter().zip(&after_matched) {
            if *matched {
                changes.stayed.push(*record);
            } else {
                changes.added.push(*record);
            }
        }
        changes.removed = before
            .iter()
            .zip(&before_matched)
            .filter(|&(_, matched)| !matched)
            .map(|(record, _)| *record)
            .collect();

        log::debug!(
            "Matched {} before / {} after: {} stayed, {} removed, {} added",
            before.len(),
            after.len(),
            changes.stayed.len(),
            changes.removed.len(),
            changes.added.len()
        );
        changes
    }
}
