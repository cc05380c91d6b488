//! Exact-match partitioning of record sets.

use std::collections::BTreeMap;
use std::fmt;

use super::PartitionKey;
use crate::core::{DefectRecord, TopBottom};

/// Values of the configured partition keys for one record.
///
/// Keys that are not configured are `None` and compare equal, so they do
/// not split the set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartitionId {
    pub group_key: Option<String>,
    pub top_bottom: Option<TopBottom>,
    pub state: Option<String>,
}

impl PartitionId {
    pub fn of(record: &DefectRecord, keys: &[PartitionKey]) -> Self {
        let mut id = Self::default();
        for key in keys {
            match key {
                PartitionKey::GroupKey => id.group_key = Some(record.group_key.clone()),
                PartitionKey::TopBottom => id.top_bottom = Some(record.top_bottom),
                PartitionKey::State => id.state = Some(record.state.clone()),
            }
        }
        id
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if let Some(group) = &self.group_key {
            parts.push(group.as_str());
        }
        if let Some(side) = &self.top_bottom {
            parts.push(side.as_str());
        }
        if let Some(state) = &self.state {
            parts.push(state.as_str());
        }
        if parts.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&parts.join("/"))
        }
    }
}

/// Group record positions by partition id.
///
/// Returns indices into `records`, in input order, keyed by partition in
/// sorted order.
pub fn partition(
    records: &[&DefectRecord],
    keys: &[PartitionKey],
) -> BTreeMap<PartitionId, Vec<usize>> {
    let mut parts: BTreeMap<PartitionId, Vec<usize>> = BTreeMap::new();
    for (slot, record) in records.iter().enumerate() {
        parts
            .entry(PartitionId::of(record, keys))
            .or_default()
            .push(slot);
    }
    parts
}
