//! The unified defect table and filtered views over it.

use std::collections::HashMap;

use crate::algorithms::CoordinateNormalizer;
use crate::core::{DefectError, DefectRecord, RawRow, Result, TopBottom};

/// A raw row that could not be normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// Id the row would have had.
    pub row_id: u64,
    pub fov_id: String,
    pub error: DefectError,
}

/// Output of [`DefectTable::build`].
#[derive(Debug, Clone, Default)]
pub struct TableBuild {
    pub table: DefectTable,
    pub rejected: Vec<RejectedRow>,
}

/// Inclusive FM size range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeRange {
    pub min: f64,
    pub max: f64,
}

impl SizeRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, fm_size: f64) -> bool {
        fm_size >= self.min && fm_size <= self.max
    }
}

/// Selection criteria for [`DefectTable::select`].
///
/// Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub groups: Option<Vec<String>>,
    pub states: Option<Vec<String>>,
    pub top_bottom: Option<Vec<TopBottom>>,
    pub size_range: Option<SizeRange>,
    pub excluded_fov_numbers: Vec<u32>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, group: &str) -> Self {
        self.groups
            .get_or_insert_with(Vec::new)
            .push(group.to_string());
        self
    }

    pub fn state(mut self, state: &str) -> Self {
        self.states
            .get_or_insert_with(Vec::new)
            .push(state.to_string());
        self
    }

    pub fn sides(mut self, sides: &[TopBottom]) -> Self {
        self.top_bottom = Some(sides.to_vec());
        self
    }

    pub fn size_range(mut self, range: SizeRange) -> Self {
        self.size_range = Some(range);
        self
    }

    pub fn exclude_fovs(mut self, fov_numbers: &[u32]) -> Self {
        self.excluded_fov_numbers.extend_from_slice(fov_numbers);
        self
    }

    pub fn matches(&self, record: &DefectRecord) -> bool {
        if let Some(groups) = &self.groups
            && !groups.contains(&record.group_key)
        {
            return false;
        }
        if let Some(states) = &self.states
            && !states.contains(&record.state)
        {
            return false;
        }
        if let Some(sides) = &self.top_bottom
            && !sides.contains(&record.top_bottom)
        {
            return false;
        }
        if let Some(range) = &self.size_range
            && !range.contains(record.fm_size)
        {
            return false;
        }
        !self.excluded_fov_numbers.contains(&record.fov_number)
    }
}

/// Flat table of normalized records, in ingestion order.
///
/// Records are never removed or modified; callers work on borrowed views.
#[derive(Debug, Clone, Default)]
pub struct DefectTable {
    records: Vec<DefectRecord>,
    by_row_id: HashMap<u64, usize>,
}

impl DefectTable {
    /// Normalize raw rows into a table.
    ///
    /// Row ids are the 1-based ingestion position, so a rejected row leaves
    /// a gap rather than shifting later ids.
    pub fn build(
        rows: impl IntoIterator<Item = RawRow>,
        normalizer: &CoordinateNormalizer,
    ) -> TableBuild {
        let mut records = Vec::new();
        let mut rejected = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            let row_id = index as u64 + 1;
            let fov_id = row.fov_id.clone();
            let context = format!("{}/{}", row.state, row.group_key);
            match normalizer.normalize(row_id, row) {
                Ok(record) => records.push(record),
                Err(error) => {
                    log::warn!("Excluding row {} ({}): {}", row_id, context, error);
                    rejected.push(RejectedRow {
                        row_id,
                        fov_id,
                        error,
                    });
                }
            }
        }

        let by_row_id = records
            .iter()
            .enumerate()
            .map(|(slot, r)| (r.row_id, slot))
            .collect();
        TableBuild {
            table: Self { records, by_row_id },
            rejected,
        }
    }

    /// Wrap already-normalized records, e.g. read back from disk.
    pub fn from_records(records: Vec<DefectRecord>) -> Result<Self> {
        let mut by_row_id = HashMap::with_capacity(records.len());
        for (slot, record) in records.iter().enumerate() {
            if by_row_id.insert(record.row_id, slot).is_some() {
                return Err(DefectError::DuplicateRowId(record.row_id));
            }
        }
        Ok(Self { records, by_row_id })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DefectRecord] {
        &self.records
    }

    pub fn get(&self, row_id: u64) -> Option<&DefectRecord> {
        self.by_row_id.get(&row_id).map(|&slot| &self.records[slot])
    }

    /// Records matching `filter`, in table order.
    pub fn select(&self, filter: &RecordFilter) -> Vec<&DefectRecord> {
        self.records.iter().filter(|r| filter.matches(r)).collect()
    }

    /// Distinct states in first-seen order.
    pub fn states(&self) -> Vec<&str> {
        distinct(self.records.iter().map(|r| r.state.as_str()))
    }

    /// Distinct foils within one state, in first-seen order.
    pub fn groups_in_state(&self, state: &str) -> Vec<&str> {
        distinct(
            self.records
                .iter()
                .filter(|r| r.state == state)
                .map(|r| r.group_key.as_str()),
        )
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::TileLayout;

    fn raw(fov_id: &str, fm_size: f64, state: &str, foil: &str) -> RawRow {
        RawRow {
            fov_id: fov_id.to_string(),
            fm_size,
            pos_x_px: 100.0,
            pos_y_px: 200.0,
            state: state.to_string(),
            group_key: foil.to_string(),
            top_bottom: TopBottom::Unknown,
        }
    }

    fn build(rows: Vec<RawRow>) -> TableBuild {
        let normalizer = CoordinateNormalizer::new(TileLayout::default()).unwrap();
        DefectTable::build(rows, &normalizer)
    }

    #[test]
    fn test_build_assigns_sequential_ids() {
        let built = build(vec![
            raw("R_1_C_1", 150.0, "A", "foil1"),
            raw("R_2_C_3", 250.0, "A", "foil1"),
        ]);
        assert!(built.rejected.is_empty());
        let ids: Vec<u64> = built.table.records().iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(built.table.get(2).unwrap().fov_number, 8);
    }

    #[test]
    fn test_malformed_row_is_excluded_and_run_continues() {
        let built = build(vec![
            raw("R_1_C_1", 150.0, "A", "foil1"),
            raw("AB", 150.0, "A", "foil1"),
            raw("R_1_C_2", 150.0, "A", "foil1"),
        ]);
        assert_eq!(built.table.len(), 2);
        assert_eq!(built.rejected.len(), 1);
        assert_eq!(built.rejected[0].row_id, 2);
        assert!(matches!(
            built.rejected[0].error,
            DefectError::MalformedFovId { .. }
        ));
        // ids are never reused
        assert!(built.table.get(2).is_none());
        assert_eq!(built.table.get(3).unwrap().fov_id, "R_1_C_2");
    }

    #[test]
    fn test_select_by_filter() {
        let built = build(vec![
            raw("R_1_C_1", 150.0, "A", "foil1"),
            raw("R_1_C_2", 700.0, "A", "foil2"),
            raw("R_1_C_3", 90.0, "B", "foil1"),
            raw("R_6_C_5", 300.0, "B", "foil1"),
        ]);
        let table = &built.table;

        let a = table.select(&RecordFilter::new().state("A"));
        assert_eq!(a.len(), 2);

        let sized = table.select(&RecordFilter::new().size_range(SizeRange::new(100.0, 700.0)));
        let ids: Vec<u64> = sized.iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![1, 2, 4]);

        let excluded = table.select(&RecordFilter::new().state("B").exclude_fovs(&[30]));
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].row_id, 3);

        let foil1 = table.select(&RecordFilter::new().group("foil1").state("A"));
        assert_eq!(foil1.len(), 1);

        let known = table.select(&RecordFilter::new().sides(&[TopBottom::Top]));
        assert!(known.is_empty());
    }

    #[test]
    fn test_states_and_groups() {
        let built = build(vec![
            raw("R_1_C_1", 150.0, "B", "foil2"),
            raw("R_1_C_1", 150.0, "A", "foil1"),
            raw("R_1_C_1", 150.0, "B", "foil1"),
        ]);
        assert_eq!(built.table.states(), vec!["B", "A"]);
        assert_eq!(built.table.groups_in_state("B"), vec!["foil2", "foil1"]);
    }

    #[test]
    fn test_from_records_rejects_duplicate_ids() {
        let built = build(vec![raw("R_1_C_1", 150.0, "A", "foil1")]);
        let mut records = built.table.records().to_vec();
        records.push(records[0].clone());
        assert_eq!(
            DefectTable::from_records(records).unwrap_err(),
            DefectError::DuplicateRowId(1)
        );
    }
}
