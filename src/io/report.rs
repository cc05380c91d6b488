//! Top/bottom counts and the per-transition text report.

use std::fmt::Write as _;
use std::path::Path;

use crate::algorithms::ChangeSet;
use crate::core::{DefectRecord, TopBottom};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopBottomCounts {
    pub top: usize,
    pub bottom: usize,
    /// Records nobody has classified yet.
    pub unknown: usize,
}

impl TopBottomCounts {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DefectRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.top_bottom {
                TopBottom::Top => counts.top += 1,
                TopBottom::Bottom => counts.bottom += 1,
                TopBottom::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.top + self.bottom + self.unknown
    }
}

/// Counts for one foil between two states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    pub foil: String,
    pub before_state: String,
    pub after_state: String,
    pub before: TopBottomCounts,
    pub after: TopBottomCounts,
    pub stayed: TopBottomCounts,
    pub removed: TopBottomCounts,
    pub added: TopBottomCounts,
}

impl TransitionReport {
    pub fn new(
        foil: &str,
        before_state: &str,
        after_state: &str,
        before: &[&DefectRecord],
        after: &[&DefectRecord],
        changes: &ChangeSet<'_>,
    ) -> Self {
        Self {
            foil: foil.to_string(),
            before_state: before_state.to_string(),
            after_state: after_state.to_string(),
            before: TopBottomCounts::from_records(before.iter().copied()),
            after: TopBottomCounts::from_records(after.iter().copied()),
            stayed: TopBottomCounts::from_records(changes.stayed.iter().copied()),
            removed: TopBottomCounts::from_records(changes.removed.iter().copied()),
            added: TopBottomCounts::from_records(changes.added.iter().copied()),
        }
    }

    /// Report lines, ready to print or draw in monospace.
    pub fn lines(&self) -> Vec<String> {
        let rule = "-".repeat(51);
        let row = |label: &str, c: &TopBottomCounts| {
            format!(
                "{:<8} Top: {:>4} | Bottom: {:>4} | Total: {:>4}",
                label,
                c.top,
                c.bottom,
                c.total()
            )
        };
        vec![
            format!("Analysis Report for: {}", self.foil),
            format!("Transition: {} -> {}", self.before_state, self.after_state),
            rule.clone(),
            row("Before:", &self.before),
            row("After:", &self.after),
            rule,
            row("Stayed:", &self.stayed),
            row("Removed:", &self.removed),
            row("Added:", &self.added),
        ]
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            let _ = writeln!(out, "{line}");
        }
        out
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())
    }
}
