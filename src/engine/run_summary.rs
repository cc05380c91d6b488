//! Per-run bookkeeping of what worked and what did not.

use std::fmt::Display;
use std::path::PathBuf;

/// A unit of work (sample, FOV, foil comparison) that failed or was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFailure {
    pub sample: String,
    pub reason: String,
}

/// Outcome of one command. Failures never abort the run; they are
/// collected here and logged at the end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub command: String,
    pub succeeded: usize,
    pub failures: Vec<SampleFailure>,
    /// Rows excluded during normalization.
    pub rejected_rows: usize,
    /// Files written.
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Default::default()
        }
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_output(&mut self, path: PathBuf) {
        self.succeeded += 1;
        self.outputs.push(path);
    }

    pub fn record_failure(&mut self, sample: impl Into<String>, reason: impl Display) {
        let failure = SampleFailure {
            sample: sample.into(),
            reason: reason.to_string(),
        };
        log::warn!("[{}] {}: {}", self.command, failure.sample, failure.reason);
        self.failures.push(failure);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.rejected_rows == 0
    }

    /// Fold another command's summary into this one.
    pub fn merge(&mut self, other: RunSummary) {
        self.succeeded += other.succeeded;
        self.rejected_rows += other.rejected_rows;
        self.failures.extend(other.failures);
        self.outputs.extend(other.outputs);
    }

    /// Log the totals, at warn level when anything failed or was rejected.
    pub fn log(&self) {
        let level = if self.is_clean() {
            log::Level::Info
        } else {
            log::Level::Warn
        };
        log::log!(
            level,
            "[{}] {} succeeded, {} failed, {} rows rejected, {} files written",
            self.command,
            self.succeeded,
            self.failures.len(),
            self.rejected_rows,
            self.outputs.len()
        );
        for failure in &self.failures {
            log::warn!("[{}]   {}: {}", self.command, failure.sample, failure.reason);
        }
    }
}
