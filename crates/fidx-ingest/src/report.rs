//! Ingestion run report
//!
//! The report is the single account of a run: every failure, malformed line
//! and warning ends up counted here.

use crate::coordinator::LocatorState;
use crate::locator::ResourceLocator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

/// How many malformed lines are kept verbatim
pub const MAX_MALFORMED_SAMPLES: usize = 20;

/// A malformed line, kept so format drift can be diagnosed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedSample {
    pub locator: String,
    pub line: u64,
    pub reason: String,
}

/// A locator that ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorFailure {
    pub locator: String,
    /// State the locator was in when it failed
    pub stage: LocatorState,
    pub error: String,
}

/// Counters for one locator's pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorStats {
    /// Decoded lines, including any below the resume watermark
    pub lines_read: u64,
    /// Lines below the watermark that were not parsed again
    pub lines_skipped: u64,
    pub records_parsed: u64,
    pub records_selected: u64,
    pub records_committed: u64,
    pub records_duplicate: u64,
    pub records_malformed: u64,
    pub malformed_samples: Vec<MalformedSample>,
}

impl LocatorStats {
    pub fn record_malformed(&mut self, locator: &ResourceLocator, line: u64, reason: String) {
        self.records_malformed += 1;
        if self.malformed_samples.len() < MAX_MALFORMED_SAMPLES {
            self.malformed_samples.push(MalformedSample {
                locator: locator.relative_path(),
                line,
                reason,
            });
        }
    }
}

/// Result of one `ingest` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub locators_attempted: u64,
    pub locators_completed: u64,
    pub locators_failed: u64,
    /// Already complete from an earlier run; not fetched
    pub locators_skipped: u64,

    pub records_parsed: u64,
    pub records_selected: u64,
    pub records_committed: u64,
    pub records_duplicate: u64,
    pub records_malformed: u64,

    pub malformed_samples: Vec<MalformedSample>,
    pub failures: Vec<LocatorFailure>,
    pub warnings: Vec<String>,
    /// Stopped early by a cancellation request
    pub cancelled: bool,
}

impl IngestionReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            locators_attempted: 0,
            locators_completed: 0,
            locators_failed: 0,
            locators_skipped: 0,
            records_parsed: 0,
            records_selected: 0,
            records_committed: 0,
            records_duplicate: 0,
            records_malformed: 0,
            malformed_samples: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            cancelled: false,
        }
    }

    /// Fold one locator's counters into the run totals
    pub fn absorb(&mut self, stats: LocatorStats) {
        self.records_parsed += stats.records_parsed;
        self.records_selected += stats.records_selected;
        self.records_committed += stats.records_committed;
        self.records_duplicate += stats.records_duplicate;
        self.records_malformed += stats.records_malformed;

        let room = MAX_MALFORMED_SAMPLES.saturating_sub(self.malformed_samples.len());
        self.malformed_samples
            .extend(stats.malformed_samples.into_iter().take(room));
    }

    pub fn record_failure(&mut self, locator: &ResourceLocator, stage: LocatorState, error: String) {
        self.locators_failed += 1;
        self.failures.push(LocatorFailure {
            locator: locator.relative_path(),
            stage,
            error,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        // Failures arrive in completion order
        self.failures.sort_by(|a, b| a.locator.cmp(&b.locator));
        self.malformed_samples
            .sort_by(|a, b| a.locator.cmp(&b.locator).then(a.line.cmp(&b.line)));
    }

    /// Every attempted locator completed and the run was not cut short
    pub fn is_success(&self) -> bool {
        self.locators_failed == 0 && !self.cancelled
    }

    /// Human-readable multi-line summary
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Ingestion run {}", self.run_id);
        let _ = writeln!(
            out,
            "  locators:  {} attempted, {} completed, {} failed, {} already complete",
            self.locators_attempted, self.locators_completed, self.locators_failed, self.locators_skipped
        );
        let _ = writeln!(
            out,
            "  records:   {} parsed, {} selected, {} committed, {} duplicate, {} malformed",
            self.records_parsed,
            self.records_selected,
            self.records_committed,
            self.records_duplicate,
            self.records_malformed
        );
        if let Some(finished) = self.finished_at {
            let elapsed = finished - self.started_at;
            let _ = writeln!(out, "  elapsed:   {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
        }
        if self.cancelled {
            let _ = writeln!(out, "  cancelled before all locators were processed");
        }
        for failure in &self.failures {
            let _ = writeln!(
                out,
                "  FAILED    {} while {}: {}",
                failure.locator,
                failure.stage.as_str(),
                failure.error
            );
        }
        for sample in &self.malformed_samples {
            let _ = writeln!(out, "  MALFORMED {}:{}: {}", sample.locator, sample.line, sample.reason);
        }
        if self.records_malformed > self.malformed_samples.len() as u64 {
            let _ = writeln!(
                out,
                "  ... {} more malformed lines",
                self.records_malformed - self.malformed_samples.len() as u64
            );
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "  WARNING   {}", warning);
        }
        out
    }
}

impl Default for IngestionReport {
    fn default() -> Self {
        Self::new()
    }
}
