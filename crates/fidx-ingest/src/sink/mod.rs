//! Persistence sinks
//!
//! A sink owns uniqueness: submitting a record whose natural key (company
//! identifier, form, filed date, document path) is already stored reports
//! [`UpsertOutcome::Duplicate`] and stores nothing.

pub mod jsonl;
#[cfg(feature = "database")]
pub mod postgres;

pub use jsonl::JsonLinesSink;
#[cfg(feature = "database")]
pub use postgres::PgSink;

use crate::error::SinkError;
use async_trait::async_trait;
use fidx_common::types::{FilingRecord, NaturalKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Committed,
    Duplicate,
}

/// Destination for selected filing records
#[async_trait]
pub trait FilingSink: Send + Sync {
    /// Store one record atomically; safe to repeat
    async fn upsert(&self, record: &FilingRecord) -> Result<UpsertOutcome, SinkError>;

    /// Make every acknowledged upsert durable
    ///
    /// Called at each batch boundary before the cursor advances.
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// Keeps records in memory; for dry runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    keys: HashSet<NaturalKey>,
    records: Vec<FilingRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored records in commit order
    pub fn records(&self) -> Vec<FilingRecord> {
        self.inner
            .lock()
            .map(|state| state.records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|state| state.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FilingSink for MemorySink {
    async fn upsert(&self, record: &FilingRecord) -> Result<UpsertOutcome, SinkError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| SinkError("memory sink lock poisoned".to_string()))?;

        if !state.keys.insert(record.natural_key()) {
            return Ok(UpsertOutcome::Duplicate);
        }
        state.records.push(record.clone());
        Ok(UpsertOutcome::Committed)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
