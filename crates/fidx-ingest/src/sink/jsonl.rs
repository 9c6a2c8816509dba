//! Append-only JSON-lines sink
//!
//! One [`FilingRecord`] per line. Existing lines are read at open so that a
//! rerun against the same file reports duplicates instead of appending them
//! again.

use super::{FilingSink, UpsertOutcome};
use crate::error::SinkError;
use async_trait::async_trait;
use fidx_common::types::{FilingRecord, NaturalKey};
use serde_jsonlines::{json_lines, JsonLinesWriter};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub struct JsonLinesSink {
    path: PathBuf,
    inner: Mutex<JsonLinesState>,
}

struct JsonLinesState {
    keys: HashSet<NaturalKey>,
    writer: JsonLinesWriter<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open (or create) `path` and index the records already in it
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut keys = HashSet::new();
        if path.exists() {
            for record in json_lines::<FilingRecord, _>(&path)? {
                let record = record
                    .map_err(|e| SinkError(format!("{}: unreadable record: {}", path.display(), e)))?;
                keys.insert(record.natural_key());
            }
        }
        info!(path = %path.display(), existing = keys.len(), "Opened JSON-lines sink");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(JsonLinesState {
                keys,
                writer: JsonLinesWriter::new(BufWriter::new(file)),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, JsonLinesState>, SinkError> {
        self.inner
            .lock()
            .map_err(|_| SinkError("JSON-lines sink lock poisoned".to_string()))
    }
}

#[async_trait]
impl FilingSink for JsonLinesSink {
    async fn upsert(&self, record: &FilingRecord) -> Result<UpsertOutcome, SinkError> {
        let mut state = self.lock()?;
        let key = record.natural_key();
        if state.keys.contains(&key) {
            return Ok(UpsertOutcome::Duplicate);
        }

        state.writer.write(record)?;
        state.keys.insert(key);
        Ok(UpsertOutcome::Committed)
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let mut state = self.lock()?;
        state.writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}
