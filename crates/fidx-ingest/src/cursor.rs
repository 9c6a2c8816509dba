//! Per-locator ingestion cursors
//!
//! A cursor records how far one resource has been committed. It is created on
//! the first attempt, advanced after every acknowledged batch and never
//! deleted. A complete cursor means the resource is never fetched again for
//! the same selection criteria; progress made under other criteria is
//! discarded and the sink's natural-key dedup absorbs the re-read.

use crate::error::CursorError;
use crate::locator::ResourceLocator;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fidx_common::checksum::{sha256_hex, verify_sha256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl CursorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorStatus::Pending => "pending",
            CursorStatus::InProgress => "in_progress",
            CursorStatus::Complete => "complete",
            CursorStatus::Failed => "failed",
        }
    }
}

/// Progress marker for one [`ResourceLocator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCursor {
    pub locator: ResourceLocator,
    pub status: CursorStatus,
    /// Highest decoded line whose records the sink has acknowledged
    pub lines_committed: u64,
    /// Rows newly stored across all attempts
    pub records_committed: u64,
    /// Fingerprint of the bytes the watermark refers to
    pub content_sha256: Option<String>,
    /// Fingerprint of the selection criteria the watermark was computed for
    #[serde(default)]
    pub criteria_sha256: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionCursor {
    pub fn new(locator: ResourceLocator) -> Self {
        Self {
            locator,
            status: CursorStatus::Pending,
            lines_committed: 0,
            records_committed: 0,
            content_sha256: None,
            criteria_sha256: None,
            attempts: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Store key; the locator's relative path
    pub fn key(&self) -> String {
        self.locator.relative_path()
    }

    pub fn is_complete(&self) -> bool {
        self.status == CursorStatus::Complete
    }

    /// Mark a new attempt as started
    pub fn begin_attempt(&mut self) {
        self.status = CursorStatus::InProgress;
        self.attempts += 1;
        self.last_error = None;
        self.touch();
    }

    /// Bind the cursor to the criteria of the current run
    ///
    /// A watermark or completion recorded under different criteria says
    /// nothing about which lines this selection still needs, so both are
    /// dropped. Returns true when earlier progress was discarded.
    pub fn adopt_criteria(&mut self, fingerprint: &str) -> bool {
        if self.criteria_sha256.as_deref() == Some(fingerprint) {
            return false;
        }

        let had_progress = self.lines_committed > 0 || self.is_complete();
        if had_progress {
            warn!(
                locator = %self.locator,
                watermark = self.lines_committed,
                status = self.status.as_str(),
                "Selection criteria changed since last attempt, re-reading from line 1"
            );
            self.lines_committed = 0;
            if self.is_complete() {
                self.status = CursorStatus::Pending;
            }
        }
        self.criteria_sha256 = Some(fingerprint.to_string());
        self.touch();
        had_progress
    }

    /// Resume point within freshly fetched bytes
    ///
    /// Returns the number of leading lines already committed from these exact
    /// bytes. If the upstream content changed, the old watermark says nothing
    /// about the new line numbering and is dropped.
    pub fn resume_from(&mut self, content: &[u8]) -> u64 {
        let unchanged = match self.content_sha256.as_deref() {
            Some(stored) => verify_sha256(content, stored).is_ok(),
            None => false,
        };

        if !unchanged {
            if self.lines_committed > 0 {
                warn!(
                    locator = %self.locator,
                    watermark = self.lines_committed,
                    "Index resource changed since last attempt, restarting from line 1"
                );
            }
            self.lines_committed = 0;
            self.content_sha256 = Some(sha256_hex(content));
            self.touch();
        }
        self.lines_committed
    }

    /// Move the watermark after an acknowledged batch; never moves backwards
    pub fn advance(&mut self, line: u64, committed: u64) {
        self.lines_committed = self.lines_committed.max(line);
        self.records_committed += committed;
        self.touch();
    }

    pub fn complete(&mut self) {
        self.status = CursorStatus::Complete;
        self.last_error = None;
        self.touch();
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = CursorStatus::Failed;
        self.last_error = Some(reason.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Durable cursor storage
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self, locator: &ResourceLocator) -> Result<Option<IngestionCursor>, CursorError>;

    async fn save(&self, cursor: &IngestionCursor) -> Result<(), CursorError>;

    /// Every stored cursor, ordered by key
    async fn list(&self) -> Result<Vec<IngestionCursor>, CursorError>;
}

#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<BTreeMap<String, IngestionCursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, locator: &ResourceLocator) -> Result<Option<IngestionCursor>, CursorError> {
        Ok(self.cursors.lock().await.get(&locator.relative_path()).cloned())
    }

    async fn save(&self, cursor: &IngestionCursor) -> Result<(), CursorError> {
        self.cursors.lock().await.insert(cursor.key(), cursor.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<IngestionCursor>, CursorError> {
        Ok(self.cursors.lock().await.values().cloned().collect())
    }
}

/// All cursors in one JSON document, rewritten atomically on every save
///
/// Writes go to `<file>.tmp` first and are renamed over the document, so a
/// crash leaves either the old or the new state on disk.
#[derive(Debug)]
pub struct JsonCursorStore {
    path: PathBuf,
    cursors: Mutex<BTreeMap<String, IngestionCursor>>,
}

impl JsonCursorStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CursorError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cursors = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            cursors: Mutex::new(cursors),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, cursors: &BTreeMap<String, IngestionCursor>) -> Result<(), CursorError> {
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(cursors)?;
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), cursors = cursors.len(), "Persisted cursors");
        Ok(())
    }
}

#[async_trait]
impl CursorStore for JsonCursorStore {
    async fn load(&self, locator: &ResourceLocator) -> Result<Option<IngestionCursor>, CursorError> {
        Ok(self.cursors.lock().await.get(&locator.relative_path()).cloned())
    }

    async fn save(&self, cursor: &IngestionCursor) -> Result<(), CursorError> {
        let mut cursors = self.cursors.lock().await;
        cursors.insert(cursor.key(), cursor.clone());
        self.persist(&cursors).await
    }

    async fn list(&self) -> Result<Vec<IngestionCursor>, CursorError> {
        Ok(self.cursors.lock().await.values().cloned().collect())
    }
}
