//! Ingestion coordinator
//!
//! Drives every resolved locator through
//!
//! ```text
//! Pending -> Fetching -> Decoding -> Parsing -> (Committing -> Parsing)* -> Committing -> Complete
//!                \___________\___________\____________\______________________________-> Failed
//! ```
//!
//! Locators are independent, so several pipelines run at once (`concurrency`)
//! while upstream fetches are gated separately (`fetch_concurrency`, one by
//! default). Inside a pipeline, decoding and parsing run on a blocking thread
//! and hand selected records to the async commit loop in batches over a
//! bounded channel, so commits happen in parse order.
//!
//! A batch is acknowledged by the sink before the locator's cursor advances
//! past it. A crash in between re-submits that batch on the next run, which
//! the sink's natural-key dedup absorbs. Cursors carry the fingerprint of the
//! criteria they were written under; a run with other criteria starts the
//! locator over.

use crate::cursor::{CursorStore, IngestionCursor};
use crate::decoder::{self, IndexLines};
use crate::error::{DecodeError, Result, SinkError};
use crate::filter::{CriteriaRequest, SelectionCriteria};
use crate::locator::{Encoding, LocatorResolver, QuarterRange, ResourceLocator, SortOrder};
use crate::parser::{ParseOutcome, RecordParser};
use crate::report::{IngestionReport, LocatorStats};
use crate::sink::{FilingSink, UpsertOutcome};
use crate::ticker::TickerCache;
use crate::transport::IndexTransport;
use fidx_common::types::FilingRecord;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// Locator State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorState {
    Pending,
    Fetching,
    Decoding,
    Parsing,
    Committing,
    Complete,
    Failed,
}

impl LocatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorState::Pending => "pending",
            LocatorState::Fetching => "fetching",
            LocatorState::Decoding => "decoding",
            LocatorState::Parsing => "parsing",
            LocatorState::Committing => "committing",
            LocatorState::Complete => "complete",
            LocatorState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LocatorState::Complete | LocatorState::Failed)
    }

    /// Allowed transitions; `Failed` is reachable from any live state
    pub fn can_transition_to(&self, next: LocatorState) -> bool {
        use LocatorState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Fetching)
            | (Fetching, Decoding)
            | (Decoding, Parsing)
            | (Parsing, Committing)
            | (Committing, Parsing)
            | (Committing, Complete) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LocatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of one locator's pipeline
struct StateTracker {
    locator: ResourceLocator,
    state: LocatorState,
}

impl StateTracker {
    fn new(locator: ResourceLocator) -> Self {
        Self {
            locator,
            state: LocatorState::Pending,
        }
    }

    fn enter(&mut self, next: LocatorState) {
        if !self.state.can_transition_to(next) {
            error!(
                locator = %self.locator,
                from = %self.state,
                to = %next,
                "Illegal locator state transition"
            );
        }
        debug!(locator = %self.locator, from = %self.state, to = %next, "Locator state");
        self.state = next;
    }

    fn state(&self) -> LocatorState {
        self.state
    }
}

// ============================================================================
// Settings and Planning
// ============================================================================

/// Coordinator tuning; batch size and pool sizes never change results
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Records per sink flush and cursor advance
    pub batch_size: usize,
    /// Locator pipelines in flight
    pub concurrency: usize,
    /// Upstream fetches in flight
    pub fetch_concurrency: usize,
    /// Attempts per batch before the locator fails
    pub sink_max_attempts: u32,
    /// Multiplied by the attempt number between sink retries
    pub sink_retry_delay: Duration,
    /// Fixed index variant; `None` picks one from the criteria
    pub sort_order: Option<SortOrder>,
    pub encoding: Encoding,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            concurrency: 4,
            fetch_concurrency: 1,
            sink_max_attempts: 3,
            sink_retry_delay: Duration::from_millis(500),
            sort_order: None,
            encoding: Encoding::Gzip,
        }
    }
}

/// Resolved work for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionPlan {
    pub sort_order: SortOrder,
    pub locators: Vec<ResourceLocator>,
}

/// Choose the index variant and enumerate its locators
pub fn plan(
    criteria: &SelectionCriteria,
    range: &QuarterRange,
    sort_order: Option<SortOrder>,
    encoding: Encoding,
) -> IngestionPlan {
    let sort_order = sort_order
        .unwrap_or_else(|| SortOrder::preferred(criteria.form_count(), criteria.company_count()));
    IngestionPlan {
        sort_order,
        locators: LocatorResolver::new(sort_order, encoding).resolve(range),
    }
}

// ============================================================================
// Pipeline Results
// ============================================================================

#[derive(Debug)]
enum LocatorOutcome {
    /// Cancelled before the locator was dequeued
    NotStarted,
    AlreadyComplete,
    Completed,
    /// Stopped after an acknowledged batch; cursor left in progress
    Cancelled,
    Failed { stage: LocatorState, error: String },
}

#[derive(Debug)]
struct LocatorRun {
    locator: ResourceLocator,
    outcome: LocatorOutcome,
    stats: LocatorStats,
}

impl LocatorRun {
    fn new(locator: ResourceLocator, outcome: LocatorOutcome) -> Self {
        Self {
            locator,
            outcome,
            stats: LocatorStats::default(),
        }
    }
}

/// Messages from the parse thread to the commit loop
enum ParseEvent {
    Batch {
        records: Vec<FilingRecord>,
        /// Every line up to here has been parsed and filtered
        through_line: u64,
        last: bool,
    },
    Failed(DecodeError),
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchCounts {
    committed: u64,
    duplicate: u64,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Runs ingestion against injected transport, sink and cursor store
pub struct IngestionCoordinator {
    transport: Arc<dyn IndexTransport>,
    sink: Arc<dyn FilingSink>,
    cursors: Arc<dyn CursorStore>,
    settings: CoordinatorSettings,
    fetch_permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl IngestionCoordinator {
    pub fn new(
        transport: Arc<dyn IndexTransport>,
        sink: Arc<dyn FilingSink>,
        cursors: Arc<dyn CursorStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        let fetch_permits = Arc::new(Semaphore::new(settings.fetch_concurrency.max(1)));
        Self {
            transport,
            sink,
            cursors,
            settings,
            fetch_permits,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one tripped by Ctrl-C
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Resolve tickers, then ingest
    ///
    /// Ticker failures abort before any locator is attempted.
    pub async fn ingest_request(
        &self,
        request: CriteriaRequest,
        tickers: &TickerCache,
        range: &QuarterRange,
    ) -> Result<IngestionReport> {
        let criteria = request.resolve(tickers).await?;
        self.ingest(&criteria, range).await
    }

    /// Ingest every quarter in `range`, keeping records that match `criteria`
    ///
    /// Per-locator failures are recorded in the report; only setup problems
    /// return `Err`.
    pub async fn ingest(
        &self,
        criteria: &SelectionCriteria,
        range: &QuarterRange,
    ) -> Result<IngestionReport> {
        let mut report = IngestionReport::new();

        if criteria.is_unbounded() {
            let message = "No form, company or date criteria given; every filing in range will be ingested";
            warn!("{}", message);
            report.warn(message);
        }

        let plan = plan(criteria, range, self.settings.sort_order, self.settings.encoding);
        let parser = Arc::new(RecordParser::new(plan.sort_order)?);
        let fingerprint = criteria.fingerprint();
        let fingerprint = fingerprint.as_str();
        let criteria = Arc::new(criteria.clone());

        info!(
            run_id = %report.run_id,
            sort_order = plan.sort_order.file_stem(),
            encoding = self.settings.encoding.as_str(),
            locators = plan.locators.len(),
            from = %range.start(),
            to = %range.end(),
            concurrency = self.settings.concurrency,
            "Starting ingestion run"
        );

        let runs: Vec<LocatorRun> = stream::iter(plan.locators)
            .map(|locator| {
                let parser = parser.clone();
                let criteria = criteria.clone();
                async move { self.run_locator(locator, parser, criteria, fingerprint).await }
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for run in runs {
            let LocatorRun {
                locator,
                outcome,
                stats,
            } = run;
            match outcome {
                LocatorOutcome::NotStarted => report.cancelled = true,
                LocatorOutcome::AlreadyComplete => report.locators_skipped += 1,
                LocatorOutcome::Completed => {
                    report.locators_attempted += 1;
                    report.locators_completed += 1;
                },
                LocatorOutcome::Cancelled => {
                    report.locators_attempted += 1;
                    report.cancelled = true;
                },
                LocatorOutcome::Failed { stage, error } => {
                    report.locators_attempted += 1;
                    report.record_failure(&locator, stage, error);
                },
            }
            report.absorb(stats);
        }
        report.cancelled |= self.cancel.is_cancelled();
        report.finish();

        info!(
            run_id = %report.run_id,
            attempted = report.locators_attempted,
            completed = report.locators_completed,
            failed = report.locators_failed,
            skipped = report.locators_skipped,
            committed = report.records_committed,
            duplicate = report.records_duplicate,
            malformed = report.records_malformed,
            cancelled = report.cancelled,
            "Ingestion run finished"
        );

        Ok(report)
    }

    async fn run_locator(
        &self,
        locator: ResourceLocator,
        parser: Arc<RecordParser>,
        criteria: Arc<SelectionCriteria>,
        fingerprint: &str,
    ) -> LocatorRun {
        if self.cancel.is_cancelled() {
            return LocatorRun::new(locator, LocatorOutcome::NotStarted);
        }

        let mut tracker = StateTracker::new(locator);
        let mut cursor = match self.cursors.load(&locator).await {
            Ok(Some(cursor)) => cursor,
            Ok(None) => IngestionCursor::new(locator),
            Err(e) => {
                return LocatorRun::new(
                    locator,
                    LocatorOutcome::Failed {
                        stage: LocatorState::Pending,
                        error: format!("cannot load cursor: {}", e),
                    },
                );
            },
        };

        cursor.adopt_criteria(fingerprint);
        if cursor.is_complete() {
            debug!(locator = %locator, "Locator already complete, skipping");
            return LocatorRun::new(locator, LocatorOutcome::AlreadyComplete);
        }

        // Dequeued in resolver order; the semaphore is FIFO
        let fetched = {
            let _permit = tokio::select! {
                permit = self.fetch_permits.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return LocatorRun::new(locator, LocatorOutcome::NotStarted),
                },
                _ = self.cancel.cancelled() => {
                    return LocatorRun::new(locator, LocatorOutcome::NotStarted);
                },
            };

            tracker.enter(LocatorState::Fetching);
            cursor.begin_attempt();
            info!(locator = %locator, transport = self.transport.name(), attempt = cursor.attempts, "Fetching index resource");
            self.transport.fetch(&locator).await
        };

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(locator = %locator, error = %e, "Fetch failed");
                return self.fail(tracker, cursor, e.to_string(), LocatorStats::default()).await;
            },
        };

        tracker.enter(LocatorState::Decoding);
        let watermark = cursor.resume_from(&bytes);
        let lines = match decoder::decode(bytes, locator.encoding) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(locator = %locator, error = %e, "Decode failed");
                return self.fail(tracker, cursor, e.to_string(), LocatorStats::default()).await;
            },
        };
        if watermark > 0 {
            info!(locator = %locator, watermark, "Resuming after committed lines");
        }

        tracker.enter(LocatorState::Parsing);
        self.parse_and_commit(tracker, cursor, lines, watermark, parser, criteria)
            .await
    }

    async fn parse_and_commit(
        &self,
        mut tracker: StateTracker,
        mut cursor: IngestionCursor,
        lines: IndexLines,
        watermark: u64,
        parser: Arc<RecordParser>,
        criteria: Arc<SelectionCriteria>,
    ) -> LocatorRun {
        let locator = tracker.locator;
        let (tx, mut rx) = mpsc::channel::<ParseEvent>(2);
        let batch_size = self.settings.batch_size.max(1);

        let producer = tokio::task::spawn_blocking(move || {
            produce_batches(locator, lines, watermark, &parser, &criteria, batch_size, tx)
        });

        let mut counts = BatchCounts::default();
        let mut failure: Option<String> = None;
        let mut finished = false;
        let mut cancelled = false;

        while let Some(event) = rx.recv().await {
            match event {
                ParseEvent::Batch {
                    records,
                    through_line,
                    last,
                } => {
                    tracker.enter(LocatorState::Committing);
                    let batch = match self.commit_batch(&locator, &records).await {
                        Ok(batch) => batch,
                        Err(e) => {
                            failure = Some(e.to_string());
                            break;
                        },
                    };
                    counts.committed += batch.committed;
                    counts.duplicate += batch.duplicate;
                    cursor.advance(through_line, batch.committed);
                    if last {
                        cursor.complete();
                    }
                    if let Err(e) = self.cursors.save(&cursor).await {
                        failure = Some(format!("cannot save cursor: {}", e));
                        break;
                    }
                    debug!(
                        locator = %locator,
                        through_line,
                        committed = batch.committed,
                        duplicate = batch.duplicate,
                        "Batch committed"
                    );

                    if last {
                        finished = true;
                        tracker.enter(LocatorState::Complete);
                        break;
                    }
                    if self.cancel.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                    tracker.enter(LocatorState::Parsing);
                },
                ParseEvent::Failed(e) => {
                    warn!(locator = %locator, error = %e, "Index stream failed");
                    failure = Some(e.to_string());
                    break;
                },
            }
        }
        // Unblocks the producer if we stopped early
        drop(rx);

        let mut stats = match producer.await {
            Ok(stats) => stats,
            Err(e) => {
                failure.get_or_insert_with(|| format!("parser task failed: {}", e));
                LocatorStats::default()
            },
        };
        stats.records_committed = counts.committed;
        stats.records_duplicate = counts.duplicate;

        if let Some(error) = failure {
            return self.fail(tracker, cursor, error, stats).await;
        }
        if cancelled {
            info!(locator = %locator, through_line = cursor.lines_committed, "Stopping after committed batch");
            return LocatorRun {
                locator,
                outcome: LocatorOutcome::Cancelled,
                stats,
            };
        }
        if !finished {
            return self
                .fail(tracker, cursor, "parser stopped before the end of the index".to_string(), stats)
                .await;
        }

        info!(
            locator = %locator,
            lines = stats.lines_read,
            parsed = stats.records_parsed,
            selected = stats.records_selected,
            committed = stats.records_committed,
            duplicate = stats.records_duplicate,
            malformed = stats.records_malformed,
            "Locator complete"
        );
        LocatorRun {
            locator,
            outcome: LocatorOutcome::Completed,
            stats,
        }
    }

    /// Submit one batch, retrying from the first unacknowledged record
    async fn commit_batch(
        &self,
        locator: &ResourceLocator,
        records: &[FilingRecord],
    ) -> std::result::Result<BatchCounts, SinkError> {
        let attempts = self.settings.sink_max_attempts.max(1);
        let mut counts = BatchCounts::default();
        let mut acknowledged = 0;
        let mut attempt = 1;

        loop {
            match self.submit(records, &mut acknowledged, &mut counts).await {
                Ok(()) => return Ok(counts),
                Err(e) if attempt >= attempts => {
                    warn!(locator = %locator, attempts, error = %e, "Sink rejected batch");
                    return Err(e);
                },
                Err(e) => {
                    let delay = self.settings.sink_retry_delay * attempt;
                    warn!(
                        locator = %locator,
                        attempt,
                        attempts,
                        acknowledged,
                        error = %e,
                        "Sink failure, retrying batch in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
            }
        }
    }

    async fn submit(
        &self,
        records: &[FilingRecord],
        acknowledged: &mut usize,
        counts: &mut BatchCounts,
    ) -> std::result::Result<(), SinkError> {
        for record in &records[*acknowledged..] {
            match self.sink.upsert(record).await? {
                UpsertOutcome::Committed => counts.committed += 1,
                UpsertOutcome::Duplicate => counts.duplicate += 1,
            }
            *acknowledged += 1;
        }
        self.sink.flush().await
    }

    async fn fail(
        &self,
        mut tracker: StateTracker,
        mut cursor: IngestionCursor,
        error: String,
        stats: LocatorStats,
    ) -> LocatorRun {
        let stage = tracker.state();
        tracker.enter(LocatorState::Failed);
        cursor.fail(error.clone());
        if let Err(e) = self.cursors.save(&cursor).await {
            error!(locator = %cursor.locator, error = %e, "Cannot record failed cursor");
        }
        LocatorRun {
            locator: cursor.locator,
            outcome: LocatorOutcome::Failed { stage, error },
            stats,
        }
    }
}

/// Blocking half of a pipeline: decode, parse, filter and batch
///
/// Lines at or below `watermark` were committed by an earlier attempt over
/// the same bytes and are only counted.
fn produce_batches(
    locator: ResourceLocator,
    lines: IndexLines,
    watermark: u64,
    parser: &RecordParser,
    criteria: &SelectionCriteria,
    batch_size: usize,
    tx: mpsc::Sender<ParseEvent>,
) -> LocatorStats {
    let mut stats = LocatorStats::default();
    let mut batch = Vec::with_capacity(batch_size);
    let mut through_line = 0;

    for line in lines {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                // Receiver gone means the pipeline already stopped
                let _ = tx.blocking_send(ParseEvent::Failed(e));
                return stats;
            },
        };
        stats.lines_read += 1;
        through_line = line.number;

        if line.number <= watermark {
            stats.lines_skipped += 1;
            continue;
        }

        match parser.parse(&line.text) {
            ParseOutcome::Matched(record) => {
                stats.records_parsed += 1;
                if criteria.matches(&record) {
                    stats.records_selected += 1;
                    batch.push(record);
                }
            },
            ParseOutcome::Skipped => {},
            ParseOutcome::Malformed(reason) => {
                debug!(locator = %locator, line = line.number, reason = %reason, "Malformed index line");
                stats.record_malformed(&locator, line.number, reason);
            },
        }

        if batch.len() >= batch_size {
            let event = ParseEvent::Batch {
                records: std::mem::replace(&mut batch, Vec::with_capacity(batch_size)),
                through_line,
                last: false,
            };
            if tx.blocking_send(event).is_err() {
                return stats;
            }
        }
    }

    let _ = tx.blocking_send(ParseEvent::Batch {
        records: batch,
        through_line,
        last: true,
    });
    stats
}
