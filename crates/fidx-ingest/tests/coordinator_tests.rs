//! End-to-end tests for the ingestion coordinator
//!
//! The fixture quarter (1995 Q1, form-sorted) holds 63 filings: nine each of
//! seven form types spread over seven companies, filed January to March.

use async_trait::async_trait;
use chrono::NaiveDate;
use fidx_common::types::{CompanyId, FilingRecord};
use fidx_ingest::coordinator::{CoordinatorSettings, IngestionCoordinator, LocatorState};
use fidx_ingest::cursor::{CursorStatus, CursorStore, MemoryCursorStore};
use fidx_ingest::error::{IngestError, SinkError, TransportError};
use fidx_ingest::filter::{CriteriaRequest, DateRange, SelectionCriteria};
use fidx_ingest::locator::{Encoding, Period, QuarterRange, ResourceLocator, SortOrder};
use fidx_ingest::sink::{FilingSink, MemorySink, UpsertOutcome};
use fidx_ingest::ticker::{TickerCache, TickerResolver};
use fidx_ingest::transport::{IndexTransport, LocalTransport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const FORM_IDX: &[u8] = include_bytes!("fixtures/form.idx");
const FORM_GZ: &[u8] = include_bytes!("fixtures/form.gz");

// ============================================================================
// Test Doubles
// ============================================================================

/// Serves fixed bytes keyed by relative path
struct FixtureTransport {
    files: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl FixtureTransport {
    fn new(files: impl IntoIterator<Item = (&'static str, Vec<u8>)>) -> Self {
        Self {
            files: files.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    fn quarter(content: &[u8]) -> Self {
        Self::new([("1995/QTR1/form.idx", content.to_vec())])
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexTransport for FixtureTransport {
    async fn fetch(&self, locator: &ResourceLocator) -> Result<Vec<u8>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let path = locator.relative_path();
        self.files
            .get(&path)
            .cloned()
            .ok_or(TransportError::NotFound(path))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

/// Wraps a memory sink and rejects chosen upsert calls (1-based)
struct FlakySink {
    inner: Arc<MemorySink>,
    calls: AtomicUsize,
    fail_from: usize,
    fail_until: usize,
}

impl FlakySink {
    /// Every call from `n` on fails
    fn failing_from(inner: Arc<MemorySink>, n: usize) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_from: n,
            fail_until: usize::MAX,
        }
    }

    /// Only call `n` fails
    fn failing_once(inner: Arc<MemorySink>, n: usize) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_from: n,
            fail_until: n,
        }
    }
}

#[async_trait]
impl FilingSink for FlakySink {
    async fn upsert(&self, record: &FilingRecord) -> Result<UpsertOutcome, SinkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if (self.fail_from..=self.fail_until).contains(&call) {
            return Err(SinkError(format!("connection reset on call {}", call)));
        }
        self.inner.upsert(record).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Wraps a memory sink and trips a cancellation token on one upsert call
struct CancellingSink {
    inner: Arc<MemorySink>,
    calls: AtomicUsize,
    cancel_on: usize,
    token: CancellationToken,
}

#[async_trait]
impl FilingSink for CancellingSink {
    async fn upsert(&self, record: &FilingRecord) -> Result<UpsertOutcome, SinkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_on {
            self.token.cancel();
        }
        self.inner.upsert(record).await
    }

    fn name(&self) -> &'static str {
        "cancelling"
    }
}

struct StaticTickers(HashMap<&'static str, u64>);

#[async_trait]
impl TickerResolver for StaticTickers {
    async fn resolve(&self, ticker: &str) -> Result<Option<CompanyId>, TransportError> {
        Ok(self.0.get(ticker).map(|cik| CompanyId::new(*cik)))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn q1_1995() -> QuarterRange {
    QuarterRange::parse("1995-01", "1995-03").unwrap()
}

fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        batch_size: 4,
        sink_retry_delay: Duration::from_millis(1),
        sort_order: Some(SortOrder::Form),
        encoding: Encoding::None,
        ..CoordinatorSettings::default()
    }
}

fn coordinator(
    transport: Arc<dyn IndexTransport>,
    sink: Arc<dyn FilingSink>,
    cursors: Arc<dyn CursorStore>,
    settings: CoordinatorSettings,
) -> IngestionCoordinator {
    IngestionCoordinator::new(transport, sink, cursors, settings)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn q1_locator() -> ResourceLocator {
    ResourceLocator::new(Period::new(1995, 1).unwrap(), SortOrder::Form, Encoding::None)
}

// ============================================================================
// Selection
// ============================================================================

#[tokio::test]
async fn test_annual_reports_for_one_quarter() {
    let sink = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        Arc::new(FixtureTransport::quarter(FORM_IDX)),
        sink.clone(),
        Arc::new(MemoryCursorStore::new()),
        settings(),
    );

    let criteria = SelectionCriteria::all().with_forms(["10-K"]);
    let report = coordinator.ingest(&criteria, &q1_1995()).await.unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.locators_attempted, 1);
    assert_eq!(report.locators_completed, 1);
    assert_eq!(report.records_parsed, 63);
    assert_eq!(report.records_selected, 9);
    assert_eq!(report.records_committed, 9);
    assert_eq!(report.records_malformed, 0);
    assert!(report.warnings.is_empty());
    assert!(sink.records().iter().all(|r| r.form_type == "10-K"));
}

#[tokio::test]
async fn test_form_and_filing_date_intersect() {
    let sink = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        Arc::new(FixtureTransport::quarter(FORM_IDX)),
        sink.clone(),
        Arc::new(MemoryCursorStore::new()),
        settings(),
    );

    let criteria = SelectionCriteria::all()
        .with_forms(["10-K"])
        .with_filed(DateRange::parse("1995-01-01", "1995-01-31").unwrap());
    let report = coordinator.ingest(&criteria, &q1_1995()).await.unwrap();

    assert_eq!(report.records_committed, 3);
    assert!(sink.records().iter().all(|r| r.filed_date.format("%Y-%m").to_string() == "1995-01"));
}

#[tokio::test]
async fn test_form_and_company_intersect() {
    let sink = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        Arc::new(FixtureTransport::quarter(FORM_IDX)),
        sink.clone(),
        Arc::new(MemoryCursorStore::new()),
        settings(),
    );

    let criteria = SelectionCriteria::all()
        .with_forms(["10-K"])
        .with_companies([CompanyId::new(320193)]);
    let report = coordinator.ingest(&criteria, &q1_1995()).await.unwrap();

    assert_eq!(report.records_committed, 2);
    let mut dates: Vec<_> = sink.records().iter().map(|r| r.filed_date).collect();
    dates.sort();
    assert_eq!(dates, vec![date(1995, 2, 8), date(1995, 3, 1)]);
}

#[tokio::test]
async fn test_unbounded_criteria_warn_and_take_everything() {
    let sink = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        Arc::new(FixtureTransport::quarter(FORM_IDX)),
        sink.clone(),
        Arc::new(MemoryCursorStore::new()),
        settings(),
    );

    let report = coordinator
        .ingest(&SelectionCriteria::all(), &q1_1995())
        .await
        .unwrap();

    assert_eq!(report.records_committed, 63);
    assert_eq!(sink.len(), 63);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.summary().contains("WARNING"));
}

#[tokio::test]
async fn test_gzip_resource_from_local_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let quarter_dir = dir.path().join("1995").join("QTR1");
    std::fs::create_dir_all(&quarter_dir).unwrap();
    std::fs::write(quarter_dir.join("form.gz"), FORM_GZ).unwrap();

    let sink = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        Arc::new(LocalTransport::new(dir.path())),
        sink.clone(),
        Arc::new(MemoryCursorStore::new()),
        CoordinatorSettings {
            encoding: Encoding::Gzip,
            ..settings()
        },
    );

    let criteria = SelectionCriteria::all().with_forms(["10-Q", "8-K"]);
    let report = coordinator.ingest(&criteria, &q1_1995()).await.unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.records_committed, 18);
}

// ============================================================================
// Idempotence and Resume
// ============================================================================

#[tokio::test]
async fn test_rerun_skips_completed_locator() {
    let transport = Arc::new(FixtureTransport::quarter(FORM_IDX));
    let sink = Arc::new(MemorySink::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let coordinator = coordinator(transport.clone(), sink.clone(), cursors.clone(), settings());
    let criteria = SelectionCriteria::all().with_forms(["10-K"]);

    let first = coordinator.ingest(&criteria, &q1_1995()).await.unwrap();
    let second = coordinator.ingest(&criteria, &q1_1995()).await.unwrap();

    assert_eq!(first.records_committed, 9);
    assert_eq!(second.records_committed, 0);
    assert_eq!(second.locators_skipped, 1);
    assert_eq!(second.locators_attempted, 0);
    assert!(second.is_success());
    assert_eq!(transport.fetches(), 1);
    assert_eq!(sink.len(), 9);

    let cursor = cursors.load(&q1_locator()).await.unwrap().unwrap();
    assert_eq!(cursor.status, CursorStatus::Complete);
    assert_eq!(cursor.lines_committed, 72);
    assert_eq!(cursor.records_committed, 9);
}

#[tokio::test]
async fn test_lost_cursors_fall_back_to_sink_dedup() {
    let sink = Arc::new(MemorySink::new());
    let criteria = SelectionCriteria::all().with_forms(["10-K"]);

    for expected_committed in [9, 0] {
        let coordinator = coordinator(
            Arc::new(FixtureTransport::quarter(FORM_IDX)),
            sink.clone(),
            Arc::new(MemoryCursorStore::new()),
            settings(),
        );
        let report = coordinator.ingest(&criteria, &q1_1995()).await.unwrap();
        assert_eq!(report.records_committed, expected_committed);
        assert_eq!(report.records_committed + report.records_duplicate, 9);
    }
    assert_eq!(sink.len(), 9);
}

#[tokio::test]
async fn test_resume_after_sink_outage() {
    let transport = Arc::new(FixtureTransport::quarter(FORM_IDX));
    let store = Arc::new(MemorySink::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let criteria = SelectionCriteria::all().with_forms(["10-K"]);
    let settings = CoordinatorSettings {
        batch_size: 2,
        sink_max_attempts: 1,
        ..settings()
    };

    // Batches of two: the third batch dies on its first record
    let outage = coordinator(
        transport.clone(),
        Arc::new(FlakySink::failing_from(store.clone(), 5)),
        cursors.clone(),
        settings.clone(),
    );
    let first = outage.ingest(&criteria, &q1_1995()).await.unwrap();

    assert!(!first.is_success());
    assert_eq!(first.records_committed, 4);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].stage, LocatorState::Committing);
    assert_eq!(first.failures[0].locator, "1995/QTR1/form.idx");

    let cursor = cursors.load(&q1_locator()).await.unwrap().unwrap();
    assert_eq!(cursor.status, CursorStatus::Failed);
    assert_eq!(cursor.lines_committed, 13);
    assert!(cursor.last_error.as_deref().unwrap().contains("connection reset"));

    let healthy = coordinator(transport, store.clone(), cursors.clone(), settings);
    let second = healthy.ingest(&criteria, &q1_1995()).await.unwrap();

    assert!(second.is_success(), "{}", second.summary());
    assert_eq!(second.records_committed, 5);
    assert_eq!(second.records_duplicate, 0);
    assert_eq!(store.len(), 9);

    let cursor = cursors.load(&q1_locator()).await.unwrap().unwrap();
    assert!(cursor.is_complete());
    assert_eq!(cursor.records_committed, 9);
    assert_eq!(cursor.attempts, 2);
}

#[tokio::test]
async fn test_transient_sink_failure_is_retried_without_duplicates() {
    let store = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        Arc::new(FixtureTransport::quarter(FORM_IDX)),
        Arc::new(FlakySink::failing_once(store.clone(), 3)),
        Arc::new(MemoryCursorStore::new()),
        settings(),
    );

    let criteria = SelectionCriteria::all().with_forms(["10-K"]);
    let report = coordinator.ingest(&criteria, &q1_1995()).await.unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.records_committed, 9);
    assert_eq!(report.records_duplicate, 0);
    assert_eq!(store.len(), 9);
}

#[tokio::test]
async fn test_completed_locator_is_reread_for_other_forms() {
    let transport = Arc::new(FixtureTransport::quarter(FORM_IDX));
    let sink = Arc::new(MemorySink::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let coordinator = coordinator(transport.clone(), sink.clone(), cursors.clone(), settings());
    let annual = SelectionCriteria::all().with_forms(["10-K"]);
    let current = SelectionCriteria::all().with_forms(["8-K"]);

    let first = coordinator.ingest(&annual, &q1_1995()).await.unwrap();
    let second = coordinator.ingest(&current, &q1_1995()).await.unwrap();

    assert_eq!(first.records_committed, 9);
    assert!(second.is_success(), "{}", second.summary());
    assert_eq!(second.locators_skipped, 0);
    assert_eq!(second.locators_completed, 1);
    assert_eq!(second.records_committed, 9);
    assert_eq!(second.records_duplicate, 0);
    assert_eq!(transport.fetches(), 2);
    assert_eq!(sink.len(), 18);

    let cursor = cursors.load(&q1_locator()).await.unwrap().unwrap();
    assert!(cursor.is_complete());
    assert_eq!(cursor.criteria_sha256, Some(current.fingerprint()));
    assert_eq!(cursor.records_committed, 18);

    // Switching back re-reads once more; the sink already holds every row
    let third = coordinator.ingest(&annual, &q1_1995()).await.unwrap();
    assert_eq!(third.records_committed, 0);
    assert_eq!(third.records_duplicate, 9);
    assert_eq!(sink.len(), 18);

    let fourth = coordinator.ingest(&annual, &q1_1995()).await.unwrap();
    assert_eq!(fourth.locators_skipped, 1);
    assert_eq!(transport.fetches(), 3);
}

#[tokio::test]
async fn test_partial_watermark_ignored_under_other_forms() {
    let transport = Arc::new(FixtureTransport::quarter(FORM_IDX));
    let store = Arc::new(MemorySink::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let settings = CoordinatorSettings {
        batch_size: 2,
        sink_max_attempts: 1,
        ..settings()
    };

    // Quarterly reports sit on lines 19..=27; the outage leaves the watermark at 22
    let outage = coordinator(
        transport.clone(),
        Arc::new(FlakySink::failing_from(store.clone(), 5)),
        cursors.clone(),
        settings.clone(),
    );
    let quarterly = SelectionCriteria::all().with_forms(["10-Q"]);
    let first = outage.ingest(&quarterly, &q1_1995()).await.unwrap();

    assert!(!first.is_success());
    assert_eq!(first.records_committed, 4);
    let cursor = cursors.load(&q1_locator()).await.unwrap().unwrap();
    assert_eq!(cursor.lines_committed, 22);

    // Annual reports sit on lines 10..=18, below that watermark
    let healthy = coordinator(transport, store.clone(), cursors.clone(), settings);
    let annual = SelectionCriteria::all().with_forms(["10-K"]);
    let second = healthy.ingest(&annual, &q1_1995()).await.unwrap();

    assert!(second.is_success(), "{}", second.summary());
    assert_eq!(second.records_committed, 9);
    assert_eq!(second.records_selected, 9);
    assert_eq!(store.len(), 13);

    let cursor = cursors.load(&q1_locator()).await.unwrap().unwrap();
    assert!(cursor.is_complete());
    assert_eq!(cursor.lines_committed, 72);
    assert_eq!(cursor.criteria_sha256, Some(annual.fingerprint()));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_missing_quarter_fails_alone() {
    let transport = Arc::new(FixtureTransport::quarter(FORM_IDX));
    let cursors = Arc::new(MemoryCursorStore::new());
    let coordinator = coordinator(
        transport.clone(),
        Arc::new(MemorySink::new()),
        cursors.clone(),
        settings(),
    );

    let range = QuarterRange::parse("1995-01", "1995-06").unwrap();
    let criteria = SelectionCriteria::all().with_forms(["10-K"]);
    let report = coordinator.ingest(&criteria, &range).await.unwrap();

    assert_eq!(report.locators_attempted, 2);
    assert_eq!(report.locators_completed, 1);
    assert_eq!(report.locators_failed, 1);
    assert_eq!(report.records_committed, 9);
    assert_eq!(report.failures[0].locator, "1995/QTR2/form.idx");
    assert_eq!(report.failures[0].stage, LocatorState::Fetching);
    assert!(!report.is_success());
    assert_eq!(transport.fetches(), 2);

    let cursors = cursors.list().await.unwrap();
    assert_eq!(cursors.len(), 2);
    assert_eq!(cursors[1].status, CursorStatus::Failed);
}

#[tokio::test]
async fn test_malformed_lines_are_counted_not_fatal() {
    let mut content = FORM_IDX.to_vec();
    content.extend_from_slice(
        b"10-K        BROKEN CO                                                     12X456      1995-01-05  edgar/data/12456/0000012456-95-000001.txt\n",
    );
    let coordinator = coordinator(
        Arc::new(FixtureTransport::quarter(&content)),
        Arc::new(MemorySink::new()),
        Arc::new(MemoryCursorStore::new()),
        settings(),
    );

    let criteria = SelectionCriteria::all().with_forms(["10-K"]);
    let report = coordinator.ingest(&criteria, &q1_1995()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.records_committed, 9);
    assert_eq!(report.records_malformed, 1);
    assert_eq!(report.malformed_samples[0].locator, "1995/QTR1/form.idx");
    assert_eq!(report.malformed_samples[0].line, 73);
    assert!(report.malformed_samples[0].reason.contains("12X456"));
}

#[tokio::test]
async fn test_truncated_resource_fails_after_committing_prefix() {
    // Cut mid-way through the last record
    let content = &FORM_IDX[..FORM_IDX.len() - 20];
    let cursors = Arc::new(MemoryCursorStore::new());
    let coordinator = coordinator(
        Arc::new(FixtureTransport::quarter(content)),
        Arc::new(MemorySink::new()),
        cursors.clone(),
        settings(),
    );

    let report = coordinator
        .ingest(&SelectionCriteria::all(), &q1_1995())
        .await
        .unwrap();

    assert_eq!(report.locators_failed, 1);
    assert!(report.failures[0].error.contains("mid-record"), "{}", report.failures[0].error);
    let cursor = cursors.load(&q1_locator()).await.unwrap().unwrap();
    assert_eq!(cursor.status, CursorStatus::Failed);
    assert!(cursor.lines_committed < 72);
}

#[tokio::test]
async fn test_declared_encoding_mismatch() {
    let coordinator = coordinator(
        Arc::new(FixtureTransport::new([("1995/QTR1/form.Z", FORM_GZ.to_vec())])),
        Arc::new(MemorySink::new()),
        Arc::new(MemoryCursorStore::new()),
        CoordinatorSettings {
            encoding: Encoding::Compress,
            ..settings()
        },
    );

    let report = coordinator
        .ingest(&SelectionCriteria::all(), &q1_1995())
        .await
        .unwrap();

    assert_eq!(report.locators_failed, 1);
    assert_eq!(report.failures[0].stage, LocatorState::Decoding);
}

// ============================================================================
// Cancellation and Tickers
// ============================================================================

#[tokio::test]
async fn test_cancelled_run_attempts_nothing() {
    let transport = Arc::new(FixtureTransport::quarter(FORM_IDX));
    let coordinator = coordinator(
        transport.clone(),
        Arc::new(MemorySink::new()),
        Arc::new(MemoryCursorStore::new()),
        settings(),
    );
    coordinator.cancellation_token().cancel();

    let report = coordinator
        .ingest(&SelectionCriteria::all(), &q1_1995())
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(report.locators_attempted, 0);
    assert_eq!(transport.fetches(), 0);
}

#[tokio::test]
async fn test_cancel_after_committed_batch_resumes_on_rerun() {
    let transport = Arc::new(FixtureTransport::quarter(FORM_IDX));
    let store = Arc::new(MemorySink::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let criteria = SelectionCriteria::all().with_forms(["10-K"]);
    let settings = CoordinatorSettings {
        batch_size: 2,
        ..settings()
    };

    // Cancelled while the second batch is being written
    let token = CancellationToken::new();
    let sink = Arc::new(CancellingSink {
        inner: store.clone(),
        calls: AtomicUsize::new(0),
        cancel_on: 3,
        token: token.clone(),
    });
    let interrupted = coordinator(transport.clone(), sink, cursors.clone(), settings.clone())
        .with_cancellation(token);
    let first = interrupted.ingest(&criteria, &q1_1995()).await.unwrap();

    assert!(first.cancelled);
    assert!(!first.is_success());
    assert_eq!(first.locators_attempted, 1);
    assert_eq!(first.locators_completed, 0);
    assert!(first.failures.is_empty());
    assert_eq!(first.records_committed, 4);
    assert_eq!(store.len(), 4);

    let cursor = cursors.load(&q1_locator()).await.unwrap().unwrap();
    assert_eq!(cursor.status, CursorStatus::InProgress);
    assert_eq!(cursor.lines_committed, 13);
    assert_eq!(cursor.records_committed, 4);

    let resumed = coordinator(transport.clone(), store.clone(), cursors.clone(), settings);
    let second = resumed.ingest(&criteria, &q1_1995()).await.unwrap();

    assert!(second.is_success(), "{}", second.summary());
    assert!(!second.cancelled);
    assert_eq!(second.records_committed, 5);
    assert_eq!(second.records_duplicate, 0);
    assert_eq!(second.records_selected, 5);
    assert_eq!(store.len(), 9);
    assert_eq!(transport.fetches(), 2);

    let cursor = cursors.load(&q1_locator()).await.unwrap().unwrap();
    assert!(cursor.is_complete());
    assert_eq!(cursor.records_committed, 9);
    assert_eq!(cursor.attempts, 2);
}

#[tokio::test]
async fn test_tickers_merge_with_explicit_identifiers() {
    let sink = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        Arc::new(FixtureTransport::quarter(FORM_IDX)),
        sink.clone(),
        Arc::new(MemoryCursorStore::new()),
        settings(),
    );
    let tickers = TickerCache::new(Arc::new(StaticTickers(HashMap::from([("GBX", 320193)]))));

    let request = CriteriaRequest {
        forms: vec!["10-K".to_string()],
        ciks: vec![CompanyId::new(789019)],
        tickers: vec!["gbx".to_string()],
        filed: None,
    };
    let report = coordinator
        .ingest_request(request, &tickers, &q1_1995())
        .await
        .unwrap();

    assert_eq!(report.records_committed, 3);
    assert_eq!(tickers.len().await, 1);
}

#[tokio::test]
async fn test_unknown_ticker_aborts_before_fetching() {
    let transport = Arc::new(FixtureTransport::quarter(FORM_IDX));
    let coordinator = coordinator(
        transport.clone(),
        Arc::new(MemorySink::new()),
        Arc::new(MemoryCursorStore::new()),
        settings(),
    );
    let tickers = TickerCache::new(Arc::new(StaticTickers(HashMap::new())));

    let request = CriteriaRequest {
        tickers: vec!["ZZZZ".to_string()],
        ..CriteriaRequest::default()
    };
    let result = coordinator.ingest_request(request, &tickers, &q1_1995()).await;

    assert!(matches!(
        result,
        Err(IngestError::TickerResolutionFailed { ticker, .. }) if ticker == "ZZZZ"
    ));
    assert_eq!(transport.fetches(), 0);
}
