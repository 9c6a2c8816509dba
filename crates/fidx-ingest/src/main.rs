//! FIDX Ingest - quarterly filing-index ingestion tool

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use fidx_common::logging::{init_logging, LogConfig, LogLevel};
use fidx_common::types::CompanyId;
use fidx_ingest::config::{parse_sort_order, IngestConfig, TransportKind};
use fidx_ingest::coordinator::{plan, IngestionCoordinator};
use fidx_ingest::cursor::{CursorStore, JsonCursorStore};
use fidx_ingest::filter::{CriteriaRequest, DateRange};
use fidx_ingest::locator::{Encoding, Period, QuarterRange};
use fidx_ingest::sink::jsonl::JsonLinesSink;
use fidx_ingest::sink::{FilingSink, MemorySink};
use fidx_ingest::ticker::TickerCache;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fidx-ingest")]
#[command(author, version, about = "Quarterly filing-index ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory for cursors and the JSON-lines sink
    #[arg(long, global = true, env = "FIDX_STATE_DIR")]
    state_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, filter and persist filing records
    Ingest {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Upstream serving the index files (http, ftp, local)
        #[arg(long)]
        transport: Option<String>,

        /// Root of a local mirror, for --transport local
        #[arg(long)]
        local_root: Option<PathBuf>,

        /// Where selected records go
        #[arg(long, value_enum, default_value_t = SinkKind::Jsonl)]
        sink: SinkKind,

        /// Records per committed batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Locator pipelines in flight
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the index resources an ingest would read
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// List stored cursors
    Status,
}

#[derive(clap::Args, Debug)]
struct SelectionArgs {
    /// Form type to keep (repeatable)
    #[arg(long = "form", value_name = "FORM")]
    forms: Vec<String>,

    /// Company identifier to keep (repeatable)
    #[arg(long = "cik", value_name = "CIK")]
    ciks: Vec<CompanyId>,

    /// Ticker symbol to keep (repeatable)
    #[arg(long = "ticker", value_name = "TICKER")]
    tickers: Vec<String>,

    /// Quarter range, e.g. 1995-01 2000-12
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    range: Option<Vec<String>>,

    /// Filing-date range, e.g. 1995-01-01 1995-03-31
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    filed: Option<Vec<String>>,

    /// Index variant (auto, form, company, master)
    #[arg(long)]
    sort: Option<String>,

    /// Published encoding (none, gzip, compress, zip)
    #[arg(long)]
    encoding: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SinkKind {
    Jsonl,
    Memory,
    Postgres,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("fidx-ingest")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env().context("Failed to load configuration")?;
    if let Some(dir) = cli.state_dir {
        config = config.with_state_dir(dir);
    }

    match cli.command {
        Command::Ingest {
            selection,
            transport,
            local_root,
            sink,
            batch_size,
            concurrency,
        } => {
            let mut config = selection.apply(config)?;
            if let Some(transport) = transport {
                config = config.with_transport(transport.parse::<TransportKind>()?);
            }
            if let Some(root) = local_root {
                config = config.with_local_root(root);
            }
            if let Some(batch_size) = batch_size {
                config = config.with_batch_size(batch_size);
            }
            if let Some(concurrency) = concurrency {
                config = config.with_concurrency(concurrency);
            }
            config.validate()?;
            ingest(&config, selection, sink).await
        },
        Command::Plan { selection } => {
            let config = selection.apply(config)?;
            let request = selection.request()?;
            let range = selection.quarter_range(&config, request.filed)?;
            // Ticker lookups are network calls; planning only needs counts
            let criteria = fidx_ingest::SelectionCriteria::all()
                .with_forms(request.forms)
                .with_companies(request.ciks);
            let plan = plan(&criteria, &range, config.sort_order, config.encoding);

            println!("{} index, {} resources", plan.sort_order.file_stem(), plan.locators.len());
            for locator in &plan.locators {
                println!("  {}", locator.url(&config.base_url));
            }
            Ok(())
        },
        Command::Status => status(&config).await,
    }
}

impl SelectionArgs {
    /// Fold --sort and --encoding into the configuration
    fn apply(&self, mut config: IngestConfig) -> Result<IngestConfig> {
        if let Some(sort) = &self.sort {
            config = config.with_sort_order(parse_sort_order(sort)?);
        }
        if let Some(encoding) = &self.encoding {
            config = config.with_encoding(encoding.parse::<Encoding>()?);
        }
        Ok(config)
    }

    fn request(&self) -> Result<CriteriaRequest> {
        let filed = match self.filed.as_deref() {
            Some([start, end]) => Some(DateRange::parse(start, end)?),
            _ => None,
        };
        Ok(CriteriaRequest {
            forms: self.forms.clone(),
            ciks: self.ciks.clone(),
            tickers: self.tickers.clone(),
            filed,
        })
    }

    /// --range, else the quarters spanned by --filed, else everything published
    fn quarter_range(&self, config: &IngestConfig, filed: Option<DateRange>) -> Result<QuarterRange> {
        if let Some([start, end]) = self.range.as_deref() {
            return Ok(QuarterRange::parse(start, end)?);
        }
        if let Some(filed) = filed {
            let end = filed.end().min(today()).max(filed.start());
            return Ok(QuarterRange::new(
                Period::containing(filed.start()),
                Period::containing(end),
            )?);
        }
        Ok(QuarterRange::default_as_of(today(), config.earliest_year))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn open_sink(config: &IngestConfig, kind: SinkKind) -> Result<Arc<dyn FilingSink>> {
    let sink: Arc<dyn FilingSink> = match kind {
        SinkKind::Jsonl => Arc::new(
            JsonLinesSink::open(config.jsonl_path()).context("Failed to open JSON-lines sink")?,
        ),
        SinkKind::Memory => {
            warn!("Memory sink selected; records are discarded on exit");
            Arc::new(MemorySink::new())
        },
        #[cfg(feature = "database")]
        SinkKind::Postgres => {
            let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set for the postgres sink")?;
            Arc::new(
                fidx_ingest::sink::postgres::PgSink::connect(&url, 5)
                    .await
                    .context("Failed to connect to database")?,
            )
        },
        #[cfg(not(feature = "database"))]
        SinkKind::Postgres => {
            anyhow::bail!("postgres sink requires building with the `database` feature")
        },
    };
    Ok(sink)
}

async fn ingest(config: &IngestConfig, selection: SelectionArgs, sink: SinkKind) -> Result<()> {
    let request = selection.request()?;
    let range = selection.quarter_range(config, request.filed)?;

    let transport = config.build_transport()?;
    let sink = open_sink(config, sink).await?;
    let cursors = Arc::new(
        JsonCursorStore::open(config.cursor_path())
            .await
            .context("Failed to open cursor store")?,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight batches");
            on_signal.cancel();
        }
    });

    info!(
        transport = transport.name(),
        sink = sink.name(),
        state_dir = %config.state_dir.display(),
        "Starting ingestion"
    );

    let coordinator = IngestionCoordinator::new(transport, sink, cursors, config.coordinator_settings())
        .with_cancellation(cancel);

    let tickers = TickerCache::new(Arc::new(config.build_ticker_resolver()?));
    let report = coordinator.ingest_request(request, &tickers, &range).await?;

    print!("{}", report.summary());

    if report.cancelled {
        anyhow::bail!("Ingestion cancelled; rerun to resume");
    }
    if !report.is_success() {
        anyhow::bail!("{} locator(s) failed", report.locators_failed);
    }
    Ok(())
}

async fn status(config: &IngestConfig) -> Result<()> {
    let store = JsonCursorStore::open(config.cursor_path())
        .await
        .context("Failed to open cursor store")?;
    let cursors = store.list().await?;

    if cursors.is_empty() {
        println!("No cursors in {}", store.path().display());
        return Ok(());
    }

    println!(
        "{:<24} {:<12} {:>10} {:>10} {:>8}  {}",
        "LOCATOR", "STATUS", "LINES", "RECORDS", "ATTEMPTS", "UPDATED"
    );
    for cursor in &cursors {
        println!(
            "{:<24} {:<12} {:>10} {:>10} {:>8}  {}",
            cursor.key(),
            cursor.status.as_str(),
            cursor.lines_committed,
            cursor.records_committed,
            cursor.attempts,
            cursor.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(error) = &cursor.last_error {
            println!("    last error: {}", error);
        }
    }
    Ok(())
}
