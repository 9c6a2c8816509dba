//! FIDX Ingest Library
//!
//! Pulls quarterly filing indexes from the public full-index archive, keeps
//! the records a caller asked for and hands them to a persistence sink.
//!
//! # Pipeline
//!
//! - **Locators**: a quarter range becomes one resource per quarter
//! - **Transport**: HTTPS, an FTP mirror, or a local mirror fetch the bytes
//! - **Decoder**: gzip, zip and legacy `compress` streams become numbered lines
//! - **Parser**: each line is matched against its index layout
//! - **Filter**: form, company and filing-date criteria select records
//! - **Coordinator**: runs locators concurrently, commits in batches and
//!   keeps per-locator cursors so reruns resume instead of repeating work
//!
//! # Example
//!
//! ```no_run
//! use fidx_ingest::coordinator::{CoordinatorSettings, IngestionCoordinator};
//! use fidx_ingest::cursor::MemoryCursorStore;
//! use fidx_ingest::filter::SelectionCriteria;
//! use fidx_ingest::locator::QuarterRange;
//! use fidx_ingest::sink::MemorySink;
//! use fidx_ingest::transport::{HttpTransport, RetryPolicy};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = HttpTransport::new(
//!         "https://www.sec.gov/Archives/edgar/full-index",
//!         "example-app admin@example.com",
//!         RetryPolicy::default(),
//!     )?;
//!     let coordinator = IngestionCoordinator::new(
//!         Arc::new(transport),
//!         Arc::new(MemorySink::new()),
//!         Arc::new(MemoryCursorStore::new()),
//!         CoordinatorSettings::default(),
//!     );
//!
//!     let criteria = SelectionCriteria::all().with_forms(["10-K"]);
//!     let range = QuarterRange::parse("1995-01", "1995-12")?;
//!     let report = coordinator.ingest(&criteria, &range).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod compress;
pub mod config;
pub mod coordinator;
pub mod cursor;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod locator;
pub mod parser;
pub mod report;
pub mod sink;
pub mod ticker;
pub mod transport;

pub use coordinator::{CoordinatorSettings, IngestionCoordinator};
pub use error::{IngestError, Result};
pub use filter::{CriteriaRequest, DateRange, SelectionCriteria};
pub use locator::{Encoding, QuarterRange, ResourceLocator, SortOrder};
pub use report::IngestionReport;
