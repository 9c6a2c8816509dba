//! FIDX Common Library
//!
//! Shared types, utilities, and error handling for the FIDX filing-index tools.
//!
//! - **Types**: company identifiers and filing records handed between crates
//! - **Checksums**: content fingerprints for fetched index resources
//! - **Logging**: one `tracing` subscriber setup for every binary
//! - **Errors**: the shared error and result types
//!
//! # Example
//!
//! ```
//! use fidx_common::types::CompanyId;
//!
//! let cik: CompanyId = "0000320193".parse().unwrap();
//! assert_eq!(cik.value(), 320193);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{FidxError, Result};
pub use types::{CompanyId, FilingRecord, NaturalKey};
