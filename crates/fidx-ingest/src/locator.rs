//! Quarter-index enumeration
//!
//! The archive publishes one index per fiscal quarter under
//! `{base}/{year}/QTR{quarter}/{variant}.{ext}`. This module turns a date
//! range into the ordered list of those resources.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// First year the quarterly indices exist
pub const EARLIEST_PUBLICATION_YEAR: i32 = 1993;

/// Month (1-12) to fiscal quarter
const MONTH_TO_QUARTER: [u8; 12] = [1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4];

/// One fiscal quarter; orders chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    year: i32,
    quarter: u8,
}

impl Period {
    pub fn new(year: i32, quarter: u8) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(IngestError::InvalidRange(format!(
                "quarter must be 1-4, got {}",
                quarter
            )));
        }
        Ok(Self { year, quarter })
    }

    pub fn from_year_month(year: i32, month: u32) -> Result<Self> {
        let quarter = month
            .checked_sub(1)
            .and_then(|m| MONTH_TO_QUARTER.get(m as usize))
            .copied()
            .ok_or_else(|| {
                IngestError::InvalidRange(format!("month must be 1-12, got {}", month))
            })?;
        Ok(Self { year, quarter })
    }

    /// Quarter containing a calendar date
    pub fn containing(date: NaiveDate) -> Self {
        let quarter = MONTH_TO_QUARTER[date.month0() as usize];
        Self {
            year: date.year(),
            quarter,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    pub fn next(&self) -> Self {
        if self.quarter == 4 {
            Self {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Q{}", self.year, self.quarter)
    }
}

/// Which pre-sorted variant of a quarter's index to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// `form.*`, sorted by form code
    Form,
    /// `company.*`, sorted by company name
    Company,
    /// `master.*`, sorted by company identifier (pipe-delimited)
    Master,
}

impl SortOrder {
    pub fn file_stem(&self) -> &'static str {
        match self {
            SortOrder::Form => "form",
            SortOrder::Company => "company",
            SortOrder::Master => "master",
        }
    }

    /// Scan-cost heuristic; never affects which records are selected
    ///
    /// `None` means the dimension is unconstrained, which counts as more
    /// distinct values than any finite set.
    pub fn preferred(form_count: Option<usize>, company_count: Option<usize>) -> Self {
        match (form_count, company_count) {
            (None, Some(_)) => SortOrder::Company,
            (Some(forms), Some(companies)) if forms > companies => SortOrder::Company,
            _ => SortOrder::Form,
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "form" => Ok(SortOrder::Form),
            "company" => Ok(SortOrder::Company),
            "master" | "cik" | "identifier" => Ok(SortOrder::Master),
            other => Err(IngestError::Config(format!("unknown sort order: {}", other))),
        }
    }
}

/// Compression applied to the published resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    None,
    Gzip,
    /// Legacy Unix `compress` (LZW, `.Z`)
    Compress,
    Zip,
}

impl Encoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Encoding::None => "idx",
            Encoding::Gzip => "gz",
            Encoding::Compress => "Z",
            Encoding::Zip => "zip",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::None => "none",
            Encoding::Gzip => "gzip",
            Encoding::Compress => "compress",
            Encoding::Zip => "zip",
        }
    }
}

impl std::str::FromStr for Encoding {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "idx" | "raw" => Ok(Encoding::None),
            "gzip" | "gz" => Ok(Encoding::Gzip),
            "compress" | "z" => Ok(Encoding::Compress),
            "zip" => Ok(Encoding::Zip),
            other => Err(IngestError::Config(format!("unknown encoding: {}", other))),
        }
    }
}

/// Address of one quarterly index resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLocator {
    pub period: Period,
    pub sort_order: SortOrder,
    pub encoding: Encoding,
}

impl ResourceLocator {
    pub fn new(period: Period, sort_order: SortOrder, encoding: Encoding) -> Self {
        Self {
            period,
            sort_order,
            encoding,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.sort_order.file_stem(), self.encoding.extension())
    }

    /// `1993/QTR1/form.gz`; also the cursor key
    pub fn relative_path(&self) -> String {
        format!(
            "{}/QTR{}/{}",
            self.period.year(),
            self.period.quarter(),
            self.file_name()
        )
    }

    pub fn url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.relative_path())
    }
}

impl std::fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.relative_path())
    }
}

/// Inclusive span of quarters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterRange {
    start: Period,
    end: Period,
}

impl QuarterRange {
    pub fn new(start: Period, end: Period) -> Result<Self> {
        if start > end {
            return Err(IngestError::InvalidRange(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// From two date strings (`YYYYMMDD`, `YYYY-MM-DD`, `YYYYMM` or `YYYY-MM`)
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_period(start)?, parse_period(end)?)
    }

    /// Earliest publication quarter through the quarter containing `today`
    ///
    /// Pure given its inputs; `today` is only the upper bound.
    pub fn default_as_of(today: NaiveDate, earliest_year: i32) -> Self {
        let end = Period::containing(today);
        let start = Period {
            year: earliest_year.min(end.year()),
            quarter: 1,
        };
        Self { start, end }
    }

    /// Fill missing bounds from [`QuarterRange::default_as_of`]
    pub fn from_bounds(
        start: Option<&str>,
        end: Option<&str>,
        today: NaiveDate,
        earliest_year: i32,
    ) -> Result<Self> {
        let default = Self::default_as_of(today, earliest_year);
        let start = start.map(parse_period).transpose()?.unwrap_or(default.start);
        let end = end.map(parse_period).transpose()?.unwrap_or(default.end);
        Self::new(start, end)
    }

    pub fn start(&self) -> Period {
        self.start
    }

    pub fn end(&self) -> Period {
        self.end
    }

    /// Every quarter in the range, oldest first
    pub fn periods(&self) -> impl Iterator<Item = Period> {
        let end = self.end;
        std::iter::successors(Some(self.start), move |p| {
            let next = p.next();
            (next <= end).then_some(next)
        })
    }
}

/// Parse a date-like string down to its (year, quarter)
pub fn parse_period(input: &str) -> Result<Period> {
    let trimmed = input.trim();
    let digits: String = trimmed.chars().filter(|c| *c != '-' && *c != '/').collect();

    if !(digits.len() == 6 || digits.len() == 8) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IngestError::InvalidRange(format!(
            "cannot read a year and month from {:?}",
            input
        )));
    }

    let year: i32 = digits[..4]
        .parse()
        .map_err(|_| IngestError::InvalidRange(format!("bad year in {:?}", input)))?;
    let month: u32 = digits[4..6]
        .parse()
        .map_err(|_| IngestError::InvalidRange(format!("bad month in {:?}", input)))?;

    Period::from_year_month(year, month)
}

/// Expands a quarter range into locators for one index variant
#[derive(Debug, Clone, Copy)]
pub struct LocatorResolver {
    sort_order: SortOrder,
    encoding: Encoding,
}

impl LocatorResolver {
    pub fn new(sort_order: SortOrder, encoding: Encoding) -> Self {
        Self {
            sort_order,
            encoding,
        }
    }

    pub fn resolve(&self, range: &QuarterRange) -> Vec<ResourceLocator> {
        range
            .periods()
            .map(|period| ResourceLocator::new(period, self.sort_order, self.encoding))
            .collect()
    }

    /// Convenience over [`QuarterRange::parse`]
    pub fn resolve_between(&self, start: &str, end: &str) -> Result<Vec<ResourceLocator>> {
        Ok(self.resolve(&QuarterRange::parse(start, end)?))
    }
}
