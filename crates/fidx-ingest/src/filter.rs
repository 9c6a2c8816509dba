//! Selection criteria applied to parsed records

use crate::error::{IngestError, Result};
use crate::ticker::TickerCache;
use chrono::NaiveDate;
use fidx_common::checksum::sha256_hex;
use fidx_common::types::{CompanyId, FilingRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Inclusive filing-date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(IngestError::InvalidRange(format!(
                "filing date range starts {} after it ends {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Both bounds as `YYYY-MM-DD` or `YYYYMMDD`
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .map_err(|_| IngestError::InvalidRange(format!("cannot read a date from {:?}", input)))
}

/// Which records an ingestion run keeps
///
/// Each dimension is optional; an absent dimension accepts everything. Empty
/// sets are stored as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    forms: Option<BTreeSet<String>>,
    companies: Option<BTreeSet<CompanyId>>,
    filed: Option<DateRange>,
}

impl SelectionCriteria {
    /// Select everything
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_forms<I, S>(mut self, forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let forms: BTreeSet<String> = forms
            .into_iter()
            .map(|f| f.into().trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        self.forms = (!forms.is_empty()).then_some(forms);
        self
    }

    pub fn with_companies<I>(mut self, companies: I) -> Self
    where
        I: IntoIterator<Item = CompanyId>,
    {
        let companies: BTreeSet<CompanyId> = companies.into_iter().collect();
        self.companies = (!companies.is_empty()).then_some(companies);
        self
    }

    pub fn with_filed(mut self, filed: DateRange) -> Self {
        self.filed = Some(filed);
        self
    }

    pub fn forms(&self) -> Option<&BTreeSet<String>> {
        self.forms.as_ref()
    }

    pub fn companies(&self) -> Option<&BTreeSet<CompanyId>> {
        self.companies.as_ref()
    }

    pub fn filed(&self) -> Option<DateRange> {
        self.filed
    }

    /// True when nothing narrows the selection
    pub fn is_unbounded(&self) -> bool {
        self.forms.is_none() && self.companies.is_none() && self.filed.is_none()
    }

    /// Distinct form codes, `None` when unconstrained
    pub fn form_count(&self) -> Option<usize> {
        self.forms.as_ref().map(BTreeSet::len)
    }

    /// Distinct company identifiers, `None` when unconstrained
    pub fn company_count(&self) -> Option<usize> {
        self.companies.as_ref().map(BTreeSet::len)
    }

    /// Stable SHA-256 of the canonical criteria text
    ///
    /// Equal criteria give equal fingerprints regardless of the order values
    /// were supplied in. Cursors store it so progress made under one selection
    /// is never mistaken for progress under another.
    pub fn fingerprint(&self) -> String {
        let forms = self
            .forms
            .iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\u{1f}");
        let companies = self
            .companies
            .iter()
            .flatten()
            .map(CompanyId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let filed = self
            .filed
            .map(|range| format!("{}..{}", range.start, range.end))
            .unwrap_or_default();

        let canonical = format!(
            "forms={}:{}\ncompanies={}:{}\nfiled={}",
            self.forms.is_some(),
            forms,
            self.companies.is_some(),
            companies,
            filed
        );
        sha256_hex(canonical.as_bytes())
    }

    /// Conjunction of every present dimension, cheapest first
    pub fn matches(&self, record: &FilingRecord) -> bool {
        if let Some(forms) = &self.forms {
            if !forms.contains(&record.form_type) {
                return false;
            }
        }
        if let Some(companies) = &self.companies {
            if !companies.contains(&record.company_id) {
                return false;
            }
        }
        if let Some(filed) = &self.filed {
            if !filed.contains(record.filed_date) {
                return false;
            }
        }
        true
    }
}

/// Caller-facing criteria before tickers are resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaRequest {
    pub forms: Vec<String>,
    pub ciks: Vec<CompanyId>,
    pub tickers: Vec<String>,
    pub filed: Option<DateRange>,
}

impl CriteriaRequest {
    /// Resolve tickers and merge them with the explicit identifiers
    ///
    /// Any ticker that cannot be resolved fails the whole request.
    pub async fn resolve(self, tickers: &TickerCache) -> Result<SelectionCriteria> {
        let mut companies: BTreeSet<CompanyId> = self.ciks.into_iter().collect();
        for ticker in &self.tickers {
            companies.insert(tickers.resolve(ticker).await?);
        }

        let mut criteria = SelectionCriteria::all()
            .with_forms(self.forms)
            .with_companies(companies);
        if let Some(filed) = self.filed {
            criteria = criteria.with_filed(filed);
        }
        Ok(criteria)
    }
}
