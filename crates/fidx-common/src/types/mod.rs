//! Domain types shared by every FIDX crate

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Company Identifiers
// ============================================================================

/// Opaque numeric company identifier issued by the filings authority (CIK)
///
/// Index files print it zero-padded (`0000320193`); the numeric value is
/// what identifies the company, so `0000320193` and `320193` are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(u64);

impl CompanyId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejected company identifier text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid company identifier: {0:?}")]
pub struct InvalidCompanyId(pub String);

impl std::str::FromStr for CompanyId {
    type Err = InvalidCompanyId;

    /// Accepts ASCII digits only; signs and whitespace are rejected
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidCompanyId(s.to_string()));
        }
        s.parse::<u64>()
            .map(CompanyId)
            .map_err(|_| InvalidCompanyId(s.to_string()))
    }
}

// ============================================================================
// Filing Records
// ============================================================================

/// One row of a quarterly index: who filed what, when, and where it lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilingRecord {
    pub company_id: CompanyId,
    pub company_name: String,
    pub form_type: String,
    pub filed_date: NaiveDate,
    /// Relative path such as `edgar/data/320193/0000320193-24-000123.txt`
    pub document_path: String,
}

/// Uniqueness key for persisted filings
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub company_id: CompanyId,
    pub form_type: String,
    pub filed_date: NaiveDate,
    pub document_path: String,
}

impl FilingRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            company_id: self.company_id,
            form_type: self.form_type.clone(),
            filed_date: self.filed_date,
            document_path: self.document_path.clone(),
        }
    }

    /// Resolve the document path against an archive base such as
    /// `https://www.sec.gov/Archives`
    pub fn document_url(&self, base: &str) -> String {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            self.document_path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record() -> FilingRecord {
        FilingRecord {
            company_id: CompanyId::new(123456),
            company_name: "ACME CORP".to_string(),
            form_type: "10-K".to_string(),
            filed_date: NaiveDate::from_ymd_opt(1993, 3, 15).unwrap(),
            document_path: "edgar/data/123456/0000123456.txt".to_string(),
        }
    }

    #[test]
    fn test_company_id_ignores_zero_padding() {
        let padded: CompanyId = "0000123456".parse().unwrap();
        assert_eq!(padded, CompanyId::new(123456));
        assert_eq!(padded.to_string(), "123456");
    }

    #[test]
    fn test_company_id_rejects_non_digits() {
        assert!("12A4".parse::<CompanyId>().is_err());
        assert!("+123".parse::<CompanyId>().is_err());
        assert!("".parse::<CompanyId>().is_err());
    }

    #[test]
    fn test_natural_key_ignores_company_name() {
        let a = record();
        let mut b = record();
        b.company_name = "ACME CORPORATION".to_string();
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn test_document_url() {
        assert_eq!(
            record().document_url("https://www.sec.gov/Archives/"),
            "https://www.sec.gov/Archives/edgar/data/123456/0000123456.txt"
        );
    }
}
