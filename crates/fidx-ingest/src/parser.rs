//! Quarterly index record parser
//!
//! Each index variant has its own line layout:
//!
//! ```text
//! form.idx     Form Type   Company Name            CIK         Date Filed  File Name
//!              10-K        ACME CORP               123456      1995-03-15  edgar/data/123456/0000123456-95-000001.txt
//!
//! company.idx  Company Name            Form Type   CIK         Date Filed  File Name
//!              ACME CORP               10-K        123456      1995-03-15  edgar/data/123456/0000123456-95-000001.txt
//!
//! master.idx   CIK|Company Name|Form Type|Date Filed|Filename
//!              123456|ACME CORP|10-K|1995-03-15|edgar/data/123456/0000123456-95-000001.txt
//! ```
//!
//! Column widths drift between years and company names contain spaces,
//! punctuation and even slashes, so every layout is matched with one
//! anchored pattern whose tail (identifier, date, path) pins the split.
//! Lines the pattern does not recognise (descriptions, column headers,
//! dash separators, blank lines) are skipped. Lines it does recognise but
//! whose identifier or date will not parse are malformed.

use crate::error::{IngestError, Result};
use crate::locator::SortOrder;
use chrono::NaiveDate;
use fidx_common::types::{CompanyId, FilingRecord};
use regex::{Captures, Regex};

/// Form-sorted: the form code is either followed by two or more spaces (and
/// may then contain single spaces, `SC 13G/A`), or is one token.
const FORM_LAYOUT: &str = r"^(?:(?P<form>\S+(?: \S+)*?)\s{2,}|(?P<form1>\S+)\s+)(?P<name>\S.*?)\s+(?P<cik>\S+)\s+(?P<date>\S+)\s+(?P<path>edgar/\S+)\s*$";

const COMPANY_LAYOUT: &str = r"^(?P<name>\S.*?)\s{2,}(?P<form>\S+(?: \S+)*?)\s{2,}(?P<cik>\S+)\s+(?P<date>\S+)\s+(?P<path>edgar/\S+)\s*$";

const MASTER_LAYOUT: &str = r"^(?P<cik>[^|]*)\|(?P<name>[^|]*)\|(?P<form>[^|]*)\|(?P<date>[^|]*)\|(?P<path>edgar/[^|]*?)\s*$";

/// Result of parsing one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Matched(FilingRecord),
    /// Not a record line for this layout
    Skipped,
    /// Looked like a record but a field is unusable
    Malformed(String),
}

impl ParseOutcome {
    pub fn record(self) -> Option<FilingRecord> {
        match self {
            ParseOutcome::Matched(record) => Some(record),
            _ => None,
        }
    }
}

/// Line parser for one index layout
#[derive(Debug, Clone)]
pub struct RecordParser {
    layout: SortOrder,
    pattern: Regex,
}

impl RecordParser {
    pub fn new(layout: SortOrder) -> Result<Self> {
        let source = match layout {
            SortOrder::Form => FORM_LAYOUT,
            SortOrder::Company => COMPANY_LAYOUT,
            SortOrder::Master => MASTER_LAYOUT,
        };
        let pattern = Regex::new(source)
            .map_err(|e| IngestError::Config(format!("{} layout pattern: {}", layout.file_stem(), e)))?;
        Ok(Self { layout, pattern })
    }

    pub fn layout(&self) -> SortOrder {
        self.layout
    }

    /// Classify one line; never fails
    pub fn parse(&self, line: &str) -> ParseOutcome {
        match self.pattern.captures(line) {
            Some(caps) => build_record(&caps),
            None => ParseOutcome::Skipped,
        }
    }
}

fn field<'h>(caps: &Captures<'h>, name: &str) -> &'h str {
    caps.name(name).map(|m| m.as_str().trim()).unwrap_or("")
}

fn build_record(caps: &Captures<'_>) -> ParseOutcome {
    let form = match field(caps, "form") {
        "" => field(caps, "form1"),
        form => form,
    };
    if form.is_empty() {
        return ParseOutcome::Malformed("empty form type".to_string());
    }

    let cik = field(caps, "cik");
    let company_id = match cik.parse::<CompanyId>() {
        Ok(id) => id,
        Err(_) => return ParseOutcome::Malformed(format!("non-numeric company identifier {:?}", cik)),
    };

    let date = field(caps, "date");
    let filed_date = match parse_filed_date(date) {
        Some(d) => d,
        None => return ParseOutcome::Malformed(format!("unparseable filing date {:?}", date)),
    };

    ParseOutcome::Matched(FilingRecord {
        company_id,
        company_name: field(caps, "name").to_string(),
        form_type: form.to_string(),
        filed_date,
        document_path: field(caps, "path").to_string(),
    })
}

/// `1995-03-15`, or `19950315` as printed by the earliest master files
fn parse_filed_date(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(text, "%Y%m%d").ok();
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parser(layout: SortOrder) -> RecordParser {
        RecordParser::new(layout).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_form_layout_record() {
        let line = "10-K   ACME CORP   0000123456   1993-03-15   edgar/data/123456/0000123456.txt";
        let record = parser(SortOrder::Form).parse(line).record().unwrap();
        assert_eq!(
            record,
            FilingRecord {
                company_id: CompanyId::new(123456),
                company_name: "ACME CORP".to_string(),
                form_type: "10-K".to_string(),
                filed_date: date(1993, 3, 15),
                document_path: "edgar/data/123456/0000123456.txt".to_string(),
            }
        );
    }

    #[test]
    fn test_form_layout_multi_word_form_and_name() {
        let line = "SC 13G/A    BERKSHIRE HATHAWAY INC /DE/                                   1067983     2024-02-14  edgar/data/1067983/0000950123-24-001234.txt";
        let record = parser(SortOrder::Form).parse(line).record().unwrap();
        assert_eq!(record.form_type, "SC 13G/A");
        assert_eq!(record.company_name, "BERKSHIRE HATHAWAY INC /DE/");
        assert_eq!(record.company_id, CompanyId::new(1067983));
    }

    #[test]
    fn test_form_layout_single_space_after_form() {
        let line = "10-K405 ACME CORP 123456 1997-03-31 edgar/data/123456/0000123456-97-000002.txt";
        let record = parser(SortOrder::Form).parse(line).record().unwrap();
        assert_eq!(record.form_type, "10-K405");
        assert_eq!(record.company_name, "ACME CORP");
    }

    #[test]
    fn test_company_layout_record() {
        let line = "ACME CORP                                                     DEF 14A     123456      1995-03-15  edgar/data/123456/0000123456-95-000015.txt";
        let record = parser(SortOrder::Company).parse(line).record().unwrap();
        assert_eq!(record.company_name, "ACME CORP");
        assert_eq!(record.form_type, "DEF 14A");
        assert_eq!(record.filed_date, date(1995, 3, 15));
    }

    #[test]
    fn test_master_layout_record() {
        let line = "1000045|NICHOLAS FINANCIAL INC|10-Q|2016-02-16|edgar/data/1000045/0001193125-16-463227.txt";
        let record = parser(SortOrder::Master).parse(line).record().unwrap();
        assert_eq!(record.company_id, CompanyId::new(1000045));
        assert_eq!(record.company_name, "NICHOLAS FINANCIAL INC");
        assert_eq!(record.form_type, "10-Q");
    }

    #[test]
    fn test_compact_dates() {
        let line = "1000045|NICHOLAS FINANCIAL INC|10-Q|19960216|edgar/data/1000045/0000950109-96-000123.txt";
        let record = parser(SortOrder::Master).parse(line).record().unwrap();
        assert_eq!(record.filed_date, date(1996, 2, 16));
    }

    #[test]
    fn test_non_record_lines_are_skipped() {
        let form = parser(SortOrder::Form);
        for line in [
            "",
            "------------------------------------------------------------------------",
            "Description:           Master Index of EDGAR Dissemination Feed by Form Type",
            "Anonymous FTP:         ftp://ftp.sec.gov/edgar/",
            "Form Type   Company Name                      CIK         Date Filed  File Name",
        ] {
            assert_eq!(form.parse(line), ParseOutcome::Skipped, "{:?}", line);
        }

        let master = parser(SortOrder::Master);
        assert_eq!(
            master.parse("CIK|Company Name|Form Type|Date Filed|Filename"),
            ParseOutcome::Skipped
        );
    }

    #[test]
    fn test_bad_identifier_is_malformed() {
        let line = "10-K   ACME CORP   00001234X6   1993-03-15   edgar/data/123456/0000123456.txt";
        assert!(matches!(
            parser(SortOrder::Form).parse(line),
            ParseOutcome::Malformed(reason) if reason.contains("00001234X6")
        ));
    }

    #[test]
    fn test_bad_date_is_malformed() {
        let line = "10-K   ACME CORP   123456   1993-13-45   edgar/data/123456/0000123456.txt";
        assert!(matches!(
            parser(SortOrder::Form).parse(line),
            ParseOutcome::Malformed(_)
        ));

        let line = "123456|ACME CORP|10-K|15/03/1993|edgar/data/123456/0000123456.txt";
        assert!(matches!(
            parser(SortOrder::Master).parse(line),
            ParseOutcome::Malformed(_)
        ));
    }

    #[test]
    fn test_empty_master_form_is_malformed() {
        let line = "123456|ACME CORP||1993-03-15|edgar/data/123456/0000123456.txt";
        assert_eq!(
            parser(SortOrder::Master).parse(line),
            ParseOutcome::Malformed("empty form type".to_string())
        );
    }

    #[test]
    fn test_fixture_is_fully_classified() {
        let content = include_str!("../tests/fixtures/form.idx");
        let parser = parser(SortOrder::Form);
        let outcomes: Vec<_> = content.lines().map(|l| parser.parse(l)).collect();

        let matched = outcomes
            .iter()
            .filter(|o| matches!(o, ParseOutcome::Matched(_)))
            .count();
        let malformed = outcomes
            .iter()
            .filter(|o| matches!(o, ParseOutcome::Malformed(_)))
            .count();
        assert_eq!(matched, 63);
        assert_eq!(malformed, 0);
        assert_eq!(outcomes.len() - matched, 9);
    }
}
