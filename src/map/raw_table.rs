use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::{fs, io::Cursor, path::Path};
use tracing::{debug, trace};

use crate::map::utils::clean_str;

/// Free-text header lines that precede the tabular data in the download.
pub const DEFAULT_HEADER_LINES: usize = 8;

/// One data row of the borrowings download, in source column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub member_name: String,
    pub member_code: String,
    pub kind: String,
    pub facility: String,
    pub start_date: String,
    pub expiration: String,
    pub revolving: String,
    pub amount: String,
    pub currency: String,
    pub amount_outstanding_sdr: String,
    pub status: String,
}

impl RawRecord {
    fn from_fields(fields: &[String]) -> Self {
        let get = |i: usize| fields.get(i).cloned().unwrap_or_default();
        Self {
            member_name: get(0),
            member_code: get(1),
            kind: get(2),
            facility: get(3),
            start_date: get(4),
            expiration: get(5),
            revolving: get(6),
            amount: get(7),
            currency: get(8),
            amount_outstanding_sdr: get(9),
            status: get(10),
        }
    }

    /// Repeated column headings and blank lines are not data.
    fn is_data_row(&self) -> bool {
        !self.member_name.is_empty()
            && !self.member_name.contains("Member")
            && !self.facility.is_empty()
            && !self.amount.is_empty()
    }
}

/// The downloaded artifact: its full text (for date extraction) and its rows.
#[derive(Debug)]
pub struct RawTable {
    pub content: String,
    pub records: Vec<RawRecord>,
}

/// Read the artifact from disk. The file is TSV even though the site names it `.xls`.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_borrowings<P: AsRef<Path>>(path: P, header_lines: usize) -> Result<RawTable> {
    let bytes = fs::read(&path)
        .with_context(|| format!("Failed to read source file: {:?}", path.as_ref()))?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    let records = parse_borrowings(&content, header_lines)?;
    Ok(RawTable { content, records })
}

/// Parse the tab-separated body that follows `header_lines` lines of preamble.
pub fn parse_borrowings(content: &str, header_lines: usize) -> Result<Vec<RawRecord>> {
    let body = skip_lines(content, header_lines);

    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(body.as_bytes()));

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (idx, result) in rdr.records().enumerate() {
        let row = result.with_context(|| format!("TSV parse error at data record {}", idx))?;
        let fields: Vec<String> = row.iter().map(clean_str).collect();
        let record = RawRecord::from_fields(&fields);
        if record.is_data_row() {
            records.push(record);
        } else {
            trace!(idx, ?fields, "skipping non-data row");
            skipped += 1;
        }
    }

    debug!(rows = records.len(), skipped, "parsed borrowings table");
    Ok(records)
}

fn skip_lines(content: &str, n: usize) -> &str {
    let mut rest = content;
    for _ in 0..n {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "IMF Financial Data\n\
Members' Borrowings\n\
As of: June 30, 2025\n\
\n\
\n\
\n\
\n\
\n\
Member (Lender)\tMember Code\tType\tFacility\tStart Date\tExpiration of Term\tRevolving\tAmount\tCurrency\tAmount Outstanding (SDR)\tStatus\n\
France\tFRA\tLender\tNew Arrangement to Borrow\t2011-03-11\t2025-12-31\tYes\t500,000\tSDR\t0\tActive\n\
Stand-By Co.\t\tLender\tStand-By Arrangement\t2020-01-01\t2026-01-01\tNo\t999\tSDR\t0\tActive\n\
Kuwait\tKWT\tLender\tNew Arrangement to Borrow\t\t\t\t\tSDR\n\
\n";

    #[test]
    fn parses_rows_after_header_block() -> Result<()> {
        let records = parse_borrowings(SAMPLE, DEFAULT_HEADER_LINES)?;
        // heading row, the Kuwait row without amount and the blank line are dropped
        assert_eq!(records.len(), 2);

        let france = &records[0];
        assert_eq!(france.member_name, "France");
        assert_eq!(france.member_code, "FRA");
        assert_eq!(france.facility, "New Arrangement to Borrow");
        assert_eq!(france.amount, "500,000");
        assert_eq!(france.currency, "SDR");
        assert_eq!(france.status, "Active");

        assert_eq!(records[1].member_code, "");
        assert_eq!(records[1].facility, "Stand-By Arrangement");
        Ok(())
    }

    #[test]
    fn short_rows_fill_missing_fields_with_empty_strings() -> Result<()> {
        let records = parse_borrowings("Japan\tJPN\tLender\tNew Arrangement to Borrow\tx\ty\tz\t10", 0)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, "10");
        assert_eq!(records[0].status, "");
        Ok(())
    }

    #[test]
    fn header_shorter_than_preamble_yields_no_rows() -> Result<()> {
        assert!(parse_borrowings("As of: June 30, 2025\n", DEFAULT_HEADER_LINES)?.is_empty());
        Ok(())
    }

    #[test]
    fn load_keeps_full_text_for_date_extraction() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(SAMPLE.as_bytes())?;

        let table = load_borrowings(tmp.path(), DEFAULT_HEADER_LINES)?;
        assert!(table.content.contains("As of: June 30, 2025"));
        assert_eq!(table.records.len(), 2);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_borrowings("/definitely/not/here.xls", DEFAULT_HEADER_LINES).is_err());
    }
}
