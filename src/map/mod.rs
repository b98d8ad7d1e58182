// src/map/mod.rs
pub mod date_parser;
pub mod raw_table;
pub mod registry;
pub mod table;
pub mod utils;
pub mod write;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use raw_table::RawRecord;
use registry::{Resolution, REGISTRY};
use table::{is_target_facility, OutputTable, TableBuilder, TARGET_FACILITY};
use utils::{format_amount, parse_amount};

/// A source member that no resolution tier recognised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmappedMember {
    pub member_name: String,
    pub member_code: String,
    pub amount: f64,
}

/// Counts for one mapping run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapSummary {
    pub report_date: String,
    pub rows_loaded: usize,
    pub rows_retained: usize,
    pub rows_mapped: usize,
    pub unparsed_amounts: usize,
    pub unmapped: Vec<UnmappedMember>,
    pub duplicates: usize,
    pub columns_populated: usize,
}

/// Turn filtered source rows into the output table.
///
/// Rows for other facilities, rows whose amount does not parse and rows that
/// resolve to no country are dropped and counted, never raised.
pub fn map_records(records: &[RawRecord], report_date: &str) -> (OutputTable, MapSummary) {
    let mut summary = MapSummary {
        report_date: report_date.to_string(),
        rows_loaded: records.len(),
        ..Default::default()
    };
    let mut builder = TableBuilder::new(&REGISTRY, report_date);

    let retained: Vec<&RawRecord> = records
        .iter()
        .filter(|r| is_target_facility(&r.facility))
        .collect();
    summary.rows_retained = retained.len();
    info!(
        retained = retained.len(),
        facility = TARGET_FACILITY,
        "filtered source rows"
    );
    if retained.is_empty() {
        warn!(facilities = ?distinct_facilities(records), "no rows for target facility");
    }

    for record in retained {
        let Some(amount) = parse_amount(&record.amount) else {
            warn!(
                member = %record.member_name,
                amount = %record.amount,
                "amount did not parse, row dropped"
            );
            summary.unparsed_amounts += 1;
            continue;
        };

        match registry::resolve(&record.member_name, &record.member_code) {
            Resolution::Resolved { country, tier } => {
                builder.insert(&country.code, amount);
                summary.rows_mapped += 1;
                info!(
                    country = country.name,
                    member = %record.member_name,
                    tier = tier.as_str(),
                    amount = %format_amount(amount),
                    "[OK] mapped"
                );
            }
            Resolution::Unmapped => {
                error!(
                    member = %record.member_name,
                    code = %record.member_code,
                    amount = %format_amount(amount),
                    "[ERROR] could not map member"
                );
                summary.unmapped.push(UnmappedMember {
                    member_name: record.member_name.clone(),
                    member_code: record.member_code.clone(),
                    amount,
                });
            }
        }
    }

    summary.duplicates = builder.duplicates();
    let table = builder.finish();
    summary.columns_populated = table.populated();
    (table, summary)
}

fn distinct_facilities(records: &[RawRecord]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for r in records {
        let f = r.facility.trim();
        if !seen.contains(&f) {
            seen.push(f);
        }
        if seen.len() == 10 {
            break;
        }
    }
    seen
}

/// Build the output table for the artifact at `input`.
pub fn build_output_table<P: AsRef<Path>>(
    input: P,
    header_lines: usize,
    today: NaiveDate,
) -> Result<(OutputTable, MapSummary)> {
    let raw = raw_table::load_borrowings(input, header_lines)?;
    let report_date = date_parser::extract_report_date(&raw.content, today);
    info!(report_date = %report_date, rows = raw.records.len(), "loaded source");
    Ok(map_records(&raw.records, &report_date))
}

/// Read `input`, map it and write the spreadsheet to `output`.
#[tracing::instrument(level = "info", skip_all, fields(input = %input.as_ref().display()))]
pub fn run_mapping<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    header_lines: usize,
    today: NaiveDate,
) -> Result<(PathBuf, MapSummary)> {
    let (table, summary) = build_output_table(input, header_lines, today)?;
    let path = write::write_output_table(&table, output)?;
    Ok((path, summary))
}
