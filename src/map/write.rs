use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::table::OutputTable;

pub const SHEET_NAME: &str = "Sheet1";
const NUMBER_FORMAT: &str = "#,##0";

/// Render `table` into an in-memory `.xlsx` workbook.
///
/// Row 1 holds the series codes, row 2 the labels, row 3 the date (as text)
/// followed by the amounts in `#,##0` format. Empty cells are left blank.
pub fn render_workbook(table: &OutputTable) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let number = Format::new().set_num_format(NUMBER_FORMAT);

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (i, (code, label)) in table.codes.iter().zip(&table.labels).enumerate() {
        let col = u16::try_from(i).context("too many output columns")?;
        if !code.is_empty() {
            sheet.write_string(0, col, code)?;
        }
        if !label.is_empty() {
            sheet.write_string(1, col, label)?;
        }
    }

    // the date must stay text even though it looks numeric
    sheet.write_string(2, 0, &table.date)?;
    for (i, value) in table.values.iter().enumerate().skip(1) {
        if let Some(v) = value {
            let col = u16::try_from(i).context("too many output columns")?;
            sheet.write_number_with_format(2, col, *v, &number)?;
        }
    }

    workbook
        .save_to_buffer()
        .context("rendering output workbook")
}

/// Write `table` to `path`, creating the parent directory when needed.
///
/// The workbook goes to a temp file next to `path` and is renamed over it, so
/// a failed write leaves no partial file behind.
pub fn write_output_table<P: AsRef<Path>>(table: &OutputTable, path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("creating output directory {:?}", dir))?;

    let bytes = render_workbook(table)?;
    debug!(bytes = bytes.len(), "workbook rendered");

    let mut tmp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("creating temp file in {:?}", dir))?;
    tmp.write_all(&bytes)
        .with_context(|| format!("writing workbook to {:?}", tmp.path()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("flushing {:?}", tmp.path()))?;
    tmp.persist(path)
        .with_context(|| format!("renaming workbook into place at {:?}", path))?;

    info!(path = %path.display(), bytes = bytes.len(), "[OK] output workbook written");
    Ok(path.to_path_buf())
}
