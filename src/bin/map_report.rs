use anyhow::{bail, Result};
use chrono::Local;
use clap::Parser;
use nabimfd::{config::MapArgs, logging, map::run_mapping};
use std::process::ExitCode;
use tracing::{error, info};

fn run(args: &MapArgs) -> Result<()> {
    if !args.input.is_file() {
        bail!("source file not found: {:?}", args.input);
    }
    let (path, summary) = run_mapping(
        &args.input,
        &args.output,
        args.header_lines,
        Local::now().date_naive(),
    )?;
    info!(summary = %serde_json::to_string(&summary)?, "run summary");
    info!(
        path = %path.display(),
        date = %summary.report_date,
        columns = summary.columns_populated,
        "[OK] spreadsheet written"
    );
    Ok(())
}

fn main() -> ExitCode {
    logging::init_console();
    let args = MapArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "[ERROR] mapping failed");
            ExitCode::FAILURE
        }
    }
}
