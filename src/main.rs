use clap::Parser;
use nabimfd::{
    config::PipelineArgs,
    logging,
    pipeline::{self, Pipeline},
};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = PipelineArgs::parse();

    // ─── 1) init logging ─────────────────────────────────────────────
    let log_file = match logging::init_with_file(&args.log_dir) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[ERROR] could not set up logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(log_file = %log_file.display(), "NABIMFD pipeline starting");

    // ─── 2) resolve config ───────────────────────────────────────────
    let bin_dir = match args.bin_dir.clone() {
        Some(dir) => dir,
        None => match pipeline::default_bin_dir() {
            Ok(dir) => dir,
            Err(e) => {
                error!(error = %format!("{:#}", e), "[ERROR] pipeline failed");
                return ExitCode::FAILURE;
            }
        },
    };
    let cfg = args.to_config(bin_dir);
    info!(
        downloads = %cfg.downloads_dir.display(),
        output = %cfg.output_file.display(),
        bin_dir = %cfg.bin_dir.display(),
        "configuration"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    match Pipeline::new(cfg).run().await {
        Ok(()) => {
            info!("[OK] NABIMFD pipeline completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "[ERROR] pipeline failed");
            ExitCode::FAILURE
        }
    }
}
