use clap::Parser;
use nabimfd::{config::FetchArgs, fetch::fetch_report, logging};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_console();
    let cfg = FetchArgs::parse().to_config();
    info!(url = %cfg.url, dest = %cfg.target_path().display(), "fetching borrowings report");

    match fetch_report(&cfg).await {
        Ok(path) => {
            info!(path = %path.display(), "[OK] report saved");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "[ERROR] fetch failed");
            ExitCode::FAILURE
        }
    }
}
