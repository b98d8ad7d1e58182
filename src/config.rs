//! Command-line configuration for the three binaries. Every flag can also be
//! set through the environment variable named next to it.

use clap::Parser;
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::{
    fetch::{FetchConfig, DEFAULT_QUERY_URL, DEFAULT_SOURCE_FILE},
    map::raw_table::DEFAULT_HEADER_LINES,
    pipeline::PipelineConfig,
};

pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
pub const DEFAULT_OUTPUT_FILE: &str = "output/NABIMFD_OUTPUT.xlsx";

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "fetch_report",
    about = "Download the current IMF borrowings report through the query form",
    version
)]
pub struct FetchArgs {
    /// Query form URL.
    #[arg(long, env = "NABIMFD_QUERY_URL", default_value = DEFAULT_QUERY_URL)]
    pub url: Url,

    /// Directory the report is saved to.
    #[arg(long, env = "NABIMFD_DOWNLOADS_DIR", default_value = DEFAULT_DOWNLOADS_DIR)]
    pub downloads_dir: PathBuf,

    /// File name of the saved report.
    #[arg(long, env = "NABIMFD_SOURCE_FILE", default_value = DEFAULT_SOURCE_FILE)]
    pub file_name: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "NABIMFD_REQUEST_TIMEOUT_SECS", default_value_t = 20)]
    pub request_timeout_secs: u64,

    /// Pause between form steps in milliseconds.
    #[arg(long, env = "NABIMFD_STEP_DELAY_MS", default_value_t = 1000)]
    pub step_delay_ms: u64,
}

impl FetchArgs {
    pub fn to_config(&self) -> FetchConfig {
        FetchConfig {
            url: self.url.clone(),
            downloads_dir: self.downloads_dir.clone(),
            file_name: self.file_name.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            step_delay: Duration::from_millis(self.step_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "map_report",
    about = "Reshape the borrowings report into the NABIMFD spreadsheet",
    version
)]
pub struct MapArgs {
    /// Downloaded report (tab-separated, despite the extension).
    #[arg(long, env = "NABIMFD_INPUT", default_value = "downloads/BORROWINGS.xls")]
    pub input: PathBuf,

    /// Spreadsheet to write.
    #[arg(long, env = "NABIMFD_OUTPUT", default_value = DEFAULT_OUTPUT_FILE)]
    pub output: PathBuf,

    /// Preamble lines before the data rows.
    #[arg(long, default_value_t = DEFAULT_HEADER_LINES)]
    pub header_lines: usize,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "nabimfd",
    about = "Fetch the IMF borrowings report and build the NABIMFD spreadsheet",
    version
)]
pub struct PipelineArgs {
    #[arg(long, env = "NABIMFD_DOWNLOADS_DIR", default_value = DEFAULT_DOWNLOADS_DIR)]
    pub downloads_dir: PathBuf,

    #[arg(long, env = "NABIMFD_SOURCE_FILE", default_value = DEFAULT_SOURCE_FILE)]
    pub source_name: String,

    #[arg(long, env = "NABIMFD_OUTPUT", default_value = DEFAULT_OUTPUT_FILE)]
    pub output: PathBuf,

    /// Where `nabimfd_pipeline_*.log` files are written and pruned.
    #[arg(long, env = "NABIMFD_LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,

    /// Log files older than this many days are deleted after a successful run.
    #[arg(long, env = "NABIMFD_LOG_RETENTION_DAYS", default_value_t = 7)]
    pub retention_days: u64,

    #[arg(long, default_value_t = 300)]
    pub fetch_timeout_secs: u64,

    #[arg(long, default_value_t = 120)]
    pub map_timeout_secs: u64,

    /// Directory holding `fetch_report` and `map_report`. Defaults to the
    /// directory of this executable.
    #[arg(long, env = "NABIMFD_BIN_DIR")]
    pub bin_dir: Option<PathBuf>,

    /// Keep old log files.
    #[arg(long)]
    pub no_cleanup: bool,
}

impl PipelineArgs {
    /// `bin_dir` is used when `--bin-dir` was not given.
    pub fn to_config(&self, bin_dir: PathBuf) -> PipelineConfig {
        PipelineConfig {
            bin_dir: self.bin_dir.clone().unwrap_or(bin_dir),
            downloads_dir: self.downloads_dir.clone(),
            source_file: self.downloads_dir.join(&self.source_name),
            output_file: self.output.clone(),
            log_dir: self.log_dir.clone(),
            retention: Duration::from_secs(self.retention_days.saturating_mul(SECS_PER_DAY)),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            map_timeout: Duration::from_secs(self.map_timeout_secs),
            cleanup: !self.no_cleanup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        env,
        sync::{Mutex, MutexGuard},
    };

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialise tests that depend on `NABIMFD_*` and start them from a clean slate.
    fn clean_env() -> MutexGuard<'static, ()> {
        let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for (key, _) in env::vars() {
            if key.starts_with("NABIMFD_") {
                env::remove_var(key);
            }
        }
        guard
    }

    #[test]
    fn fetch_defaults_match_the_site() {
        let _env = clean_env();
        let args = FetchArgs::try_parse_from(["fetch_report"]).unwrap();
        let cfg = args.to_config();
        assert_eq!(cfg.url.as_str(), DEFAULT_QUERY_URL);
        assert_eq!(cfg.target_path(), PathBuf::from("downloads/BORROWINGS.xls"));
        assert_eq!(cfg.request_timeout, Duration::from_secs(20));
    }

    #[test]
    fn map_flags_override_defaults() {
        let _env = clean_env();
        let args = MapArgs::try_parse_from([
            "map_report",
            "--input",
            "in.tsv",
            "--output",
            "out/x.xlsx",
            "--header-lines",
            "3",
        ])
        .unwrap();
        assert_eq!(args.input, PathBuf::from("in.tsv"));
        assert_eq!(args.output, PathBuf::from("out/x.xlsx"));
        assert_eq!(args.header_lines, 3);
    }

    #[test]
    fn pipeline_defaults() {
        let _env = clean_env();
        let args = PipelineArgs::try_parse_from(["nabimfd"]).unwrap();
        let cfg = args.to_config(PathBuf::from("/opt/nabimfd"));
        assert_eq!(cfg.bin_dir, PathBuf::from("/opt/nabimfd"));
        assert_eq!(cfg.source_file, PathBuf::from("downloads/BORROWINGS.xls"));
        assert_eq!(cfg.retention, Duration::from_secs(7 * 86_400));
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(300));
        assert_eq!(cfg.map_timeout, Duration::from_secs(120));
        assert!(cfg.cleanup);
    }

    #[test]
    fn environment_fills_unset_flags() {
        let _env = clean_env();
        env::set_var("NABIMFD_DOWNLOADS_DIR", "/srv/nabimfd/in");
        env::set_var("NABIMFD_LOG_RETENTION_DAYS", "30");
        let args = PipelineArgs::try_parse_from(["nabimfd", "--retention-days", "2"]);
        env::remove_var("NABIMFD_DOWNLOADS_DIR");
        env::remove_var("NABIMFD_LOG_RETENTION_DAYS");

        let cfg = args.unwrap().to_config(PathBuf::from("/opt/nabimfd"));
        assert_eq!(cfg.downloads_dir, PathBuf::from("/srv/nabimfd/in"));
        assert_eq!(cfg.source_file, PathBuf::from("/srv/nabimfd/in/BORROWINGS.xls"));
        // an explicit flag beats the environment
        assert_eq!(cfg.retention, Duration::from_secs(2 * SECS_PER_DAY));
    }

    #[test]
    fn huge_retention_saturates() {
        let _env = clean_env();
        let max = u64::MAX.to_string();
        let args = PipelineArgs::try_parse_from(["nabimfd", "--retention-days", &max]).unwrap();
        assert_eq!(
            args.to_config(PathBuf::from(".")).retention,
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn bad_url_is_rejected() {
        let _env = clean_env();
        assert!(FetchArgs::try_parse_from(["fetch_report", "--url", "not a url"]).is_err());
    }
}
