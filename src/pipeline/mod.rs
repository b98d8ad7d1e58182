// src/pipeline/mod.rs

pub mod retention;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use glob::{glob, Pattern};
use std::{
    env::consts::EXE_SUFFIX,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, SystemTime},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    task::JoinHandle,
    time::Instant,
};
use tracing::{error, info, warn};

use crate::error::PipelineError;

pub const FETCH_BIN: &str = "fetch_report";
pub const MAP_BIN: &str = "map_report";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Extraction,
    Processing,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Extraction => "extraction",
            Phase::Processing => "processing",
        }
    }

    /// Prefix for re-logged child output.
    pub fn tag(&self) -> &'static str {
        match self {
            Phase::Extraction => "[EXTRACTION]",
            Phase::Processing => "[PROCESSING]",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the phase executables.
    pub bin_dir: PathBuf,
    pub downloads_dir: PathBuf,
    /// Where the extraction phase must leave the report.
    pub source_file: PathBuf,
    pub output_file: PathBuf,
    pub log_dir: PathBuf,
    pub retention: Duration,
    pub fetch_timeout: Duration,
    pub map_timeout: Duration,
    pub cleanup: bool,
}

impl PipelineConfig {
    pub fn fetch_program(&self) -> PathBuf {
        self.bin_dir.join(format!("{}{}", FETCH_BIN, EXE_SUFFIX))
    }

    pub fn map_program(&self) -> PathBuf {
        self.bin_dir.join(format!("{}{}", MAP_BIN, EXE_SUFFIX))
    }
}

/// Directory of the running executable, where the phase binaries are installed.
pub fn default_bin_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating the running executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("{:?} has no parent directory", exe))
}

/// Size and modification time of a pipeline artifact.
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub label: &'static str,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Local>,
}

/// Run one phase as a child process, relaying its output into our log.
///
/// The child is killed when `limit` elapses. Exit status 0 is the only success.
pub async fn run_phase(
    phase: Phase,
    program: &Path,
    args: &[OsString],
    limit: Duration,
) -> Result<(), PipelineError> {
    let spawn_err = |source| PipelineError::Spawn {
        phase: phase.as_str(),
        program: program.to_path_buf(),
        source,
    };

    info!(phase = phase.as_str(), program = %program.display(), ?limit, "starting phase");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(spawn_err)?;

    let started = Instant::now();
    let mut relays: Vec<JoinHandle<()>> = [
        child.stdout.take().map(|out| tokio::spawn(relay(out, phase, false))),
        child.stderr.take().map(|err| tokio::spawn(relay(err, phase, true))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let status = match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => return Err(spawn_err(source)),
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!(phase = phase.as_str(), error = %e, "could not kill timed-out child");
            }
            // a grandchild may still hold the pipes open
            relays.iter().for_each(JoinHandle::abort);
            error!(phase = phase.as_str(), ?limit, "[ERROR] phase timed out");
            return Err(PipelineError::Timeout {
                phase: phase.as_str(),
                timeout: limit,
            });
        }
    };

    // a grandchild that inherited the pipes must not outlive the phase limit
    let remaining = limit.saturating_sub(started.elapsed());
    let drained = tokio::time::timeout(remaining, async {
        for handle in relays.iter_mut() {
            let _ = handle.await;
        }
    })
    .await;
    if drained.is_err() {
        relays.iter().for_each(JoinHandle::abort);
        warn!(phase = phase.as_str(), "child output still open after exit, stopped relaying");
    }

    if status.success() {
        info!(phase = phase.as_str(), "[OK] phase completed");
        Ok(())
    } else {
        error!(phase = phase.as_str(), code = ?status.code(), "[ERROR] phase failed");
        Err(PipelineError::NonZeroExit {
            phase: phase.as_str(),
            code: status.code(),
        })
    }
}

async fn relay<R: AsyncRead + Unpin>(reader: R, phase: Phase, is_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if line.trim().is_empty() {
                    continue;
                }
                if is_stderr {
                    warn!("{} {}", phase.tag(), line);
                } else {
                    info!("{} {}", phase.tag(), line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(phase = phase.as_str(), error = %e, "stopped reading child output");
                break;
            }
        }
    }
}

fn artifact_info(label: &'static str, path: &Path) -> Option<ArtifactInfo> {
    let meta = fs::metadata(path).ok()?;
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    Some(ArtifactInfo {
        label,
        path: path.to_path_buf(),
        size: meta.len(),
        modified: DateTime::<Local>::from(modified),
    })
}

/// Runs extraction then processing, one child at a time.
pub struct Pipeline {
    cfg: PipelineConfig,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Both phase executables exist and the downloads directory is usable.
    pub fn check_requirements(&self) -> Result<(), PipelineError> {
        for program in [self.cfg.fetch_program(), self.cfg.map_program()] {
            if !program.is_file() {
                error!(program = %program.display(), "[ERROR] required executable not found");
                return Err(PipelineError::Environment(format!(
                    "executable {:?} not found",
                    program
                )));
            }
        }
        fs::create_dir_all(&self.cfg.downloads_dir).map_err(|e| {
            PipelineError::Environment(format!(
                "cannot create downloads directory {:?}: {}",
                self.cfg.downloads_dir, e
            ))
        })?;
        info!("[OK] requirements satisfied");
        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self), fields(dest = %self.cfg.source_file.display()))]
    pub async fn run_extraction(&self) -> Result<PathBuf> {
        let file_name = self
            .cfg
            .source_file
            .file_name()
            .map(OsString::from)
            .with_context(|| format!("{:?} has no file name", self.cfg.source_file))?;
        let args = vec![
            OsString::from("--downloads-dir"),
            self.cfg.downloads_dir.clone().into_os_string(),
            OsString::from("--file-name"),
            file_name,
        ];
        run_phase(
            Phase::Extraction,
            &self.cfg.fetch_program(),
            &args,
            self.cfg.fetch_timeout,
        )
        .await?;

        if !self.cfg.source_file.is_file() {
            match self.adopt_newest_download()? {
                Some(from) => warn!(
                    from = %from.display(),
                    to = %self.cfg.source_file.display(),
                    "report saved under another name, renamed"
                ),
                None => {
                    error!(path = %self.cfg.source_file.display(), "[ERROR] report not found");
                    return Err(PipelineError::MissingArtifact {
                        phase: Phase::Extraction.as_str(),
                        path: self.cfg.source_file.clone(),
                    }
                    .into());
                }
            }
        }
        if let Some(info) = artifact_info("source", &self.cfg.source_file) {
            info!(size = info.size, "[OK] report downloaded");
        }
        Ok(self.cfg.source_file.clone())
    }

    /// Rename the most recently modified spreadsheet in the downloads
    /// directory to the expected report name. Returns the path it was renamed from.
    fn adopt_newest_download(&self) -> Result<Option<PathBuf>> {
        let dir = Pattern::escape(&self.cfg.downloads_dir.to_string_lossy());
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for ext in ["xls", "xlsx"] {
            let pattern = format!("{}/*.{}", dir, ext);
            for entry in glob(&pattern).with_context(|| format!("bad glob {}", pattern))? {
                let Ok(path) = entry else { continue };
                let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) else {
                    continue;
                };
                if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                    newest = Some((modified, path));
                }
            }
        }
        let Some((_, path)) = newest else {
            return Ok(None);
        };
        fs::rename(&path, &self.cfg.source_file).with_context(|| {
            format!("renaming {:?} to {:?}", path, self.cfg.source_file)
        })?;
        Ok(Some(path))
    }

    #[tracing::instrument(level = "info", skip(self), fields(output = %self.cfg.output_file.display()))]
    pub async fn run_processing(&self) -> Result<PathBuf> {
        let args = vec![
            OsString::from("--input"),
            self.cfg.source_file.clone().into_os_string(),
            OsString::from("--output"),
            self.cfg.output_file.clone().into_os_string(),
        ];
        run_phase(
            Phase::Processing,
            &self.cfg.map_program(),
            &args,
            self.cfg.map_timeout,
        )
        .await?;

        if !self.cfg.output_file.is_file() {
            error!(path = %self.cfg.output_file.display(), "[ERROR] output not found");
            return Err(PipelineError::MissingArtifact {
                phase: Phase::Processing.as_str(),
                path: self.cfg.output_file.clone(),
            }
            .into());
        }
        info!("[OK] output written");
        Ok(self.cfg.output_file.clone())
    }

    /// Log size and modification time of both artifacts.
    pub fn summary(&self) -> Vec<ArtifactInfo> {
        let mut found = Vec::new();
        for (label, path) in [
            ("source", &self.cfg.source_file),
            ("output", &self.cfg.output_file),
        ] {
            match artifact_info(label, path) {
                Some(info) => {
                    info!(
                        file = label,
                        path = %info.path.display(),
                        size = info.size,
                        modified = %info.modified.format("%Y-%m-%d %H:%M:%S"),
                        "artifact"
                    );
                    found.push(info);
                }
                None => warn!(file = label, path = %path.display(), "artifact missing"),
            }
        }
        found
    }

    /// Prune old pipeline logs. Never fails the run.
    pub fn cleanup(&self) {
        match retention::remove_old_logs(&self.cfg.log_dir, self.cfg.retention, SystemTime::now()) {
            Ok(removed) => info!(removed = removed.len(), "log cleanup done"),
            Err(e) => warn!(error = %format!("{:#}", e), "log cleanup failed"),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let started = Instant::now();

        // ─── 1) environment ──────────────────────────────────────────────
        self.check_requirements()?;

        // ─── 2) extraction ───────────────────────────────────────────────
        info!("=== phase 1: data extraction ===");
        self.run_extraction().await?;

        // ─── 3) processing ───────────────────────────────────────────────
        info!("=== phase 2: data processing ===");
        self.run_processing().await?;

        // ─── 4) summary & housekeeping ───────────────────────────────────
        self.summary();
        if self.cfg.cleanup {
            self.cleanup();
        }

        info!(elapsed = ?started.elapsed(), "total execution time");
        Ok(())
    }
}
