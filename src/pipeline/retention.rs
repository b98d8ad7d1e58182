// src/pipeline/retention.rs

use anyhow::{Context, Result};
use glob::{glob, Pattern};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::{info, warn};

use crate::logging::{LOG_FILE_PREFIX, LOG_FILE_SUFFIX};

/// Delete pipeline log files in `log_dir` last modified before `now - keep`.
///
/// Only `nabimfd_pipeline_*.log` is considered. A file that cannot be
/// inspected or removed is logged and skipped. Returns the removed paths.
pub fn remove_old_logs(log_dir: &Path, keep: Duration, now: SystemTime) -> Result<Vec<PathBuf>> {
    let cutoff = now.checked_sub(keep).unwrap_or(SystemTime::UNIX_EPOCH);
    let pattern = format!(
        "{}/{}*{}",
        Pattern::escape(&log_dir.to_string_lossy()),
        LOG_FILE_PREFIX,
        LOG_FILE_SUFFIX
    );

    let mut removed = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("bad log glob {}", pattern))? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "skipping unreadable log entry");
                continue;
            }
        };
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read log file age");
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "removed old log file");
                removed.push(path);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove old log file"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DAY: Duration = Duration::from_secs(86_400);

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, "log").unwrap();
        p
    }

    #[test]
    fn fresh_logs_are_kept() {
        let dir = tempdir().unwrap();
        let log = touch(dir.path(), "nabimfd_pipeline_20260101_120000.log");
        let removed = remove_old_logs(dir.path(), 7 * DAY, SystemTime::now()).unwrap();
        assert!(removed.is_empty());
        assert!(log.exists());
    }

    #[test]
    fn expired_logs_are_removed_and_others_untouched() {
        let dir = tempdir().unwrap();
        let old = touch(dir.path(), "nabimfd_pipeline_20200101_000000.log");
        let other_log = touch(dir.path(), "unrelated.log");
        let other_prefix = touch(dir.path(), "nabimfd_pipeline_notes.txt");

        // pretend eight days have passed since the files were written
        let later = SystemTime::now() + 8 * DAY;
        let removed = remove_old_logs(dir.path(), 7 * DAY, later).unwrap();

        assert_eq!(removed, vec![old.clone()]);
        assert!(!old.exists());
        assert!(other_log.exists());
        assert!(other_prefix.exists());
    }

    #[test]
    fn missing_dir_removes_nothing() {
        let dir = tempdir().unwrap();
        let removed =
            remove_old_logs(&dir.path().join("absent"), 7 * DAY, SystemTime::now()).unwrap();
        assert!(removed.is_empty());
    }
}
