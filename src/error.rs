//! Failure kinds callers branch on. Everything else travels as `anyhow::Error`.

use std::{path::PathBuf, time::Duration};

/// Fetcher failures that abort the form workflow.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("{step}: no element matched any of {tried:?}")]
    ElementNotFound {
        step: &'static str,
        tried: Vec<&'static str>,
    },

    #[error("{0}: the page has no form")]
    MissingForm(&'static str),

    #[error("{step}: control `{control}` has no name to submit")]
    UnnamedControl { step: &'static str, control: String },

    #[error("{step}: control `{control}` neither posts back nor links anywhere")]
    DeadControl { step: &'static str, control: String },

    #[error("no borrowing type could be selected")]
    NoBorrowingTypes,

    #[error("download returned an HTML page instead of the report")]
    NotAReport,
}

/// Sequencer failures. Each one aborts the pipeline at the phase it names.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("requirement missing: {0}")]
    Environment(String),

    #[error("{phase}: could not start {program:?}: {source}")]
    Spawn {
        phase: &'static str,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{phase}: exited with status {code:?}")]
    NonZeroExit {
        phase: &'static str,
        code: Option<i32>,
    },

    #[error("{phase}: timed out after {timeout:?}")]
    Timeout {
        phase: &'static str,
        timeout: Duration,
    },

    #[error("{phase}: expected artifact {path:?} not found")]
    MissingArtifact { phase: &'static str, path: PathBuf },
}
