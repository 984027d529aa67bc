//! Error taxonomy for the song pipeline.
//!
//! Only [`ValidationError`] is fatal for a run. Everything a single song can
//! hit is a [`SongError`] and is recorded in the run summary instead of
//! propagated.
use std::time::Duration;
use thiserror::Error;

/// Failure invoking an external program.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Failure talking to the correction oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle command failed: {0}")]
    Command(#[from] ToolError),

    #[error("oracle request timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("oracle returned HTTP status {0}")]
    Status(u16),

    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("oracle returned an empty reply")]
    Empty,
}

/// The oracle never produced a usable batch of judgments.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(
        "validation unavailable: no parseable judgments after {attempts} attempts (last error: {last_error})"
    )]
    Unavailable { attempts: usize, last_error: String },
}

/// Per-song failure. Recorded and reported, never aborts the batch.
#[derive(Debug, Error)]
pub enum SongError {
    #[error("no search result for {query:?}")]
    NotFound { query: String },

    #[error("acquisition failed for {song}: {reason}")]
    Acquisition { song: String, reason: String },

    #[error("processing failed for {song}: {reason}")]
    Processing { song: String, reason: String },
}

impl SongError {
    /// Stage label used in summaries and logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Acquisition { .. } => "acquisition",
            Self::Processing { .. } => "processing",
        }
    }
}
