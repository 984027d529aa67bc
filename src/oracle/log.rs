//! Oracle call log.
//!
//! Every oracle call is appended to `Output/_logs/oracle_log.jsonl` as one
//! JSON line so a run's validation and naming decisions can be audited:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"kind":"validation","attempt":1,"duration_ms":4200,"outcome":"rejected",...}
//! {"schema_version":1,"ts":1707900004300,"kind":"validation","attempt":2,"duration_ms":3900,"outcome":"accepted",...}
//! ```
//!
//! A log that cannot be written never fails the run.
use crate::util::{now_epoch_ms, truncate_string};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

pub const ORACLE_LOG_SCHEMA_VERSION: u32 = 1;

const PREVIEW_BYTES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleCallKind {
    /// Batched song/artist validation.
    Validation,
    /// Filename suggestion for one song.
    Filename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleOutcome {
    /// Reply parsed and was used.
    Accepted,
    /// Reply arrived but could not be used.
    Rejected,
    /// No reply (transport failure, timeout, empty output).
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleLogEntry {
    pub schema_version: u32,
    pub ts: u64,
    pub kind: OracleCallKind,
    pub attempt: usize,
    pub duration_ms: u64,
    pub outcome: OracleOutcome,
    pub prompt_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
}

/// Times one oracle call and finishes into a log entry.
pub struct OracleCallRecord {
    start: Instant,
    ts: u64,
    kind: OracleCallKind,
    attempt: usize,
    prompt_bytes: usize,
}

impl OracleCallRecord {
    pub fn start(kind: OracleCallKind, attempt: usize, prompt: &str) -> Self {
        Self {
            start: Instant::now(),
            ts: now_epoch_ms(),
            kind,
            attempt,
            prompt_bytes: prompt.len(),
        }
    }

    pub fn accepted(self, response: &str) -> OracleLogEntry {
        self.build(OracleOutcome::Accepted, Some(response), None)
    }

    pub fn rejected(self, response: &str, error: impl Into<String>) -> OracleLogEntry {
        self.build(OracleOutcome::Rejected, Some(response), Some(error.into()))
    }

    pub fn failed(self, error: impl Into<String>) -> OracleLogEntry {
        self.build(OracleOutcome::Failed, None, Some(error.into()))
    }

    fn build(
        self,
        outcome: OracleOutcome,
        response: Option<&str>,
        error: Option<String>,
    ) -> OracleLogEntry {
        // Previews only for replies that were rejected.
        let response_preview = match outcome {
            OracleOutcome::Rejected => response.map(|text| truncate_string(text, PREVIEW_BYTES)),
            _ => None,
        };
        OracleLogEntry {
            schema_version: ORACLE_LOG_SCHEMA_VERSION,
            ts: self.ts,
            kind: self.kind,
            attempt: self.attempt,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            prompt_bytes: self.prompt_bytes,
            response_bytes: response.map(str::len),
            error,
            response_preview,
        }
    }
}

/// Append-only JSONL sink; a disabled log drops entries.
#[derive(Debug, Clone, Default)]
pub struct OracleLog {
    path: Option<PathBuf>,
}

impl OracleLog {
    pub fn at(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Append an entry, reporting write failures as warnings.
    pub fn record(&self, entry: &OracleLogEntry) {
        if let Err(err) = self.append(entry) {
            tracing::warn!(error = %format!("{err:#}"), "could not write oracle log entry");
        }
    }

    fn append(&self, entry: &OracleLogEntry) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create oracle log directory")?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open oracle log for append: {}", path.display()))?;
        let line = serde_json::to_string(entry).context("serialize oracle log entry")?;
        writeln!(file, "{line}").context("write oracle log entry")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs/oracle_log.jsonl");
        let log = OracleLog::at(path.clone());

        let first = OracleCallRecord::start(OracleCallKind::Validation, 1, "prompt")
            .rejected("not json", "expected a JSON array");
        let second =
            OracleCallRecord::start(OracleCallKind::Validation, 2, "prompt").accepted("[]");
        log.record(&first);
        log.record(&second);

        let text = std::fs::read_to_string(&path).expect("read log");
        let entries: Vec<OracleLogEntry> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("parse entry"))
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].outcome, OracleOutcome::Rejected);
        assert_eq!(entries[0].response_preview.as_deref(), Some("not json"));
        assert_eq!(entries[1].attempt, 2);
        assert_eq!(entries[1].response_bytes, Some(2));
        assert!(entries[1].response_preview.is_none());
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let log = OracleLog::disabled();
        log.record(&OracleCallRecord::start(OracleCallKind::Filename, 1, "p").failed("boom"));
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let entry = OracleCallRecord::start(OracleCallKind::Filename, 1, "p").failed("timeout");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["kind"], "filename");
        assert_eq!(value["outcome"], "failed");
        assert!(value.get("response_bytes").is_none());
    }
}
