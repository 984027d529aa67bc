//! Output routing and the run-level summary.
//!
//! The summary is an explicit accumulator owned by the pipeline driver and
//! handed to each stage by `&mut`; nothing here is global.
use crate::error::SongError;
use crate::song::Provenance;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const RUN_REPORT_SCHEMA_VERSION: u32 = 1;

/// Destination tree for a processed song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Trusted,
    Verification,
}

/// Searched sources always need a human to confirm them.
pub fn route_for(provenance: Provenance) -> Route {
    match provenance {
        Provenance::Authoritative => Route::Trusted,
        Provenance::AutoSearched => Route::Verification,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub original_input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_artist: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateSong {
    pub original_input: String,
    pub song: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongFailure {
    pub song: String,
    pub stage: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedEntry {
    pub song: String,
    pub route: Route,
    pub source: String,
    pub output: PathBuf,
    pub length_seconds: u64,
    /// Set when the directory name is the deterministic fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_name_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub processed: Vec<ProcessedEntry>,
    pub auto_searched: Vec<String>,
    pub validation_failed: Vec<ValidationFailure>,
    pub duplicates: Vec<DuplicateSong>,
    pub failures: Vec<SongFailure>,
}

impl RunSummary {
    pub fn record_validation_failure(
        &mut self,
        original_input: &str,
        suggested_artist: Option<String>,
    ) {
        self.validation_failed.push(ValidationFailure {
            original_input: original_input.to_string(),
            suggested_artist,
        });
    }

    pub fn record_duplicate(&mut self, original_input: &str, song: &str) {
        self.duplicates.push(DuplicateSong {
            original_input: original_input.to_string(),
            song: song.to_string(),
        });
    }

    pub fn record_auto_searched(&mut self, song: &str) {
        self.auto_searched.push(song.to_string());
    }

    pub fn record_failure(&mut self, song: &str, err: &SongError) {
        self.failures.push(SongFailure {
            song: song.to_string(),
            stage: err.stage(),
            error: err.to_string(),
        });
    }

    pub fn record_processed(&mut self, entry: ProcessedEntry) {
        self.processed.push(entry);
    }

    pub fn validation_failed_inputs(&self) -> Vec<&str> {
        self.validation_failed
            .iter()
            .map(|failure| failure.original_input.as_str())
            .collect()
    }

    /// Human-readable end-of-run report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let trusted = self
            .processed
            .iter()
            .filter(|entry| entry.route == Route::Trusted)
            .count();
        let _ = writeln!(
            out,
            "Processed {} song(s): {} trusted, {} awaiting verification.",
            self.processed.len(),
            trusted,
            self.processed.len() - trusted
        );
        for entry in &self.processed {
            let marker = match entry.route {
                Route::Trusted => "ok",
                Route::Verification => "verify",
            };
            let _ = writeln!(
                out,
                " [{marker}] {} ({}s) -> {}",
                entry.song,
                entry.length_seconds,
                entry.output.display()
            );
            if let Some(reason) = &entry.fallback_name_reason {
                let _ = writeln!(out, "          fallback name ({reason})");
            }
        }

        if !self.auto_searched.is_empty() {
            let _ = writeln!(
                out,
                "\nAuto-searched (check these sources in _verification_needed):"
            );
            for song in &self.auto_searched {
                let _ = writeln!(out, " - {song}");
            }
        }

        if !self.validation_failed.is_empty() {
            let _ = writeln!(out, "\nFailed validation (not processed):");
            for failure in &self.validation_failed {
                match &failure.suggested_artist {
                    Some(artist) => {
                        let _ = writeln!(
                            out,
                            " - {} (artist might be: {artist})",
                            failure.original_input
                        );
                    }
                    None => {
                        let _ = writeln!(out, " - {}", failure.original_input);
                    }
                }
            }
        }

        if !self.duplicates.is_empty() {
            let _ = writeln!(out, "\nDuplicates (skipped):");
            for duplicate in &self.duplicates {
                let _ = writeln!(
                    out,
                    " - {} (same as {})",
                    duplicate.original_input, duplicate.song
                );
            }
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "\nFailed:");
            for failure in &self.failures {
                let _ = writeln!(out, " - [{}] {}", failure.stage, failure.error);
            }
        }

        out
    }

    /// Persist the summary as pretty JSON.
    pub fn write_report(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct RunReport<'a> {
            schema_version: u32,
            generated_at_epoch_ms: u64,
            #[serde(flatten)]
            summary: &'a RunSummary,
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let report = RunReport {
            schema_version: RUN_REPORT_SCHEMA_VERSION,
            generated_at_epoch_ms: crate::util::now_epoch_ms(),
            summary: self,
        };
        let text = serde_json::to_string_pretty(&report).context("serialize run report")?;
        fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}
