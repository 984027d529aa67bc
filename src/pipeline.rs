//! End-to-end batch driver.
//!
//! Validation runs once for the whole list and is the only step allowed to
//! abort the run. Every later step works song by song, and a failure there
//! is recorded in the [`RunSummary`] before moving on.
use crate::acquire::{acquire, MediaSource};
use crate::input::RawEntry;
use crate::layout::LibraryPaths;
use crate::oracle::log::OracleLog;
use crate::oracle::Oracle;
use crate::processing::{DurationProbe, Processor, Transcoder};
use crate::sanitize::Sanitizer;
use crate::song::{build_valid_songs, Provenance};
use crate::summary::{route_for, ProcessedEntry, RunSummary};
use crate::validation::Validator;
use anyhow::Result;
use std::time::Duration;

/// External capabilities the pipeline drives.
pub struct Collaborators<'a> {
    pub oracle: &'a dyn Oracle,
    pub media: &'a dyn MediaSource,
    pub transcoder: &'a dyn Transcoder,
    pub probe: &'a dyn DurationProbe,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub retry_backoff: Duration,
    pub oracle_log: OracleLog,
}

/// How a run ended, short of a fatal error.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    EmptyInput,
    NothingValid(RunSummary),
}

/// Validate, acquire, process and route every entry.
///
/// Validation unavailability comes back as an error wrapping
/// [`crate::error::ValidationError`].
pub fn run_pipeline(
    entries: &[RawEntry],
    paths: &LibraryPaths,
    collaborators: &Collaborators<'_>,
    options: &PipelineOptions,
) -> Result<RunOutcome> {
    if entries.is_empty() {
        tracing::warn!("song list is empty; nothing to do");
        return Ok(RunOutcome::EmptyInput);
    }

    let texts: Vec<String> = entries.iter().map(|entry| entry.text.clone()).collect();
    tracing::info!(songs = texts.len(), "validating song list");
    let validator = Validator::new(
        collaborators.oracle,
        &options.oracle_log,
        options.retry_backoff,
    );
    let judgments = validator.validate(&texts)?;

    let mut summary = RunSummary::default();
    let songs = build_valid_songs(entries, judgments, &mut summary);
    tracing::info!(
        valid = songs.len(),
        invalid = summary.validation_failed.len(),
        duplicates = summary.duplicates.len(),
        "validation complete"
    );
    if songs.is_empty() {
        return Ok(RunOutcome::NothingValid(summary));
    }

    paths.ensure()?;
    let working_dir = paths.working_dir();
    let mut processor = Processor::new(
        collaborators.transcoder,
        collaborators.probe,
        Sanitizer::new(collaborators.oracle, &options.oracle_log),
        paths,
    );

    for (index, song) in songs.iter().enumerate() {
        let label = song.display_name();
        tracing::info!(
            song = %label,
            position = index + 1,
            total = songs.len(),
            "processing song"
        );

        let acquired = match acquire(collaborators.media, song, &working_dir) {
            Ok(acquired) => acquired,
            Err(err) => {
                summary.record_failure(&label, &err);
                continue;
            }
        };
        if acquired.provenance == Provenance::AutoSearched {
            summary.record_auto_searched(&label);
        }

        let route = route_for(acquired.provenance);
        match processor.process(&acquired.path, song, route) {
            Ok(processed) => summary.record_processed(ProcessedEntry {
                song: label,
                route: processed.route,
                source: acquired.locator,
                output: processed.mp3_path,
                length_seconds: processed.metadata.length_seconds,
                fallback_name_reason: processed
                    .name
                    .degraded_reason()
                    .map(|reason| reason.to_string()),
            }),
            Err(err) => summary.record_failure(&label, &err),
        }
    }

    Ok(RunOutcome::Completed(summary))
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
