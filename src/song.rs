//! Songs that survived validation.
use crate::input::RawEntry;
use crate::summary::RunSummary;
use crate::validation::ValidationJudgment;
use serde::Serialize;
use std::collections::HashSet;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_YEAR: &str = "Unknown Year";

/// Where a song's source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// The user supplied the locator.
    Authoritative,
    /// The locator was picked by a search.
    AutoSearched,
}

/// A song the oracle accepted, ready for acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSong {
    pub original_input: String,
    pub title: String,
    pub artist: String,
    pub year: String,
    /// User-supplied source, if any.
    pub locator: Option<String>,
}

impl ValidSong {
    /// `"{artist} - {title}"`, the search query and working file stem.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }

    fn key(&self) -> (String, String) {
        (self.artist.to_lowercase(), self.title.to_lowercase())
    }
}

/// Partition judgments into valid songs, recording rejected inputs and
/// duplicate canonical songs in `summary`.
///
/// `judgments` must be aligned with `entries` (one judgment per entry, same
/// order), which `validation::validate` guarantees.
pub fn build_valid_songs(
    entries: &[RawEntry],
    judgments: Vec<ValidationJudgment>,
    summary: &mut RunSummary,
) -> Vec<ValidSong> {
    let mut seen = HashSet::new();
    let mut songs = Vec::new();

    for (entry, judgment) in entries.iter().zip(judgments) {
        if !judgment.artist_correct {
            tracing::warn!(
                input = %judgment.original_input,
                suggested_artist = judgment.correct_artist.as_deref().unwrap_or("Unknown"),
                "incorrect artist; song will not be processed"
            );
            summary.record_validation_failure(&judgment.original_input, judgment.correct_artist);
            continue;
        }

        let title = if judgment.song_name.trim().is_empty() {
            entry.text.clone()
        } else {
            judgment.song_name.trim().to_string()
        };
        let song = ValidSong {
            original_input: judgment.original_input,
            title,
            artist: judgment
                .correct_artist
                .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            year: judgment
                .release_year
                .unwrap_or_else(|| UNKNOWN_YEAR.to_string()),
            locator: entry.locator.clone(),
        };

        if !seen.insert(song.key()) {
            tracing::warn!(
                input = %song.original_input,
                song = %song.display_name(),
                "input resolves to a song already in this run; skipping"
            );
            summary.record_duplicate(&song.original_input, &song.display_name());
            continue;
        }
        songs.push(song);
    }

    songs
}
