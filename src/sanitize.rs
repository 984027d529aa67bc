//! Filesystem-safe song identifiers.
//!
//! The oracle proposes a short `artist_name_song_name` identifier as a JSON
//! object. Any failure along the way (oracle error, unparseable reply, a
//! suggestion that is empty once cleaned) degrades to a deterministic
//! transform of the artist and title, so naming can never stop the pipeline.
use crate::oracle::log::{OracleCallKind, OracleCallRecord, OracleLog};
use crate::oracle::Oracle;
use crate::util::strip_code_fences;
use serde::Deserialize;
use std::fmt;

const SUGGEST_FILENAME_PROMPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/suggest_filename.md"
));

const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Why the oracle's suggestion was not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    OracleFailed(String),
    Unparseable(String),
    Unusable,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OracleFailed(err) => write!(f, "oracle failed: {err}"),
            Self::Unparseable(err) => write!(f, "unparseable suggestion: {err}"),
            Self::Unusable => write!(f, "suggestion empty after cleaning"),
        }
    }
}

/// Outcome of naming one song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameSuggestion {
    Accepted(String),
    Degraded {
        identifier: String,
        reason: DegradedReason,
    },
}

impl FilenameSuggestion {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Accepted(identifier) => identifier,
            Self::Degraded { identifier, .. } => identifier,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn degraded_reason(&self) -> Option<&DegradedReason> {
        match self {
            Self::Accepted(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

#[derive(Deserialize)]
struct FilenameReply {
    filename: String,
}

/// Names songs through the oracle.
pub struct Sanitizer<'a> {
    oracle: &'a dyn Oracle,
    log: &'a OracleLog,
}

impl<'a> Sanitizer<'a> {
    pub fn new(oracle: &'a dyn Oracle, log: &'a OracleLog) -> Self {
        Self { oracle, log }
    }

    pub fn sanitize(&self, title: &str, artist: &str) -> FilenameSuggestion {
        let prompt = SUGGEST_FILENAME_PROMPT
            .replace("{artist}", artist)
            .replace("{title}", title);
        let record = OracleCallRecord::start(OracleCallKind::Filename, 1, &prompt);

        let reason = match self.oracle.complete(&prompt) {
            Err(err) => {
                self.log.record(&record.failed(err.to_string()));
                DegradedReason::OracleFailed(err.to_string())
            }
            Ok(response) => match parse_reply(&response) {
                Err(err) => {
                    self.log.record(&record.rejected(&response, err.to_string()));
                    DegradedReason::Unparseable(err.to_string())
                }
                Ok(reply) => match clean_suggestion(&reply.filename) {
                    Some(identifier) => {
                        self.log.record(&record.accepted(&response));
                        return FilenameSuggestion::Accepted(identifier);
                    }
                    None => {
                        self.log
                            .record(&record.rejected(&response, "empty filename"));
                        DegradedReason::Unusable
                    }
                },
            },
        };

        let identifier = fallback_identifier(artist, title);
        tracing::warn!(
            artist,
            title,
            identifier = %identifier,
            reason = %reason,
            "filename suggestion degraded; using fallback"
        );
        FilenameSuggestion::Degraded { identifier, reason }
    }
}

/// Replace characters that are invalid in paths (and control characters) with `_`.
pub fn replace_invalid_chars(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if INVALID_PATH_CHARS.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

/// Deterministic identifier from artist and title: `artist_title`, lowercased,
/// spaces and invalid characters replaced with `_`.
pub fn fallback_identifier(artist: &str, title: &str) -> String {
    normalize_identifier(&format!("{artist}_{title}"))
}

/// Idempotent normalization used by the fallback.
pub fn normalize_identifier(raw: &str) -> String {
    replace_invalid_chars(&trim_name(raw).to_lowercase()).replace(' ', "_")
}

fn trim_name(raw: &str) -> &str {
    raw.trim_matches(|ch: char| ch.is_whitespace() || ch == '.')
}

fn clean_suggestion(raw: &str) -> Option<String> {
    let cleaned = replace_invalid_chars(raw);
    let cleaned = trim_name(&cleaned);
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn parse_reply(response: &str) -> serde_json::Result<FilenameReply> {
    serde_json::from_str(&strip_code_fences(response))
}
