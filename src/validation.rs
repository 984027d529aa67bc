//! Batched song/artist validation against the correction oracle.
//!
//! The whole input list goes out in one prompt and must come back as a JSON
//! array holding exactly one judgment per input. Replies that fail to parse
//! (malformed JSON, a non-array, missing or extra judgments) are retried a
//! bounded number of times; if none succeeds the run cannot continue, since no
//! song can be trusted without a judgment.
use crate::error::ValidationError;
use crate::oracle::log::{OracleCallKind, OracleCallRecord, OracleLog};
use crate::oracle::Oracle;
use crate::util::{strip_code_fences, truncate_string};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Total oracle calls made before validation is declared unavailable.
pub const MAX_VALIDATION_ATTEMPTS: usize = 3;

const RAW_RESPONSE_LOG_BYTES: usize = 2000;

const VALIDATE_SONGS_PROMPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/validate_songs.md"
));

/// The oracle's verdict on one input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationJudgment {
    pub original_input: String,
    pub song_name: String,
    pub artist_correct: bool,
    #[serde(default, deserialize_with = "optional_text")]
    pub correct_artist: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub release_year: Option<String>,
}

/// Accept a string, a number (years often come back unquoted), or null.
fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => {
            let text = text.trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        }
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string, number or null, got {other}"
        ))),
    }
}

/// Validates song lists through an oracle.
pub struct Validator<'a> {
    oracle: &'a dyn Oracle,
    log: &'a OracleLog,
    backoff: Duration,
}

impl<'a> Validator<'a> {
    pub fn new(oracle: &'a dyn Oracle, log: &'a OracleLog, backoff: Duration) -> Self {
        Self {
            oracle,
            log,
            backoff,
        }
    }

    /// Return one judgment per song, in input order.
    pub fn validate(&self, songs: &[String]) -> Result<Vec<ValidationJudgment>, ValidationError> {
        let prompt = build_validation_prompt(songs);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=MAX_VALIDATION_ATTEMPTS {
            let record = OracleCallRecord::start(OracleCallKind::Validation, attempt, &prompt);
            match self.oracle.complete(&prompt) {
                Ok(response) => match parse_judgments(&response, songs) {
                    Ok(judgments) => {
                        self.log.record(&record.accepted(&response));
                        if attempt > 1 {
                            tracing::info!(attempt, "oracle validation succeeded after retry");
                        }
                        return Ok(judgments);
                    }
                    Err(err) => {
                        tracing::warn!(
                            attempt,
                            max_attempts = MAX_VALIDATION_ATTEMPTS,
                            error = %err,
                            "oracle returned unusable validation JSON"
                        );
                        tracing::debug!(
                            raw_response = %truncate_string(&response, RAW_RESPONSE_LOG_BYTES),
                            "raw oracle response"
                        );
                        self.log.record(&record.rejected(&response, err.as_str()));
                        last_error = err;
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = MAX_VALIDATION_ATTEMPTS,
                        error = %err,
                        "oracle validation call failed"
                    );
                    self.log.record(&record.failed(err.to_string()));
                    last_error = err.to_string();
                }
            }

            if attempt < MAX_VALIDATION_ATTEMPTS && !self.backoff.is_zero() {
                std::thread::sleep(self.backoff);
            }
        }

        Err(ValidationError::Unavailable {
            attempts: MAX_VALIDATION_ATTEMPTS,
            last_error,
        })
    }
}

fn build_validation_prompt(songs: &[String]) -> String {
    VALIDATE_SONGS_PROMPT.replace("{song_list}", &songs.join("\n"))
}

/// Parse a reply into judgments aligned with `songs`.
fn parse_judgments(response: &str, songs: &[String]) -> Result<Vec<ValidationJudgment>, String> {
    let text = strip_code_fences(response);
    let value: Value =
        serde_json::from_str(&text).map_err(|err| format!("response is not JSON: {err}"))?;
    if !value.is_array() {
        return Err("expected a JSON array of judgments".to_string());
    }
    let judgments: Vec<ValidationJudgment> =
        serde_json::from_value(value).map_err(|err| format!("malformed judgment: {err}"))?;

    if judgments.len() != songs.len() {
        return Err(format!(
            "expected {} judgments, got {}",
            songs.len(),
            judgments.len()
        ));
    }

    let mut by_input: HashMap<String, ValidationJudgment> = HashMap::new();
    for judgment in judgments {
        let key = judgment.original_input.trim().to_string();
        if by_input.insert(key.clone(), judgment).is_some() {
            return Err(format!("duplicate judgment for {key:?}"));
        }
    }

    songs
        .iter()
        .map(|song| {
            by_input
                .remove(song.trim())
                .ok_or_else(|| format!("no judgment for {song:?}"))
        })
        .collect()
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
