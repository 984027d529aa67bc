//! Raw song list intake.
//!
//! Lines come from a file, stdin, the clipboard (via a paste command), or the
//! config's fallback list. A line may pin its source with a trailing URL after
//! ` | ` or a tab.
use crate::runner::{run_tool, split_command};
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

const PASTE_TIMEOUT: Duration = Duration::from_secs(10);

/// One input line, split into the text sent to the oracle and an optional
/// user-supplied source locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub text: String,
    pub locator: Option<String>,
}

impl RawEntry {
    #[cfg(test)]
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            locator: None,
        }
    }
}

/// Where the song list comes from.
#[derive(Debug, Clone)]
pub enum InputSource {
    File(PathBuf),
    Stdin,
    Clipboard { paste_command: String },
    Listed(Vec<String>),
}

impl InputSource {
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => format!("file {}", path.display()),
            Self::Stdin => "stdin".to_string(),
            Self::Clipboard { .. } => "clipboard".to_string(),
            Self::Listed(_) => "config song list".to_string(),
        }
    }
}

/// Read the raw text for a source.
pub fn read_input(source: &InputSource) -> Result<String> {
    match source {
        InputSource::File(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read song list {}", path.display())),
        InputSource::Stdin => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("read song list from stdin")?;
            Ok(text)
        }
        InputSource::Clipboard { paste_command } => {
            let argv = split_command(paste_command)?;
            let output = run_tool(&argv, None, PASTE_TIMEOUT)
                .with_context(|| format!("read clipboard via {paste_command}"))?;
            Ok(output.stdout_text())
        }
        InputSource::Listed(songs) => Ok(songs.join("\n")),
    }
}

/// Parse newline-separated songs. Blank lines are ignored and a repeated line
/// text keeps only its first occurrence.
pub fn parse_song_list(content: &str) -> Vec<RawEntry> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<RawEntry> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry = split_locator(line);
        if entry.text.is_empty() {
            continue;
        }
        if let Some(&index) = seen.get(&entry.text) {
            let kept = &entries[index];
            match dropped_locator(kept, &entry) {
                Some(dropped) => tracing::warn!(
                    line = %entry.text,
                    dropped_locator = dropped,
                    kept_locator = kept.locator.as_deref().unwrap_or("none"),
                    "repeated line ignored; its source is not used"
                ),
                None => tracing::debug!(line = %entry.text, "duplicate input line ignored"),
            }
            continue;
        }
        seen.insert(entry.text.clone(), entries.len());
        entries.push(entry);
    }
    entries
}

/// Locator carried by `repeat` that the first occurrence `kept` does not share.
fn dropped_locator<'a>(kept: &RawEntry, repeat: &'a RawEntry) -> Option<&'a str> {
    repeat
        .locator
        .as_deref()
        .filter(|locator| kept.locator.as_deref() != Some(*locator))
}

fn locator_regex() -> &'static Regex {
    static LOCATOR: OnceLock<Regex> = OnceLock::new();
    LOCATOR.get_or_init(|| {
        Regex::new(r"^(.*?)\s*(?:\t|\s\|\s)\s*(https?://\S+)$").expect("locator regex")
    })
}

fn split_locator(line: &str) -> RawEntry {
    if let Some(caps) = locator_regex().captures(line) {
        let text = caps[1].trim();
        if !text.is_empty() {
            return RawEntry {
                text: text.to_string(),
                locator: Some(caps[2].to_string()),
            };
        }
    }
    RawEntry {
        text: line.to_string(),
        locator: None,
    }
}
