//! Fixed-recipe transcoding, duration measurement and metadata records.
use crate::error::{SongError, ToolError};
use crate::layout::LibraryPaths;
use crate::runner::{run_tool, split_command};
use crate::sanitize::{FilenameSuggestion, Sanitizer};
use crate::song::ValidSong;
use crate::summary::Route;
use anyhow::{Context, Result};
use lofty::file::AudioFile;
use lofty::probe::Probe;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output normalization parameters. Identical for every song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub loudnorm: &'static str,
    pub max_seconds: u32,
    pub fade_seconds: u32,
    pub channels: u32,
    pub codec: &'static str,
    pub bitrate: &'static str,
}

pub const NORMALIZATION_RECIPE: Recipe = Recipe {
    loudnorm: "loudnorm=I=-14:LRA=11:TP=-2",
    max_seconds: 180,
    fade_seconds: 5,
    channels: 1,
    codec: "libmp3lame",
    bitrate: "320k",
};

impl Recipe {
    /// Second at which the fade-out starts.
    ///
    /// The fade covers the last `fade_seconds` of the trimmed output, or of the
    /// source itself when it is shorter than the trim length.
    pub fn fade_start(&self, source: Option<Duration>) -> u32 {
        let full = self.max_seconds - self.fade_seconds;
        match source {
            Some(length) if length.as_secs() < u64::from(self.max_seconds) => {
                (length.as_secs() as u32).saturating_sub(self.fade_seconds)
            }
            _ => full,
        }
    }

    /// The single `-af` chain: loudness normalization, then the fade.
    pub fn filter_chain(&self, fade_start: u32) -> String {
        format!(
            "{},afade=t=out:st={fade_start}:d={}",
            self.loudnorm, self.fade_seconds
        )
    }
}

/// One transcode request.
#[derive(Debug)]
pub struct TranscodeJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub recipe: &'a Recipe,
    pub fade_start_secs: u32,
}

pub trait Transcoder {
    fn transcode(&self, job: &TranscodeJob<'_>) -> Result<(), ToolError>;
}

/// `ffmpeg` (or a compatible command line).
pub struct Ffmpeg {
    argv: Vec<String>,
    timeout: Duration,
}

impl Ffmpeg {
    pub fn from_command_line(command: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            argv: split_command(command)?,
            timeout,
        })
    }
}

impl Transcoder for Ffmpeg {
    fn transcode(&self, job: &TranscodeJob<'_>) -> Result<(), ToolError> {
        let mut argv = self.argv.clone();
        argv.extend(ffmpeg_args(job));
        let output = run_tool(&argv, None, self.timeout)?;
        tracing::debug!(
            output = %job.output.display(),
            duration_ms = output.duration.as_millis() as u64,
            "transcode finished"
        );
        Ok(())
    }
}

/// Arguments after the program name for one job.
pub fn ffmpeg_args(job: &TranscodeJob<'_>) -> Vec<String> {
    let recipe = job.recipe;
    vec![
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        job.input.display().to_string(),
        "-vn".to_string(),
        "-af".to_string(),
        recipe.filter_chain(job.fade_start_secs),
        "-t".to_string(),
        recipe.max_seconds.to_string(),
        "-ac".to_string(),
        recipe.channels.to_string(),
        "-c:a".to_string(),
        recipe.codec.to_string(),
        "-b:a".to_string(),
        recipe.bitrate.to_string(),
        job.output.display().to_string(),
    ]
}

/// Measures audio length.
pub trait DurationProbe {
    fn duration(&self, path: &Path) -> Result<Duration>;
}

/// Reads the length from container properties.
pub struct LoftyProbe;

impl DurationProbe for LoftyProbe {
    fn duration(&self, path: &Path) -> Result<Duration> {
        let tagged = Probe::open(path)
            .and_then(|probe| probe.read())
            .with_context(|| format!("read audio properties of {}", path.display()))?;
        Ok(tagged.properties().duration())
    }
}

/// Contents of `metadata.yaml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub artist: String,
    pub title: String,
    pub length_seconds: u64,
    pub year: String,
}

impl MetadataRecord {
    pub fn to_yaml(&self) -> String {
        format!(
            "artist: {}\ntitle: {}\nlength: {}\nyear: {}\n",
            yaml_scalar(&self.artist),
            yaml_scalar(&self.title),
            self.length_seconds,
            yaml_scalar(&self.year)
        )
    }
}

/// Plain scalar when unambiguous, otherwise a double-quoted one.
fn yaml_scalar(value: &str) -> String {
    const RESERVED: &[&str] = &["true", "false", "yes", "no", "on", "off", "null", "~"];
    let plain = value
        .chars()
        .next()
        .is_some_and(|first| first.is_alphanumeric())
        && value
            .chars()
            .all(|ch| ch.is_alphanumeric() || " -_.,'()&!".contains(ch))
        && !value.ends_with(' ')
        && !RESERVED.contains(&value.to_lowercase().as_str());
    if plain {
        value.to_string()
    } else {
        // JSON strings are valid YAML double-quoted scalars.
        serde_json::Value::String(value.to_string()).to_string()
    }
}

/// A song written to its output tree.
#[derive(Debug, Clone)]
pub struct ProcessedSong {
    pub mp3_path: PathBuf,
    pub metadata: MetadataRecord,
    pub route: Route,
    pub name: FilenameSuggestion,
}

pub struct Processor<'a> {
    transcoder: &'a dyn Transcoder,
    probe: &'a dyn DurationProbe,
    sanitizer: Sanitizer<'a>,
    paths: &'a LibraryPaths,
    /// Song directories already written in this run.
    claimed: HashSet<PathBuf>,
}

impl<'a> Processor<'a> {
    pub fn new(
        transcoder: &'a dyn Transcoder,
        probe: &'a dyn DurationProbe,
        sanitizer: Sanitizer<'a>,
        paths: &'a LibraryPaths,
    ) -> Self {
        Self {
            transcoder,
            probe,
            sanitizer,
            paths,
            claimed: HashSet::new(),
        }
    }

    /// Normalize `source` into `{route_dir}/{id}/{id}.mp3` and write its metadata.
    ///
    /// Identifiers are unique per route within a run: a second song with the
    /// same identifier gets `_2`, `_3`, ... appended.
    pub fn process(
        &mut self,
        source: &Path,
        song: &ValidSong,
        route: Route,
    ) -> Result<ProcessedSong, SongError> {
        let label = song.display_name();
        let failure = |reason: String| {
            tracing::error!(song = %label, reason = %reason, "processing failed");
            SongError::Processing {
                song: label.clone(),
                reason,
            }
        };

        let name = self.sanitizer.sanitize(&song.title, &song.artist);
        let identifier = self.claim_identifier(route, name.identifier());
        let song_dir = self.paths.route_dir(route).join(&identifier);
        fs::create_dir_all(&song_dir)
            .map_err(|err| failure(format!("create {}: {err}", song_dir.display())))?;
        let mp3_path = song_dir.join(format!("{identifier}.mp3"));
        let metadata_path = song_dir.join("metadata.yaml");

        let source_length = match self.probe.duration(source) {
            Ok(length) => Some(length),
            Err(err) => {
                tracing::debug!(
                    source = %source.display(),
                    error = %err,
                    "source length unknown; using full-length fade"
                );
                None
            }
        };
        let recipe = &NORMALIZATION_RECIPE;
        let job = TranscodeJob {
            input: source,
            output: &mp3_path,
            recipe,
            fade_start_secs: recipe.fade_start(source_length),
        };
        tracing::info!(song = %label, output = %mp3_path.display(), ?route, "transcoding");
        self.transcoder
            .transcode(&job)
            .map_err(|err| failure(format!("transcode: {err}")))?;

        let length = self
            .probe
            .duration(&mp3_path)
            .map_err(|err| failure(format!("measure duration: {err:#}")))?;

        let metadata = MetadataRecord {
            artist: song.artist.clone(),
            title: song.title.clone(),
            length_seconds: length.as_secs(),
            year: song.year.clone(),
        };
        fs::write(&metadata_path, metadata.to_yaml())
            .map_err(|err| failure(format!("write {}: {err}", metadata_path.display())))?;

        tracing::info!(
            song = %label,
            length_seconds = metadata.length_seconds,
            degraded_name = name.is_degraded(),
            "processed"
        );
        Ok(ProcessedSong {
            mp3_path,
            metadata,
            route,
            name,
        })
    }

    fn claim_identifier(&mut self, route: Route, base: &str) -> String {
        let root = self.paths.route_dir(route);
        let mut identifier = base.to_string();
        let mut n = 1;
        while !self.claimed.insert(root.join(&identifier)) {
            n += 1;
            identifier = format!("{base}_{n}");
        }
        if n > 1 {
            tracing::warn!(
                identifier = %base,
                renamed = %identifier,
                "identifier already used in this run; writing to a suffixed directory"
            );
        }
        identifier
    }
}
