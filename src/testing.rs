//! Fake collaborators shared by unit tests.
use crate::acquire::MediaSource;
use crate::error::{OracleError, ToolError};
use crate::oracle::Oracle;
use crate::processing::{DurationProbe, TranscodeJob, Transcoder};
use anyhow::{anyhow, Result};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Oracle replaying scripted validation replies; filename prompts get a fixed answer.
#[derive(Default)]
pub struct ScriptedOracle {
    validation_replies: RefCell<VecDeque<Result<String, OracleError>>>,
    filename_reply: Option<String>,
    validation_calls: Cell<usize>,
    filename_calls: Cell<usize>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.validation_replies
            .borrow_mut()
            .push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, err: OracleError) -> Self {
        self.validation_replies.borrow_mut().push_back(Err(err));
        self
    }

    pub fn with_filename(mut self, text: &str) -> Self {
        self.filename_reply = Some(text.to_string());
        self
    }

    pub fn validation_calls(&self) -> usize {
        self.validation_calls.get()
    }

    pub fn filename_calls(&self) -> usize {
        self.filename_calls.get()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        if prompt.contains("{\"filename\"") {
            self.filename_calls.set(self.filename_calls.get() + 1);
            return self.filename_reply.clone().ok_or(OracleError::Empty);
        }
        self.validation_calls.set(self.validation_calls.get() + 1);
        self.validation_replies
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(OracleError::Empty))
    }
}

/// Search/download stand-in that writes a placeholder file on fetch.
#[derive(Default)]
pub struct FakeMedia {
    search_results: HashMap<String, String>,
    fetch_fails: bool,
    write_nothing: bool,
    pub searches: RefCell<Vec<String>>,
    pub fetches: RefCell<Vec<(String, String)>>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, query: &str, id: &str) -> Self {
        self.search_results
            .insert(query.to_string(), format!("https://www.youtube.com/watch?v={id}"));
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    pub fn silent_fetch(mut self) -> Self {
        self.write_nothing = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.searches.borrow().len() + self.fetches.borrow().len()
    }
}

impl MediaSource for FakeMedia {
    fn search(&self, query: &str) -> Result<Option<String>, ToolError> {
        self.searches.borrow_mut().push(query.to_string());
        Ok(self.search_results.get(query).cloned())
    }

    fn fetch(&self, locator: &str, output_template: &str) -> Result<(), ToolError> {
        self.fetches
            .borrow_mut()
            .push((locator.to_string(), output_template.to_string()));
        if self.fetch_fails {
            return Err(ToolError::Failed {
                program: "yt-dlp".to_string(),
                status: "status 1".to_string(),
                stderr: "ERROR: Video unavailable".to_string(),
            });
        }
        if !self.write_nothing {
            let path = output_template.replace("%%", "%").replace("%(ext)s", "opus");
            std::fs::write(path, b"source audio").expect("write fake download");
        }
        Ok(())
    }
}

/// Transcoder stand-in that copies the input to the output path.
#[derive(Default)]
pub struct FakeTranscoder {
    fails: bool,
    pub jobs: RefCell<Vec<(PathBuf, PathBuf, u32)>>,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fails: true,
            jobs: RefCell::new(Vec::new()),
        }
    }
}

impl Transcoder for FakeTranscoder {
    fn transcode(&self, job: &TranscodeJob<'_>) -> Result<(), ToolError> {
        self.jobs.borrow_mut().push((
            job.input.to_path_buf(),
            job.output.to_path_buf(),
            job.fade_start_secs,
        ));
        if self.fails {
            return Err(ToolError::Failed {
                program: "ffmpeg".to_string(),
                status: "status 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }
        std::fs::copy(job.input, job.output).expect("copy fake transcode");
        Ok(())
    }
}

/// Probe answering with fixed source and output durations (keyed on `.mp3`).
pub struct FixedProbe {
    pub source: Option<Duration>,
    pub output: Option<Duration>,
}

impl DurationProbe for FixedProbe {
    fn duration(&self, path: &Path) -> Result<Duration> {
        let is_output = path.extension().and_then(|ext| ext.to_str()) == Some("mp3");
        let duration = if is_output { self.output } else { self.source };
        duration.ok_or_else(|| anyhow!("no duration for {}", path.display()))
    }
}
