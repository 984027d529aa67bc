//! Shared test infrastructure for integration tests.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::io::Write;
use tempfile::TempDir;

/// A scratch library root plus a config wiring songprep to the canned oracle
/// and recording tool stand-ins.
pub struct Harness {
    temp_dir: TempDir,
    pub config_path: PathBuf,
}

/// Result of one songprep invocation.
#[derive(Debug)]
pub struct RunResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

fn script_command(script: &str, args: &[&str]) -> String {
    let script = manifest_dir().join("tests").join(script);
    let mut words = vec!["sh".to_string(), script.display().to_string()];
    words.extend(args.iter().map(|arg| arg.to_string()));
    shell_words::join(words)
}

impl Harness {
    /// Harness whose oracle replays `tests/fixtures/{fixture}`.
    pub fn new(fixture: &str) -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let fixture_dir = manifest_dir().join("tests/fixtures").join(fixture);
        let fixture_arg = fixture_dir.display().to_string();
        let config = serde_json::json!({
            "schema_version": 1,
            "root": temp_dir.path().join("library"),
            "oracle": {
                "command": script_command("mock-oracle.sh", &[&fixture_arg]),
                "retry_backoff_ms": 0
            },
            "tools": {
                "downloader": script_command("record-call.sh", &["yt-dlp"]),
                "transcoder": script_command("record-call.sh", &["ffmpeg"])
            },
            "timeouts": {
                "oracle_secs": 10,
                "search_secs": 10,
                "download_secs": 10,
                "transcode_secs": 10
            }
        });
        let config_path = temp_dir.path().join("songprep.json");
        std::fs::write(&config_path, serde_json::to_vec_pretty(&config)?)?;
        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    pub fn state_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn library_root(&self) -> PathBuf {
        self.temp_dir.path().join("library")
    }

    /// Number of validation prompts the canned oracle answered.
    pub fn validation_calls(&self) -> u32 {
        std::fs::read_to_string(self.state_dir().join("validation_calls"))
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Argv lines recorded by the yt-dlp/ffmpeg stand-ins.
    pub fn tool_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.state_dir().join("tool_calls"))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Files anywhere under `dir` with the given extension.
    pub fn files_with_extension(&self, dir: &Path, ext: &str) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return found;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(self.files_with_extension(&path, ext));
            } else if path.extension().and_then(|e| e.to_str()) == Some(ext) {
                found.push(path);
            }
        }
        found
    }

    /// Run songprep with the song list piped on stdin.
    pub fn run_with_stdin(&self, songs: &str) -> anyhow::Result<RunResult> {
        let mut child = Command::new(env!("CARGO_BIN_EXE_songprep"))
            .arg("--config")
            .arg(&self.config_path)
            .arg("--input")
            .arg("-")
            .arg("--skip-preflight")
            .env("SONGPREP_MOCK_STATE_DIR", self.state_dir())
            .env("SONGPREP_LOG", "debug")
            .env_remove("SONGPREP_ORACLE_COMMAND")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(songs.as_bytes())?;
        }
        let Output {
            status,
            stdout,
            stderr,
        } = child.wait_with_output()?;
        Ok(RunResult {
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}
