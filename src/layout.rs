//! Filesystem layout of a song library root.
use crate::summary::Route;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const WORKING_DIR: &str = "Original Song Files";
const OUTPUT_DIR: &str = "Output";
const VERIFICATION_DIR: &str = "_verification_needed";
const LOGS_DIR: &str = "_logs";

/// Path helper rooted at the library root.
#[derive(Debug, Clone)]
pub struct LibraryPaths {
    root: PathBuf,
}

impl LibraryPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Download target for acquired source files.
    pub fn working_dir(&self) -> PathBuf {
        self.root.join(WORKING_DIR)
    }

    /// Trusted output tree.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Review tree for songs whose source was chosen heuristically.
    pub fn verification_dir(&self) -> PathBuf {
        self.output_dir().join(VERIFICATION_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir().join(LOGS_DIR)
    }

    pub fn oracle_log_path(&self) -> PathBuf {
        self.logs_dir().join("oracle_log.jsonl")
    }

    pub fn run_report_path(&self) -> PathBuf {
        self.logs_dir().join("run_report.json")
    }

    /// Output root a song lands in for the given route.
    pub fn route_dir(&self, route: Route) -> PathBuf {
        match route {
            Route::Trusted => self.output_dir(),
            Route::Verification => self.verification_dir(),
        }
    }

    /// Create the working, output and verification trees if absent.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.working_dir(),
            self.output_dir(),
            self.verification_dir(),
        ] {
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(())
    }
}
