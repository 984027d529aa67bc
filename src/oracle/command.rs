use super::Oracle;
use crate::error::OracleError;
use crate::runner::{run_tool, split_command};
use anyhow::Result;
use std::time::Duration;

/// Oracle backed by a local command: prompt on stdin, reply on stdout.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandOracle {
    /// Build from a shell-style command line such as `claude -p --model haiku`.
    pub fn from_command_line(command: &str, timeout: Duration) -> Result<Self> {
        let argv = split_command(command)?;
        Ok(Self { argv, timeout })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

impl Oracle for CommandOracle {
    fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let output = run_tool(&self.argv, Some(prompt.as_bytes()), self.timeout)?;
        tracing::info!(
            program = %self.program(),
            elapsed_ms = output.duration.as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = output.stdout.len(),
            "oracle invoke complete"
        );
        let text = output.stdout_text();
        if text.trim().is_empty() {
            return Err(OracleError::Empty);
        }
        Ok(text)
    }
}
