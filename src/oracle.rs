//! Correction oracle backends.
//!
//! The oracle is an opaque text-in/text-out service. Rather than binding to a
//! single provider, the pipeline talks to it through the [`Oracle`] trait:
//!
//! - [`CommandOracle`] pipes the prompt into a user-configured command (e.g.
//!   `claude -p`, `llm`, `ollama run`) and reads the reply from stdout.
//! - [`HttpOracle`] posts the prompt to an OpenAI-compatible
//!   `chat/completions` endpoint.
//!
//! Both enforce a timeout. Parsing and retry policy live with the callers
//! (`validation`, `sanitize`), which also record each call in the oracle log.
mod command;
mod http;
pub mod log;

pub use command::CommandOracle;
pub use http::HttpOracle;

use crate::error::OracleError;

/// A request/response text service.
pub trait Oracle {
    fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}
