use super::Oracle;
use crate::config::HttpOracleSettings;
use crate::error::OracleError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Oracle backed by an OpenAI-compatible `chat/completions` endpoint.
pub struct HttpOracle {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl HttpOracle {
    /// Build a client; the API key is read from the configured environment variable.
    pub fn new(settings: &HttpOracleSettings, timeout: Duration) -> Self {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env = %settings.api_key_env,
                "no API key in environment; sending unauthenticated oracle requests"
            );
        }
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(true)
            .build();
        Self {
            agent: config.into(),
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            api_key,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Oracle for HttpOracle {
    fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let start = Instant::now();
        let mut request = self.agent.post(self.endpoint.as_str());
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let mut response = request
            .send_json(&body)
            .map_err(|err| map_ureq_error(err, self.timeout))?;
        let reply: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| map_ureq_error(err, self.timeout))?;

        tracing::info!(
            endpoint = %self.endpoint,
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            "oracle request complete"
        );

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(OracleError::Empty)
    }
}

fn map_ureq_error(err: ureq::Error, timeout: Duration) -> OracleError {
    match err {
        ureq::Error::Timeout(_) => OracleError::TimedOut(timeout),
        ureq::Error::StatusCode(code) => OracleError::Status(code),
        other => OracleError::Transport(other.to_string()),
    }
}
