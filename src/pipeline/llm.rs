//! Text-completion client seam.
//!
//! Every model-calling stage goes through `CompletionClient`. The HTTP
//! implementation talks to an OpenAI-compatible chat-completions endpoint;
//! `MockCompletionClient` is exported so host test suites can exercise the
//! pipeline without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Cannot reach completion service at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited by completion service")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Completion service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),
}

impl LlmError {
    /// Transient failures are retried under the retry policy; everything
    /// else surfaces to the stage boundary immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Connection(_) | LlmError::Timeout(_) | LlmError::RateLimited { .. } => true,
            LlmError::Status { status, .. } => *status >= 500,
            LlmError::MalformedResponse(_) | LlmError::JsonParsing(_) => false,
        }
    }
}

/// A text-completion service. One instance serves the summary,
/// classification, and checklist stages; a second, optionally absent
/// instance serves the critic.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct HttpCompletionClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpCompletionClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.1,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(LlmError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("Response contained no choices".into()))
    }
}

/// Mock completion client returning a configured queue of responses.
/// Once the queue is drained the last response repeats.
pub struct MockCompletionClient {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    fail_with_connection: bool,
}

impl MockCompletionClient {
    pub fn new(responses: Vec<&str>) -> Self {
        let queue: VecDeque<String> = responses.iter().map(|s| s.to_string()).collect();
        let last = queue.back().cloned().unwrap_or_default();
        Self {
            responses: Mutex::new(queue),
            last: Mutex::new(last),
            fail_with_connection: false,
        }
    }

    pub fn single(response: &str) -> Self {
        Self::new(vec![response])
    }

    /// A client whose every call fails with a connection error — simulates
    /// an unreachable service for fallback testing.
    pub fn unreachable() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            last: Mutex::new(String::new()),
            fail_with_connection: true,
        }
    }
}

impl CompletionClient for MockCompletionClient {
    fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
        if self.fail_with_connection {
            return Err(LlmError::Connection("mock://unreachable".into()));
        }
        let mut queue = self.responses.lock().expect("mock lock poisoned");
        match queue.pop_front() {
            Some(response) => {
                *self.last.lock().expect("mock lock poisoned") = response.clone();
                Ok(response)
            }
            None => Ok(self.last.lock().expect("mock lock poisoned").clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(LlmError::Connection("x".into()).is_transient());
        assert!(LlmError::Timeout(30).is_transient());
        assert!(LlmError::RateLimited { retry_after_secs: None }.is_transient());
        assert!(LlmError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!LlmError::Status { status: 400, body: String::new() }.is_transient());
        assert!(!LlmError::MalformedResponse("x".into()).is_transient());
        assert!(!LlmError::JsonParsing("x".into()).is_transient());
    }

    #[test]
    fn mock_client_pops_queue_then_repeats_last() {
        let client = MockCompletionClient::new(vec!["first", "second"]);
        assert_eq!(client.complete("s", "p").unwrap(), "first");
        assert_eq!(client.complete("s", "p").unwrap(), "second");
        assert_eq!(client.complete("s", "p").unwrap(), "second");
    }

    #[test]
    fn unreachable_mock_always_errors() {
        let client = MockCompletionClient::unreachable();
        assert!(matches!(
            client.complete("s", "p"),
            Err(LlmError::Connection(_))
        ));
    }

    #[test]
    fn http_client_trims_trailing_slash() {
        let client = HttpCompletionClient::new("https://api.example.com/", "key", "model-1", 60);
        assert_eq!(client.base_url, "https://api.example.com");
        assert_eq!(client.model(), "model-1");
    }
}
