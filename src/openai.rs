//! Shared HTTP plumbing for OpenAI-compatible endpoints.
//!
//! Both the embedding adapter and the chat model talk to the same base URL
//! with the same bearer credential, and both classify failures the same way:
//!
//! | Failure | Error |
//! |---------|-------|
//! | HTTP 429 | [`Error::ProviderRateLimited`] |
//! | other non-2xx, network, decode | [`Error::ProviderUnavailable`] |
//! | deadline exceeded | [`Error::ProviderTimeout`] |
//!
//! Nothing in this module retries.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde_json::Value;

use rainbow_intel_core::{Error, Result};

use crate::config::ProviderConfig;

/// Authenticated client for one OpenAI-compatible deployment.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: &ProviderConfig, api_key: &str) -> anyhow::Result<Self> {
        // per-call deadlines only; a streamed completion may run past `timeout`
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout: config.timeout(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST a JSON body to `{base_url}{path}` and return the successful response.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Response> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(resp).await
    }
}

/// Classify a non-success response; pass successful ones through.
pub async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

pub fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = format!("HTTP {}: {}", status, truncate(body, 200));
    if status == StatusCode::TOO_MANY_REQUESTS {
        Error::ProviderRateLimited(detail)
    } else {
        Error::ProviderUnavailable(detail)
    }
}

pub fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::ProviderTimeout(err.to_string())
    } else {
        Error::ProviderUnavailable(err.to_string())
    }
}

/// Run `fut` under `deadline`, turning expiry into [`Error::ProviderTimeout`].
pub async fn with_deadline<T, F>(deadline: Duration, what: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::time::timeout(deadline, fut).await.map_err(|_| {
        Error::ProviderTimeout(format!("{} exceeded {}s", what, deadline.as_secs_f32()))
    })?
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// One event parsed from a `text/event-stream` body.
#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Reassembles SSE lines across arbitrary network chunk boundaries.
///
/// Bytes are buffered until a full line is available, so a multi-byte UTF-8
/// character or a `data:` payload split across two chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return every complete event it finishes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }
        events
    }
}

/// Extract the text delta from one streamed chat-completion chunk.
///
/// Chunks without text (role announcements, finish markers) yield `None`.
/// A payload that is not JSON, or that carries an `error` object, is a
/// [`Error::ProviderUnavailable`].
pub fn delta_content(data: &str) -> Result<Option<String>> {
    let json: Value = serde_json::from_str(data).map_err(|e| {
        Error::ProviderUnavailable(format!(
            "malformed stream chunk ({}): {}",
            e,
            truncate(data, 200)
        ))
    })?;

    if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
        let message = err["message"].as_str().unwrap_or("unknown error");
        return Err(Error::ProviderUnavailable(format!(
            "provider error in stream: {}",
            message
        )));
    }

    Ok(json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

/// Local stand-in for an OpenAI-compatible server, for adapter tests.
#[cfg(test)]
pub(crate) mod stub {
    use axum::Router;
    use tokio::net::TcpListener;

    use super::OpenAiClient;
    use crate::config::ProviderConfig;

    /// Serve `router` on an ephemeral port and return a client for it with
    /// a one second deadline.
    pub async fn client_for(router: Router) -> OpenAiClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let config = ProviderConfig {
            base_url,
            timeout_secs: 1,
            ..ProviderConfig::default()
        };
        OpenAiClient::new(&config, "sk-test").unwrap()
    }
}
