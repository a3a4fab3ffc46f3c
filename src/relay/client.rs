//! Outbound relay client
//!
//! Sends shaped requests to the model runner and hands the answer back either
//! as one buffered string or as a lazy stream of text fragments. Transport
//! failures are retried with exponential backoff; HTTP error statuses are not.

use super::retry::{RetryDecision, RetryPolicy};
use super::sse::{decode_line, LineBuffer, StreamEvent};
use crate::config::Config;
use crate::shaper::EndpointKind;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::pin::Pin;
use tracing::{debug, warn};

/// Returned when a chat response carries a choice without message content
pub const NO_RESPONSE: &str = "No response generated";

/// Lazily produced text fragments. Dropping it closes the connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP Error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid JSON in response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Request failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<RelayError>,
    },
}

impl RelayError {
    /// Only transport-level failures (connect, timeout, body I/O) are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Transport(_))
    }

    fn into_final(self, attempt: u32) -> Self {
        if self.is_retryable() {
            RelayError::Exhausted {
                attempts: attempt + 1,
                source: Box::new(self),
            }
        } else {
            self
        }
    }
}

/// Caller-visible rendering of a failure
pub fn error_text(error: &impl std::fmt::Display) -> String {
    format!("Error: {}", error)
}

/// One fully built outbound call. Retries resend it unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRequest {
    pub kind: EndpointKind,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl RelayRequest {
    pub fn new(kind: EndpointKind, url: impl Into<String>, body: Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            kind,
            url: url.into(),
            headers,
            body,
        }
    }
}

/// Result of a dispatch
pub enum Reply {
    Text(String),
    Stream(FragmentStream),
}

impl Reply {
    /// Drain into one string, concatenating fragments in order.
    pub async fn into_text(self) -> String {
        match self {
            Reply::Text(text) => text,
            Reply::Stream(stream) => stream.collect::<Vec<_>>().await.concat(),
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Reply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Build the HTTP client shared by the relay and the model catalog.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(config.connection_timeout)
        .read_timeout(config.read_timeout)
        // Don't park connections; a dropped stream must close its socket
        .pool_max_idle_per_host(0)
        .build()
}

/// Relay client with retry
#[derive(Clone)]
pub struct Relay {
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl Relay {
    pub fn new(http: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    pub fn from_config(config: &Config) -> Result<Self, RelayError> {
        let http = build_http_client(config)?;
        Ok(Self::new(http, RetryPolicy::from_config(config)))
    }

    /// Send a request in buffered or streaming mode.
    pub async fn dispatch(&self, request: RelayRequest, streaming: bool) -> Reply {
        if streaming {
            Reply::Stream(self.stream(request))
        } else {
            Reply::Text(self.send(&request).await)
        }
    }

    /// Buffered call. Failures come back as `Error: ...` text.
    pub async fn send(&self, request: &RelayRequest) -> String {
        let mut attempt = 0;
        loop {
            debug!(
                kind = request.kind.as_str(),
                url = %request.url,
                attempt = attempt + 1,
                "Sending buffered request"
            );

            let error = match self.try_send(request).await {
                Ok(text) => return text,
                Err(e) => e,
            };

            match self.policy.decide(attempt, error.is_retryable()) {
                RetryDecision::Backoff(delay) => {
                    warn!(
                        attempt = attempt + 1,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Request attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    let error = error.into_final(attempt);
                    warn!(error = %error, "Request failed");
                    return error_text(&error);
                }
            }
        }
    }

    async fn try_send(&self, request: &RelayRequest) -> Result<String, RelayError> {
        let response = open(&self.http, request).await?;
        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        Ok(extract_text(&body))
    }

    /// Streaming call.
    ///
    /// A transport failure mid-stream restarts the request from scratch.
    /// Fragments already yielded from the failed attempt are not taken back.
    pub fn stream(&self, request: RelayRequest) -> FragmentStream {
        let http = self.http.clone();
        let policy = self.policy;

        Box::pin(async_stream::stream! {
            let mut attempt = 0;
            loop {
                debug!(
                    kind = request.kind.as_str(),
                    url = %request.url,
                    attempt = attempt + 1,
                    "Opening stream"
                );

                let error = match open(&http, &request).await {
                    Err(e) => e,
                    Ok(response) => {
                        let mut body = response.bytes_stream();
                        let mut lines = LineBuffer::new();
                        let mut failure = None;
                        let mut finished = false;

                        while !finished {
                            match body.next().await {
                                Some(Ok(chunk)) => {
                                    for line in lines.push(&chunk) {
                                        match decode_line(&line) {
                                            StreamEvent::Fragment(text) => yield text,
                                            StreamEvent::Done => {
                                                finished = true;
                                                break;
                                            }
                                            StreamEvent::Malformed(e) => {
                                                warn!(error = %e, line = %line, "Skipping malformed stream event");
                                            }
                                            StreamEvent::Skip => {}
                                        }
                                    }
                                }
                                Some(Err(e)) => {
                                    failure = Some(RelayError::from(e));
                                    finished = true;
                                }
                                None => {
                                    if let Some(line) = lines.finish() {
                                        match decode_line(&line) {
                                            StreamEvent::Fragment(text) => yield text,
                                            StreamEvent::Malformed(e) => {
                                                warn!(error = %e, line = %line, "Skipping malformed stream event");
                                            }
                                            StreamEvent::Done | StreamEvent::Skip => {}
                                        }
                                    }
                                    finished = true;
                                }
                            }
                        }

                        match failure {
                            None => return,
                            Some(e) => e,
                        }
                    }
                };

                match policy.decide(attempt, error.is_retryable()) {
                    RetryDecision::Backoff(delay) => {
                        warn!(
                            attempt = attempt + 1,
                            error = %error,
                            delay_ms = delay.as_millis() as u64,
                            "Stream attempt failed, restarting"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        let error = error.into_final(attempt);
                        warn!(error = %error, "Stream failed");
                        yield error_text(&error);
                        return;
                    }
                }
            }
        })
    }
}

/// Send the request and reject non-2xx statuses.
async fn open(
    http: &reqwest::Client,
    request: &RelayRequest,
) -> Result<reqwest::Response, RelayError> {
    let mut builder = http.post(&request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.json(&request.body).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Pull the answer out of a buffered response body.
///
/// Chat responses yield the first choice's message content; anything else
/// (embeddings, unexpected shapes) is returned as JSON text.
pub fn extract_text(body: &Value) -> String {
    let first_choice = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first());

    let Some(choice) = first_choice else {
        return body.to_string();
    };

    match choice.get("message").and_then(|m| m.get("content")) {
        Some(Value::String(content)) => content.clone(),
        None | Some(Value::Null) => NO_RESPONSE.to_string(),
        Some(other) => other.to_string(),
    }
}
