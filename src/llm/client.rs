// src/llm/client.rs
// Streaming chat client for the local Ollama server (/api/chat NDJSON)

use crate::error::{Result, TutorError};
use crate::http::{create_fast_client, create_stream_client};
use crate::llm::decoder::decode_lines;
use crate::llm::types::{
    GenerateRequest, GenerateResponse, Role, StreamEvent, StreamOutcome, StreamRequest, Turn,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Default Ollama endpoint
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model tag
pub const DEFAULT_MODEL: &str = "NicoleShelterV1";

/// Shown to the user (through the chunk callback) when the server can't be reached
pub const DEFAULT_FALLBACK_MESSAGE: &str = "(Pet can't be heard...)";

/// Max characters of a malformed line echoed into the log
const LOG_LINE_PREVIEW: usize = 200;

/// Strip trailing slashes and a `/v1` suffix (OpenAI-compat URLs work too)
pub(crate) fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim_end_matches('/').to_string();
    if url.ends_with("/v1") {
        url.truncate(url.len() - 3);
    }
    url.trim_end_matches('/').to_string()
}

/// Check if a URL points to a local address (localhost, 127.0.0.1, [::1])
pub(crate) fn is_local_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host() {
            Some(url::Host::Domain(d)) => d == "localhost",
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            None => true,
        },
        Err(_) => true,
    }
}

struct InFlight {
    id: u64,
    token: CancellationToken,
}

/// Clears the in-flight slot when a request ends, however it ends.
/// Only clears it if the slot still belongs to this request.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<InFlight>>,
    id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|f| f.id == self.id) {
            *slot = None;
        }
    }
}

/// Client for one logical generation at a time.
///
/// Starting a request while another is still streaming cancels the older
/// one first and asks the server to stop generating, so at most one stream
/// is ever live per client.
pub struct ChatStreamClient {
    base_url: String,
    model: String,
    fallback_message: String,
    http: reqwest::Client,
    control: reqwest::Client,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
}

impl ChatStreamClient {
    /// Create a client with the default model
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_model(base_url, DEFAULT_MODEL)
    }

    /// Create a client with a custom model
    pub fn with_model(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let normalized = normalize_base_url(&base_url.into());

        if !is_local_url(&normalized) {
            warn!(
                "OLLAMA_HOST points to non-local address '{}'. The tutor expects a local server.",
                normalized
            );
        }

        Self {
            base_url: normalized,
            model: model.into(),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            http: create_stream_client(),
            control: create_fast_client(),
            in_flight: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Override the message delivered to the chunk callback on transport failure
    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }

    /// Whether a generation is currently streaming
    pub fn is_busy(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Stream a chat completion, forwarding each text fragment to `on_chunk`.
    ///
    /// Returns `Completed` with the full text, or `Cancelled` with whatever had
    /// arrived when a newer request (or [`cancel`](Self::cancel)) pre-empted
    /// this one. Transport failures deliver the fallback message to `on_chunk`
    /// and return `TutorError::Transport`.
    #[instrument(skip_all, fields(request_id, model = %self.model, turn_count = turns.len()))]
    pub async fn send<F>(&self, turns: &[Turn], mut on_chunk: F) -> Result<StreamOutcome>
    where
        F: FnMut(&str),
    {
        validate_turns(turns)?;

        let request_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());

        let (id, token, preempted) = self.begin();
        let _guard = InFlightGuard {
            slot: &self.in_flight,
            id,
        };

        if preempted {
            warn!(request_id = %request_id, "Previous request was aborted");
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(request_id = %request_id, "Pre-empted while stopping the previous generation");
                    return Ok(StreamOutcome::Cancelled(String::new()));
                }
                _ = self.request_shutdown() => {}
            }
        }

        let start = Instant::now();
        let url = format!("{}/api/chat", self.base_url);
        let body = StreamRequest::new(&self.model, turns);

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(request_id = %request_id, "Cancelled before the server answered");
                return Ok(StreamOutcome::Cancelled(String::new()));
            }
            res = self.http.post(&url).json(&body).send() => res,
        };

        let response = match sent.and_then(|r| r.error_for_status()) {
            Ok(r) => r,
            Err(e) => {
                return Err(self.fail(&mut on_chunk, &request_id, format!("Connection failed: {}", e)));
            }
        };

        let mut accumulated = String::new();
        let mut lines = std::pin::pin!(decode_lines(response.bytes_stream()));
        let mut chunk_count = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(
                        request_id = %request_id,
                        partial_len = accumulated.len(),
                        "Generation cancelled mid-stream"
                    );
                    return Ok(StreamOutcome::Cancelled(accumulated));
                }
                next = lines.next() => next,
            };

            let line = match next {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    return Err(self.fail(&mut on_chunk, &request_id, format!("Stream interrupted: {}", e)));
                }
                None => break,
            };

            if line.trim().is_empty() {
                continue;
            }

            let event: StreamEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    error!(
                        request_id = %request_id,
                        error = %e,
                        line = %preview(&line),
                        "Malformed stream line, skipping"
                    );
                    continue;
                }
            };

            // Content on the terminal event is not part of the reply
            if event.done {
                break;
            }

            if let Some(content) = event.content() {
                on_chunk(content);
                accumulated.push_str(content);
                chunk_count += 1;
            }
        }

        info!(
            request_id = %request_id,
            duration_ms = start.elapsed().as_millis() as u64,
            chunks = chunk_count,
            content_len = accumulated.len(),
            "Ollama chat complete"
        );

        Ok(StreamOutcome::Completed(accumulated))
    }

    /// Cancel the in-flight generation, if any, and ask the server to stop.
    /// Returns whether something was cancelled.
    pub async fn cancel(&self) -> bool {
        let previous = self.lock_slot().take();
        match previous {
            Some(flight) => {
                flight.token.cancel();
                info!("In-flight generation cancelled");
                self.request_shutdown().await;
                true
            }
            None => false,
        }
    }

    /// One-shot, non-streamed completion via `POST /api/generate`.
    ///
    /// Does not take the in-flight slot, so it neither cancels nor can be
    /// cancelled by streamed requests. Failures return `Transport` without
    /// any fallback text.
    #[instrument(skip_all, fields(request_id, model = %self.model))]
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let request_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());

        let start = Instant::now();
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest::new(&self.model, prompt);

        let reply: GenerateResponse = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!(request_id = %request_id, error = %e, "Ollama generate failed");
                TutorError::Transport(format!("Connection failed: {}", e))
            })?
            .json()
            .await?;

        info!(
            request_id = %request_id,
            duration_ms = start.elapsed().as_millis() as u64,
            content_len = reply.response.len(),
            "Ollama generate complete"
        );
        Ok(reply.response)
    }

    /// Connectivity check against `GET /api/tags`; any 2xx counts as reachable
    pub async fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.control.get(&url).send().await {
            Ok(resp) => {
                debug!(status = %resp.status(), "Ollama probe answered");
                resp.status().is_success()
            }
            Err(e) => {
                debug!(error = %e, "Ollama probe failed");
                false
            }
        }
    }

    /// Swap in a fresh token, cancelling whatever was in flight
    fn begin(&self) -> (u64, CancellationToken, bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let mut slot = self.lock_slot();
        let preempted = match slot.take() {
            Some(previous) => {
                previous.token.cancel();
                true
            }
            None => false,
        };
        *slot = Some(InFlight {
            id,
            token: token.clone(),
        });

        (id, token, preempted)
    }

    /// Best-effort `POST /api/shutdown`; failures are ignored
    async fn request_shutdown(&self) {
        let url = format!("{}/api/shutdown", self.base_url);
        match self.control.post(&url).send().await {
            Ok(resp) => debug!(status = %resp.status(), "Shutdown request sent"),
            Err(e) => debug!(error = %e, "Shutdown request failed (ignored)"),
        }
    }

    fn fail<F>(&self, on_chunk: &mut F, request_id: &str, message: String) -> TutorError
    where
        F: FnMut(&str),
    {
        error!(request_id = %request_id, error = %message, "Ollama request failed");
        on_chunk(&self.fallback_message);
        TutorError::Transport(message)
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_turns(turns: &[Turn]) -> Result<()> {
    match turns.last() {
        None => Err(TutorError::InvalidInput("no turns to send".into())),
        Some(last) if last.role != Role::User => Err(TutorError::InvalidInput(format!(
            "last turn must come from the user, got {}",
            last.role
        ))),
        Some(_) => Ok(()),
    }
}

fn preview(line: &str) -> &str {
    match line.char_indices().nth(LOG_LINE_PREVIEW) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
