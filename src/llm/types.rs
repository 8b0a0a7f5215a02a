// src/llm/types.rs
// Wire types for the Ollama /api/chat streaming protocol

use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Body of `POST /api/chat`
#[derive(Debug, Serialize)]
pub struct StreamRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Turn],
    pub stream: bool,
}

impl<'a> StreamRequest<'a> {
    pub fn new(model: &'a str, messages: &'a [Turn]) -> Self {
        Self {
            model,
            messages,
            stream: true,
        }
    }
}

/// One NDJSON line of the streamed reply
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub message: Option<StreamMessage>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl StreamEvent {
    /// Text fragment carried by this event, if non-empty
    pub fn content(&self) -> Option<&str> {
        self.message
            .as_ref()
            .map(|m| m.content.as_str())
            .filter(|c| !c.is_empty())
    }
}

/// Body of a one-shot `POST /api/generate`
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
}

impl<'a> GenerateRequest<'a> {
    pub fn new(model: &'a str, prompt: &'a str) -> Self {
        Self {
            model,
            prompt,
            stream: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
}

/// How a streamed request ended (transport failures are the `Err` side)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The server finished; full accumulated text
    Completed(String),
    /// A newer request (or an explicit cancel) pre-empted this one; partial text
    Cancelled(String),
}

impl StreamOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Completed(t) | Self::Cancelled(t) => t,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Completed(t) | Self::Cancelled(t) => t,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let turns = vec![Turn::user("2+2?")];
        let body = serde_json::to_value(StreamRequest::new("llama3", &turns)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "llama3",
                "messages": [{"role": "user", "content": "2+2?"}],
                "stream": true
            })
        );
    }

    #[test]
    fn test_generate_request_is_not_streamed() {
        let body = serde_json::to_value(GenerateRequest::new("llama3", "hi")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"model": "llama3", "prompt": "hi", "stream": false})
        );

        let reply: GenerateResponse = serde_json::from_str(r#"{"model":"llama3","done":true}"#).unwrap();
        assert_eq!(reply.response, "");
    }

    #[test]
    fn test_event_with_content() {
        let ev: StreamEvent =
            serde_json::from_str(r#"{"message":{"role":"assistant","content":"4"},"done":false}"#)
                .unwrap();
        assert_eq!(ev.content(), Some("4"));
        assert!(!ev.done);
    }

    #[test]
    fn test_final_event_without_message() {
        let ev: StreamEvent = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(ev.done);
        assert_eq!(ev.content(), None);
    }

    #[test]
    fn test_empty_content_is_none() {
        let ev: StreamEvent =
            serde_json::from_str(r#"{"message":{"role":"assistant","content":""},"done":true}"#)
                .unwrap();
        assert_eq!(ev.content(), None);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }

    #[test]
    fn test_outcome_text() {
        let done = StreamOutcome::Completed("all".into());
        let cut = StreamOutcome::Cancelled("pa".into());
        assert_eq!(done.text(), "all");
        assert!(cut.is_cancelled());
        assert_eq!(cut.into_text(), "pa");
    }
}
