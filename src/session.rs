// src/session.rs
// Chat session: request assembly and the memory update policy

use crate::config::{DEFAULT_APPEARANCE, DEFAULT_THEME, TutorConfig};
use crate::error::{Result, TutorError};
use crate::llm::{ChatStreamClient, StreamOutcome, Turn};
use crate::memory::ConversationMemory;
use chrono::Local;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Situational lines sent with every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub appearance: String,
    pub theme: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            appearance: DEFAULT_APPEARANCE.to_string(),
            theme: DEFAULT_THEME.to_string(),
        }
    }
}

/// One conversation with the tutor.
///
/// Owns the memory and context the request payload is built from. Replies
/// only reach memory when they complete; a reply pre-empted by a newer
/// `respond` call leaves memory untouched.
pub struct ChatSession {
    client: Arc<ChatStreamClient>,
    memory: Mutex<ConversationMemory>,
    instructions: String,
    context: Mutex<SessionContext>,
}

impl ChatSession {
    pub fn new(
        client: Arc<ChatStreamClient>,
        memory: ConversationMemory,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            client,
            memory: Mutex::new(memory),
            instructions: instructions.into(),
            context: Mutex::new(SessionContext::default()),
        }
    }

    /// Build a session (and its client) from resolved configuration
    pub fn from_config(config: &TutorConfig) -> Result<Self> {
        let memory = ConversationMemory::with_limits(config.trim_limit, config.trim_cut)?;
        let client = ChatStreamClient::with_model(&config.host, &config.model)
            .with_fallback_message(&config.fallback_message);

        let session = Self::new(Arc::new(client), memory, &config.instructions);
        session.set_context(SessionContext {
            appearance: config.appearance.clone(),
            theme: config.theme.clone(),
        });
        Ok(session)
    }

    pub fn client(&self) -> &Arc<ChatStreamClient> {
        &self.client
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn context(&self) -> SessionContext {
        lock(&self.context).clone()
    }

    pub fn set_context(&self, context: SessionContext) {
        *lock(&self.context) = context;
    }

    pub fn set_appearance(&self, appearance: impl Into<String>) {
        lock(&self.context).appearance = appearance.into();
    }

    pub fn set_theme(&self, theme: impl Into<String>) {
        lock(&self.context).theme = theme.into();
    }

    /// Copy of the current history, oldest first
    pub fn memory_snapshot(&self) -> Vec<Turn> {
        lock(&self.memory).turns().to_vec()
    }

    pub fn memory_len(&self) -> usize {
        lock(&self.memory).len()
    }

    /// Forget the conversation so far
    pub fn reset(&self) {
        lock(&self.memory).clear();
        info!("Session memory cleared");
    }

    /// Messages for the next request: profile + context, history, user input
    pub fn build_payload(&self, user_input: &str) -> Vec<Turn> {
        let context = self.context();
        let time = format!(
            "Current time in the real world is {}",
            Local::now().format("%H:%M:%S")
        );
        let history = lock(&self.memory).render();

        vec![
            Turn::system(format!(
                "::ASSISTANT PROFILE::\n{}\n\n::CONTEXT OF THE MOMENT::\n{}\n{}\n{}",
                self.instructions, time, context.appearance, context.theme
            )),
            Turn::system(format!("::PREVIOUS MESSAGES::\n{}", history)),
            Turn::user(user_input),
        ]
    }

    /// Send `user_input`, streaming the reply through `on_chunk`.
    ///
    /// A completed reply is stored in memory together with the input. If a
    /// newer call pre-empts this one, the partial text is returned when
    /// `allow_partial_save` is set, otherwise `TutorError::Cancelled`.
    pub async fn respond<F>(
        &self,
        user_input: &str,
        mut on_chunk: F,
        allow_partial_save: bool,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        if user_input.trim().is_empty() {
            return Err(TutorError::InvalidInput("message is empty".into()));
        }

        let payload = self.build_payload(user_input);
        let outcome = self.client.send(&payload, |chunk| on_chunk(chunk)).await?;

        match outcome {
            StreamOutcome::Completed(reply) => {
                self.remember(user_input, &reply);
                Ok(reply)
            }
            StreamOutcome::Cancelled(partial) if allow_partial_save => {
                debug!(partial_len = partial.len(), "Returning partial reply");
                Ok(partial)
            }
            StreamOutcome::Cancelled(_) => Err(TutorError::Cancelled),
        }
    }

    fn remember(&self, user_input: &str, reply: &str) {
        let mut memory = lock(&self.memory);
        memory.append(Turn::user(user_input));
        memory.append(Turn::assistant(reply));
        memory.trim();
        debug!(size = memory.len(), "Exchange stored in memory");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
