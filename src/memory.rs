// src/memory.rs
// Bounded in-process conversation history

use crate::error::{Result, TutorError};
use crate::llm::Turn;
use tracing::info;

/// Trim is triggered once the history grows past this many turns
pub const DEFAULT_TRIM_LIMIT: usize = 100;

/// Turns kept after a trim
pub const DEFAULT_TRIM_CUT: usize = 80;

/// Append-only turn log with a count-based trim.
///
/// Lives as long as the chat session. Trim drops by count without looking
/// at roles, so an odd `trim_cut` can orphan a user turn from its reply.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
    trim_limit: usize,
    trim_cut: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self {
            turns: Vec::new(),
            trim_limit: DEFAULT_TRIM_LIMIT,
            trim_cut: DEFAULT_TRIM_CUT,
        }
    }
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom bounds; `trim_cut` must not exceed `trim_limit`
    pub fn with_limits(trim_limit: usize, trim_cut: usize) -> Result<Self> {
        if trim_limit == 0 {
            return Err(TutorError::Config("trim_limit must be greater than zero".into()));
        }
        if trim_cut > trim_limit {
            return Err(TutorError::Config(format!(
                "trim_cut ({}) must not exceed trim_limit ({})",
                trim_cut, trim_limit
            )));
        }
        Ok(Self {
            turns: Vec::new(),
            trim_limit,
            trim_cut,
        })
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Keep only the newest `trim_cut` turns once the log exceeds `trim_limit`.
    /// Returns how many turns were dropped.
    pub fn trim(&mut self) -> usize {
        if self.turns.len() <= self.trim_limit {
            return 0;
        }
        let dropped = self.turns.len() - self.trim_cut;
        self.turns.drain(..dropped);
        info!(dropped, size = self.turns.len(), "Memory trimmed");
        dropped
    }

    /// `role: content` lines, oldest first
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn trim_limit(&self) -> usize {
        self.trim_limit
    }

    pub fn trim_cut(&self) -> usize {
        self.trim_cut
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
