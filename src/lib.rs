// src/lib.rs
// Streaming chat client for a local Ollama tutor

pub mod config;
pub mod error;
pub mod extract;
pub mod http;
pub mod llm;
pub mod memory;
pub mod session;
pub mod study;

pub use config::TutorConfig;
pub use error::{Result, TutorError};
pub use extract::{extract_as, extract_structured};
pub use llm::{ChatStreamClient, LineStreamDecoder, Role, StreamOutcome, Turn};
pub use memory::ConversationMemory;
pub use session::{ChatSession, SessionContext};
pub use study::StudyGenerator;
