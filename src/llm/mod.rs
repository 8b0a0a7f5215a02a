// src/llm/mod.rs
// Ollama streaming chat: wire types, line decoder, client

pub mod client;
pub mod decoder;
pub mod types;

pub use client::ChatStreamClient;
pub use decoder::{LineStreamDecoder, decode_lines};
pub use types::{
    GenerateRequest, GenerateResponse, Role, StreamEvent, StreamMessage, StreamOutcome,
    StreamRequest, Turn,
};
