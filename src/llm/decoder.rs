// src/llm/decoder.rs
// Incremental newline splitter for NDJSON response bodies

use futures::{Stream, StreamExt};
use futures::stream::unfold;
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

/// Turns arbitrarily chunked bytes into complete text lines.
///
/// A multi-byte UTF-8 sequence split across two chunks is held back until
/// its tail arrives; invalid sequences decode to U+FFFD. The text after the
/// last `\n` stays buffered until more input completes it. One decoder
/// serves exactly one stream.
///
/// The buffer is not capped: a peer that never sends a newline grows it
/// without bound.
#[derive(Debug, Default)]
pub struct LineStreamDecoder {
    pending: Vec<u8>,
    buffer: String,
}

impl LineStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed, separators removed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        self.decode_pending();

        let Some(last) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete[..last].split('\n').map(str::to_string).collect()
    }

    /// Text buffered after the last newline
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// End of stream: returns the incomplete trailing line, if any
    pub fn finish(mut self) -> Option<String> {
        self.take_remainder()
    }

    fn take_remainder(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.buffer.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    fn decode_pending(&mut self) {
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer.push_str(
                        std::str::from_utf8(&self.pending[start..start + valid]).unwrap_or_default(),
                    );
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            start += valid + bad;
                        }
                        // Truncated sequence at the end: wait for the next chunk
                        None => {
                            start += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
    }
}

struct LineState<S> {
    bytes: Pin<Box<S>>,
    decoder: LineStreamDecoder,
    ready: VecDeque<String>,
    ended: bool,
}

/// Adapt a byte-chunk stream into a lazy stream of complete lines.
///
/// Ends when the underlying stream ends or yields an error (the error is
/// passed through as the final item). An unterminated trailing line is
/// dropped.
pub fn decode_lines<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let initial = LineState {
        bytes: Box::pin(bytes),
        decoder: LineStreamDecoder::new(),
        ready: VecDeque::new(),
        ended: false,
    };

    unfold(initial, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.ended {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.decoder.push(chunk.as_ref());
                    state.ready.extend(lines);
                }
                Some(Err(e)) => {
                    state.ended = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.ended = true;
                    if let Some(rest) = state.decoder.take_remainder() {
                        debug!(len = rest.len(), "Stream ended with an unterminated line, dropping it");
                    }
                }
            }
        }
    })
}
