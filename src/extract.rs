// src/extract.rs
// Recover a JSON object from free-form model output

use crate::error::{Result, TutorError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Locate and parse the JSON object embedded in `text`.
///
/// Takes everything from the first `{` to the last `}`, blanks out raw
/// control characters, and parses the result. Text with no braces at all
/// is passed through as `{"material": text, "task": text}` so generators
/// still get something to show.
pub fn extract_structured(text: &str) -> Result<Value> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            warn!(len = text.len(), "No JSON object in model output, passing raw text through");
            return Ok(fallback_wrapper(text));
        }
    };

    let cleaned = scrub_control_chars(&text[start..=end]);
    debug!(candidate_len = cleaned.len(), "Parsing structured output");

    serde_json::from_str(&cleaned).map_err(|e| TutorError::MalformedStructuredOutput {
        message: e.to_string(),
        raw: text.to_string(),
    })
}

/// [`extract_structured`] followed by deserialization into `T`
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Result<T> {
    let value = extract_structured(text)?;
    serde_json::from_value(value).map_err(|e| TutorError::MalformedStructuredOutput {
        message: e.to_string(),
        raw: text.to_string(),
    })
}

fn fallback_wrapper(text: &str) -> Value {
    serde_json::json!({
        "material": text,
        "task": text,
    })
}

/// Single pass over the candidate.
///
/// Control characters (U+0000..U+001F, U+007F) become a space, except tab,
/// newline and carriage return. Those stay as-is between tokens and are
/// rewritten to their escape sequence inside string literals, where JSON
/// forbids them raw.
fn scrub_control_chars(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in candidate.chars() {
        match c {
            '\t' | '\n' | '\r' if in_string => {
                out.push_str(match c {
                    '\t' => "\\t",
                    '\n' => "\\n",
                    _ => "\\r",
                });
                escaped = false;
            }
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 || c == '\u{7F}' => {
                out.push(' ');
                escaped = false;
            }
            _ => {
                out.push(c);
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        in_string = false;
                    }
                } else if c == '"' {
                    in_string = true;
                }
            }
        }
    }

    out
}
