// src/config/env.rs
// Environment-based configuration overrides

use tracing::{debug, warn};

/// Values read from environment variables; `None` means "not set"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    /// Ollama base URL (OLLAMA_HOST)
    pub host: Option<String>,
    /// Model tag (TUTOR_MODEL)
    pub model: Option<String>,
    /// Memory trim threshold (TUTOR_TRIM_LIMIT)
    pub trim_limit: Option<usize>,
    /// Turns kept after a trim (TUTOR_TRIM_CUT)
    pub trim_cut: Option<usize>,
}

impl EnvOverrides {
    /// Read overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through an arbitrary lookup (tests use a map)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let overrides = Self {
            host: read("OLLAMA_HOST").map(|h| normalize_host(&h)),
            model: read("TUTOR_MODEL"),
            trim_limit: read("TUTOR_TRIM_LIMIT").and_then(|v| parse_usize("TUTOR_TRIM_LIMIT", &v)),
            trim_cut: read("TUTOR_TRIM_CUT").and_then(|v| parse_usize("TUTOR_TRIM_CUT", &v)),
        };
        debug!(?overrides, "Environment overrides loaded");
        overrides
    }
}

/// Ollama's own OLLAMA_HOST is often `host:port` without a scheme
fn normalize_host(value: &str) -> String {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!("http://{}", value)
    }
}

fn parse_usize(name: &str, value: &str) -> Option<usize> {
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(name, value, "Ignoring non-numeric environment value");
            None
        }
    }
}
