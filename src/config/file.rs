// src/config/file.rs
// File-based configuration from ~/.tutor-stream/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level config file structure; every key is optional
#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub session: SessionSection,
}

/// `[llm]`
#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct LlmSection {
    /// Ollama base URL
    pub host: Option<String>,
    pub model: Option<String>,
}

/// `[memory]`
#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct MemorySection {
    pub trim_limit: Option<usize>,
    pub trim_cut: Option<usize>,
}

/// `[session]`
#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct SessionSection {
    pub fallback_message: Option<String>,
    /// Plain-text assistant instructions
    pub instructions_file: Option<PathBuf>,
    pub appearance: Option<String>,
    pub theme: Option<String>,
}

impl FileConfig {
    /// Load config from ~/.tutor-stream/config.toml
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path; a missing or broken file yields defaults
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}

/// ~/.tutor-stream
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tutor-stream")
}
