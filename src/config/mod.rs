// src/config/mod.rs
// Resolved configuration: defaults, then config file, then environment

pub mod env;
pub mod file;

pub use env::EnvOverrides;
pub use file::FileConfig;

use crate::llm::client::{DEFAULT_BASE_URL, DEFAULT_FALLBACK_MESSAGE, DEFAULT_MODEL, is_local_url};
use crate::memory::{DEFAULT_TRIM_CUT, DEFAULT_TRIM_LIMIT};
use tracing::{info, warn};

/// Built-in assistant profile used when no instructions file is configured
pub const DEFAULT_INSTRUCTIONS: &str = "You are Nicole, a friendly virtual study companion. \
    Answer briefly and warmly, encourage the student, and explain ideas step by step \
    when asked about a school subject.";

pub const DEFAULT_APPEARANCE: &str = "Pet wears Green hoodie\nPet is in Digital program window";

pub const DEFAULT_THEME: &str =
    "Currently it is light in the website, Pet has a day time in her locations";

/// Everything a chat session needs, fully resolved
#[derive(Debug, Clone, PartialEq)]
pub struct TutorConfig {
    pub host: String,
    pub model: String,
    pub trim_limit: usize,
    pub trim_cut: usize,
    pub fallback_message: String,
    /// Instructions with newlines flattened to spaces
    pub instructions: String,
    pub appearance: String,
    pub theme: String,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            trim_limit: DEFAULT_TRIM_LIMIT,
            trim_cut: DEFAULT_TRIM_CUT,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            appearance: DEFAULT_APPEARANCE.to_string(),
            theme: DEFAULT_THEME.to_string(),
        }
    }
}

impl TutorConfig {
    /// Load all configuration layers (call once at startup)
    pub fn load() -> Self {
        info!("Loading configuration");
        let mut config = Self::default();
        config.apply_file(FileConfig::load());
        config.apply_env(EnvOverrides::from_env());
        config
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(host) = file.llm.host {
            self.host = host;
        }
        if let Some(model) = file.llm.model {
            self.model = model;
        }
        if let Some(limit) = file.memory.trim_limit {
            self.trim_limit = limit;
        }
        if let Some(cut) = file.memory.trim_cut {
            self.trim_cut = cut;
        }
        if let Some(message) = file.session.fallback_message {
            self.fallback_message = message;
        }
        if let Some(path) = file.session.instructions_file {
            match std::fs::read_to_string(&path) {
                Ok(text) => self.instructions = flatten_instructions(&text),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read instructions file, keeping built-in instructions"
                ),
            }
        }
        if let Some(appearance) = file.session.appearance {
            self.appearance = appearance;
        }
        if let Some(theme) = file.session.theme {
            self.theme = theme;
        }
    }

    pub fn apply_env(&mut self, env: EnvOverrides) {
        if let Some(host) = env.host {
            self.host = host;
        }
        if let Some(model) = env.model {
            self.model = model;
        }
        if let Some(limit) = env.trim_limit {
            self.trim_limit = limit;
        }
        if let Some(cut) = env.trim_cut {
            self.trim_cut = cut;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::default();

        if self.model.trim().is_empty() {
            validation.error(Section::Llm, "model name is empty (TUTOR_MODEL)");
        }
        if url::Url::parse(&self.host).is_err() {
            validation.error(
                Section::Llm,
                format!("host '{}' is not a valid URL (OLLAMA_HOST)", self.host),
            );
        } else if !is_local_url(&self.host) {
            validation.warning(
                Section::Llm,
                format!("host '{}' is not a local address", self.host),
            );
        }
        if self.trim_limit == 0 {
            validation.error(Section::Memory, "trim_limit must be greater than zero");
        }
        if self.trim_cut > self.trim_limit {
            validation.error(
                Section::Memory,
                format!(
                    "trim_cut ({}) must not exceed trim_limit ({})",
                    self.trim_cut, self.trim_limit
                ),
            );
        }

        validation
    }
}

/// Instructions are sent on a single line
fn flatten_instructions(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Config file section an issue belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Llm,
    Memory,
}

impl Section {
    pub fn name(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub section: Section,
    pub severity: Severity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.section.name(), self.message)
    }
}

/// Problems found in a resolved [`TutorConfig`], in discovery order
#[derive(Debug, Default)]
pub struct ConfigValidation {
    issues: Vec<ConfigIssue>,
}

impl ConfigValidation {
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    fn error(&mut self, section: Section, message: impl Into<String>) {
        self.push(section, Severity::Error, message.into());
    }

    fn warning(&mut self, section: Section, message: impl Into<String>) {
        self.push(section, Severity::Warning, message.into());
    }

    fn push(&mut self, section: Section, severity: Severity, message: String) {
        self.issues.push(ConfigIssue {
            section,
            severity,
            message,
        });
    }

    /// Issues grouped under the config.toml section that fixes them:
    ///
    /// ```text
    /// [memory]
    ///   error: trim_cut (90) must not exceed trim_limit (50)
    /// ```
    pub fn report(&self) -> String {
        if self.issues.is_empty() {
            return "Configuration OK".to_string();
        }

        let mut sorted: Vec<&ConfigIssue> = self.issues.iter().collect();
        sorted.sort_by_key(|i| i.section);

        let mut lines = Vec::new();
        let mut current = None;
        for issue in sorted {
            if current != Some(issue.section) {
                current = Some(issue.section);
                lines.push(format!("[{}]", issue.section.name()));
            }
            let label = match issue.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            lines.push(format!("  {}: {}", label, issue.message));
        }
        lines.join("\n")
    }
}
