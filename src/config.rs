use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pr::position::AnchorPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .pr-reviewer.toml.
///
/// All fields are optional — the tool works with zero config as long as
/// GITHUB_TOKEN and OPENAI_API_KEY are set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub testgen: TestGenConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// REST API root, override for GitHub Enterprise
    pub api_base: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: "https://api.github.com".to_string(),
        }
    }
}

/// Settings for an OpenAI-compatible completion/embedding endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub embedding_model: String,
    /// If None, falls back to OPENAI_API_KEY env var.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 1500,
            timeout_secs: 60,
        }
    }
}

/// What to do with a comment whose line is not in the patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundPolicy {
    /// Drop the comment.
    Drop,
    /// Attach it to diff position 1 (top of the file's diff).
    #[default]
    FirstLine,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Retrieved context snippets per file; 0 disables the index.
    pub top_k: usize,
    pub not_found: NotFoundPolicy,
    pub anchor: AnchorPolicy,
    /// Closed pull requests fed into the index as review history.
    pub history_limit: usize,
    /// Repository files larger than this are not indexed.
    pub max_file_bytes: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            not_found: NotFoundPolicy::default(),
            anchor: AnchorPolicy::default(),
            history_limit: 30,
            max_file_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TestGenConfig {
    pub output_dir: PathBuf,
    /// Per-language framework override, keyed by language name (e.g. `python = "pytest"`).
    pub framework_hints: HashMap<String, String>,
}

impl Default for TestGenConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated_tests"),
            framework_hints: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from .pr-reviewer.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(".pr-reviewer.toml");
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            config.github.token = std::env::var("GITHUB_TOKEN").ok();
        }
        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }
}
