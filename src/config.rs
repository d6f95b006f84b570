//! Configuration management for Grace.
//!
//! Loads configuration from ${GRACE_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::paths;

/// Default config template with comments, embedded at compile time.
const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("default_config.toml");

/// System instruction sent with every request unless overridden.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, helpful, and concise AI assistant named 'Grace'. Your responses should be formatted using Markdown. Always provide high-quality, relevant information.";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The Gemini model to use
    pub model: String,

    /// Maximum tokens for generated replies (0 sends no limit)
    pub max_output_tokens: u32,

    /// Optional inline system prompt override
    pub system_prompt: Option<String>,

    /// Optional path to a file containing the system prompt
    pub system_prompt_file: Option<String>,

    /// Optional Generative Language API base URL (for test rigs or proxies)
    pub gemini_base_url: Option<String>,
}

impl Config {
    const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";
    const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Returns the effective system prompt.
    ///
    /// Precedence: prompt file, then inline prompt, then the built-in
    /// Grace instruction.
    pub fn effective_system_prompt(&self) -> Result<String> {
        if let Some(path_str) = &self.system_prompt_file {
            let content = fs::read_to_string(Path::new(path_str))
                .with_context(|| format!("Failed to read system prompt file: {}", path_str))?;
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }

        let trimmed = self.system_prompt.as_deref().unwrap_or("").trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }

        Ok(DEFAULT_SYSTEM_PROMPT.to_string())
    }

    /// Returns the effective Gemini base URL from config, if set.
    /// Empty strings are treated as unset.
    pub fn effective_gemini_base_url(&self) -> Option<&str> {
        self.gemini_base_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// Saves only the model field to the config file.
    ///
    /// Creates the file if it doesn't exist.
    /// Preserves existing fields and comments using toml_edit.
    pub fn save_model(model: &str) -> Result<()> {
        Self::save_model_to(&paths::config_path(), model)
    }

    /// Saves only the model field to a specific config file path.
    pub fn save_model_to(path: &Path, model: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let contents = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?
        } else {
            DEFAULT_CONFIG_TEMPLATE.to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["model"] = value(model);

        Self::write_config(path, &doc.to_string())
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, DEFAULT_CONFIG_TEMPLATE)
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_string(),
            max_output_tokens: Self::DEFAULT_MAX_OUTPUT_TOKENS,
            system_prompt: None,
            system_prompt_file: None,
            gemini_base_url: None,
        }
    }
}
