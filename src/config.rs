//! TOML configuration.
//!
//! The configuration is loaded once at process start by [`load_config`] and
//! handed to every component as an explicit value (usually `Arc<Config>`).
//! Secrets are never read from the file: the generator reads its API key
//! from the environment variable named in `[llm].api_key_env`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::render::RenderMode;
use crate::sessions::SessionIdStrategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub uploads: UploadsConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    pub dir: PathBuf,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_max_upload_mb() -> usize {
    64
}

impl UploadsConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Which generative endpoint answers questions.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Disabled,
    Gemini,
    OpenAi,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the API key. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout. Absent means the call may block indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != LlmProvider::Disabled
    }

    pub fn key_env(&self) -> &str {
        match (&self.api_key_env, self.provider) {
            (Some(name), _) => name,
            (None, LlmProvider::Gemini) => "GEMINI_API_KEY",
            (None, LlmProvider::OpenAi) => "OPENAI_API_KEY",
            (None, LlmProvider::Disabled) => "",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default)]
    pub session_ids: SessionIdStrategy,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            session_ids: SessionIdStrategy::default(),
            title_max_chars: default_title_max_chars(),
        }
    }
}

fn default_title_max_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RenderConfig {
    #[serde(default)]
    pub mode: RenderMode,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

/// Parses and validates configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.uploads.max_upload_mb == 0 {
        anyhow::bail!("uploads.max_upload_mb must be > 0");
    }

    if config.chat.title_max_chars == 0 {
        anyhow::bail!("chat.title_max_chars must be > 0");
    }

    if config.llm.is_enabled() && config.llm.model.as_deref().unwrap_or("").is_empty() {
        anyhow::bail!(
            "llm.model must be specified when provider is {:?}",
            config.llm.provider
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[db]
path = "/tmp/nlm.sqlite"

[uploads]
dir = "/tmp/uploads"

[server]
bind = "127.0.0.1:5000"
"#;

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let cfg = parse_config(BASE).unwrap();
        assert_eq!(cfg.llm.provider, LlmProvider::Disabled);
        assert_eq!(cfg.chat.title_max_chars, 50);
        assert_eq!(cfg.chat.session_ids, SessionIdStrategy::Unique);
        assert_eq!(cfg.render.mode, RenderMode::Structured);
        assert_eq!(cfg.uploads.max_upload_bytes(), 64 * 1024 * 1024);
        assert!(cfg.llm.timeout_secs.is_none());
    }

    #[test]
    fn enabled_provider_requires_model() {
        let text = format!("{}\n[llm]\nprovider = \"gemini\"\n", BASE);
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("llm.model"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let text = format!("{}\n[llm]\nprovider = \"cohere\"\nmodel = \"x\"\n", BASE);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn key_env_defaults_per_provider() {
        let text = format!(
            "{}\n[llm]\nprovider = \"gemini\"\nmodel = \"gemini-2.5-flash\"\n",
            BASE
        );
        let cfg = parse_config(&text).unwrap();
        assert_eq!(cfg.llm.key_env(), "GEMINI_API_KEY");
    }

    #[test]
    fn compat_modes_parse() {
        let text = format!(
            "{}\n[chat]\nsession_ids = \"timestamp\"\n\n[render]\nmode = \"compat\"\n",
            BASE
        );
        let cfg = parse_config(&text).unwrap();
        assert_eq!(cfg.chat.session_ids, SessionIdStrategy::Timestamp);
        assert_eq!(cfg.render.mode, RenderMode::Compat);
    }
}
