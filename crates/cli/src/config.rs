//! Configuration loading from tiller.toml.
//!
//! Two layers: the base configuration in the user's config directory, and
//! an optional agent-local `.tiller/` directory in the working directory
//! whose values override the base. An agent directory also supplies its own
//! prompts and capability units, which is how a project turns the generic
//! assistant into a specialized one.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const AGENT_DIR: &str = ".tiller";
pub const CONFIG_FILE: &str = "tiller.toml";

const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Model to use.
    #[serde(default = "default_model")]
    pub model: String,

    /// Gemini API key. Falls back to the GOOGLE_API_KEY environment
    /// variable when absent.
    pub api_key: Option<String>,

    /// Ceiling on sending rounds per user turn.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Where the session database lives. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

/// A partial configuration layered on top of the base one.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigOverlay {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub max_rounds: Option<usize>,
    pub data_dir: Option<PathBuf>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_rounds() -> usize {
    runtime::DEFAULT_MAX_ROUNDS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            max_rounds: default_max_rounds(),
            data_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load the base config (defaults when the file is absent) and apply
    /// the agent overlay when one exists.
    pub fn load_layered(base_dir: &Path, agent_dir: &Path) -> Result<Self, ConfigError> {
        let base_file = base_dir.join(CONFIG_FILE);
        let mut config = if base_file.exists() {
            Self::load(&base_file)?
        } else {
            Self::default()
        };

        let agent_file = agent_dir.join(CONFIG_FILE);
        if agent_file.exists() {
            let content = std::fs::read_to_string(&agent_file)?;
            let overlay: ConfigOverlay =
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.apply(overlay);
        }

        Ok(config)
    }

    /// Apply an overlay; present fields win.
    pub fn apply(&mut self, overlay: ConfigOverlay) {
        if let Some(model) = overlay.model {
            self.model = model;
        }
        if let Some(api_key) = overlay.api_key {
            self.api_key = Some(api_key);
        }
        if let Some(max_rounds) = overlay.max_rounds {
            self.max_rounds = max_rounds;
        }
        if let Some(data_dir) = overlay.data_dir {
            self.data_dir = Some(data_dir);
        }
    }

    /// Resolve the API key from config or environment.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_defaults() {
        let config = Config::parse("api_key = \"AIza-test\"").unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_rounds, runtime::DEFAULT_MAX_ROUNDS);
        assert_eq!(config.api_key.as_deref(), Some("AIza-test"));
    }

    #[test]
    fn overlay_fields_win() {
        let mut config = Config::parse("model = \"gemini-1.5-flash\"\nmax_rounds = 4").unwrap();
        let overlay: ConfigOverlay = toml::from_str("model = \"gemini-1.5-pro\"").unwrap();
        config.apply(overlay);
        assert_eq!(config.model, "gemini-1.5-pro");
        assert_eq!(config.max_rounds, 4);
    }
}
