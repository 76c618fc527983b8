//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// How store changes are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per change
    Json,
}

/// Configuration for cosync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default response script to replay
    pub script: Option<String>,
    /// Output format (text, json)
    pub output: Option<OutputFormat>,
    /// Log filter directive, used when RUST_LOG is unset
    pub log_filter: Option<String>,
    /// Print busy/idle transitions
    pub show_busy: Option<bool>,
    /// System message the conversation starts with
    pub system_prompt: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cosync")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("COSYNC_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Parse config from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            script: None,
            output: Some(OutputFormat::Text),
            log_filter: Some("warn".to_string()),
            show_busy: Some(true),
            system_prompt: None,
        };

        default_config.save()?;
        Ok(path)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output.unwrap_or_default()
    }

    pub fn show_busy(&self) -> bool {
        self.show_busy.unwrap_or(true)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# cosync configuration file
# Place at ~/.config/cosync/config.toml (Linux) or set COSYNC_CONFIG_PATH

# Response script replayed when --script is not given
# script = "/path/to/responses.json"

# Output format (text, json)
output = "text"

# Log filter used when RUST_LOG is unset
log_filter = "warn"

# Print busy/idle transitions
show_busy = true

# System message the conversation starts with (optional)
# system_prompt = "You are a helpful assistant."
"#
}
