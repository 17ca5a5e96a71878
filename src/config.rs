//! Configuration layering.
//!
//! A [`Config`] is built once per invocation from built-in defaults, the
//! optional TOML file, a dotenv file and `LLMEXEC_*` environment variables.
//! Command-line options are applied on top by the pipeline.

use anyhow::{anyhow, Context, Result};
use dirs::config_dir;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_MODEL: &str = "gemini/gemini-2.5-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

/// Effective configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub default_model: String,
    pub timeout_secs: u64,
    pub interpreter: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Base URL override for OpenAI-compatible endpoints.
    pub api_base: Option<String>,
    /// Canned model response; replaces the network gateway when set.
    pub mock_response: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            interpreter: DEFAULT_INTERPRETER.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_base: None,
            mock_response: None,
        }
    }
}

/// On-disk representation of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub api_base: Option<String>,
}

impl Config {
    /// Load configuration from the config file, `.env` and the process environment.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => debug!("No .env file found"),
            Err(e) => return Err(anyhow!("Failed to load .env file: {}", e)),
        }

        let file = match Self::get_config_path() {
            Some(path) => Self::load_file(&path)?,
            None => None,
        };

        Self::from_layers(file, |key| std::env::var(key).ok())
    }

    /// Combine defaults, an optional file layer and an environment lookup.
    pub fn from_layers<F>(file: Option<FileConfig>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(file) = file {
            if let Some(model) = file.default_model {
                config.default_model = model;
            }
            if let Some(secs) = file.timeout_secs {
                config.timeout_secs = secs;
            }
            if let Some(interpreter) = file.interpreter {
                config.interpreter = interpreter;
            }
            if let Some(temperature) = file.temperature {
                config.temperature = temperature;
            }
            if let Some(max_tokens) = file.max_tokens {
                config.max_tokens = max_tokens;
            }
            config.api_base = file.api_base.or(config.api_base);
        }

        // Environment variables override config file
        if let Some(model) = env("LLMEXEC_MODEL").filter(|m| !m.trim().is_empty()) {
            config.default_model = model;
        }
        if let Some(secs) = env("LLMEXEC_TIMEOUT_SECS") {
            config.timeout_secs = parse_timeout(&secs)
                .with_context(|| "Invalid LLMEXEC_TIMEOUT_SECS".to_string())?;
        }
        if let Some(interpreter) = env("LLMEXEC_INTERPRETER").filter(|i| !i.trim().is_empty()) {
            config.interpreter = interpreter;
        }
        if let Some(base) = env("LLMEXEC_API_BASE").filter(|b| !b.trim().is_empty()) {
            config.api_base = Some(base);
        }
        config.mock_response = env("LLMEXEC_MOCK_RESPONSE");

        Ok(config)
    }

    /// Read and parse a config file. A missing file is not an error.
    pub fn load_file(path: &Path) -> Result<Option<FileConfig>> {
        if !path.exists() {
            debug!("No config file at {}", path.display());
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded config from: {}", path.display());
        Ok(Some(file))
    }

    pub fn get_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("llmexec").join("config.toml"))
    }
}

/// Parse a timeout in whole seconds; zero is rejected.
pub fn parse_timeout(value: &str) -> Result<u64> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("'{}' is not a number of seconds", value))?;
    if secs == 0 {
        return Err(anyhow!("timeout must be at least one second"));
    }
    Ok(secs)
}
