//! Model identifier routing and provider credentials.
//!
//! Only the gateway looks at the structure of a model identifier. Everything
//! upstream passes it through as an opaque string.

use std::collections::HashMap;
use std::fmt;

/// Vendor protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
    OpenRouter,
    Ollama,
}

impl Provider {
    /// Environment variables holding the API key, in lookup order.
    pub fn credential_vars(&self) -> &'static [&'static str] {
        match self {
            Provider::OpenAi => &["OPENAI_API_KEY"],
            Provider::Anthropic => &["ANTHROPIC_API_KEY"],
            Provider::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Provider::OpenRouter => &["OPENROUTER_API_KEY"],
            Provider::Ollama => &[],
        }
    }

    pub fn requires_credential(&self) -> bool {
        !self.credential_vars().is_empty()
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            "gemini" | "google" => Some(Provider::Gemini),
            "openrouter" => Some(Provider::OpenRouter),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::OpenRouter => "openrouter",
            Provider::Ollama => "ollama",
        };
        f.write_str(name)
    }
}

/// Where a model identifier is sent, and under which vendor-side name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub provider: Provider,
    pub model: String,
}

/// Resolve a model identifier.
///
/// `provider/model` uses the named provider. Bare names are routed by model
/// family, and anything else goes to the OpenAI-compatible endpoint unchanged.
pub fn route(model_id: &str) -> Route {
    if let Some((prefix, rest)) = model_id.split_once('/') {
        if let Some(provider) = Provider::from_prefix(prefix) {
            if !rest.is_empty() {
                return Route {
                    provider,
                    model: rest.to_string(),
                };
            }
        }
    }

    let lower = model_id.to_ascii_lowercase();
    let provider = if lower.starts_with("claude") {
        Provider::Anthropic
    } else if lower.starts_with("gemini") {
        Provider::Gemini
    } else {
        Provider::OpenAi
    };

    Route {
        provider,
        model: model_id.to_string(),
    }
}

/// API keys captured once per run.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<String, String>,
}

impl Credentials {
    /// Capture every known credential variable from the process environment.
    pub fn from_env() -> Self {
        let mut credentials = Self::default();
        for provider in [
            Provider::OpenAi,
            Provider::Anthropic,
            Provider::Gemini,
            Provider::OpenRouter,
        ] {
            for var in provider.credential_vars() {
                if let Ok(value) = std::env::var(var) {
                    credentials = credentials.with(var, value);
                }
            }
        }
        credentials
    }

    pub fn with(mut self, var: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.keys.insert(var.to_string(), value.trim().to_string());
        }
        self
    }

    /// First key found for `provider`.
    pub fn for_provider(&self, provider: Provider) -> Option<&str> {
        provider
            .credential_vars()
            .iter()
            .find_map(|var| self.keys.get(*var))
            .map(String::as_str)
    }
}
