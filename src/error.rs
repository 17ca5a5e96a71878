//! Error taxonomy for the request-to-execution pipeline.
//!
//! Every stage failure maps to exactly one [`LlmexecError`] variant, and every
//! variant knows the stage it came from and the process exit code it implies.
//! A non-zero exit status of the generated program is not an error of this
//! tool; it is passed through by the executor instead.

use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes used by the binary.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const CONFIGURATION: i32 = 2;
    pub const SCRIPT_READ: i32 = 3;
    pub const MODEL_REQUEST: i32 = 4;
    pub const NO_CODE: i32 = 5;
    pub const WRITE: i32 = 6;
    pub const EXECUTION: i32 = 7;
    pub const INTERRUPTED: i32 = 130;
}

/// Main error type for llmexec
#[derive(Error, Debug)]
pub enum LlmexecError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("Failed to read script {path}: {reason}")]
    ScriptRead { path: PathBuf, reason: String },

    #[error("Model request failed: {0}")]
    Model(#[from] ModelError),

    #[error("No code found in model response")]
    NoCodeFound,

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run generated program: {0}")]
    Execution(String),

    #[error("Interrupted")]
    Interrupted,
}

/// Failures reported by the model provider gateway.
///
/// `detail` holds the raw underlying failure (status code, provider error
/// body) and is only rendered in verbose mode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("AuthenticationFailure: {message}")]
    Authentication {
        message: String,
        detail: Option<String>,
    },

    #[error("NetworkFailure: {message}")]
    Network {
        message: String,
        timeout: bool,
        detail: Option<String>,
    },

    #[error("ProviderFailure: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
        detail: Option<String>,
    },

    #[error("RateLimited: {message}")]
    RateLimited {
        message: String,
        detail: Option<String>,
    },
}

impl ModelError {
    pub fn authentication(message: impl Into<String>) -> Self {
        ModelError::Authentication {
            message: message.into(),
            detail: None,
        }
    }

    pub fn timeout(secs: u64) -> Self {
        ModelError::Network {
            message: format!("request timed out after {} seconds", secs),
            timeout: true,
            detail: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        ModelError::Network {
            message: message.into(),
            timeout: false,
            detail: None,
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        ModelError::Provider {
            message: message.into(),
            status: None,
            detail: None,
        }
    }

    /// Category name as it appears in user-facing messages.
    pub fn category(&self) -> &'static str {
        match self {
            ModelError::Authentication { .. } => "AuthenticationFailure",
            ModelError::Network { .. } => "NetworkFailure",
            ModelError::Provider { .. } => "ProviderFailure",
            ModelError::RateLimited { .. } => "RateLimited",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ModelError::Authentication { detail, .. }
            | ModelError::Network { detail, .. }
            | ModelError::Provider { detail, .. }
            | ModelError::RateLimited { detail, .. } => detail.as_deref(),
        }
    }

    /// Attach raw failure detail, replacing any previous detail.
    pub fn with_detail(mut self, raw: impl Into<String>) -> Self {
        let raw = Some(raw.into());
        match &mut self {
            ModelError::Authentication { detail, .. }
            | ModelError::Network { detail, .. }
            | ModelError::Provider { detail, .. }
            | ModelError::RateLimited { detail, .. } => *detail = raw,
        }
        self
    }

    /// Guidance shown after the error message, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ModelError::Authentication { .. } => Some(
                "Set the API key for this provider in the environment or in a .env file.",
            ),
            ModelError::Network { .. } | ModelError::RateLimited { .. } => Some(
                "Retry the command later, or pick another model with --model.",
            ),
            ModelError::Provider { .. } => {
                Some("Check that the model identifier passed to --model is valid.")
            }
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Network {
                message: "request timed out".to_string(),
                timeout: true,
                detail: Some(err.to_string()),
            }
        } else if err.is_connect() {
            ModelError::network("could not connect to the model provider")
                .with_detail(err.to_string())
        } else if let Some(status) = err.status() {
            ModelError::Provider {
                message: format!("provider returned HTTP {}", status.as_u16()),
                status: Some(status.as_u16()),
                detail: Some(err.to_string()),
            }
        } else {
            ModelError::network("request failed").with_detail(err.to_string())
        }
    }
}

impl LlmexecError {
    /// Name of the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            LlmexecError::Configuration(_) => "invocation",
            LlmexecError::ScriptNotFound(_) | LlmexecError::ScriptRead { .. } => "script",
            LlmexecError::Model(_) => "model request",
            LlmexecError::NoCodeFound => "code extraction",
            LlmexecError::Write { .. }
            | LlmexecError::Execution(_)
            | LlmexecError::Interrupted => "execution",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            LlmexecError::Configuration(_) => exit_code::CONFIGURATION,
            LlmexecError::ScriptNotFound(_) | LlmexecError::ScriptRead { .. } => {
                exit_code::SCRIPT_READ
            }
            LlmexecError::Model(_) => exit_code::MODEL_REQUEST,
            LlmexecError::NoCodeFound => exit_code::NO_CODE,
            LlmexecError::Write { .. } => exit_code::WRITE,
            LlmexecError::Execution(_) => exit_code::EXECUTION,
            LlmexecError::Interrupted => exit_code::INTERRUPTED,
        }
    }

    /// Format the error for display on stderr.
    ///
    /// Verbose output adds the raw failure detail and the source chain.
    pub fn render(&self, verbose: bool) -> String {
        let mut output = format!("Error ({}): {}\n", self.stage(), self);

        match self {
            LlmexecError::Model(model_err) => {
                if verbose {
                    if let Some(detail) = model_err.detail() {
                        output.push_str(&format!("Detail: {}\n", detail));
                    }
                }
                if let Some(hint) = model_err.hint() {
                    output.push_str(&format!("Hint: {}\n", hint));
                }
            }
            LlmexecError::ScriptNotFound(_) => {
                output.push_str("Hint: Check the path of the script file.\n");
            }
            LlmexecError::NoCodeFound => {
                output.push_str(
                    "Hint: The model answered without a program. Rephrase the request or try another model.\n",
                );
            }
            _ => {}
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, LlmexecError>;
