//! llmexec - run natural-language scripts through a language model.
//!
//! A script file holds a plain-language request, usually behind a shebang
//! line such as `#!/usr/bin/env -S llmexec -x`. llmexec sends the request to
//! a model, pulls the Python program out of the answer and then executes it,
//! saves it, or prints it.
//!
//! # Architecture
//!
//! - [`invocation`] - Command-line parsing, including shebang-combined arguments
//! - [`script_source`] - Reads the script and strips the shebang line
//! - [`prompt`] - Builds the model query around the fixed system prompt
//! - [`llm_client`] - Timeout-bounded model requests
//! - [`gateway`] - Provider wire formats and error classification
//! - [`providers`] - Model id routing and credentials
//! - [`http_client`] - HTTP client abstraction
//! - [`extractor`] - Finds the program in the model's answer
//! - [`executor`] - Runs, saves or prints the program
//! - [`pipeline`] - Wires the stages together
//! - [`config`] - Layered configuration
//! - [`error`] - Error kinds and exit codes
//!
//! # Example
//!
//! ```ignore
//! use llmexec::config::Config;
//! use llmexec::invocation::{parse_args, ParseOutcome};
//! use llmexec::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let args = ["llmexec", "--dry-run", "hello.llm"];
//!     if let ParseOutcome::Run(run) = parse_args(args, &config.default_model)? {
//!         let outcome = Pipeline::from_config(&config, &run)?.run(&run).await?;
//!         std::process::exit(outcome.exit_code);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod gateway;
pub mod http_client;
pub mod invocation;
pub mod llm_client;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod script_source;
