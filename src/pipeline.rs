//! Stage orchestration.
//!
//! Connects the script reader, prompt builder, model client, extractor and
//! execution router into one run.

use crate::{
    config::Config,
    error::Result,
    executor::{ExecutionOutcome, Executor, ProgramRunner, RouterConfig, SystemProgramRunner},
    extractor::extract_program,
    gateway::{CannedGateway, HttpGateway, ModelGateway, Sampling},
    http_client::ReqwestHttpClient,
    invocation::{Mode, RunConfig},
    llm_client::ModelClient,
    prompt::build_query,
    providers::Credentials,
    script_source::read_script,
};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

const SEPARATOR_WIDTH: usize = 50;

/// One run of the request-to-execution pipeline.
///
/// Stages run strictly in order: read script, build query, request model,
/// extract program, route. The first failure ends the run.
pub struct Pipeline {
    client: ModelClient,
    executor: Executor,
    interpreter: String,
}

impl Pipeline {
    pub fn new(
        gateway: Box<dyn ModelGateway>,
        timeout: Duration,
        interpreter: impl Into<String>,
    ) -> Self {
        Self {
            client: ModelClient::new(gateway, timeout),
            executor: Executor::new(),
            interpreter: interpreter.into(),
        }
    }

    /// Build the production pipeline for `config`.
    ///
    /// Uses the canned gateway when `LLMEXEC_MOCK_RESPONSE` was set, and the
    /// HTTP gateway with credentials from the environment otherwise.
    pub fn from_config(config: &Config, run: &RunConfig) -> Result<Self> {
        let timeout = Duration::from_secs(run.timeout_secs.unwrap_or(config.timeout_secs));

        let gateway: Box<dyn ModelGateway> = match &config.mock_response {
            Some(response) => Box::new(CannedGateway::new(response.clone())),
            None => Box::new(HttpGateway::new(
                ReqwestHttpClient::new(timeout)?,
                Credentials::from_env(),
                config.api_base.clone(),
                Sampling {
                    temperature: config.temperature,
                    max_tokens: config.max_tokens,
                },
            )),
        };

        let pipeline = Self::new(gateway, timeout, config.interpreter.clone());
        debug!("Model request timeout: {:?}", pipeline.client.timeout());
        Ok(pipeline)
    }

    pub async fn run(&self, run: &RunConfig) -> Result<ExecutionOutcome> {
        self.run_with_deps(
            run,
            &SystemProgramRunner,
            &mut std::io::stdout(),
            &mut std::io::stderr(),
        )
        .await
    }

    /// Run with injected dependencies (for testing).
    ///
    /// `diagnostics` receives the human-readable verbose output.
    pub async fn run_with_deps<P, W, D>(
        &self,
        run: &RunConfig,
        runner: &P,
        stdout: &mut W,
        diagnostics: &mut D,
    ) -> Result<ExecutionOutcome>
    where
        P: ProgramRunner,
        W: Write,
        D: Write,
    {
        let request = read_script(&run.script_path)?;
        info!("Processing script: {}", request.path().display());

        if run.verbose {
            let _ = writeln!(diagnostics, "Using model: {}", run.model);
            let _ = writeln!(diagnostics, "Request: {}", request.text().trim_end());
            let _ = writeln!(diagnostics, "{}", "-".repeat(SEPARATOR_WIDTH));
        }

        let query = build_query(&request, &run.model);
        let response = self.client.request(&query).await?;
        info!("Received {} bytes from '{}'", response.text.len(), response.model);
        let program = extract_program(&response.text)?;

        if !program.fenced {
            warn!(
                "No fenced code block in the response; treating the whole response as the program"
            );
        }

        if run.verbose && run.mode != Mode::DryRun {
            let _ = writeln!(diagnostics, "Generated code ({:?}):", program.rule);
            let _ = writeln!(diagnostics, "{}", "-".repeat(SEPARATOR_WIDTH));
            let _ = writeln!(diagnostics, "{}", program.source.trim_end());
            let _ = writeln!(diagnostics, "{}", "-".repeat(SEPARATOR_WIDTH));
        }

        let router_config = RouterConfig {
            mode: run.mode,
            output_path: run.output_path.clone(),
            working_dir: request.directory().to_path_buf(),
            interpreter: self.interpreter.clone(),
        };

        let outcome = self
            .executor
            .route_with_deps(&program, &router_config, runner, stdout)
            .await?;

        if run.verbose {
            match (outcome.branch, &run.output_path) {
                (Mode::Save, Some(path)) => {
                    let _ = writeln!(diagnostics, "Code saved to: {}", path.display());
                }
                (Mode::Execute, _) => {
                    let _ = writeln!(
                        diagnostics,
                        "Program exited with status {}",
                        outcome.exit_code
                    );
                }
                _ => {}
            }
        }

        Ok(outcome)
    }
}
