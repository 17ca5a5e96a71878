//! Execution router for generated programs.
//!
//! This module dispatches an extracted program to one of three terminal
//! actions:
//! - **dry-run**: print the program to stdout
//! - **save**: write the program to the requested file
//! - **execute**: run it with the Python interpreter from the script's directory
//!
//! Executed programs inherit stdin, stdout and stderr so their output streams
//! live. The router's exit status is the program's exit status.

use crate::error::{LlmexecError, Result};
use crate::extractor::ExtractedProgram;
use crate::invocation::Mode;
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time a program gets to exit on its own after an interrupt before it is killed.
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Interpreters tried when the configured one is not on PATH.
const FALLBACK_INTERPRETERS: &[&str] = &["python3", "python"];

/// Routing parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub mode: Mode,
    pub output_path: Option<PathBuf>,
    /// Working directory for executed programs.
    pub working_dir: PathBuf,
    pub interpreter: String,
}

/// Terminal value of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub branch: Mode,
    pub exit_code: i32,
}

// =============================================================================
// Traits for Dependency Injection
// =============================================================================

/// Trait for running the interpreter on a program file.
///
/// This abstraction enables testing without spawning real processes.
#[async_trait]
pub trait ProgramRunner: Send + Sync {
    /// Runs `interpreter program` in `working_dir` and returns its exit code.
    async fn run(&self, interpreter: &Path, program: &Path, working_dir: &Path) -> Result<i32>;

    /// Resolves a program name against PATH.
    fn find_program(&self, name: &str) -> Option<PathBuf>;
}

/// Runner spawning a real subprocess with live stdio.
///
/// An interrupt received while the program runs is forwarded as `SIGINT`.
/// The program then gets [`INTERRUPT_GRACE`] to exit before it is killed, and
/// it is always reaped before this returns.
pub struct SystemProgramRunner;

#[async_trait]
impl ProgramRunner for SystemProgramRunner {
    async fn run(&self, interpreter: &Path, program: &Path, working_dir: &Path) -> Result<i32> {
        let mut child = tokio::process::Command::new(interpreter)
            .arg(program)
            .current_dir(working_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LlmexecError::Execution(format!(
                    "failed to start {}: {}",
                    interpreter.display(),
                    e
                ))
            })?;

        debug!("Spawned {} (pid {:?})", interpreter.display(), child.id());

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| {
                    LlmexecError::Execution(format!("failed to wait for program: {}", e))
                })?;
                Ok(exit_code_of(status))
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                warn!("Interrupt received, stopping generated program");
                forward_interrupt(&child);
                match tokio::time::timeout(INTERRUPT_GRACE, child.wait()).await {
                    Ok(_) => debug!("Program exited after interrupt"),
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill generated program: {}", e);
                        }
                    }
                }
                Err(LlmexecError::Interrupted)
            }
        }
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

#[cfg(unix)]
fn forward_interrupt(child: &tokio::process::Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: kill(2) only takes plain integers.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc != 0 {
        debug!(
            "Could not forward SIGINT to pid {}: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn forward_interrupt(_child: &tokio::process::Child) {}

/// Exit code of a finished process; `128 + signal` when killed by a signal.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

// =============================================================================
// Executor Implementation
// =============================================================================

/// Routes extracted programs to their terminal action.
///
/// # Example
///
/// ```ignore
/// let executor = Executor::new();
/// let outcome = executor.route(&program, &router_config).await?;
/// std::process::exit(outcome.exit_code);
/// ```
pub struct Executor;

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// Routes `program` using the real process runner and stdout.
    pub async fn route(
        &self,
        program: &ExtractedProgram,
        config: &RouterConfig,
    ) -> Result<ExecutionOutcome> {
        self.route_with_deps(program, config, &SystemProgramRunner, &mut std::io::stdout())
            .await
    }

    /// Routes `program` with injected dependencies (for testing).
    pub async fn route_with_deps<P, W>(
        &self,
        program: &ExtractedProgram,
        config: &RouterConfig,
        runner: &P,
        stdout: &mut W,
    ) -> Result<ExecutionOutcome>
    where
        P: ProgramRunner,
        W: Write,
    {
        info!("Routing generated program: {:?}", config.mode);

        let exit_code = match config.mode {
            Mode::DryRun => {
                Self::print_program(&program.source, stdout)?;
                0
            }
            Mode::Save => {
                let path = config.output_path.as_deref().ok_or_else(|| {
                    LlmexecError::Configuration("save mode requires an output path".to_string())
                })?;
                Self::save_program(&program.source, path)?;
                0
            }
            Mode::Execute => {
                self.execute_program(&program.source, config, runner).await?
            }
        };

        Ok(ExecutionOutcome {
            branch: config.mode,
            exit_code,
        })
    }

    fn print_program<W: Write>(source: &str, stdout: &mut W) -> Result<()> {
        let write_err = |source| LlmexecError::Write {
            path: PathBuf::from("<stdout>"),
            source,
        };
        stdout
            .write_all(with_trailing_newline(source).as_bytes())
            .map_err(write_err)?;
        stdout.flush().map_err(write_err)
    }

    /// Writes the program to `path`, creating parent directories and
    /// replacing any existing file.
    fn save_program(source: &str, path: &Path) -> Result<()> {
        let write_err = |source| LlmexecError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, with_trailing_newline(source)).map_err(write_err)?;
        info!("Saved generated program to {}", path.display());
        Ok(())
    }

    async fn execute_program<P: ProgramRunner>(
        &self,
        source: &str,
        config: &RouterConfig,
        runner: &P,
    ) -> Result<i32> {
        let interpreter = Self::resolve_interpreter(&config.interpreter, runner)?;

        if !config.working_dir.is_dir() {
            return Err(LlmexecError::Execution(format!(
                "working directory {} does not exist",
                config.working_dir.display()
            )));
        }

        // Removed when the guard drops, on every path out of this function.
        let mut file = tempfile::Builder::new()
            .prefix("llmexec-")
            .suffix(".py")
            .tempfile()
            .map_err(|e| {
                LlmexecError::Execution(format!("failed to create temporary file: {}", e))
            })?;
        let temp_path = file.path().to_path_buf();
        file.write_all(with_trailing_newline(source).as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| LlmexecError::Write {
                path: temp_path.clone(),
                source,
            })?;

        info!(
            "Executing {} with {} in {}",
            temp_path.display(),
            interpreter.display(),
            config.working_dir.display()
        );

        let exit_code = runner.run(&interpreter, &temp_path, &config.working_dir).await?;
        info!("Generated program exited with status {}", exit_code);
        Ok(exit_code)
    }

    /// Finds the configured interpreter, falling back to `python3` and `python`.
    fn resolve_interpreter<P: ProgramRunner>(configured: &str, runner: &P) -> Result<PathBuf> {
        std::iter::once(configured)
            .chain(FALLBACK_INTERPRETERS.iter().copied())
            .find_map(|name| runner.find_program(name))
            .ok_or_else(|| {
                LlmexecError::Execution(format!(
                    "Python interpreter not found (tried {}, {}). Install Python 3 or set LLMEXEC_INTERPRETER.",
                    configured,
                    FALLBACK_INTERPRETERS.join(", ")
                ))
            })
    }
}

fn with_trailing_newline(source: &str) -> String {
    if source.ends_with('\n') {
        source.to_string()
    } else {
        format!("{}\n", source)
    }
}
