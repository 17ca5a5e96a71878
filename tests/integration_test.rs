use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const HELLO_RESPONSE: &str = "Here is the program:\n```python\nprint(\"HELLO\")\n```\n";

/// Helper to build an llmexec command with a canned model response in an isolated environment
fn llmexec_command(workdir: &Path, mock_response: Option<&str>, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_llmexec"));
    cmd.args(args);
    cmd.current_dir(workdir);

    // Keep the developer's keys, config file and overrides out of the run
    for var in [
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "GEMINI_API_KEY",
        "GOOGLE_API_KEY",
        "OPENROUTER_API_KEY",
        "LLMEXEC_MODEL",
        "LLMEXEC_TIMEOUT_SECS",
        "LLMEXEC_INTERPRETER",
        "LLMEXEC_API_BASE",
        "LLMEXEC_MOCK_RESPONSE",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("HOME", workdir);
    cmd.env("XDG_CONFIG_HOME", workdir.join(".config"));

    if let Some(response) = mock_response {
        cmd.env("LLMEXEC_MOCK_RESPONSE", response);
    }

    cmd
}

fn run_llmexec(workdir: &Path, mock_response: Option<&str>, args: &[&str]) -> Result<Output> {
    Ok(llmexec_command(workdir, mock_response, args).output()?)
}

/// Poll until `condition` holds or `limit` passes.
fn wait_for(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

fn write_script(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}

fn python_available() -> bool {
    which::which("python3").is_ok() || which::which("python").is_ok()
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_dry_run_prints_program_without_running_it() -> Result<()> {
    let dir = TempDir::new()?;
    let script = write_script(
        dir.path(),
        "hello.llm",
        "#!/usr/bin/env -S llmexec\nPrint the text HELLO\n",
    )?;

    let output = run_llmexec(
        dir.path(),
        Some(HELLO_RESPONSE),
        &["--dry-run", script.to_str().unwrap()],
    )?;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), "print(\"HELLO\")\n");
    Ok(())
}

#[test]
fn test_save_writes_program_to_file() -> Result<()> {
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "hello.llm", "Print the text HELLO")?;
    let target = dir.path().join("generated").join("hello.py");

    let output = run_llmexec(
        dir.path(),
        Some(HELLO_RESPONSE),
        &["-o", target.to_str().unwrap(), script.to_str().unwrap()],
    )?;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(std::fs::read_to_string(&target)?, "print(\"HELLO\")\n");
    assert!(stdout_of(&output).is_empty());
    Ok(())
}

#[test]
fn test_execute_runs_generated_program() -> Result<()> {
    if !python_available() {
        eprintln!("Skipping: no Python interpreter on PATH");
        return Ok(());
    }

    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "hello.llm", "Print the text HELLO")?;

    let output = run_llmexec(dir.path(), Some(HELLO_RESPONSE), &["-x", script.to_str().unwrap()])?;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), "HELLO\n");
    Ok(())
}

#[test]
fn test_execute_is_the_default_mode() -> Result<()> {
    if !python_available() {
        eprintln!("Skipping: no Python interpreter on PATH");
        return Ok(());
    }

    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "hello.llm", "Print the text HELLO")?;

    let output = run_llmexec(dir.path(), Some(HELLO_RESPONSE), &[script.to_str().unwrap()])?;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), "HELLO\n");
    Ok(())
}

#[test]
fn test_program_runs_in_script_directory() -> Result<()> {
    if !python_available() {
        eprintln!("Skipping: no Python interpreter on PATH");
        return Ok(());
    }

    let workdir = TempDir::new()?;
    let script_dir = TempDir::new()?;
    std::fs::write(script_dir.path().join("data.txt"), "from the script directory")?;
    let script = write_script(script_dir.path(), "read.llm", "Print the contents of data.txt")?;
    let response = "```python\nprint(open('data.txt').read())\n```";

    let output = run_llmexec(workdir.path(), Some(response), &[script.to_str().unwrap()])?;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output).trim_end(), "from the script directory");
    Ok(())
}

#[test]
fn test_program_exit_code_passes_through() -> Result<()> {
    if !python_available() {
        eprintln!("Skipping: no Python interpreter on PATH");
        return Ok(());
    }

    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "fail.llm", "Exit with status 3")?;
    let response = "```python\nimport sys\nsys.exit(3)\n```";

    let output = run_llmexec(dir.path(), Some(response), &[script.to_str().unwrap()])?;

    assert_eq!(output.status.code(), Some(3));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_program_killed_by_signal_maps_to_128_plus_signal() -> Result<()> {
    if !python_available() {
        eprintln!("Skipping: no Python interpreter on PATH");
        return Ok(());
    }

    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "term.llm", "Terminate yourself")?;
    let response = "```python\nimport os, signal\nos.kill(os.getpid(), signal.SIGTERM)\n```";

    let output = run_llmexec(dir.path(), Some(response), &[script.to_str().unwrap()])?;

    assert_eq!(output.status.code(), Some(128 + 15));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_interrupt_stops_program_and_exits_130() -> Result<()> {
    if !python_available() {
        eprintln!("Skipping: no Python interpreter on PATH");
        return Ok(());
    }

    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "loop.llm", "Count forever")?;
    let response = "```python\n\
        import pathlib, time\n\
        beat = pathlib.Path('beat.txt')\n\
        n = 0\n\
        try:\n\
        \x20   while True:\n\
        \x20       n += 1\n\
        \x20       beat.write_text(str(n))\n\
        \x20       time.sleep(0.05)\n\
        except KeyboardInterrupt:\n\
        \x20   pathlib.Path('interrupted.txt').write_text('yes')\n\
        ```";

    let mut child = llmexec_command(dir.path(), Some(response), &[script.to_str().unwrap()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let beat = dir.path().join("beat.txt");
    if !wait_for(Duration::from_secs(10), || beat.exists()) {
        child.kill()?;
        panic!("generated program never started");
    }

    // Only llmexec gets the signal, as with `kill -INT <pid>` from a supervisor.
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGINT);
    }

    let mut status = None;
    wait_for(Duration::from_secs(10), || {
        status = child.try_wait().ok().flatten();
        status.is_some()
    });
    let Some(status) = status else {
        child.kill()?;
        panic!("llmexec did not exit after SIGINT");
    };

    assert_eq!(status.code(), Some(130));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("interrupted.txt"))?,
        "yes",
        "program should have received the forwarded SIGINT"
    );

    let last = std::fs::read_to_string(&beat)?;
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(std::fs::read_to_string(&beat)?, last, "program still running");
    Ok(())
}

#[test]
fn test_broken_config_file_does_not_block_help() -> Result<()> {
    let dir = TempDir::new()?;
    for config_dir in [
        dir.path().join(".config"),
        dir.path().join("Library").join("Application Support"),
    ] {
        std::fs::create_dir_all(config_dir.join("llmexec"))?;
        std::fs::write(config_dir.join("llmexec").join("config.toml"), "timeout_secs = [")?;
    }

    let output = run_llmexec(dir.path(), None, &["--help"])?;
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));

    let script = write_script(dir.path(), "hello.llm", "Print the text HELLO")?;
    let output = run_llmexec(dir.path(), Some(HELLO_RESPONSE), &[script.to_str().unwrap()])?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[test]
fn test_output_option_with_attached_value_containing_spaces() -> Result<()> {
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "hello.llm", "Print the text HELLO")?;
    let target = dir.path().join("my program.py");
    let output_arg = format!("--output={}", target.display());

    let output = run_llmexec(
        dir.path(),
        Some(HELLO_RESPONSE),
        &[&output_arg, script.to_str().unwrap()],
    )?;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(std::fs::read_to_string(&target)?, "print(\"HELLO\")\n");
    Ok(())
}

#[test]
fn test_shebang_combined_arguments_are_split() -> Result<()> {
    let dir = TempDir::new()?;
    let script = write_script(
        dir.path(),
        "hello.llm",
        "#!/usr/bin/llmexec --dry-run --model test/m\nPrint HELLO\n",
    )?;

    // What the kernel passes for `#!/usr/bin/llmexec --dry-run --model test/m`
    let output = run_llmexec(
        dir.path(),
        Some(HELLO_RESPONSE),
        &["--dry-run --model test/m", script.to_str().unwrap()],
    )?;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), "print(\"HELLO\")\n");
    Ok(())
}

#[test]
fn test_verbose_reports_model_and_code_on_stderr() -> Result<()> {
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "hello.llm", "Print the text HELLO")?;
    let target = dir.path().join("hello.py");

    let output = run_llmexec(
        dir.path(),
        Some(HELLO_RESPONSE),
        &[
            "-v",
            "--model",
            "test/verbose-model",
            "-o",
            target.to_str().unwrap(),
            script.to_str().unwrap(),
        ],
    )?;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("Using model: test/verbose-model"));
    assert!(stderr.contains("Request: Print the text HELLO"));
    assert!(stderr.contains("print(\"HELLO\")"));
    assert!(stdout_of(&output).is_empty());
    Ok(())
}

#[test]
fn test_missing_credentials_fail_with_authentication_error() -> Result<()> {
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "hello.llm", "Print the text HELLO")?;

    let output = run_llmexec(
        dir.path(),
        None,
        &["--model", "openai/gpt-4.1", script.to_str().unwrap()],
    )?;

    assert_eq!(output.status.code(), Some(4));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("AuthenticationFailure"), "stderr: {}", stderr);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {}", stderr);
    assert!(stdout_of(&output).is_empty());
    Ok(())
}

#[test]
fn test_missing_script_exits_with_script_error() -> Result<()> {
    let dir = TempDir::new()?;
    let missing = dir.path().join("nope.llm");

    let output = run_llmexec(dir.path(), Some(HELLO_RESPONSE), &[missing.to_str().unwrap()])?;

    assert_eq!(output.status.code(), Some(3));
    assert!(stderr_of(&output).contains("nope.llm"));
    Ok(())
}

#[test]
fn test_unknown_option_is_configuration_error() -> Result<()> {
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "hello.llm", "Print the text HELLO")?;

    let output = run_llmexec(
        dir.path(),
        Some(HELLO_RESPONSE),
        &["--bogus", script.to_str().unwrap()],
    )?;

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr_of(&output).contains("--bogus"));
    Ok(())
}

#[test]
fn test_no_script_argument_is_configuration_error() -> Result<()> {
    let dir = TempDir::new()?;

    let output = run_llmexec(dir.path(), Some(HELLO_RESPONSE), &[])?;

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr_of(&output).contains("missing script path"));
    Ok(())
}

#[test]
fn test_prose_only_response_is_no_code_error() -> Result<()> {
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "hello.llm", "Print the text HELLO")?;

    let output = run_llmexec(
        dir.path(),
        Some("I'm sorry, but I cannot help with that request."),
        &[script.to_str().unwrap()],
    )?;

    assert_eq!(output.status.code(), Some(5));
    assert!(stdout_of(&output).is_empty());
    Ok(())
}

#[test]
fn test_help_exits_successfully() -> Result<()> {
    let dir = TempDir::new()?;

    let output = run_llmexec(dir.path(), None, &["--help"])?;

    assert_eq!(output.status.code(), Some(0));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("SCRIPT_FILE"));
    assert!(stdout.contains("--dry-run"));
    Ok(())
}
