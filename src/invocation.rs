//! Command-line parsing, including shebang-combined arguments.
//!
//! When a script starts with `#!/usr/bin/llmexec --model gpt-4 -x`, most
//! kernels hand everything after the interpreter path to us as one argument
//! (`"--model gpt-4 -x"`). [`normalize_args`] detects that case and splits the
//! token the way a shell would before clap sees it.

use crate::error::{LlmexecError, Result};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Terminal action for the generated program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Execute,
    DryRun,
    Save,
}

/// Parsed command line for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub model: String,
    pub mode: Mode,
    pub output_path: Option<PathBuf>,
    pub verbose: bool,
    pub script_path: PathBuf,
    pub timeout_secs: Option<u64>,
}

/// Result of parsing: either a run, or text to print before exiting 0
/// (`--help`, `--version`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Run(RunConfig),
    Exit(String),
}

const KNOWN_FLAGS: &[&str] = &[
    "--model",
    "--execute",
    "-x",
    "--output",
    "-o",
    "--dry-run",
    "--verbose",
    "-v",
    "--timeout",
    "--help",
    "-h",
    "--version",
    "-V",
];

/// Value-taking options in the forms that carry the value in the same token.
const ATTACHED_VALUE_PREFIXES: &[&str] = &["--model=", "--output=", "--timeout=", "-o"];

pub fn build_cli() -> Command {
    Command::new("llmexec")
        .version(env!("CARGO_PKG_VERSION"))
        .about("LLM-powered shebang script executor")
        .long_about(
            "Turns the natural-language request in SCRIPT_FILE into a Python program \
             using a large language model, then runs, saves or prints it.",
        )
        .args_override_self(true)
        .after_help(
            "Examples:\n  \
             llmexec --dry-run hello.llm\n  \
             llmexec --model openai/gpt-4.1 -x script.llm\n  \
             llmexec -o tool.py script.llm\n\n\
             Shebang line:\n  \
             #!/usr/bin/env -S llmexec --model gemini/gemini-2.5-flash\n\n\
             API keys are read from OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY\n\
             (or GOOGLE_API_KEY) and OPENROUTER_API_KEY, or from a .env file.",
        )
        .arg(
            Arg::new("script")
                .help("Script file containing the natural language request")
                .value_name("SCRIPT_FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .num_args(1)
                .required(true),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .help("Model identifier, e.g. openai/gpt-4.1 or anthropic/claude-sonnet-4-5")
                .value_name("MODEL")
                .num_args(1),
        )
        .arg(
            Arg::new("execute")
                .long("execute")
                .short('x')
                .help("Execute the generated program (default)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .help("Save the generated program to FILE instead of running it")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .num_args(1),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Print the generated program without running it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Print diagnostics to stderr")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help("Model request timeout in seconds")
                .value_name("SECS")
                .num_args(1),
        )
}

/// Parse raw process arguments (including `argv[0]`).
pub fn parse_args<I, S>(raw: I, default_model: &str) -> Result<ParseOutcome>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args = normalize_args(raw.into_iter().map(Into::into).collect())?;
    parse_normalized(args, default_model)
}

/// Parse arguments that already went through [`normalize_args`].
pub fn parse_normalized(args: Vec<String>, default_model: &str) -> Result<ParseOutcome> {
    debug!("Normalized arguments: {:?}", args);

    let matches = match build_cli().try_get_matches_from(&args) {
        Ok(matches) => matches,
        Err(e) => {
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    Ok(ParseOutcome::Exit(e.render().to_string()))
                }
                _ => Err(clap_error_to_config(&e)),
            };
        }
    };

    Ok(ParseOutcome::Run(run_config_from_matches(&matches, default_model)?))
}

fn run_config_from_matches(matches: &ArgMatches, default_model: &str) -> Result<RunConfig> {
    let script_path = matches
        .get_one::<PathBuf>("script")
        .cloned()
        .ok_or_else(|| LlmexecError::Configuration("missing script path".to_string()))?;

    let model = matches
        .get_one::<String>("model")
        .cloned()
        .unwrap_or_else(|| default_model.to_string());
    if model.trim().is_empty() {
        return Err(LlmexecError::Configuration(
            "model identifier must not be empty".to_string(),
        ));
    }

    let timeout_secs = match matches.get_one::<String>("timeout") {
        Some(value) => Some(
            crate::config::parse_timeout(value)
                .map_err(|e| LlmexecError::Configuration(format!("--timeout: {}", e)))?,
        ),
        None => None,
    };

    let output_path = matches.get_one::<PathBuf>("output").cloned();
    let mode = select_mode(matches);

    Ok(RunConfig {
        model,
        mode,
        output_path,
        verbose: matches.get_flag("verbose"),
        script_path,
        timeout_secs,
    })
}

/// Pick the mode from the mode flags present. The last one given wins.
fn select_mode(matches: &ArgMatches) -> Mode {
    let mut given: Vec<(usize, Mode)> = [
        ("execute", Mode::Execute),
        ("dry-run", Mode::DryRun),
        ("output", Mode::Save),
    ]
    .into_iter()
    .filter(|(id, _)| matches.value_source(id) == Some(ValueSource::CommandLine))
    .filter_map(|(id, mode)| matches.index_of(id).map(|index| (index, mode)))
    .collect();

    given.sort_by_key(|(index, _)| *index);

    if given.len() > 1 {
        let overridden: Vec<Mode> = given[..given.len() - 1].iter().map(|(_, m)| *m).collect();
        warn!(
            "Conflicting mode flags; using the last one given ({:?}), ignoring {:?}",
            given[given.len() - 1].1,
            overridden
        );
    }

    given.last().map(|(_, mode)| *mode).unwrap_or(Mode::Execute)
}

fn clap_error_to_config(err: &clap::Error) -> LlmexecError {
    let message = match err.kind() {
        ErrorKind::UnknownArgument => match err.get(ContextKind::InvalidArg) {
            Some(ContextValue::String(token)) if token.starts_with('-') => {
                format!("unrecognized option '{}'", token)
            }
            Some(ContextValue::String(token)) => format!("unexpected argument '{}'", token),
            _ => first_line(err),
        },
        ErrorKind::MissingRequiredArgument => "missing script path".to_string(),
        _ => first_line(err),
    };
    LlmexecError::Configuration(message)
}

fn first_line(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string()
}

/// Re-split a shebang-combined first argument.
///
/// Only the first argument after the program name is considered, and only
/// when it looks like options (leading `-`), contains whitespace and is not a
/// known flag on its own.
pub fn normalize_args(raw: Vec<String>) -> Result<Vec<String>> {
    let Some(first) = raw.get(1) else {
        return Ok(raw);
    };

    if !needs_resplit(first) {
        return Ok(raw);
    }

    let words = split_words(first)?;
    debug!("Re-tokenized shebang argument {:?} into {:?}", first, words);

    let mut args = Vec::with_capacity(raw.len() + words.len());
    args.push(raw[0].clone());
    args.extend(words);
    args.extend(raw.into_iter().skip(2));
    Ok(args)
}

fn needs_resplit(token: &str) -> bool {
    token.starts_with('-')
        && token.chars().any(char::is_whitespace)
        && !KNOWN_FLAGS.contains(&token)
        && !is_attached_value(token)
}

/// True for one value-taking option whose attached value has whitespace in
/// it, such as `--output=my file.py` or `-omy file.py`.
///
/// `--model=gpt-4 -x` is not one: further options follow the value.
fn is_attached_value(token: &str) -> bool {
    let Some(value) = ATTACHED_VALUE_PREFIXES
        .iter()
        .find_map(|prefix| token.strip_prefix(prefix))
    else {
        return false;
    };

    !value.is_empty()
        && !value.starts_with(char::is_whitespace)
        && !value.split_whitespace().any(|word| word.starts_with('-'))
}

/// Split a string into words following POSIX shell quoting rules.
///
/// Supports single quotes, double quotes (with `\"`, `\\`, `\$` and `` \` ``
/// escapes) and backslash escapes outside quotes. No expansion is performed.
pub fn split_words(input: &str) -> Result<Vec<String>> {
    #[derive(PartialEq)]
    enum State {
        Between,
        Word,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut state = State::Between;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match state {
            State::Between | State::Word => match c {
                c if c.is_whitespace() => {
                    if state == State::Word {
                        words.push(std::mem::take(&mut current));
                        state = State::Between;
                    }
                }
                '\'' => state = State::Single,
                '"' => state = State::Double,
                '\\' => {
                    // A trailing backslash is kept literally.
                    current.push(chars.next().unwrap_or('\\'));
                    state = State::Word;
                }
                _ => {
                    current.push(c);
                    state = State::Word;
                }
            },
            State::Single => match c {
                '\'' => state = State::Word,
                _ => current.push(c),
            },
            State::Double => match c {
                '"' => state = State::Word,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => {
                        return Err(LlmexecError::Configuration(format!(
                            "unterminated double quote in arguments: {}",
                            input
                        )));
                    }
                },
                _ => current.push(c),
            },
        }
    }

    match state {
        State::Single => Err(LlmexecError::Configuration(format!(
            "unterminated single quote in arguments: {}",
            input
        ))),
        State::Double => Err(LlmexecError::Configuration(format!(
            "unterminated double quote in arguments: {}",
            input
        ))),
        State::Word => {
            words.push(current);
            Ok(words)
        }
        State::Between => Ok(words),
    }
}
