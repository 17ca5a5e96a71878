use llmexec::config::{Config, DEFAULT_MODEL};
use llmexec::error::{exit_code, LlmexecError};
use llmexec::invocation::{normalize_args, parse_normalized, ParseOutcome};
use llmexec::pipeline::Pipeline;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let args = match normalize_args(std::env::args().collect()) {
        Ok(args) => args,
        Err(err) => {
            eprint!("{}", err.render(false));
            return err.exit_code();
        }
    };

    // Logging must be up before config loading or argument parsing logs anything.
    init_logging(requests_verbose(&args));

    // A broken config file must not get in the way of --help and --version.
    let loaded = Config::load();
    let default_model = loaded
        .as_ref()
        .map_or(DEFAULT_MODEL, |config| config.default_model.as_str());

    let run_config = match parse_normalized(args, default_model) {
        Ok(ParseOutcome::Run(run_config)) => run_config,
        Ok(ParseOutcome::Exit(text)) => {
            print!("{}", text);
            return exit_code::SUCCESS;
        }
        Err(err) => {
            eprint!("{}", err.render(false));
            return err.exit_code();
        }
    };

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            let err = LlmexecError::Configuration(format!("{:#}", e));
            eprint!("{}", err.render(run_config.verbose));
            return err.exit_code();
        }
    };

    debug!("Configuration: {:?}", config);
    debug!("Run: {:?}", run_config);

    let result = match Pipeline::from_config(&config, &run_config) {
        Ok(pipeline) => pipeline.run(&run_config).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            eprint!("{}", err.render(run_config.verbose));
            err.exit_code()
        }
    }
}

fn requests_verbose(args: &[String]) -> bool {
    args.iter().skip(1).any(|arg| {
        let short_cluster = arg.starts_with('-')
            && !arg.starts_with("--")
            && arg[1..].chars().all(|c| c.is_ascii_alphabetic());
        arg == "--verbose" || (short_cluster && arg.contains('v'))
    })
}

/// `RUST_LOG` wins; otherwise `--verbose` turns on debug output for this crate.
fn init_logging(verbose: bool) {
    let fallback = if verbose { "warn,llmexec=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
