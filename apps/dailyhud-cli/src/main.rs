//! daily-hud CLI
//!
//! Runs every configured check and prints one prioritized status report.

mod commands;

use clap::{Parser, Subcommand};
use dailyhud_core::{HudError, DEFAULT_CONFIG_PATH};
use dailyhud_engine::EXIT_ERROR;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code for configuration problems, distinct from severity outcomes
const EXIT_CONFIG: i32 = 3;

/// daily-hud - morning dashboard for infrastructure, security and tasks
#[derive(Parser)]
#[command(name = "daily-hud")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Comma-separated list of checks to run
    #[arg(long)]
    only: Option<String>,

    /// Show details for OK checks too
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Disable caching
    #[arg(long)]
    no_cache: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Log at debug level to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every registered check
    List,
}

fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<HudError>() {
        Some(e) if e.is_configuration() => EXIT_CONFIG,
        _ => EXIT_ERROR,
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let outcome = match cli.command {
        Some(Commands::List) => commands::list::run(cli.json).map(|_| 0),
        None => commands::run::run(commands::run::RunArgs {
            config: cli.config,
            only: cli.only,
            verbose: cli.verbose,
            json: cli.json,
            no_cache: cli.no_cache,
            no_color: cli.no_color,
        }),
    };

    let code = match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e);
            if let Some(HudError::UnknownChecks { available, .. }) = e.downcast_ref::<HudError>() {
                eprintln!("Available: {}", available.join(", "));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}
