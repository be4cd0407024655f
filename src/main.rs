use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use codetutor::cli::commands;
use codetutor::cli::ui::Output;
use codetutor::config::{Config, ConfigLoader};
use codetutor::constants::logging::CALL_LOG_TARGET;
use codetutor::gateway::call_log;

#[derive(Parser)]
#[command(name = "codetutor")]
#[command(
    version,
    about = "Token-budgeted codebase context and cached LLM calls for tutorial generation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt to the active provider and print the response
    Ask {
        #[arg(help = "Prompt text (read from --file or stdin when omitted)")]
        prompt: Option<String>,
        #[arg(long, short, help = "Read the prompt from a file")]
        file: Option<PathBuf>,
        #[arg(long, help = "Bypass the response cache")]
        no_cache: bool,
    },

    /// Build a token-bounded context from a JSON file list
    Context {
        #[arg(
            long,
            short,
            help = "JSON array of {path, content} objects ('-' for stdin)"
        )]
        input: PathBuf,
        #[arg(long, help = "Token budget override")]
        max_tokens: Option<usize>,
        #[arg(long, help = "Files kept per directory depth override")]
        max_files_per_level: Option<usize>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Inspect and maintain the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts
    Stats,
    /// Remove expired entries
    Prune,
    /// Remove every entry
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json, yaml"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mcodetutor encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Output::new().error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

/// Console layer plus the daily call log (when a config is available)
fn init_tracing(cli: &Cli, config: Option<&Config>) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    // Prompts and responses go to the call log, not the terminal
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{}=off", level, CALL_LOG_TARGET)));
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let call_log = config.and_then(|config| match call_log::call_log_layer(&config.logging.dir) {
        Ok(layer) => Some(layer),
        Err(e) => {
            eprintln!(
                "warning: call log disabled ({}: {})",
                config.logging.dir.display(),
                e
            );
            None
        }
    });

    tracing_subscriber::registry()
        .with(console)
        .with(call_log)
        .init();
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `config init` must work even when the current config does not load
    if let Commands::Config {
        action: ConfigAction::Init { global, force },
    } = &cli.command
    {
        init_tracing(&cli, None);
        commands::config::init(*global, *force)?;
        return Ok(());
    }

    let config = ConfigLoader::load();
    init_tracing(&cli, config.as_ref().ok());
    let config = config?;

    match cli.command {
        Commands::Ask {
            prompt,
            file,
            no_cache,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::ask::run(
                &config,
                prompt,
                file.as_deref(),
                no_cache,
            ))?;
        }
        Commands::Context {
            input,
            max_tokens,
            max_files_per_level,
            format,
        } => {
            commands::context::run(&config, &input, max_tokens, max_files_per_level, &format)?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => commands::cache::stats(&config)?,
            CacheAction::Prune => commands::cache::prune(&config)?,
            CacheAction::Clear => commands::cache::clear(&config)?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => {
                commands::config::show(global, &format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { .. } => {}
        },
    }

    Ok(())
}
