pub mod commands;

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use promissory_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

use crate::commands::detect::DetectRole;

#[derive(Debug, Parser)]
#[command(
    name = "promissory",
    about = "Promissory operator CLI",
    long_about = "Inspect configuration, manage the schema, and exercise promise detection, context resolution and pending replay.",
    after_help = "Examples:\n  promissory doctor --json\n  promissory detect --role assistant \"I'll text you the registration link\"\n  promissory replay tenant-1 lead-9 --to +17135550199 --name Ana"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, pattern tables, catalog, gateway and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Score a single message for a promise or request signal")]
    Detect {
        #[arg(long, value_enum, default_value_t = DetectRole::Assistant)]
        role: DetectRole,
        #[arg(long, help = "Prior conversation text used for category and floor checks")]
        context: Option<String>,
        text: String,
    },
    #[command(about = "Show the resolved delivery context, pending queue and history of a lead")]
    Resolve { tenant: String, lead: String },
    #[command(about = "Deliver a lead's pending promises to a destination")]
    Replay {
        tenant: String,
        lead: String,
        #[arg(long = "to", help = "Destination phone number")]
        destination: String,
        #[arg(long)]
        name: Option<String>,
    },
}

/// Installs a stderr subscriber so command payloads on stdout stay parseable.
/// `RUST_LOG` wins over `logging.level` when set.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log filter `{}`", config.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|error| anyhow::anyhow!("tracing subscriber already set: {error}"))
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        if let Err(error) = init_logging(&config.logging) {
            eprintln!("logging disabled: {error:#}");
        }
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (output, healthy) = commands::doctor::run(json);
            commands::CommandResult { exit_code: if healthy { 0 } else { 1 }, output }
        }
        Command::Detect { role, context, text } => {
            commands::detect::run(role, &text, context.as_deref())
        }
        Command::Resolve { tenant, lead } => commands::resolve::run(&tenant, &lead),
        Command::Replay { tenant, lead, destination, name } => {
            commands::replay::run(&tenant, &lead, &destination, name.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
