mod config_commands;
mod db_commands;
mod hub_commands;
mod run_command;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    hublink_config::HublinkConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "hublink", about = "hublink: relay chat channels across servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "HUBLINK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of discovering one.
    #[arg(long, global = true, env = "HUBLINK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay inbound events read as JSON lines from stdin or a file.
    Run {
        /// Read events from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Run all pending database migrations.
    Migrate,
    /// Expire lapsed blacklists and warnings.
    Sweep,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Hub, connection and rule administration.
    Hub {
        #[command(subcommand)]
        action: hub_commands::HubAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<HublinkConfig> {
    match &cli.config {
        Some(path) => {
            let mut config = hublink_config::load_config(path)?;
            hublink_config::apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(hublink_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "hublink starting");

    match &cli.command {
        Commands::Run { input } => {
            let config = load_config(&cli)?;
            run_command::run(&config, input.as_deref()).await
        },
        Commands::Migrate => db_commands::migrate(&load_config(&cli)?).await,
        Commands::Sweep => db_commands::sweep(&load_config(&cli)?).await,
        Commands::Config { action } => config_commands::handle_config(action, cli.config.as_deref()),
        Commands::Hub { action } => hub_commands::handle_hub(action, &load_config(&cli)?).await,
    }
}
