use anyhow::Result;
use clap::{Parser, Subcommand};
use concord_core::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
use commands::{
    handle_call_command, handle_config_command, handle_keys_command, CallArgs, ConfigCommands,
    KeysCommands,
};

#[derive(Parser)]
#[command(name = "concord-cli")]
#[command(about = "Concord CLI - quorum-verified JSON-RPC calls through a provider relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file for `call`, overrides `CONCORD_CONFIG`
    #[arg(long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform a verified JSON-RPC call
    Call(CallArgs),

    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Provider public keys
    #[command(subcommand)]
    Keys(KeysCommands),
}

/// Initializes logging for the `call` command. Logs go to stderr so responses on stdout
/// stay machine readable.
fn init_logging(config: &AppConfig) {
    let filter = if let Ok(env_filter) = std::env::var("RUST_LOG") {
        if env_filter == "debug" {
            EnvFilter::new("warn,concord_core=debug,concord_cli=debug")
        } else if env_filter == "trace" {
            EnvFilter::new("warn,concord_core=trace,concord_cli=trace")
        } else {
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("warn,concord_core=debug,concord_cli=debug"))
        }
    } else {
        EnvFilter::new(format!(
            "warn,concord_core={level},concord_cli={level}",
            level = config.logging.level
        ))
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    } else {
        // "pretty" and any other format default to pretty logging
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Call(args) => {
            let config = match cli.config {
                Some(path) => AppConfig::from_file(path)?,
                None => AppConfig::load()?,
            };
            init_logging(&config);
            handle_call_command(config, args).await?;
        }

        Commands::Config(config_command) => {
            handle_config_command(config_command)?;
        }

        Commands::Keys(keys_command) => {
            handle_keys_command(keys_command)?;
        }
    }

    Ok(())
}
