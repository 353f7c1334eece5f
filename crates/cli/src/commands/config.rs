use clap::Subcommand;
use concord_core::config::AppConfig;
use std::path::Path;

use super::utils::{mask_secret, print_error, print_info, print_success, CliError, CliResult};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Show the effective configuration
    Show {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Show the API key in clear
        #[arg(long)]
        show_sensitive: bool,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output path for the config file
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file, show_sensitive } => show_config(&file, show_sensitive),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

fn validate_config(file: &str) -> CliResult<()> {
    if !Path::new(file).exists() {
        print_error(&format!("Configuration file not found: {file}"));
        return Err(CliError::Config(format!("File not found: {file}")));
    }

    print_info(&format!("Loading configuration from {file}..."));
    let config = AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))?;

    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;

    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Relay: {} ({:?})", config.client.url, config.client.transport);
    println!(
        "  Quorum: {} of {}",
        config.client.quorum_of(),
        config.client.quorum_from()
    );
    println!(
        "  Providers: {}",
        if config.client.provider_ids.is_empty() {
            "chosen by relay".to_string()
        } else {
            config.client.provider_ids.join(", ")
        }
    );
    println!(
        "  Signatures: {}",
        if config.client.skip_signature_check {
            "NOT checked"
        } else {
            "checked"
        }
    );

    Ok(())
}

fn show_config(file: &str, show_sensitive: bool) -> CliResult<()> {
    let config = AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))?;

    println!("Configuration from {file}:");

    println!("\n[Client]");
    println!("  URL: {}", config.client.url);
    if let Some(ws_url) = &config.client.ws_url {
        println!("  WebSocket URL: {ws_url}");
    }
    println!("  Transport: {:?}", config.client.transport);
    if show_sensitive {
        println!("  API Key: {}", config.client.api_key);
    } else {
        println!(
            "  API Key: {} [use --show-sensitive to reveal]",
            mask_secret(&config.client.api_key)
        );
    }
    println!("  Network: {}", config.client.network);
    println!("  Provider IDs: {:?}", config.client.provider_ids);
    println!("  Quorum Of: {}", config.client.quorum_of());
    println!("  Quorum From: {}", config.client.quorum_from());
    println!("  Timeout: {}ms", config.client.timeout_ms);
    println!("  Skip Signature Check: {}", config.client.skip_signature_check);

    println!("\n[HTTP]");
    println!("  Concurrent Limit: {}", config.http.concurrent_limit);
    println!("  Max Retries: {}", config.http.max_retries);

    println!("\n[Keys] ({} overrides)", config.keys.len());
    for provider_id in config.keys.keys() {
        println!("  {provider_id}");
    }

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# Concord relay client configuration

[client]
url = "https://main.drpc.org"
# ws_url = "wss://main.drpc.org"
transport = "http"
api_key = "YOUR_DKEY"
network = "ethereum"
# Leave empty to let the relay choose providers
provider_ids = []
quorum_of = 2
quorum_from = 3
timeout_ms = 5000
skip_signature_check = false

[http]
concurrent_limit = 100
permit_timeout_ms = 500
max_retries = 2
connect_timeout_ms = 5000

[logging]
level = "info"
format = "pretty"

# Extra or replacement provider public keys (uncompressed P-256, hex)
[keys]
"#;

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output, SAMPLE_CONFIG)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Remember to replace YOUR_DKEY with your relay key");

    Ok(())
}
