use clap::Subcommand;
use concord_core::{config::AppConfig, crypto::ProviderKey, keys::PublicKeyTable};

use super::utils::{print_error, print_success, CliError, CliResult};

#[derive(Subcommand)]
pub enum KeysCommands {
    /// List the provider keys a client would verify against
    List {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Print full keys instead of fingerprints
        #[arg(long)]
        full: bool,
    },

    /// Check that a hex public key is a valid P-256 point
    Check {
        /// Uncompressed or compressed public key, hex encoded
        key: String,
    },
}

pub fn handle_keys_command(command: KeysCommands) -> CliResult<()> {
    match command {
        KeysCommands::List { file, full } => list_keys(&file, full),
        KeysCommands::Check { key } => check_key(&key),
    }
}

fn list_keys(file: &str, full: bool) -> CliResult<()> {
    let config = AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))?;
    let table = PublicKeyTable::builtin_with(&config.keys)
        .map_err(|e| CliError::Config(format!("invalid public key: {e}")))?;

    println!("Provider keys ({}):", table.len());
    for (provider_id, hex_key) in table.entries() {
        let source = if config.keys.contains_key(provider_id) { "config" } else { "built-in" };
        let shown = if full { hex_key.to_string() } else { fingerprint(hex_key) };
        println!("  {provider_id:<16} {shown} ({source})");
    }
    Ok(())
}

fn check_key(key: &str) -> CliResult<()> {
    match ProviderKey::from_hex(key.trim()) {
        Ok(_) => {
            print_success("Key is a valid P-256 public key");
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Invalid key: {e}"));
            Err(CliError::General(e.to_string()))
        }
    }
}

fn fingerprint(hex_key: &str) -> String {
    if hex_key.len() <= 20 {
        return hex_key.to_string();
    }
    format!("{}...{}", &hex_key[..12], &hex_key[hex_key.len() - 8..])
}
