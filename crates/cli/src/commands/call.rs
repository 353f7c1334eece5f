use clap::Args;
use concord_core::{config::AppConfig, JsonRpcRequest, RelayClient};
use serde_json::Value;
use tracing::info;

use super::utils::{print_info, CliError, CliResult};

#[derive(Args)]
pub struct CallArgs {
    /// JSON-RPC method, e.g. `eth_blockNumber`
    pub method: String,

    /// Parameters. Each is parsed as JSON, falling back to a plain string.
    pub params: Vec<String>,

    /// Provider to address (repeatable). Overrides the configured list.
    #[arg(short, long = "provider")]
    pub providers: Vec<String>,

    /// Identical replies needed to trust the result
    #[arg(long)]
    pub quorum_of: Option<u32>,

    /// Providers that must answer
    #[arg(long)]
    pub quorum_from: Option<u32>,

    /// Call deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Accept replies without verifying provider signatures
    #[arg(long)]
    pub skip_signature_check: bool,

    /// Repeat the call this many times in one batch
    #[arg(long, default_value = "1")]
    pub repeat: usize,
}

/// Parses a command line parameter as JSON, or keeps it as a string.
pub fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Applies command line overrides to the loaded configuration.
pub fn apply_overrides(config: &mut AppConfig, args: &CallArgs) {
    if !args.providers.is_empty() {
        config.client.provider_ids.clone_from(&args.providers);
    }
    if args.quorum_of.is_some() {
        config.client.quorum_of = args.quorum_of;
    }
    if args.quorum_from.is_some() {
        config.client.quorum_from = args.quorum_from;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.client.timeout_ms = timeout_ms;
    }
    if args.skip_signature_check {
        config.client.skip_signature_check = true;
    }
}

pub async fn handle_call_command(mut config: AppConfig, args: CallArgs) -> CliResult<()> {
    apply_overrides(&mut config, &args);
    config.validate().map_err(CliError::Config)?;

    let client = RelayClient::from_config(&config).await?;
    let params: Vec<Value> = args.params.iter().map(|p| parse_param(p)).collect();
    let requests: Vec<JsonRpcRequest> = (0..args.repeat.max(1))
        .map(|_| JsonRpcRequest::new(args.method.clone(), params.clone()))
        .collect();

    print_info(&format!(
        "Calling {} via {} (quorum {} of {})",
        args.method,
        config.client.url,
        config.client.quorum_of(),
        config.client.quorum_from()
    ));

    let started = std::time::Instant::now();
    let responses = client.call_multi(requests).await?;
    info!(method = %args.method, elapsed_ms = started.elapsed().as_millis(), "call verified");

    for response in &responses {
        println!("{}", serde_json::to_string_pretty(response)?);
    }
    Ok(())
}
