//! CLI runner for assembled APIs.
//!
//! Binaries hand their [`WebApi`] to [`serve`] together with parsed
//! [`ServeArgs`]: configuration is loaded from an optional JSON file, inline
//! `--set` overrides are applied on top, endpoints are enabled/disabled,
//! the application is built and the server runs until it exits.

use std::collections::HashSet;
use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::WebApi;
use crate::server::ApiServer;

/// Command-line arguments for serving an API.
#[derive(Parser, Debug)]
#[command(about = "Serve a trellis web API")]
pub struct ServeArgs {
    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "TRELLIS_PORT")]
    pub port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0", env = "TRELLIS_ADDRESS")]
    pub address: String,

    /// Serve only these endpoints (repeatable).
    #[arg(long)]
    pub enable: Vec<String>,

    /// Serve all but these endpoints (repeatable, wins over --enable).
    #[arg(long)]
    pub disable: Vec<String>,

    /// JSON settings file merged over the defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Inline setting override: a dotted key path and a JSON value
    /// (unquoted strings are taken literally). Repeatable.
    #[arg(long = "set", num_args = 2, value_names = ["PATH", "VALUE"])]
    pub set: Vec<String>,
}

/// Initialize process logging from `RUST_LOG` (info by default).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

/// Apply configuration, build the application and serve until exit.
pub fn serve(args: ServeArgs, mut api: WebApi) -> anyhow::Result<()> {
    if let Some(path) = &args.config {
        let config = load_config_file(path)?;
        merge_over(api.settings_mut(), &config);
    }
    for pair in args.set.chunks(2) {
        let [path, raw] = pair else { continue };
        apply_inline_setting(api.settings_mut(), path, parse_inline_value(raw));
    }

    let names: HashSet<String> = api.endpoint_names().into_iter().collect();
    let enable: Option<HashSet<String>> = if !args.disable.is_empty() {
        let disabled: HashSet<String> = args.disable.iter().cloned().collect();
        Some(names.difference(&disabled).cloned().collect())
    } else if !args.enable.is_empty() {
        Some(args.enable.iter().cloned().collect())
    } else {
        None
    };

    let instance = api
        .settings()
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    info!(instance = %instance, address = %args.address, port = args.port, "Starting server");

    let application = api.build_filtered(enable.as_ref())?;
    let service = application.into_service();
    let handle = ApiServer(service)
        .start((args.address.as_str(), args.port))
        .with_context(|| format!("failed to bind {}:{}", args.address, args.port))?;

    handle.join().map_err(|err| {
        error!(instance = %instance, "Server exited abnormally");
        anyhow::anyhow!("server panicked: {err:?}")
    })
}

fn load_config_file(path: &PathBuf) -> anyhow::Result<Value> {
    let file = File::open(path).with_context(|| format!("can't open '{}'", path.display()))?;
    let config: Value = serde_json::from_reader(file)
        .with_context(|| format!("can't load config '{}'", path.display()))?;
    if !config.is_object() {
        bail!("config must be a mapping");
    }
    Ok(config)
}

/// Recursive merge where `overrides` wins; nested objects merge key by key.
fn merge_over(settings: &mut Value, overrides: &Value) {
    let (Value::Object(settings), Value::Object(overrides)) = (settings, overrides) else {
        return;
    };
    for (key, value) in overrides {
        match settings.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                merge_over(existing, value);
            }
            _ => {
                settings.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Parse an inline `--set` value: JSON when it parses, otherwise the string
/// itself (so `--set name orders` needs no quoting).
fn parse_inline_value(raw: &str) -> Value {
    serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.trim().to_string()))
}

/// Set a value at a dotted key path, creating intermediate objects.
fn apply_inline_setting(settings: &mut Value, dotted: &str, value: Value) {
    let mut current = settings;
    let mut keys = dotted.split('.').peekable();
    while let Some(key) = keys.next() {
        if keys.peek().is_none() {
            if let Value::Object(map) = current {
                map.insert(key.to_string(), value);
            }
            return;
        }
        let Value::Object(map) = current else { return };
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}
