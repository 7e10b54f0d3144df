//! jamrpc - PolkaJam network monitor
//!
//! Polls a node method on an interval and logs each change of its value.

use clap::Parser;
use jamrpc_client::{connect_backend, ClientConfig, ClientError, ConfigError, RpcBackend};
use serde_json::Value;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jamrpc")]
#[command(about = "Monitor a PolkaJam node")]
#[command(version)]
struct Args {
    /// Method to poll
    #[arg(short, long, default_value = "inspect best slot")]
    method: String,

    /// Polling interval in milliseconds
    #[arg(short, long, default_value_t = 2000)]
    interval: u64,

    /// Node endpoint (overrides JAM_RPC)
    #[arg(short, long)]
    url: Option<String>,

    /// Service ID to monitor (overrides JAM_SERVICE_ID)
    #[arg(short, long)]
    service_id: Option<String>,
}

impl Args {
    /// Environment configuration with command-line overrides applied.
    fn client_config(&self, mut config: ClientConfig) -> Result<ClientConfig, ConfigError> {
        if let Some(ref url) = self.url {
            config.url = url.clone();
        }
        if let Some(ref id) = self.service_id {
            config.service_id = Some(id.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Tracks the last observed value of the polled method.
struct Monitor {
    method: String,
    last: Option<Value>,
}

impl Monitor {
    fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            last: None,
        }
    }

    /// Polls once. Returns the new value when it differs from the last one.
    async fn poll(&mut self, backend: &dyn RpcBackend) -> Result<Option<Value>, ClientError> {
        let value = backend.call_default(&self.method, vec![]).await?;
        if self.last.as_ref() == Some(&value) {
            return Ok(None);
        }
        self.last = Some(value.clone());
        Ok(Some(value))
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = args.client_config(ClientConfig::from_env()).map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        e
    })?;
    if args.interval == 0 {
        return Err("interval must be greater than zero".into());
    }

    let backend = connect_backend(&config)?;

    tracing::info!("Monitoring JAM network");
    tracing::info!("  Backend: {} ({})", config.backend, backend.endpoint());
    tracing::info!("  Method: {}", args.method);
    tracing::info!("  Interval: {}ms", args.interval);
    if let Some(ref id) = config.service_id {
        tracing::info!("  Service: {}", id);
    }

    let mut monitor = Monitor::new(args.method);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match monitor.poll(backend.as_ref()).await {
                    Ok(Some(value)) => tracing::info!("{}: {}", monitor.method, display(&value)),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Poll failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping monitor...");
                break;
            }
        }
    }

    backend.disconnect().await;
    Ok(())
}
