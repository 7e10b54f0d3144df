//! jamrpc-cli - Command-line interface for PolkaJam nodes
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use jamrpc_client::{connect_backend, Backend, ClientConfig, ConfigError};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jamrpc-cli")]
#[command(about = "Command-line interface for PolkaJam nodes")]
#[command(version)]
struct Cli {
    /// Node endpoint (overrides JAM_RPC)
    #[arg(short, long)]
    url: Option<String>,

    /// Per-call timeout in milliseconds (overrides JAM_RPC_TIMEOUT_MS)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Backend: rpc or jamt (overrides JAM_BACKEND)
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Path to the jamt binary (overrides JAMT_PATH)
    #[arg(long)]
    jamt: Option<PathBuf>,

    /// Path to CA certificate for wss:// endpoints
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Call a method
    Call {
        /// Method name (quote multi-word jamt methods)
        method: String,

        /// Parameters, parsed as JSON and falling back to plain strings
        params: Vec<String>,
    },

    /// Hex helpers
    Hex {
        #[command(subcommand)]
        action: HexAction,
    },

    /// Show service information
    Service {
        /// Service ID (defaults to JAM_SERVICE_ID)
        id: Option<String>,

        /// Block to query
        #[arg(short, long, value_enum, default_value_t = Block::Best)]
        block: Block,
    },

    /// Read a service storage value
    Storage {
        /// Storage key: a known name (status, verification_count,
        /// last_result), 0x-prefixed hex or a plain string
        key: String,

        /// Service ID (defaults to JAM_SERVICE_ID)
        #[arg(short, long)]
        service_id: Option<String>,

        /// Block to query
        #[arg(short, long, value_enum, default_value_t = Block::Best)]
        block: Block,

        /// Print the value without decoding
        #[arg(short, long)]
        raw: bool,
    },

    /// Submit a work item to a service
    Submit {
        /// Payload (0x-prefixed hex or a plain string)
        payload: String,

        /// Service ID (defaults to JAM_SERVICE_ID)
        #[arg(short, long)]
        service_id: Option<String>,
    },

    /// Build a Blake2s-256 hash-verification work item
    HashVerify {
        /// Preimage to hash
        #[arg(short, long)]
        preimage: String,

        /// Service ID (defaults to JAM_SERVICE_ID)
        #[arg(short, long)]
        service_id: Option<String>,

        /// Submit the work item instead of only printing it
        #[arg(long)]
        submit: bool,

        /// Corrupt the expected hash so verification fails
        #[arg(long)]
        tamper: bool,
    },
}

/// Block to inspect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Block {
    #[default]
    Best,
    Final,
}

impl Block {
    pub fn as_str(self) -> &'static str {
        match self {
            Block::Best => "best",
            Block::Final => "final",
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum HexAction {
    /// Encode a UTF-8 string as 0x-prefixed hex
    Encode { value: String },
    /// Decode hex into a UTF-8 string
    Decode { value: String },
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = ClientConfig::load()?;
        if let Some(ref url) = self.url {
            config.url = url.clone();
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_ms = timeout;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(ref path) = self.jamt {
            config.jamt_path = path.clone();
        }
        if let Some(ref path) = self.ca_cert {
            config.tls_ca_cert = Some(path.clone());
        }
        if self.insecure {
            config.tls_insecure = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Hex helpers need no node
    if let Some(Commands::Hex { action }) = &cli.command {
        match commands::hex(action) {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let config = cli.client_config().map_err(|e| {
        eprintln!("{}: {}", "Configuration error".red(), e);
        e
    })?;
    let backend = connect_backend(&config)?;

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(backend.as_ref(), &config).await?;
        }
        Some(cmd) => {
            let result = commands::execute(backend.as_ref(), &config, cmd).await;
            backend.disconnect().await;

            match result {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
