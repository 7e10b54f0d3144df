//! Interactive REPL.

use crate::commands::{self, format_value, parse_param};
use crate::{Block, HexAction};
use colored::Colorize;
use jamrpc_client::{ClientConfig, RpcBackend};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

const HELP_TEXT: &str = r#"
Available commands:
  help                            Show this help
  <method> [params...]            Call a method; params are JSON or plain strings

  service [id]                    Show service information
  storage <key> [id]              Read a service storage value
  submit <payload> [id]           Submit a work item
  hash-verify <preimage> [--tamper] [--submit]
                                  Build (and submit) a hash-verification item

  hex-encode <string>             Encode a string as hex
  hex-decode <hex>                Decode hex into a string

  status                          Show connection status
  quit, exit                      Exit the REPL
"#;

pub async fn run(
    backend: &dyn RpcBackend,
    config: &ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "jamrpc CLI".bold().cyan());
    println!("Connecting to {}...", backend.endpoint());

    backend.ensure_connected().await?;
    println!("{}", "Connected!".green());

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".jamrpc_history"))
        .unwrap_or_else(|_| ".jamrpc_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "jam>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(backend, config, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    backend.disconnect().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    backend: &dyn RpcBackend,
    config: &ClientConfig,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&cmd, args)) = parts.split_first() else {
        return Ok(Some(String::new()));
    };

    let service_id = |index: usize| -> Result<String, Box<dyn std::error::Error>> {
        let id = args
            .get(index)
            .map(|s| s.to_string())
            .or_else(|| config.service_id.clone())
            .ok_or("no service ID given (pass one or set JAM_SERVICE_ID)")?;
        Ok(jamrpc_protocol::encoding::parse_service_id(&id).to_string())
    };

    match cmd.to_lowercase().as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "status" => Ok(Some(format!(
            "{} {}",
            backend.endpoint(),
            if backend.is_connected() {
                "connected".green()
            } else {
                "disconnected".yellow()
            }
        ))),

        "service" => Ok(Some(
            commands::service(backend, &service_id(0)?, Block::Best).await?,
        )),

        "storage" => {
            let Some(key) = args.first() else {
                return Ok(Some("Usage: storage <key> [service_id]".to_string()));
            };
            Ok(Some(
                commands::storage(backend, &service_id(1)?, key, Block::Best, false).await?,
            ))
        }

        "submit" => {
            let Some(payload) = args.first() else {
                return Ok(Some("Usage: submit <payload> [service_id]".to_string()));
            };
            Ok(Some(commands::submit(backend, &service_id(1)?, payload).await?))
        }

        "hash-verify" => {
            let tamper = args.contains(&"--tamper");
            let send = args.contains(&"--submit");
            let preimage: Vec<&str> = args
                .iter()
                .copied()
                .filter(|arg| !arg.starts_with("--"))
                .collect();
            if preimage.is_empty() {
                return Ok(Some(
                    "Usage: hash-verify <preimage> [--tamper] [--submit]".to_string(),
                ));
            }
            let id = config
                .service_id
                .as_deref()
                .map(jamrpc_protocol::encoding::parse_service_id)
                .ok_or("no service ID configured (set JAM_SERVICE_ID)")?;
            Ok(Some(
                commands::hash_verify(
                    backend,
                    id,
                    &preimage.join(" "),
                    tamper,
                    send,
                    &config.jamt_path,
                )
                .await?,
            ))
        }

        "hex-encode" => Ok(Some(commands::hex(&HexAction::Encode {
            value: args.join(" "),
        })?)),

        "hex-decode" => {
            let Some(value) = args.first() else {
                return Ok(Some("Usage: hex-decode <hex>".to_string()));
            };
            Ok(Some(commands::hex(&HexAction::Decode {
                value: value.to_string(),
            })?))
        }

        _ => {
            let params = args.iter().map(|arg| parse_param(arg)).collect();
            let result = backend.call_default(cmd, params).await?;
            Ok(Some(format_value(&result)))
        }
    }
}
