//! Command execution.

use crate::{Block, Commands, HexAction};
use colored::Colorize;
use jamrpc_client::{parse_service_info, parse_submission, ClientConfig, RpcBackend};
use jamrpc_protocol::encoding::{
    bytes_to_hex, ensure_hex, hex_to_bytes, hex_to_string, parse_service_id, string_to_hex,
};
use jamrpc_protocol::{HashVerifyPayload, Verification};
use serde_json::{json, Value};
use std::path::Path;

type CommandResult = Result<String, Box<dyn std::error::Error>>;

/// Storage keys written by the verifier service, by name.
const STORAGE_KEYS: &[(&str, &str)] = &[
    ("status", "0x737461747573"),
    ("verification_count", "0x766572696669636174696f6e5f636f756e74"),
    ("verificationCount", "0x766572696669636174696f6e5f636f756e74"),
    ("last_result", "0x6c6173745f726573756c74"),
    ("lastResult", "0x6c6173745f726573756c74"),
];

const LAST_RESULT_KEY: &str = "0x6c6173745f726573756c74";

/// Executes a command and returns the formatted output.
pub async fn execute(backend: &dyn RpcBackend, config: &ClientConfig, cmd: Commands) -> CommandResult {
    match cmd {
        Commands::Repl => Err("the REPL cannot run as a one-shot command".into()),

        Commands::Hex { action } => hex(&action),

        Commands::Call { method, params } => {
            let params = params.iter().map(|p| parse_param(p)).collect();
            let result = backend.call_default(&method, params).await?;
            Ok(format_value(&result))
        }

        Commands::Service { id, block } => {
            let id = resolve_service_id(id, config)?;
            service(backend, &id, block).await
        }

        Commands::Storage {
            key,
            service_id,
            block,
            raw,
        } => {
            let id = resolve_service_id(service_id, config)?;
            storage(backend, &id, &key, block, raw).await
        }

        Commands::Submit {
            payload,
            service_id,
        } => {
            let id = resolve_service_id(service_id, config)?;
            submit(backend, &id, &payload).await
        }

        Commands::HashVerify {
            preimage,
            service_id,
            submit: send,
            tamper,
        } => {
            let id = resolve_service_id(service_id, config)?;
            hash_verify(backend, &id, &preimage, tamper, send, &config.jamt_path).await
        }
    }
}

/// Runs a hex helper.
pub fn hex(action: &HexAction) -> CommandResult {
    match action {
        HexAction::Encode { value } => Ok(string_to_hex(value)),
        HexAction::Decode { value } => Ok(hex_to_string(value)?),
    }
}

pub async fn service(backend: &dyn RpcBackend, id: &str, block: Block) -> CommandResult {
    let method = format!("inspect {} service", block.as_str());
    let result = backend.call_default(&method, vec![json!(id)]).await?;

    let text = format_value(&result);
    match parse_service_info(&text) {
        Some(info) => Ok(format!(
            "{}\n  Version: {}\n  Author: {}",
            format!("Service {} ({})", info.name.cyan(), id).bold(),
            info.version,
            info.author
        )),
        None => Ok(text),
    }
}

pub async fn storage(
    backend: &dyn RpcBackend,
    id: &str,
    key: &str,
    block: Block,
    raw: bool,
) -> CommandResult {
    let key_hex = storage_key(key);
    let method = format!("inspect {} storage", block.as_str());
    let result = backend
        .call_default(&method, vec![json!(id), json!(key_hex)])
        .await?;

    let text = format_value(&result);
    if raw {
        return Ok(text);
    }
    if text.is_empty() {
        return Ok("(empty)".yellow().to_string());
    }
    if key_hex == LAST_RESULT_KEY {
        if let Some(verification) = hex_to_bytes(&text)
            .ok()
            .and_then(|bytes| Verification::from_output(&bytes).ok())
        {
            return Ok(format_verification(&verification));
        }
    }
    if text.starts_with("0x") {
        if let Ok(decoded) = hex_to_string(&text) {
            return Ok(format!(
                "{}: {}\n{}: {}",
                "Value (hex)".dimmed(),
                text,
                "Value (string)".dimmed(),
                decoded.cyan()
            ));
        }
    }
    Ok(format!("{}: {}", "Value".dimmed(), text))
}

pub async fn submit(backend: &dyn RpcBackend, id: &str, payload: &str) -> CommandResult {
    let payload_hex = ensure_hex(payload);
    let result = backend
        .call_default("item", vec![json!(id), json!(payload_hex)])
        .await?;

    let text = format_value(&result);
    let Some(submission) = parse_submission(&text) else {
        return Ok(format!("{}\n{}", "Submitted".green(), text));
    };

    let mut output = format!("{} work item to service {}", "Submitted".green(), id.cyan());
    if let Some(package) = submission.package_hash {
        output.push_str(&format!("\n  Package: {}", package));
    }
    if let Some(slot) = submission.anchor_slot {
        output.push_str(&format!("\n  Anchor slot: #{}", slot));
    }
    Ok(output)
}

/// Builds a hash-verification work item and optionally submits it.
pub async fn hash_verify(
    backend: &dyn RpcBackend,
    id: &str,
    preimage: &str,
    tamper: bool,
    send: bool,
    jamt_path: &Path,
) -> CommandResult {
    let (payload, mut output) = hash_verify_plan(preimage, id, tamper, jamt_path)?;
    if !send {
        output.push_str(&format!("\n\n{}", "(use --submit to send it to the network)".dimmed()));
        return Ok(output);
    }

    tracing::debug!("Submitting {}-byte verification payload", payload.to_bytes().len());
    let submitted = submit(backend, id, &payload.to_hex()).await?;
    output.push_str(&format!(
        "\n\n{}\nRefine reports 0x01 + computed hash if valid, 0x00 + computed hash if not.",
        submitted
    ));
    Ok(output)
}

/// Builds the payload and describes it, without touching the node.
pub fn hash_verify_plan(
    preimage: &str,
    id: &str,
    tamper: bool,
    jamt_path: &Path,
) -> Result<(HashVerifyPayload, String), Box<dyn std::error::Error>> {
    let honest = HashVerifyPayload::new(preimage.as_bytes())?;
    let mut lines = vec![
        format!("Preimage: {:?}", preimage),
        format!("Preimage (hex): {}", bytes_to_hex(honest.preimage())),
        format!("Preimage size: {} bytes", honest.preimage().len()),
        format!("Blake2s-256 hash: {}", bytes_to_hex(honest.expected_hash())),
    ];

    let payload = if tamper {
        let tampered = honest.tamper();
        lines.push(format!(
            "Tampered hash:    {} {}",
            bytes_to_hex(tampered.expected_hash()),
            "(verification should fail)".yellow()
        ));
        tampered
    } else {
        honest
    };

    let payload_hex = payload.to_hex();
    lines.push(format!(
        "Payload size: {} bytes (32 hash + {} preimage)",
        payload.to_bytes().len(),
        payload.preimage().len()
    ));
    lines.push(format!("Payload (hex): {}", payload_hex));
    lines.push(format!(
        "{}: {} item {} {}",
        "jamt".dimmed(),
        jamt_path.display(),
        id,
        payload_hex
    ));
    Ok((payload, lines.join("\n")))
}

fn format_verification(verification: &Verification) -> String {
    match verification {
        Verification::Valid(hash) => format!("{} {}", "VALID".green(), bytes_to_hex(hash)),
        Verification::Invalid(hash) => format!("{} {}", "INVALID".red(), bytes_to_hex(hash)),
        Verification::PayloadTooShort => format!("{} payload too short", "ERROR".red()),
    }
}

/// Resolves a known storage key name, otherwise hex-encodes the key.
pub fn storage_key(key: &str) -> String {
    STORAGE_KEYS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, hex)| hex.to_string())
        .unwrap_or_else(|| ensure_hex(key))
}

/// Picks the explicit service id or the configured one, without `0x`.
fn resolve_service_id(
    arg: Option<String>,
    config: &ClientConfig,
) -> Result<String, Box<dyn std::error::Error>> {
    let id = arg
        .or_else(|| config.service_id.clone())
        .ok_or("no service ID given (pass one or set JAM_SERVICE_ID)")?;
    Ok(parse_service_id(&id).to_string())
}

/// Parses a command-line parameter as JSON, falling back to a string.
pub fn parse_param(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

/// Formats a result for display. Strings print bare.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamrpc_client::{ConnectionConfig, MemoryConnector, RpcClient};
    use jamrpc_protocol::InboundMessage;
    use std::sync::Arc;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("42"), json!(42));
        assert_eq!(parse_param("true"), json!(true));
        assert_eq!(parse_param(r#"{"a":[1]}"#), json!({"a": [1]}));
        assert_eq!(parse_param("0c7bb62b"), json!("0c7bb62b"));
        assert_eq!(parse_param(r#""quoted""#), json!("quoted"));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!("slot 12")), "slot 12");
        assert_eq!(format_value(&json!(12)), "12");
        assert_eq!(format_value(&json!({"a": 1})), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_resolve_service_id() {
        let config = ClientConfig {
            service_id: Some("0x0c7bb62b".to_string()),
            ..ClientConfig::default()
        };
        assert_eq!(resolve_service_id(None, &config).unwrap(), "0c7bb62b");
        assert_eq!(
            resolve_service_id(Some("2a".to_string()), &config).unwrap(),
            "2a"
        );
        assert!(resolve_service_id(None, &ClientConfig::default()).is_err());
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key("status"), string_to_hex("status"));
        assert_eq!(storage_key("verificationCount"), string_to_hex("verification_count"));
        assert_eq!(storage_key("lastResult"), LAST_RESULT_KEY);
        assert_eq!(storage_key("last_result"), LAST_RESULT_KEY);
        assert_eq!(storage_key("0x01ff"), "0x01ff");
        assert_eq!(storage_key("count"), "0x636f756e74");
    }

    #[test]
    fn test_hash_verify_plan() {
        let jamt = Path::new("/opt/jam/jamt");
        let (payload, output) = hash_verify_plan("abc", "0c7bb62b", false, jamt).unwrap();

        let expected = "0x508c5e8c327c14e2e1a72ba34eeb452f37458b209ed63a294d999b4c86675982";
        assert_eq!(bytes_to_hex(payload.expected_hash()), expected);
        assert_eq!(payload.to_hex(), format!("{}616263", expected));
        assert!(output.contains("Preimage size: 3 bytes"));
        assert!(output.contains("35 bytes (32 hash + 3 preimage)"));
        assert!(output.contains(&format!("/opt/jam/jamt item 0c7bb62b {}616263", expected)));
    }

    #[test]
    fn test_hash_verify_plan_tampered() {
        let jamt = Path::new("jamt");
        let (honest, _) = hash_verify_plan("abc", "2a", false, jamt).unwrap();
        let (tampered, output) = hash_verify_plan("abc", "2a", true, jamt).unwrap();

        assert_eq!(tampered.expected_hash()[0], honest.expected_hash()[0].wrapping_add(1));
        assert_eq!(tampered.preimage(), honest.preimage());
        assert!(output.contains("Tampered hash"));
        assert!(hash_verify_plan("", "2a", false, jamt).is_err());
    }

    #[tokio::test]
    async fn test_hash_verify_submits_item() {
        let (connector, mut listener) = MemoryConnector::new();
        let client = RpcClient::with_connector(ConnectionConfig::new("memory://"), Arc::new(connector));
        let node = tokio::spawn(async move {
            let mut peer = listener.accept().await.unwrap();
            let call = peer.recv_call().await.unwrap();
            peer.reply(&InboundMessage::ok(call.id(), json!("queued")));
            call
        });

        let output = hash_verify(&client, "2a", "abc", false, true, Path::new("jamt"))
            .await
            .unwrap();
        let call = node.await.unwrap();

        assert_eq!(call.method(), "item");
        assert_eq!(call.params()[0], json!("2a"));
        assert_eq!(call.params()[1], json!(HashVerifyPayload::new("abc").unwrap().to_hex()));
        assert!(output.contains("Submitted"));
    }

    #[tokio::test]
    async fn test_hash_verify_without_submit_stays_local() {
        let (connector, _listener) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let client = RpcClient::with_connector(ConnectionConfig::new("memory://"), connector.clone());

        let output = hash_verify(&client, "2a", "abc", true, false, Path::new("jamt"))
            .await
            .unwrap();
        assert!(output.contains("--submit"));
        assert_eq!(connector.open_count(), 0);
    }

    #[test]
    fn test_hex() {
        let encoded = hex(&HexAction::Encode {
            value: "status".to_string(),
        })
        .unwrap();
        assert_eq!(encoded, "0x737461747573");
        let decoded = hex(&HexAction::Decode { value: encoded }).unwrap();
        assert_eq!(decoded, "status");
    }
}
