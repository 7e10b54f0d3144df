//! Subprocess backend driving the `jamt` command-line tool.
//!
//! Each call runs `jamt <method words...> <params...>` and maps the
//! process outcome onto the same result contract as the WebSocket client.

use crate::client::RpcBackend;
use crate::error::ClientError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Backend running one `jamt` process per call.
pub struct JamtClient {
    path: PathBuf,
    default_timeout: Duration,
}

impl JamtClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_timeout: crate::connection::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Command-line arguments for a call. Method words are split on
    /// whitespace; string params are passed raw, other values as JSON.
    pub fn args_for(method: &str, params: &[Value]) -> Vec<String> {
        method
            .split_whitespace()
            .map(str::to_string)
            .chain(params.iter().map(|param| match param {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }))
            .collect()
    }

    /// Runs one call to completion.
    pub async fn run(
        &self,
        method: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let args = Self::args_for(method, params);
        tracing::debug!("Running {} {}", self.path.display(), args.join(" "));

        let child = Command::new(&self.path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ClientError::ConnectionFailed(format!("cannot run {}: {}", self.path.display(), e))
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::debug!("{} timed out after {:?}", method, timeout);
                return Err(ClientError::RequestTimeout(method.to_string()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return Ok(serde_json::from_str(&stdout).unwrap_or(Value::String(stdout)));
        }

        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("jamt exited with code {}", code)
        } else {
            stderr
        };
        Err(ClientError::RemoteError {
            code: i64::from(code),
            message,
            data: (!stdout.is_empty()).then_some(Value::String(stdout)),
        })
    }

    fn locate(&self) -> Option<PathBuf> {
        if self.path.components().count() > 1 {
            return self.path.is_file().then(|| self.path.clone());
        }
        let search = std::env::var_os("PATH")?;
        std::env::split_paths(&search)
            .map(|dir| dir.join(&self.path))
            .find(|candidate| candidate.is_file())
    }
}

#[async_trait]
impl RpcBackend for JamtClient {
    async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        self.run(method, &params, timeout).await
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    async fn ensure_connected(&self) -> Result<(), ClientError> {
        match self.locate() {
            Some(found) => {
                tracing::debug!("Using jamt at {}", found.display());
                Ok(())
            }
            None => Err(ClientError::ConnectionFailed(format!(
                "jamt binary not found: {}",
                self.path.display()
            ))),
        }
    }

    async fn disconnect(&self) {}

    fn is_connected(&self) -> bool {
        self.locate().is_some()
    }

    fn endpoint(&self) -> String {
        format!("jamt:{}", self.path.display())
    }
}

/// Service metadata printed by `jamt inspect ... service`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub author: String,
}

/// Work package submission details printed by `jamt item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub package_hash: Option<String>,
    pub anchor_slot: Option<u64>,
}

/// Extracts `Service NAME vVERSION by AUTHOR` from tool output.
pub fn parse_service_info(output: &str) -> Option<ServiceInfo> {
    output.lines().find_map(|line| {
        line.match_indices("Service").find_map(|(idx, keyword)| {
            let rest = &line[idx + keyword.len()..];
            let (name, rest) = take_token(rest)?;
            let (version, rest) = take_token(rest)?;
            let version = version.strip_prefix('v').filter(|v| !v.is_empty())?;
            let ("by", rest) = take_token(rest)? else {
                return None;
            };
            if !rest.starts_with(char::is_whitespace) {
                return None;
            }
            let author = rest.trim();
            (!author.is_empty()).then(|| ServiceInfo {
                name: name.to_string(),
                version: version.to_string(),
                author: author.to_string(),
            })
        })
    })
}

/// Extracts the package hash and anchor slot from submission output.
/// Returns `None` when neither is present.
pub fn parse_submission(output: &str) -> Option<Submission> {
    let package_hash = find_package_hash(output);
    let anchor_slot = find_anchor_slot(output);
    if package_hash.is_none() && anchor_slot.is_none() {
        return None;
    }
    Some(Submission {
        package_hash,
        anchor_slot,
    })
}

fn find_package_hash(output: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `output`.
    let lower = output.to_ascii_lowercase();
    lower.match_indices("package").find_map(|(idx, keyword)| {
        let (token, _) = take_token(&lower[idx + keyword.len()..])?;
        let digits = token.strip_prefix("0x")?;
        let len = digits
            .find(|c: char| !matches!(c, '0'..='9' | 'a'..='f'))
            .unwrap_or(digits.len());
        (len > 0).then(|| format!("0x{}", &digits[..len]))
    })
}

fn find_anchor_slot(output: &str) -> Option<u64> {
    const MARKER: &str = "anchor at #";
    output.match_indices(MARKER).find_map(|(idx, _)| {
        let rest = &output[idx + MARKER.len()..];
        let len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        rest[..len].parse().ok()
    })
}

/// Splits off the next whitespace-delimited token. At least one whitespace
/// character must precede it.
fn take_token(s: &str) -> Option<(&str, &str)> {
    let trimmed = s.trim_start();
    if trimmed.len() == s.len() || trimmed.is_empty() {
        return None;
    }
    let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    Some(trimmed.split_at(end))
}
