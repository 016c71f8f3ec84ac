//! Access to the machine the collectors sample.
//!
//! Collectors never spawn processes or touch the filesystem directly; they go
//! through a [`Host`] so the same parsing code runs against the real system
//! ([`SystemHost`]) and against canned outputs in tests.

#[cfg(test)]
pub(crate) mod mock;
mod system;

pub use system::SystemHost;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("command `{program}` not found")]
    NotFound { program: String },
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("command `{program}` exited with status {code:?}")]
    Exit {
        program: String,
        code: Option<i32>,
        stdout: String,
    },
    #[error("command `{program}` timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },
}

impl HostError {
    /// True when the failure means the tool is simply not installed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::NotFound { .. })
    }
}

/// The operations the telemetry core needs from its environment.
#[async_trait]
pub trait Host: Send + Sync {
    /// Runs `argv[0]` with the remaining arguments and returns its stdout.
    async fn run_command(&self, argv: &[&str]) -> Result<String, HostError>;

    /// Reads a whole file as text.
    async fn read_file(&self, path: &str) -> Result<String, HostError>;

    /// Issues a GET request and returns the response body.
    async fn http_get(&self, url: &str) -> Result<Vec<u8>, HostError>;

    fn env_var(&self, key: &str) -> Option<String>;

    fn host_name(&self) -> Option<String>;
}

/// Checks whether `tool` is on `PATH` via `which`.
pub async fn tool_available(host: &dyn Host, tool: &str) -> bool {
    match host.run_command(&["which", tool]).await {
        Ok(out) => !out.trim().is_empty(),
        Err(_) => false,
    }
}
