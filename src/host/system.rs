use super::{Host, HostError};
use async_trait::async_trait;
use reqwest::Client;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use sysinfo::{System, SystemExt};
use tokio::process::Command;
use tokio::time;
use tracing::debug;

/// [`Host`] backed by the local machine.
#[derive(Clone)]
pub struct SystemHost {
    client: Client,
    command_timeout: Duration,
}

impl SystemHost {
    pub fn new(command_timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(concat!("panelmon/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            command_timeout,
        }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Host for SystemHost {
    async fn run_command(&self, argv: &[&str]) -> Result<String, HostError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(HostError::EmptyCommand);
        };

        let child = Command::new(program)
            .args(args)
            // parsers expect untranslated labels such as `Mem:`
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                if source.kind() == ErrorKind::NotFound {
                    HostError::NotFound {
                        program: program.to_string(),
                    }
                } else {
                    HostError::Spawn {
                        program: program.to_string(),
                        source,
                    }
                }
            })?;

        let output = match time::timeout(self.command_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(HostError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
            Err(_elapsed) => {
                return Err(HostError::Timeout {
                    program: program.to_string(),
                    timeout: self.command_timeout,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            debug!(program = %program, code = ?output.status.code(), "command exited unsuccessfully");
            return Err(HostError::Exit {
                program: program.to_string(),
                code: output.status.code(),
                stdout,
            });
        }
        Ok(stdout)
    }

    async fn read_file(&self, path: &str) -> Result<String, HostError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| HostError::Read {
                path: path.to_string(),
                source,
            })
    }

    async fn http_get(&self, url: &str) -> Result<Vec<u8>, HostError> {
        let to_err = |err: reqwest::Error| HostError::Http {
            url: url.to_string(),
            reason: err.to_string(),
        };
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(to_err)?;
        let body = resp.bytes().await.map_err(to_err)?;
        Ok(body.to_vec())
    }

    fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn host_name(&self) -> Option<String> {
        System::new().host_name()
    }
}
