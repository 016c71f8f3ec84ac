use super::pattern;
use crate::cache::Collect;
use crate::error::CollectError;
use crate::host::{Host, HostError};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use tracing::debug;

const OS_RELEASE_PATH: &str = "/etc/os-release";
const UPTIME_PATH: &str = "/proc/uptime";
const UNKNOWN_SHELL: &str = "Unknown GNOME";

static SHELL_VERSION: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)GNOME Shell\s+([\w.-]+)"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemIdentity {
    pub os_pretty_name: String,
    pub arch: String,
    pub kernel_version: String,
    pub shell_version: String,
    pub session_type: String,
}

impl SystemIdentity {
    pub fn render_lines(&self) -> Vec<String> {
        vec![
            format!("OS : {} [{}]", self.os_pretty_name, self.arch),
            format!("Kernel : Linux {}", self.kernel_version),
            format!("Shell : {}", self.shell_version),
            format!("Session : {}", self.session_type),
        ]
    }
}

/// OS name, architecture, kernel, desktop shell version and graphical session type.
///
/// Each field degrades on its own, so collection itself never fails.
pub struct SystemCollector {
    host: Arc<dyn Host>,
}

impl SystemCollector {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Collect for SystemCollector {
    type Output = SystemIdentity;
    const NAME: &'static str = "system";

    async fn collect(&mut self) -> Result<SystemIdentity, CollectError> {
        let host = self.host.as_ref();
        let (os_release, arch, kernel, shell) = tokio::join!(
            host.read_file(OS_RELEASE_PATH),
            host.run_command(&["uname", "-m"]),
            host.run_command(&["uname", "-r"]),
            host.run_command(&["gnome-shell", "--version"]),
        );

        let os_pretty_name = match os_release {
            Ok(text) => pretty_name(&text),
            Err(err) => {
                debug!(error = %err, "os-release unreadable");
                None
            }
        };
        let non_empty = |out: String| Some(out.trim().to_string()).filter(|s| !s.is_empty());

        Ok(SystemIdentity {
            os_pretty_name: os_pretty_name.unwrap_or_else(|| "Unknown OS".to_string()),
            arch: arch
                .ok()
                .and_then(non_empty)
                .unwrap_or_else(|| std::env::consts::ARCH.to_string()),
            kernel_version: kernel
                .ok()
                .and_then(non_empty)
                .unwrap_or_else(|| "Unknown Kernel".to_string()),
            shell_version: shell_version(host, shell),
            session_type: host
                .env_var("XDG_SESSION_TYPE")
                .filter(|s| !s.is_empty())
                .map(|s| capitalize(&s))
                .unwrap_or_else(|| "Unknown".to_string()),
        })
    }

    fn fallback(&self, _err: &CollectError) -> SystemIdentity {
        SystemIdentity {
            os_pretty_name: "Unknown OS".to_string(),
            arch: std::env::consts::ARCH.to_string(),
            kernel_version: "Unknown Kernel".to_string(),
            shell_version: UNKNOWN_SHELL.to_string(),
            session_type: "Unknown".to_string(),
        }
    }
}

/// `gnome-shell --version`, then `GNOME_SHELL_VERSION`.
fn shell_version(host: &dyn Host, output: Result<String, HostError>) -> String {
    let parsed = match output {
        Ok(text) => parse_shell_version(&text),
        Err(err) => {
            debug!(error = %err, "gnome-shell version unavailable");
            None
        }
    };
    parsed
        .or_else(|| host.env_var("GNOME_SHELL_VERSION"))
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| UNKNOWN_SHELL.to_string())
}

fn parse_shell_version(text: &str) -> Option<String> {
    SHELL_VERSION
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn pretty_name(os_release: &str) -> Option<String> {
    os_release
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|value| value.trim().replace(['"', '\''], ""))
        .filter(|name| !name.is_empty())
}

pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Uptime {
    pub host_name: String,
    pub seconds: Option<f64>,
    pub display: String,
}

impl Uptime {
    pub fn unknown(host_name: String) -> Self {
        Self {
            host_name,
            seconds: None,
            display: "Unknown uptime".to_string(),
        }
    }
}

pub struct UptimeCollector {
    host: Arc<dyn Host>,
}

impl UptimeCollector {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    fn host_name(&self) -> String {
        self.host
            .host_name()
            .unwrap_or_else(|| "Unknown host".to_string())
    }
}

#[async_trait]
impl Collect for UptimeCollector {
    type Output = Uptime;
    const NAME: &'static str = "uptime";

    async fn collect(&mut self) -> Result<Uptime, CollectError> {
        let text = self.host.read_file(UPTIME_PATH).await?;
        let seconds = text
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
            .ok_or_else(|| CollectError::parse("/proc/uptime", text.trim().to_string()))?;

        let host_name = self.host_name();
        Ok(Uptime {
            display: format!("{host_name} : {}", format_duration(seconds)),
            host_name,
            seconds: Some(seconds),
        })
    }

    fn fallback(&self, _err: &CollectError) -> Uptime {
        Uptime::unknown(self.host_name())
    }
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.floor() as u64;
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let secs = total % 60;
    format!("{days}d {hours}h {minutes}m {secs}s")
}
