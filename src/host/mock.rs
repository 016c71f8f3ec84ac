//! In-memory [`Host`] for testing collectors without the real tools.
//!
//! Unknown commands fail with `NotFound`, unknown files with a read error and
//! unknown URLs with an HTTP error, so an empty `MockHost` behaves like a
//! machine where nothing is installed.

use super::{Host, HostError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Exit { code: i32, stdout: String },
}

#[derive(Debug, Default)]
pub struct MockHost {
    commands: Mutex<HashMap<String, Reply>>,
    files: Mutex<HashMap<String, String>>,
    urls: Mutex<HashMap<String, Vec<u8>>>,
    env: HashMap<String, String>,
    host_name: Option<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers stdout for an exact command line (arguments joined by spaces).
    pub fn with_command(self, cmdline: &str, stdout: &str) -> Self {
        self.set_command(cmdline, stdout);
        self
    }

    /// Registers a command that exits with `code` after printing `stdout`.
    pub fn with_failing_command(self, cmdline: &str, code: i32, stdout: &str) -> Self {
        self.commands.lock().unwrap().insert(
            cmdline.to_string(),
            Reply::Exit {
                code,
                stdout: stdout.to_string(),
            },
        );
        self
    }

    /// Makes `which <tool>` succeed.
    pub fn with_tool(self, tool: &str) -> Self {
        let path = format!("/usr/bin/{tool}\n");
        self.with_command(&format!("which {tool}"), &path)
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.set_file(path, content);
        self
    }

    pub fn with_url(self, url: &str, body: &str) -> Self {
        self.urls
            .lock()
            .unwrap()
            .insert(url.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_host_name(mut self, name: &str) -> Self {
        self.host_name = Some(name.to_string());
        self
    }

    pub fn set_command(&self, cmdline: &str, stdout: &str) {
        self.commands
            .lock()
            .unwrap()
            .insert(cmdline.to_string(), Reply::Stdout(stdout.to_string()));
    }

    pub fn set_file(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }

    pub fn remove_url(&self, url: &str) {
        self.urls.lock().unwrap().remove(url);
    }

    /// How many times a command line, file path or URL was requested.
    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn record(&self, key: &str) {
        *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;
    }
}

#[async_trait]
impl Host for MockHost {
    async fn run_command(&self, argv: &[&str]) -> Result<String, HostError> {
        let Some(program) = argv.first() else {
            return Err(HostError::EmptyCommand);
        };
        let key = argv.join(" ");
        self.record(&key);
        let reply = self.commands.lock().unwrap().get(&key).cloned();
        match reply {
            Some(Reply::Stdout(out)) => Ok(out),
            Some(Reply::Exit { code, stdout }) => Err(HostError::Exit {
                program: program.to_string(),
                code: Some(code),
                stdout,
            }),
            None => Err(HostError::NotFound {
                program: program.to_string(),
            }),
        }
    }

    async fn read_file(&self, path: &str) -> Result<String, HostError> {
        self.record(path);
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| HostError::Read {
                path: path.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            })
    }

    async fn http_get(&self, url: &str) -> Result<Vec<u8>, HostError> {
        self.record(url);
        self.urls
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| HostError::Http {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
    }

    fn env_var(&self, key: &str) -> Option<String> {
        self.env.get(key).cloned()
    }

    fn host_name(&self) -> Option<String> {
        self.host_name.clone()
    }
}
