use super::parse_f64_loose;
use crate::cache::Collect;
use crate::error::CollectError;
use crate::host::Host;
use crate::status::{self, Severity};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub const NO_DEVICES: &str = "No real devices found";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageEntry {
    pub filesystem: String,
    pub mount_point: String,
    pub used_human: String,
    pub size_human: String,
    pub used_percent_human: String,
    pub available_human: String,
    pub used_percent: Option<f64>,
    pub severity: Severity,
}

impl StorageEntry {
    pub fn render(&self) -> String {
        format!(
            "- {} (  {}  )\n{} [ {} / {} ] [{}] Avail {}\n",
            self.filesystem,
            self.mount_point,
            self.severity.glyph(),
            self.used_human,
            self.size_human,
            self.used_percent_human,
            self.available_human,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageSnapshot {
    pub entries: Vec<StorageEntry>,
    pub display: String,
}

impl StorageSnapshot {
    pub fn from_entries(entries: Vec<StorageEntry>) -> Self {
        let display = if entries.is_empty() {
            NO_DEVICES.to_string()
        } else {
            entries
                .iter()
                .map(StorageEntry::render)
                .collect::<Vec<_>>()
                .join("\n")
        };
        Self { entries, display }
    }
}

pub struct StorageCollector {
    host: Arc<dyn Host>,
}

impl StorageCollector {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Collect for StorageCollector {
    type Output = StorageSnapshot;
    const NAME: &'static str = "storage";

    async fn collect(&mut self) -> Result<StorageSnapshot, CollectError> {
        let text = self.host.run_command(&["df", "-h"]).await?;
        Ok(StorageSnapshot::from_entries(parse_df(&text)))
    }

    fn fallback(&self, _err: &CollectError) -> StorageSnapshot {
        StorageSnapshot {
            entries: Vec::new(),
            display: "Error reading storage data".to_string(),
        }
    }
}

fn parse_df(text: &str) -> Vec<StorageEntry> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            let filesystem = parts[0];
            // loop devices are snap and image mounts
            if !filesystem.starts_with("/dev/") || filesystem.starts_with("/dev/loop") {
                return None;
            }
            let used_percent = parse_f64_loose(parts[4]);
            Some(StorageEntry {
                filesystem: filesystem.to_string(),
                mount_point: parts[5..].join(" "),
                used_human: parts[2].to_string(),
                size_human: parts[1].to_string(),
                used_percent_human: parts[4].to_string(),
                available_human: parts[3].to_string(),
                used_percent,
                severity: status::classify_opt(used_percent, &status::STORAGE),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::MockHost;

    const DF: &str = "\
Filesystem      Size  Used Avail Use% Mounted on
tmpfs           1.6G  2.1M  1.6G   1% /run
/dev/nvme0n1p2  468G  390G   55G  88% /
/dev/loop3       56M   56M     0 100% /snap/core18/2812
/dev/sda1       932G  233G  699G  25% /media/user/My Passport
";

    #[test]
    fn keeps_real_devices_only() {
        let entries = parse_df(DF);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].filesystem, "/dev/nvme0n1p2");
        assert_eq!(entries[0].severity, Severity::Critical);
        assert_eq!(entries[1].mount_point, "/media/user/My Passport");
        assert_eq!(entries[1].used_percent, Some(25.0));
        assert_eq!(entries[1].severity, Severity::Info);
    }

    #[test]
    fn display_blocks() {
        let snap = StorageSnapshot::from_entries(parse_df(DF));
        assert_eq!(
            snap.display,
            "- /dev/nvme0n1p2 (  /  )\n🟥 [ 390G / 468G ] [88%] Avail 55G\n\n\
             - /dev/sda1 (  /media/user/My Passport  )\n⬜️ [ 233G / 932G ] [25%] Avail 699G\n"
        );
    }

    #[tokio::test]
    async fn no_devices_sentinel() {
        let host = MockHost::new().with_command("df -h", "Filesystem Size Used Avail Use% Mounted on\n");
        let mut collector = StorageCollector::new(Arc::new(host));
        let snap = collector.collect().await.unwrap();
        assert!(snap.entries.is_empty());
        assert_eq!(snap.display, NO_DEVICES);
    }

    #[tokio::test]
    async fn df_failure_falls_back() {
        let host = MockHost::new().with_failing_command("df -h", 1, "");
        let mut cached = crate::cache::Cached::new(
            StorageCollector::new(Arc::new(host)),
            std::time::Duration::from_secs(60),
        );
        assert_eq!(cached.get().await.display, "Error reading storage data");
    }
}
