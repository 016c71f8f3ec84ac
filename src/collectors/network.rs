//! Addresses, Wi-Fi network name and throughput of the busiest interface.
//!
//! The four parts change at very different speeds, so each sits behind its
//! own [`TtlCell`] inside the collector in addition to the outer cache.

use super::pattern;
use crate::cache::{Collect, TtlCell};
use crate::error::CollectError;
use crate::host::{Host, HostError};
use crate::rate::RateTracker;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_PUBLIC_IP_URL: &str = "https://api.ipify.org";
const NET_DEV_PATH: &str = "/proc/net/dev";
const UNKNOWN: &str = "Unknown";
const NOT_CONNECTED: &str = "Not connected";

static ROUTE_SRC: LazyLock<Regex> = LazyLock::new(|| pattern(r"src (\d+\.\d+\.\d+\.\d+)"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTtls {
    pub lan_ip: Duration,
    pub public_ip: Duration,
    pub ssid: Duration,
    pub throughput: Duration,
}

impl Default for NetworkTtls {
    fn default() -> Self {
        Self {
            lan_ip: Duration::from_secs(60),
            public_ip: Duration::from_secs(120),
            ssid: Duration::from_secs(10),
            throughput: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSnapshot {
    pub lan_ip: String,
    pub public_ip: String,
    pub ssid: String,
    pub interface: Option<String>,
    pub download_bytes_per_sec: Option<f64>,
    pub upload_bytes_per_sec: Option<f64>,
    pub download_rate: String,
    pub upload_rate: String,
}

impl NetworkSnapshot {
    pub fn unknown() -> Self {
        Self::assemble(
            UNKNOWN.to_string(),
            UNKNOWN.to_string(),
            UNKNOWN.to_string(),
            Throughput::default(),
        )
    }

    fn assemble(lan_ip: String, public_ip: String, ssid: String, traffic: Throughput) -> Self {
        Self {
            lan_ip,
            public_ip,
            ssid,
            download_rate: format_rate(traffic.download),
            upload_rate: format_rate(traffic.upload),
            interface: traffic.interface,
            download_bytes_per_sec: traffic.download,
            upload_bytes_per_sec: traffic.upload,
        }
    }

    pub fn render_lines(&self) -> Vec<String> {
        vec![
            format!(
                "Wi-Fi : {} ↓ {} ↑ {}",
                self.ssid, self.download_rate, self.upload_rate
            ),
            format!("Public IP : {}", self.public_ip),
            format!("Local IP : {}", self.lan_ip),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Throughput {
    interface: Option<String>,
    download: Option<f64>,
    upload: Option<f64>,
}

pub struct NetworkCollector {
    host: Arc<dyn Host>,
    public_ip_url: String,
    lan_ip: TtlCell<String>,
    public_ip: TtlCell<String>,
    ssid: TtlCell<String>,
    throughput: TtlCell<Throughput>,
    rx: RateTracker,
    tx: RateTracker,
}

impl NetworkCollector {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self::with_settings(host, DEFAULT_PUBLIC_IP_URL, NetworkTtls::default())
    }

    pub fn with_settings(host: Arc<dyn Host>, public_ip_url: &str, ttls: NetworkTtls) -> Self {
        Self {
            host,
            public_ip_url: public_ip_url.to_string(),
            lan_ip: TtlCell::new(ttls.lan_ip),
            public_ip: TtlCell::new(ttls.public_ip),
            ssid: TtlCell::new(ttls.ssid),
            throughput: TtlCell::new(ttls.throughput),
            rx: RateTracker::new(),
            tx: RateTracker::new(),
        }
    }

    /// Drops the sub-query caches and the rate baselines.
    pub fn clear(&mut self) {
        self.lan_ip.clear();
        self.public_ip.clear();
        self.ssid.clear();
        self.throughput.clear();
        self.rx.reset();
        self.tx.reset();
    }
}

#[async_trait]
impl Collect for NetworkCollector {
    type Output = NetworkSnapshot;
    const NAME: &'static str = "network";

    async fn collect(&mut self) -> Result<NetworkSnapshot, CollectError> {
        let Self {
            host,
            public_ip_url,
            lan_ip,
            public_ip,
            ssid,
            throughput,
            rx,
            tx,
        } = self;
        let host = host.as_ref();

        let (lan_ip, public_ip, ssid, traffic) = tokio::join!(
            cached_lan_ip(host, lan_ip),
            cached_public_ip(host, public_ip_url.as_str(), public_ip),
            cached_ssid(host, ssid),
            cached_throughput(host, throughput, rx, tx),
        );
        Ok(NetworkSnapshot::assemble(lan_ip, public_ip, ssid, traffic))
    }

    fn fallback(&self, _err: &CollectError) -> NetworkSnapshot {
        NetworkSnapshot::unknown()
    }
}

async fn cached_lan_ip(host: &dyn Host, cell: &mut TtlCell<String>) -> String {
    if let Some(ip) = cell.fresh() {
        return ip.clone();
    }
    let found = match host.run_command(&["ip", "route", "get", "1.1.1.1"]).await {
        Ok(out) => ROUTE_SRC
            .captures(&out)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        Err(err) => {
            debug!(error = %err, "lan ip lookup failed");
            None
        }
    };
    settle(cell, found)
}

async fn cached_public_ip(host: &dyn Host, url: &str, cell: &mut TtlCell<String>) -> String {
    if let Some(ip) = cell.fresh() {
        return ip.clone();
    }
    let found = match host.http_get(url).await {
        Ok(body) => {
            let text = String::from_utf8_lossy(&body);
            let text = text.trim();
            match text.parse::<IpAddr>() {
                Ok(_) => Some(text.to_string()),
                Err(_) => {
                    debug!(body = %text, "public ip response is not an address");
                    None
                }
            }
        }
        Err(err) => {
            debug!(error = %err, "public ip lookup failed");
            None
        }
    };
    settle(cell, found)
}

async fn cached_ssid(host: &dyn Host, cell: &mut TtlCell<String>) -> String {
    if let Some(ssid) = cell.fresh() {
        return ssid.clone();
    }
    // iwgetid exits non-zero when the interface is not associated
    let found = match host.run_command(&["iwgetid", "-r"]).await {
        Ok(out) => Some(out),
        Err(HostError::Exit { stdout, .. }) if stdout.trim().is_empty() => Some(String::new()),
        Err(err) => {
            debug!(error = %err, "ssid lookup failed");
            None
        }
    };
    let found = found.map(|out| match out.trim() {
        "" => NOT_CONNECTED.to_string(),
        name => name.to_string(),
    });
    settle(cell, found)
}

/// A failed lookup keeps the last known value without refreshing its age.
/// With nothing known yet, `Unknown` is cached for the full TTL.
fn settle(cell: &mut TtlCell<String>, found: Option<String>) -> String {
    if let Some(value) = found {
        cell.store(value.clone());
        return value;
    }
    if let Some(prev) = cell.last() {
        return prev.clone();
    }
    cell.store(UNKNOWN.to_string());
    UNKNOWN.to_string()
}

async fn cached_throughput(
    host: &dyn Host,
    cell: &mut TtlCell<Throughput>,
    rx: &mut RateTracker,
    tx: &mut RateTracker,
) -> Throughput {
    if let Some(traffic) = cell.fresh() {
        return traffic.clone();
    }
    let text = match host.read_file(NET_DEV_PATH).await {
        Ok(text) => text,
        Err(err) => {
            debug!(error = %err, "interface counters unavailable");
            return Throughput::default();
        }
    };

    let traffic = match busiest_interface(&text) {
        Some(counters) => {
            let now = Instant::now();
            Throughput {
                download: rx.sample(&counters.name, counters.rx_bytes, now),
                upload: tx.sample(&counters.name, counters.tx_bytes, now),
                interface: Some(counters.name),
            }
        }
        None => {
            rx.reset();
            tx.reset();
            Throughput::default()
        }
    };
    cell.store(traffic.clone());
    traffic
}

#[derive(Debug, Clone, PartialEq)]
struct InterfaceCounters {
    name: String,
    rx_bytes: u64,
    tx_bytes: u64,
}

/// The interface with the most total traffic, ignoring loopback and idle ones.
fn busiest_interface(text: &str) -> Option<InterfaceCounters> {
    let mut best: Option<InterfaceCounters> = None;
    for line in text.lines().skip(2) {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let fields: Vec<&str> = counters.split_whitespace().collect();
        if fields.len() < 9 || name == "lo" {
            continue;
        }
        let (Ok(rx_bytes), Ok(tx_bytes)) = (fields[0].parse::<u64>(), fields[8].parse::<u64>())
        else {
            continue;
        };
        let total = rx_bytes.saturating_add(tx_bytes);
        if total == 0 {
            continue;
        }
        let busier = best
            .as_ref()
            .map_or(true, |b| total > b.rx_bytes.saturating_add(b.tx_bytes));
        if busier {
            best = Some(InterfaceCounters {
                name: name.to_string(),
                rx_bytes,
                tx_bytes,
            });
        }
    }
    best
}

/// Formats bytes per second, switching units at 1024.
pub fn format_rate(bytes_per_sec: Option<f64>) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let bps = bytes_per_sec.unwrap_or(0.0);
    if bps >= MIB {
        format!("{:.2} MB/s", bps / MIB)
    } else if bps >= KIB {
        format!("{:.2} kB/s", bps / KIB)
    } else {
        format!("{bps:.2} B/s")
    }
}
