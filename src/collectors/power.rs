use super::pattern;
use super::system::capitalize;
use crate::cache::Collect;
use crate::error::CollectError;
use crate::host::Host;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use tracing::debug;

static STATE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)state:\s+([\w-]+)"));
static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)percentage:\s+(\d+(?:\.\d+)?)%"));
static ENERGY_RATE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)energy-rate:\s+(\d+(?:\.\d+)?)\s+W"));
static TIME_TO: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)time to (?:empty|full):\s+(.+)"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryStatus {
    pub state: String,
    pub percent_text: String,
    pub wattage_text: String,
    pub time_remaining_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PowerSnapshot {
    Battery(BatteryStatus),
    NoBattery,
    Unavailable(String),
}

impl PowerSnapshot {
    pub fn display(&self) -> String {
        match self {
            PowerSnapshot::Battery(b) => {
                let time = if b.time_remaining_text.is_empty() {
                    String::new()
                } else {
                    format!(" | {}", b.time_remaining_text)
                };
                format!(
                    "{}% | {}W\n{}{time}",
                    b.percent_text, b.wattage_text, b.state
                )
            }
            PowerSnapshot::NoBattery => "No battery found".to_string(),
            PowerSnapshot::Unavailable(reason) => reason.clone(),
        }
    }
}

pub struct PowerCollector {
    host: Arc<dyn Host>,
}

impl PowerCollector {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Collect for PowerCollector {
    type Output = PowerSnapshot;
    const NAME: &'static str = "power";

    async fn collect(&mut self) -> Result<PowerSnapshot, CollectError> {
        let devices = self.host.run_command(&["upower", "-e"]).await?;
        let Some(battery) = devices.lines().map(str::trim).find(|l| l.contains("BAT")) else {
            debug!("no battery among upower devices");
            return Ok(PowerSnapshot::NoBattery);
        };
        let details = self.host.run_command(&["upower", "-i", battery]).await?;
        Ok(PowerSnapshot::Battery(parse_upower(&details)))
    }

    fn fallback(&self, _err: &CollectError) -> PowerSnapshot {
        PowerSnapshot::Unavailable("Error reading power data".to_string())
    }
}

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

fn decimal(re: &Regex, text: &str, places: usize) -> String {
    capture(re, text)
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| format!("{v:.places$}"))
        .unwrap_or_default()
}

/// Each field is left blank when its line is missing.
fn parse_upower(text: &str) -> BatteryStatus {
    BatteryStatus {
        state: capture(&STATE, text).map(capitalize).unwrap_or_default(),
        percent_text: decimal(&PERCENTAGE, text, 1),
        wattage_text: decimal(&ENERGY_RATE, text, 2),
        time_remaining_text: capture(&TIME_TO, text).unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::MockHost;

    const DEVICES: &str = "/org/freedesktop/UPower/devices/line_power_AC\n\
                           /org/freedesktop/UPower/devices/battery_BAT0\n\
                           /org/freedesktop/UPower/devices/DisplayDevice\n";

    const BAT0: &str = "  native-path:          BAT0
  vendor:               SMP
  power supply:         yes
  battery
    present:             yes
    state:               discharging
    energy-rate:         7.4 W
    voltage:             12.1 V
    time to empty:       5.2 hours
    percentage:          83%
";

    #[test]
    fn parses_battery_fields() {
        let status = parse_upower(BAT0);
        assert_eq!(status.state, "Discharging");
        assert_eq!(status.percent_text, "83.0");
        assert_eq!(status.wattage_text, "7.40");
        assert_eq!(status.time_remaining_text, "5.2 hours");
        assert_eq!(
            PowerSnapshot::Battery(status).display(),
            "83.0% | 7.40W\nDischarging | 5.2 hours"
        );
    }

    #[test]
    fn fully_charged_has_no_time() {
        let status = parse_upower("state: fully-charged\npercentage: 100%\n");
        assert_eq!(status.state, "Fully-charged");
        assert_eq!(status.wattage_text, "");
        assert_eq!(PowerSnapshot::Battery(status).display(), "100.0% | W\nFully-charged");
    }

    #[tokio::test]
    async fn reads_first_battery() {
        let host = MockHost::new()
            .with_command("upower -e", DEVICES)
            .with_command("upower -i /org/freedesktop/UPower/devices/battery_BAT0", BAT0);
        let mut collector = PowerCollector::new(Arc::new(host));
        let snap = collector.collect().await.unwrap();
        assert!(matches!(snap, PowerSnapshot::Battery(ref b) if b.percent_text == "83.0"));
    }

    #[tokio::test]
    async fn desktop_without_battery() {
        let host = MockHost::new()
            .with_command("upower -e", "/org/freedesktop/UPower/devices/line_power_AC\n");
        let mut collector = PowerCollector::new(Arc::new(host));
        let snap = collector.collect().await.unwrap();
        assert_eq!(snap, PowerSnapshot::NoBattery);
        assert_eq!(snap.display(), "No battery found");
    }

    #[tokio::test]
    async fn missing_upower_is_unavailable() {
        let mut cached = crate::cache::Cached::new(
            PowerCollector::new(Arc::new(MockHost::new())),
            std::time::Duration::from_secs(5),
        );
        assert_eq!(cached.get().await.display(), "Error reading power data");
    }
}
