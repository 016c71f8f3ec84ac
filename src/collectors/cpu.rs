//! Per-thread clock speed, load and temperature.
//!
//! Identity comes from `lscpu` (falling back to `/proc/cpuinfo`), current
//! clocks from cpufreq sysfs files, temperatures from `sensors`. Every source
//! is optional except the thread count.

use super::{first_capture, parse_f64_loose, pattern};
use crate::cache::Collect;
use crate::error::CollectError;
use crate::host::Host;
use crate::status::{self, Severity};
use async_trait::async_trait;
use futures_util::future::join_all;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

const CPUINFO_PATH: &str = "/proc/cpuinfo";
const MAX_FREQ_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq";

static MODEL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        pattern(r"(?m)^[ \t]*Model name:[ \t]+(.+)$"),
        pattern(r"(?m)^[ \t]*Model:[ \t]+(.+)$"),
        pattern(r"(?m)^[ \t]*CPU:[ \t]+(.+)$"),
        pattern(r"(?m)^[ \t]*Hardware:[ \t]+(.+)$"),
    ]
});
static THREADS: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?m)^[ \t]*CPU\(s\):[ \t]+(\d+)"));
static THREADS_PER_CORE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?m)^[ \t]*Thread\(s\) per core:[ \t]+(\d+)"));
static MAX_MHZ: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?m)^[ \t]*CPU max MHz:[ \t]+([\d.,]+)"));

static CORE_TEMP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        pattern(r"(?m)^Core\s+(\d+):\s+([+-][\d.]+)°C"),
        pattern(r"(?m)^CPU\s+Core\s+(\d+):\s+([+-][\d.]+)°C"),
    ]
});
static PACKAGE_TEMP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        pattern(r"(?m)^Package\s+id\s+\d+:\s+([+-][\d.]+)°C"),
        pattern(r"(?m)^Package\s+\d+:\s+([+-][\d.]+)°C"),
        pattern(r"(?m)^CPU\s+Package:\s+([+-][\d.]+)°C"),
        pattern(r"(?m)^Tctl:\s+([+-][\d.]+)°C"),
        pattern(r"(?m)^Tdie:\s+([+-][\d.]+)°C"),
        pattern(r"(?m)^CPU\s+Tctl/Tdie:\s+([+-][\d.]+)°C"),
        pattern(r"(?m)^CPU\s+Temperature:\s+([+-][\d.]+)°C"),
        pattern(r"(?m)^Core\s+\d+\s+\(PECI\s+\d+\):\s+([+-][\d.]+)°C"),
        pattern(r"([+-][\d.]+)°C"),
    ]
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreSample {
    pub index: usize,
    pub core_id: u32,
    pub speed_mhz: u64,
    pub load_percent: Option<u32>,
    pub temperature_c: Option<f64>,
    pub load_severity: Severity,
    pub temperature_severity: Severity,
}

impl CoreSample {
    pub fn render_line(&self) -> String {
        let name = format!("Core-{:02}    |", self.index);
        let speed = format!("{} MHz", self.speed_mhz);
        let (before, after) = if self.speed_mhz < 1000 {
            ("       ", "   ")
        } else {
            ("     ", "    ")
        };
        let load = format!("{:02}", self.load_percent.unwrap_or(0));
        let temp = self
            .temperature_c
            .map(|t| format!("{t:.0}"))
            .unwrap_or_else(|| "N/A".to_string());
        format!(
            "{} {name}{before}{speed:<10}{after}|  {load}%  |   {} Temp   {temp} °C",
            self.load_severity.glyph(),
            self.temperature_severity.glyph(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuSnapshot {
    pub model_name: String,
    pub core_count: usize,
    pub samples: Vec<CoreSample>,
    pub core_lines: Vec<String>,
}

impl CpuSnapshot {
    pub fn unavailable() -> Self {
        Self {
            model_name: "Unknown CPU".to_string(),
            core_count: 0,
            samples: Vec::new(),
            core_lines: vec!["Error reading CPU information".to_string()],
        }
    }
}

pub struct CpuCollector {
    host: Arc<dyn Host>,
}

impl CpuCollector {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Collect for CpuCollector {
    type Output = CpuSnapshot;
    const NAME: &'static str = "cpu";

    async fn collect(&mut self) -> Result<CpuSnapshot, CollectError> {
        let host = self.host.as_ref();
        let (lscpu, cpuinfo) = tokio::join!(
            host.run_command(&["lscpu"]),
            host.read_file(CPUINFO_PATH)
        );
        if let Err(err) = &lscpu {
            debug!(error = %err, "lscpu unavailable, falling back to /proc/cpuinfo");
        }
        let (lscpu, cpuinfo) = match (lscpu, cpuinfo) {
            (Err(err), Err(_)) => return Err(err.into()),
            (l, c) => (
                l.map(|t| parse_lscpu(&t)).unwrap_or_default(),
                c.map(|t| parse_cpuinfo(&t)).unwrap_or_default(),
            ),
        };

        let thread_count = if lscpu.threads > 0 {
            lscpu.threads
        } else {
            cpuinfo.processors.len()
        };
        if thread_count == 0 {
            return Err(CollectError::parse("lscpu", "no logical processors reported"));
        }

        let model_name = lscpu
            .model_name
            .clone()
            .or_else(|| cpuinfo.model_name.clone())
            .unwrap_or_else(|| "Unknown CPU".to_string());

        let max_mhz = match lscpu.max_mhz {
            Some(v) => Some(v),
            None => read_khz_as_mhz(host, MAX_FREQ_PATH).await.map(|v| v as f64),
        };

        let sysfs_speeds = join_all((0..thread_count).map(|i| thread_speed(host, i))).await;

        let temps = match host.run_command(&["sensors"]).await {
            Ok(text) => parse_core_temps(&text),
            Err(err) => {
                debug!(error = %err, "sensors unavailable, temperatures omitted");
                SensorTemps::default()
            }
        };

        let core_map = cpuinfo.core_map(thread_count, lscpu.threads_per_core.unwrap_or(1));

        let samples: Vec<CoreSample> = (0..thread_count)
            .map(|index| {
                let speed_mhz = sysfs_speeds[index]
                    .or_else(|| cpuinfo.mhz_of(index).map(|v| v as u64))
                    .unwrap_or(0);
                let load_percent = load_percent(speed_mhz, max_mhz);
                let core_id = core_map.get(&index).copied().unwrap_or(0);
                let temperature_c = temps.for_core(core_id);
                CoreSample {
                    index,
                    core_id,
                    speed_mhz,
                    load_percent,
                    temperature_c,
                    load_severity: status::classify(
                        load_percent.unwrap_or(0) as f64,
                        &status::CPU_LOAD,
                    ),
                    temperature_severity: status::classify_opt(
                        temperature_c,
                        &status::TEMPERATURE,
                    ),
                }
            })
            .collect();

        let core_lines = samples.iter().map(CoreSample::render_line).collect();
        Ok(CpuSnapshot {
            model_name,
            core_count: thread_count,
            samples,
            core_lines,
        })
    }

    fn fallback(&self, _err: &CollectError) -> CpuSnapshot {
        CpuSnapshot::unavailable()
    }
}

fn load_percent(speed_mhz: u64, max_mhz: Option<f64>) -> Option<u32> {
    let max = max_mhz.filter(|m| *m > 0.0)?;
    // turbo clocks can exceed the rated maximum
    Some(((speed_mhz as f64 / max) * 100.0).round().clamp(0.0, 100.0) as u32)
}

async fn read_khz_as_mhz(host: &dyn Host, path: &str) -> Option<u64> {
    let text = host.read_file(path).await.ok()?;
    let khz = text.trim().parse::<u64>().ok()?;
    Some(khz / 1000)
}

async fn thread_speed(host: &dyn Host, index: usize) -> Option<u64> {
    let base = format!("/sys/devices/system/cpu/cpu{index}/cpufreq");
    for file in ["scaling_cur_freq", "cpuinfo_cur_freq"] {
        if let Some(mhz) = read_khz_as_mhz(host, &format!("{base}/{file}")).await {
            return Some(mhz);
        }
    }
    None
}

#[derive(Debug, Default, Clone, PartialEq)]
struct LscpuInfo {
    model_name: Option<String>,
    threads: usize,
    threads_per_core: Option<usize>,
    max_mhz: Option<f64>,
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn parse_lscpu(text: &str) -> LscpuInfo {
    LscpuInfo {
        model_name: first_capture(&MODEL_PATTERNS, text),
        threads: capture(&THREADS, text)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        threads_per_core: capture(&THREADS_PER_CORE, text)
            .and_then(|v| v.parse().ok())
            .filter(|v: &usize| *v > 0),
        max_mhz: capture(&MAX_MHZ, text)
            .and_then(|v| parse_f64_loose(&v))
            .filter(|v| *v > 0.0),
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct ProcessorRecord {
    index: usize,
    core_id: Option<u32>,
    mhz: Option<f64>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct CpuInfo {
    model_name: Option<String>,
    processors: Vec<ProcessorRecord>,
}

impl CpuInfo {
    fn mhz_of(&self, index: usize) -> Option<f64> {
        self.processors
            .iter()
            .find(|p| p.index == index)
            .and_then(|p| p.mhz)
    }

    /// Logical thread index to physical core id.
    fn core_map(&self, thread_count: usize, threads_per_core: usize) -> HashMap<usize, u32> {
        let reported: HashMap<usize, u32> = self
            .processors
            .iter()
            .filter_map(|p| p.core_id.map(|id| (p.index, id)))
            .collect();
        if !reported.is_empty() {
            return reported;
        }

        let per_core = threads_per_core.max(1);
        (0..thread_count)
            .map(|i| (i, (i / per_core) as u32))
            .collect()
    }
}

fn parse_cpuinfo(text: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "processor" => {
                if let Ok(index) = value.parse() {
                    info.processors.push(ProcessorRecord {
                        index,
                        ..ProcessorRecord::default()
                    });
                }
            }
            "core id" => {
                if let Some(p) = info.processors.last_mut() {
                    p.core_id = value.parse().ok();
                }
            }
            "cpu MHz" => {
                if let Some(p) = info.processors.last_mut() {
                    p.mhz = parse_f64_loose(value);
                }
            }
            "model name" | "Hardware" if info.model_name.is_none() && !value.is_empty() => {
                info.model_name = Some(value.to_string());
            }
            _ => {}
        }
    }
    info
}

#[derive(Debug, Default, Clone, PartialEq)]
struct SensorTemps {
    per_core: HashMap<u32, f64>,
    package: Option<f64>,
}

impl SensorTemps {
    /// Per-core readings win; otherwise the package figure covers every core.
    fn for_core(&self, core_id: u32) -> Option<f64> {
        if self.per_core.is_empty() {
            self.package
        } else {
            self.per_core.get(&core_id).copied()
        }
    }
}

fn parse_core_temps(text: &str) -> SensorTemps {
    let mut temps = SensorTemps::default();
    for re in CORE_TEMP_PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            let (Some(id), Some(value)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let (Ok(id), Some(value)) = (id.as_str().parse::<u32>(), parse_f64_loose(value.as_str()))
            else {
                continue;
            };
            temps.per_core.entry(id).or_insert(value);
        }
    }
    temps.package = first_capture(&PACKAGE_TEMP_PATTERNS, text).and_then(|v| parse_f64_loose(&v));
    temps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cached;
    use crate::host::mock::MockHost;
    use std::time::Duration;

    const LSCPU_INTEL: &str = "\
Architecture:            x86_64
  CPU op-mode(s):        32-bit, 64-bit
CPU(s):                  4
  On-line CPU(s) list:   0-3
Vendor ID:               GenuineIntel
  Model name:            Intel(R) Core(TM) i5-8250U CPU @ 1.60GHz
    CPU family:          6
    Model:               142
    Thread(s) per core:  2
    Core(s) per socket:  2
    CPU max MHz:         3400.0000
    CPU min MHz:         400.0000
NUMA node0 CPU(s):       0-3
";

    const CPUINFO_INTEL: &str = "\
processor\t: 0
model name\t: Intel(R) Core(TM) i5-8250U CPU @ 1.60GHz
cpu MHz\t\t: 1800.000
core id\t\t: 0

processor\t: 1
model name\t: Intel(R) Core(TM) i5-8250U CPU @ 1.60GHz
cpu MHz\t\t: 900.000
core id\t\t: 1

processor\t: 2
model name\t: Intel(R) Core(TM) i5-8250U CPU @ 1.60GHz
cpu MHz\t\t: 3400.000
core id\t\t: 0

processor\t: 3
model name\t: Intel(R) Core(TM) i5-8250U CPU @ 1.60GHz
cpu MHz\t\t: 3900.000
core id\t\t: 1
";

    const SENSORS_INTEL: &str = "\
coretemp-isa-0000
Adapter: ISA adapter
Package id 0:  +58.0°C  (high = +100.0°C, crit = +100.0°C)
Core 0:        +52.0°C  (high = +100.0°C, crit = +100.0°C)
Core 1:        +75.0°C  (high = +100.0°C, crit = +100.0°C)
";

    const SENSORS_AMD: &str = "\
k10temp-pci-00c3
Adapter: PCI adapter
Tctl:         +45.5°C
Tccd1:        +41.2°C
";

    fn cpu_host() -> MockHost {
        MockHost::new()
            .with_command("lscpu", LSCPU_INTEL)
            .with_file(CPUINFO_PATH, CPUINFO_INTEL)
            .with_file(
                "/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq",
                "1700000\n",
            )
            .with_file(
                "/sys/devices/system/cpu/cpu1/cpufreq/cpuinfo_cur_freq",
                "850000\n",
            )
            .with_command("sensors", SENSORS_INTEL)
    }

    #[test]
    fn lscpu_fields() {
        let info = parse_lscpu(LSCPU_INTEL);
        assert_eq!(
            info.model_name.as_deref(),
            Some("Intel(R) Core(TM) i5-8250U CPU @ 1.60GHz")
        );
        assert_eq!(info.threads, 4);
        assert_eq!(info.threads_per_core, Some(2));
        assert_eq!(info.max_mhz, Some(3400.0));
    }

    #[test]
    fn arm_lscpu_uses_later_model_pattern() {
        let text = "Architecture: aarch64\nCPU(s): 4\nModel: 3\nHardware: BCM2835\n";
        assert_eq!(parse_lscpu(text).model_name.as_deref(), Some("3"));
        let text = "Architecture: aarch64\nCPU(s): 4\nHardware: BCM2835\n";
        assert_eq!(parse_lscpu(text).model_name.as_deref(), Some("BCM2835"));
    }

    #[test]
    fn cpuinfo_records() {
        let info = parse_cpuinfo(CPUINFO_INTEL);
        assert_eq!(info.processors.len(), 4);
        assert_eq!(info.processors[2].core_id, Some(0));
        assert_eq!(info.mhz_of(3), Some(3900.0));
        let map = info.core_map(4, 2);
        assert_eq!(map.get(&3), Some(&1));
    }

    #[test]
    fn core_map_is_synthesized_without_core_ids() {
        let info = parse_cpuinfo("processor : 0\nprocessor : 1\nprocessor : 2\nprocessor : 3\n");
        let map = info.core_map(4, 2);
        assert_eq!(map.get(&0), Some(&0));
        assert_eq!(map.get(&1), Some(&0));
        assert_eq!(map.get(&2), Some(&1));
        assert_eq!(map.get(&3), Some(&1));
    }

    #[test]
    fn per_core_temperatures_win_over_package() {
        let temps = parse_core_temps(SENSORS_INTEL);
        assert_eq!(temps.for_core(0), Some(52.0));
        assert_eq!(temps.for_core(1), Some(75.0));
        assert_eq!(temps.for_core(7), None);
        assert_eq!(temps.package, Some(58.0));
    }

    #[test]
    fn package_temperature_is_broadcast() {
        let temps = parse_core_temps(SENSORS_AMD);
        assert!(temps.per_core.is_empty());
        assert_eq!(temps.for_core(0), Some(45.5));
        assert_eq!(temps.for_core(5), Some(45.5));
    }

    #[test]
    fn no_temperature_lines() {
        let temps = parse_core_temps("acpitz-acpi-0\nAdapter: ACPI interface\n");
        assert_eq!(temps.for_core(0), None);
    }

    #[test]
    fn load_is_clamped() {
        assert_eq!(load_percent(3900, Some(3400.0)), Some(100));
        assert_eq!(load_percent(1700, Some(3400.0)), Some(50));
        assert_eq!(load_percent(1700, None), None);
        assert_eq!(load_percent(1700, Some(0.0)), None);
    }

    #[test]
    fn line_layout() {
        let sample = CoreSample {
            index: 3,
            core_id: 1,
            speed_mhz: 850,
            load_percent: Some(5),
            temperature_c: None,
            load_severity: Severity::Info,
            temperature_severity: Severity::Info,
        };
        assert_eq!(
            sample.render_line(),
            "⬜️ Core-03    |       850 MHz      |  05%  |   ⬜️ Temp   N/A °C"
        );
    }

    #[tokio::test]
    async fn collects_all_threads() {
        let host = Arc::new(cpu_host());
        let mut collector = CpuCollector::new(host);
        let snap = collector.collect().await.unwrap();

        assert_eq!(snap.model_name, "Intel(R) Core(TM) i5-8250U CPU @ 1.60GHz");
        assert_eq!(snap.core_count, 4);
        assert_eq!(snap.core_lines.len(), 4);

        // sysfs scaling_cur_freq
        assert_eq!(snap.samples[0].speed_mhz, 1700);
        assert_eq!(snap.samples[0].load_percent, Some(50));
        assert_eq!(snap.samples[0].load_severity, Severity::Medium);
        // sysfs cpuinfo_cur_freq fallback
        assert_eq!(snap.samples[1].speed_mhz, 850);
        // /proc/cpuinfo cpu MHz fallback, clamped above max
        assert_eq!(snap.samples[3].speed_mhz, 3900);
        assert_eq!(snap.samples[3].load_percent, Some(100));
        assert_eq!(snap.samples[3].load_severity, Severity::Critical);

        // threads 1 and 3 share physical core 1
        assert_eq!(snap.samples[1].temperature_c, Some(75.0));
        assert_eq!(snap.samples[3].temperature_c, Some(75.0));
        assert_eq!(snap.samples[1].temperature_severity, Severity::High);
        assert_eq!(snap.samples[0].temperature_severity, Severity::Low);
        assert!(snap.core_lines[1].contains("Temp   75 °C"));
    }

    #[tokio::test]
    async fn missing_sensors_degrades_only_temperature() {
        let host = MockHost::new()
            .with_command("lscpu", LSCPU_INTEL)
            .with_file(CPUINFO_PATH, CPUINFO_INTEL);
        let mut collector = CpuCollector::new(Arc::new(host));
        let snap = collector.collect().await.unwrap();
        assert_eq!(snap.core_count, 4);
        assert!(snap.samples.iter().all(|s| s.temperature_c.is_none()));
        assert!(snap.core_lines.iter().all(|l| l.ends_with("N/A °C")));
        assert_eq!(snap.samples[1].speed_mhz, 900);
    }

    #[tokio::test]
    async fn falls_back_to_cpuinfo_without_lscpu() {
        let cpuinfo = "processor\t: 0\nmodel name\t: AMD Ryzen 5 3600\ncpu MHz\t\t: 2200.000\n\n\
                       processor\t: 1\nmodel name\t: AMD Ryzen 5 3600\ncpu MHz\t\t: 4200.000\n";
        let host = MockHost::new()
            .with_file(CPUINFO_PATH, cpuinfo)
            .with_file(MAX_FREQ_PATH, "4200000\n")
            .with_command("sensors", SENSORS_AMD);
        let mut collector = CpuCollector::new(Arc::new(host));
        let snap = collector.collect().await.unwrap();
        assert_eq!(snap.model_name, "AMD Ryzen 5 3600");
        assert_eq!(snap.core_count, 2);
        assert_eq!(snap.samples[1].load_percent, Some(100));
        assert_eq!(snap.samples[0].temperature_c, Some(45.5));
        assert_eq!(snap.samples[1].temperature_c, Some(45.5));
    }

    #[tokio::test]
    async fn no_dynamic_speed_source_reports_zero() {
        let host = MockHost::new().with_command("lscpu", "CPU(s): 2\nModel name: Mystery\n");
        let mut collector = CpuCollector::new(Arc::new(host));
        let snap = collector.collect().await.unwrap();
        assert_eq!(snap.samples[0].speed_mhz, 0);
        assert_eq!(snap.samples[0].load_percent, None);
        assert!(snap.core_lines[0].contains("|  00%  |"));
    }

    #[tokio::test]
    async fn nothing_available_yields_sentinel() {
        let mut cached = Cached::new(
            CpuCollector::new(Arc::new(MockHost::new())),
            Duration::from_secs(1),
        );
        let snap = cached.get().await;
        assert_eq!(snap, CpuSnapshot::unavailable());
        assert_eq!(snap.core_lines, vec!["Error reading CPU information"]);
    }
}
