//! GPU discovery across vendor tools.
//!
//! Three probes run side by side: `nvidia-smi`, `rocm-smi` (topped up from
//! the `amdgpu` sections of `sensors`) and `lspci` (with live stats from
//! `intel_gpu_top` for Intel parts). Vendor tools win over PCI identification.

use super::{parse_f64_loose, pattern};
use crate::cache::Collect;
use crate::error::CollectError;
use crate::host::{tool_available, Host};
use crate::status;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const GPU_NOT_AVAILABLE: &str = "GPU info not available (sudo or drivers may be required)";

const NVIDIA_QUERY: [&str; 3] = [
    "nvidia-smi",
    "--query-gpu=name,memory.total,memory.used,temperature.gpu,clocks.gr,clocks.max.gr",
    "--format=csv,noheader,nounits",
];
const ROCM_QUERY: [&str; 6] = [
    "rocm-smi",
    "--showproductname",
    "--showmeminfo",
    "vram",
    "--showtemp",
    "--json",
];
const INTEL_GPU_TOP: [&str; 3] = [
    "sh",
    "-c",
    "timeout 1 intel_gpu_top -J -s 500 2>/dev/null; true",
];

const MIB: f64 = 1024.0 * 1024.0;

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| pattern(r"\[([^\]]+)\]"));
static PCI_ID: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[0-9a-fA-F]{4}(:[0-9a-fA-F]{4})?$"));

const PRODUCT_FAMILIES: [&str; 8] = [
    "GeForce",
    "Quadro",
    "RTX",
    "Radeon",
    "Arc",
    "Iris",
    "UHD Graphics",
    "HD Graphics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Pci,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineLoad {
    pub name: String,
    pub busy_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuDevice {
    pub vendor: GpuVendor,
    pub name: String,
    pub vram_used_mb: Option<f64>,
    pub vram_total_mb: Option<f64>,
    pub temperature_c: Option<f64>,
    pub clock_mhz: Option<f64>,
    pub clock_max_mhz: Option<f64>,
    pub power_watts: Option<f64>,
    pub engines: Vec<EngineLoad>,
}

impl GpuDevice {
    fn identified(vendor: GpuVendor, name: impl Into<String>) -> Self {
        Self {
            vendor,
            name: name.into(),
            vram_used_mb: None,
            vram_total_mb: None,
            temperature_c: None,
            clock_mhz: None,
            clock_max_mhz: None,
            power_watts: None,
            engines: Vec::new(),
        }
    }

    pub fn vram_load_percent(&self) -> Option<f64> {
        match (self.vram_used_mb, self.vram_total_mb) {
            (Some(used), Some(total)) if total > 0.0 => Some((used / total * 100.0).round()),
            _ => None,
        }
    }

    pub fn render(&self, index: usize) -> String {
        let mut lines = vec![format!("GPU{index} - [ {} ]", self.name)];
        let temp_glyph = status::classify_opt(self.temperature_c, &status::TEMPERATURE).glyph();
        let temp = self
            .temperature_c
            .map(|t| format!("{t:.0}"))
            .unwrap_or_else(|| "N/A".to_string());

        if let (Some(used), Some(total)) = (self.vram_used_mb, self.vram_total_mb) {
            let load = self.vram_load_percent().unwrap_or(0.0);
            lines.push(format!(
                "{} [ VRAM : {used:.0}MB / {total:.0}MB ] [{load:.0}%] {temp_glyph} Temp {temp} °C",
                status::classify(load, &status::GPU_VRAM).glyph(),
            ));
        } else if self.temperature_c.is_some() {
            lines.push(format!("{temp_glyph} Temp {temp} °C"));
        }

        match (self.vendor, self.clock_mhz) {
            (GpuVendor::Intel, Some(freq)) => {
                let power = self
                    .power_watts
                    .map(|p| format!("{p:.2}"))
                    .unwrap_or_else(|| "N/A".to_string());
                lines.push(format!("[ Freq : {freq:.0} MHz ] [ Power : {power} W ]"));
            }
            (_, Some(clock)) => {
                let max = self
                    .clock_max_mhz
                    .map(|m| format!(" / {m:.0} MHz"))
                    .unwrap_or_default();
                lines.push(format!(
                    "{} Clock {clock:.0} MHz{max}",
                    status::classify(clock, &status::GPU_CLOCK).glyph(),
                ));
            }
            (_, None) => {}
        }

        if !self.engines.is_empty() {
            let engines: Vec<String> = self
                .engines
                .iter()
                .map(|e| format!("{} {:.0}%", e.name, e.busy_percent))
                .collect();
            lines.push(engines.join(" | "));
        }

        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuSnapshot {
    pub devices: Vec<GpuDevice>,
    pub display: String,
}

impl GpuSnapshot {
    pub fn from_devices(devices: Vec<GpuDevice>) -> Self {
        let display = if devices.is_empty() {
            GPU_NOT_AVAILABLE.to_string()
        } else {
            devices
                .iter()
                .enumerate()
                .map(|(i, d)| d.render(i))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        Self { devices, display }
    }
}

pub struct GpuCollector {
    host: Arc<dyn Host>,
}

impl GpuCollector {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Collect for GpuCollector {
    type Output = GpuSnapshot;
    const NAME: &'static str = "gpu";

    async fn collect(&mut self) -> Result<GpuSnapshot, CollectError> {
        let host = self.host.as_ref();
        let (nvidia, amd, (pci, lspci_text)) =
            tokio::join!(probe_nvidia(host), probe_amd(host), probe_pci(host));
        debug!(
            nvidia = nvidia.len(),
            amd = amd.len(),
            pci = pci.len(),
            "gpu probes finished"
        );

        let mut devices = merge_devices(nvidia, amd, pci);
        if devices.is_empty() {
            devices = scan_display_controllers(&lspci_text);
        }
        Ok(GpuSnapshot::from_devices(devices))
    }

    fn fallback(&self, _err: &CollectError) -> GpuSnapshot {
        GpuSnapshot {
            devices: Vec::new(),
            display: "Error fetching GPU info".to_string(),
        }
    }
}

async fn probe_nvidia(host: &dyn Host) -> Vec<GpuDevice> {
    if !tool_available(host, "nvidia-smi").await {
        return Vec::new();
    }
    match host.run_command(&NVIDIA_QUERY).await {
        Ok(text) => parse_nvidia_smi(&text),
        Err(err) => {
            debug!(error = %err, "nvidia-smi query failed");
            Vec::new()
        }
    }
}

async fn probe_amd(host: &dyn Host) -> Vec<GpuDevice> {
    if !tool_available(host, "rocm-smi").await {
        return Vec::new();
    }
    let mut devices = match host.run_command(&ROCM_QUERY).await {
        Ok(text) => parse_rocm_smi(&text),
        Err(err) => {
            debug!(error = %err, "rocm-smi query failed");
            return Vec::new();
        }
    };

    let incomplete = devices
        .iter()
        .any(|d| d.temperature_c.is_none() || d.clock_mhz.is_none());
    if incomplete {
        if let Ok(text) = host.run_command(&["sensors"]).await {
            supplement_from_sensors(&mut devices, &parse_amdgpu_sensors(&text));
        }
    }
    devices
}

/// Returns the PCI-identified devices and the raw listing for the last-resort scan.
async fn probe_pci(host: &dyn Host) -> (Vec<GpuDevice>, String) {
    let text = match host.run_command(&["lspci"]).await {
        Ok(text) => text,
        Err(err) => {
            debug!(error = %err, "lspci unavailable");
            return (Vec::new(), String::new());
        }
    };
    let mut devices = parse_lspci(&text);

    if devices.iter().any(|d| d.vendor == GpuVendor::Intel)
        && tool_available(host, "intel_gpu_top").await
    {
        match host.run_command(&INTEL_GPU_TOP).await {
            Ok(out) => {
                if let (Some(stats), Some(dev)) = (
                    parse_intel_gpu_top(&out),
                    devices.iter_mut().find(|d| d.vendor == GpuVendor::Intel),
                ) {
                    dev.clock_mhz = stats.frequency_mhz;
                    dev.power_watts = stats.power_watts;
                    dev.engines = stats.engines;
                }
            }
            Err(err) => debug!(error = %err, "intel_gpu_top sample failed"),
        }
    }

    (devices, text)
}

fn merge_devices(
    nvidia: Vec<GpuDevice>,
    amd: Vec<GpuDevice>,
    pci: Vec<GpuDevice>,
) -> Vec<GpuDevice> {
    let mut out: Vec<GpuDevice> = Vec::new();
    for dev in nvidia.into_iter().chain(amd) {
        push_unique(&mut out, dev);
    }
    // a vendor tool already describes these cards better than lspci
    let reported: HashSet<GpuVendor> = out.iter().map(|d| d.vendor).collect();
    for dev in pci {
        if !reported.contains(&dev.vendor) {
            push_unique(&mut out, dev);
        }
    }
    out
}

fn push_unique(out: &mut Vec<GpuDevice>, dev: GpuDevice) {
    if !out.iter().any(|d| d.name.eq_ignore_ascii_case(&dev.name)) {
        out.push(dev);
    }
}

fn parse_nvidia_smi(text: &str) -> Vec<GpuDevice> {
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() < 4 || parts[0].is_empty() {
                return None;
            }
            let field = |i: usize| parts.get(i).and_then(|v| parse_f64_loose(v));
            Some(GpuDevice {
                vram_total_mb: field(1),
                vram_used_mb: field(2),
                temperature_c: field(3),
                clock_mhz: field(4),
                clock_max_mhz: field(5),
                ..GpuDevice::identified(GpuVendor::Nvidia, parts[0])
            })
        })
        .collect()
}

fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_f64_loose(s),
        _ => None,
    }
}

fn parse_rocm_smi(text: &str) -> Vec<GpuDevice> {
    let Ok(root) = serde_json::from_str::<serde_json::Map<String, Value>>(text.trim()) else {
        debug!("rocm-smi output is not a JSON object");
        return Vec::new();
    };

    root.iter()
        .filter(|(key, _)| key.starts_with("card"))
        .filter_map(|(_, card)| {
            let card = card.as_object()?;
            let name = ["Card series", "Card Series", "Card model", "Card SKU"]
                .iter()
                .find_map(|k| card.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .filter(|n| !n.is_empty())?;
            let bytes_as_mb = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| card.get(*k).and_then(json_f64))
                    .map(|b| b / MIB)
            };
            let temperature_c = card
                .iter()
                .filter(|(k, _)| k.starts_with("Temperature"))
                .min_by_key(|(k, _)| !k.contains("edge"))
                .and_then(|(_, v)| json_f64(v));
            Some(GpuDevice {
                vram_total_mb: bytes_as_mb(&["VRAM Total Memory (B)"]),
                vram_used_mb: bytes_as_mb(&["VRAM Total Used Memory (B)", "VRAM Used Memory (B)"]),
                temperature_c,
                ..GpuDevice::identified(GpuVendor::Amd, name)
            })
        })
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq)]
struct AmdgpuSensors {
    edge_c: Option<f64>,
    sclk_mhz: Option<f64>,
    power_watts: Option<f64>,
}

/// Reads the `amdgpu-*` adapter sections of `sensors` output, in order.
fn parse_amdgpu_sensors(text: &str) -> Vec<AmdgpuSensors> {
    let mut out = Vec::new();
    let mut current: Option<AmdgpuSensors> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.extend(current.take());
            continue;
        }
        if !line.starts_with(' ') && !trimmed.contains(':') {
            out.extend(current.take());
            if trimmed.starts_with("amdgpu-") {
                current = Some(AmdgpuSensors::default());
            }
            continue;
        }
        let Some(section) = current.as_mut() else {
            continue;
        };
        let Some((label, value)) = trimmed.split_once(':') else {
            continue;
        };
        let reading = value.split('(').next().unwrap_or(value);
        match label.trim() {
            "edge" => section.edge_c = parse_f64_loose(reading.trim_end_matches("°C")),
            "sclk" => section.sclk_mhz = parse_f64_loose(reading),
            "PPT" | "power1" => section.power_watts = parse_f64_loose(reading),
            _ => {}
        }
    }
    out.extend(current);
    out
}

fn supplement_from_sensors(devices: &mut [GpuDevice], sensors: &[AmdgpuSensors]) {
    for (dev, s) in devices.iter_mut().zip(sensors) {
        if dev.temperature_c.is_none() {
            dev.temperature_c = s.edge_c;
        }
        if dev.clock_mhz.is_none() {
            dev.clock_mhz = s.sclk_mhz;
        }
        if dev.power_watts.is_none() {
            dev.power_watts = s.power_watts;
        }
    }
}

fn is_display_controller(line: &str) -> bool {
    line.contains("VGA") || line.contains("3D controller")
}

fn vendor_of(line: &str) -> GpuVendor {
    let lower = line.to_ascii_lowercase();
    if lower.contains("intel") {
        GpuVendor::Intel
    } else if lower.contains("nvidia") {
        GpuVendor::Nvidia
    } else if lower.contains("advanced micro devices") || lower.contains("amd") || lower.contains("ati ")
    {
        GpuVendor::Amd
    } else {
        GpuVendor::Pci
    }
}

fn product_name(line: &str) -> Option<String> {
    let brackets: Vec<regex::Match<'_>> =
        BRACKETED.captures_iter(line).filter_map(|c| c.get(1)).collect();
    let candidates: Vec<&str> = brackets
        .iter()
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty() && *s != "AMD/ATI" && !PCI_ID.is_match(s))
        .collect();
    if let Some(name) = candidates
        .iter()
        .find(|c| PRODUCT_FAMILIES.iter().any(|f| c.contains(f)))
        .or_else(|| candidates.last())
    {
        return Some(name.to_string());
    }

    // only a vendor tag like `[AMD/ATI] Renoir (rev c6)`: use the chip name after it
    let tag = brackets.last()?;
    let after = &line[tag.end() + 1..];
    let chip = after.split('(').next().unwrap_or(after).trim();
    if chip.is_empty() {
        Some(tag.as_str().trim().to_string()).filter(|t| !t.is_empty())
    } else {
        Some(chip.to_string())
    }
}

fn parse_lspci(text: &str) -> Vec<GpuDevice> {
    text.lines()
        .filter(|line| is_display_controller(line))
        .filter_map(|line| {
            let name = product_name(line)?;
            Some(GpuDevice::identified(vendor_of(line), name))
        })
        .collect()
}

/// Any display controller line at all, described by its text after the class.
fn scan_display_controllers(text: &str) -> Vec<GpuDevice> {
    text.lines()
        .filter(|line| is_display_controller(line))
        .filter_map(|line| {
            let (_, desc) = line.split_once(": ")?;
            let desc = desc.trim();
            (!desc.is_empty()).then(|| GpuDevice::identified(GpuVendor::Pci, desc))
        })
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq)]
struct IntelGpuStats {
    frequency_mhz: Option<f64>,
    power_watts: Option<f64>,
    engines: Vec<EngineLoad>,
}

/// Takes the first complete sample from `intel_gpu_top -J`, which streams a
/// JSON array that may be cut off mid-element.
fn parse_intel_gpu_top(text: &str) -> Option<IntelGpuStats> {
    let start = text.find('{')?;
    let sample: Value = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()?
        .ok()?;

    let frequency_mhz = sample
        .pointer("/frequency/actual")
        .and_then(json_f64)
        .filter(|f| *f > 0.0);
    let power_watts = ["/power/GPU", "/power/gpu"]
        .iter()
        .find_map(|p| sample.pointer(p).and_then(json_f64));
    let engines = sample
        .get("engines")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(name, e)| {
                    Some(EngineLoad {
                        name: name.clone(),
                        busy_percent: e.get("busy").and_then(json_f64)?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(IntelGpuStats {
        frequency_mhz,
        power_watts,
        engines,
    })
}
