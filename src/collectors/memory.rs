use crate::cache::Collect;
use crate::error::CollectError;
use crate::host::Host;
use crate::status::{self, Severity};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub total_gb: f64,
    pub used_gb: f64,
    pub used_percent: f64,
    pub cache_gb: f64,
    pub available_gb: f64,
    pub severity: Severity,
    pub error: Option<String>,
}

impl MemorySnapshot {
    pub fn unavailable() -> Self {
        Self {
            total_gb: 0.0,
            used_gb: 0.0,
            used_percent: 0.0,
            cache_gb: 0.0,
            available_gb: 0.0,
            severity: Severity::Info,
            error: Some("Error reading memory info".to_string()),
        }
    }

    /// Usage line and cache line, or the error alone.
    pub fn render_lines(&self) -> Vec<String> {
        if let Some(err) = &self.error {
            return vec![err.clone()];
        }
        vec![
            format!(
                "{} [ {:.1} / {:.1} GB ] [{:.1}%]",
                self.severity.glyph(),
                self.used_gb,
                self.total_gb,
                self.used_percent
            ),
            format!("Cache {:.1} GB", self.cache_gb),
        ]
    }
}

pub struct MemoryCollector {
    host: Arc<dyn Host>,
}

impl MemoryCollector {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Collect for MemoryCollector {
    type Output = MemorySnapshot;
    const NAME: &'static str = "memory";

    async fn collect(&mut self) -> Result<MemorySnapshot, CollectError> {
        let text = self.host.run_command(&["free", "-k"]).await?;
        parse_free(&text)
    }

    fn fallback(&self, _err: &CollectError) -> MemorySnapshot {
        MemorySnapshot::unavailable()
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn parse_free(text: &str) -> Result<MemorySnapshot, CollectError> {
    let row = text
        .lines()
        .map(str::trim)
        .find(|line| line.to_ascii_lowercase().starts_with("mem:"))
        .ok_or_else(|| CollectError::parse("free", "no Mem: row"))?;

    let columns = row
        .split_whitespace()
        .skip(1)
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| CollectError::parse("free", format!("bad Mem: column: {err}")))?;

    let [total, used, _free, _shared, buff_cache, available] = columns[..] else {
        return Err(CollectError::parse(
            "free",
            format!("expected 6 Mem: columns, got {}", columns.len()),
        ));
    };
    if total == 0 {
        return Err(CollectError::parse("free", "total memory is zero"));
    }

    let used_percent = used as f64 / total as f64 * 100.0;
    Ok(MemorySnapshot {
        total_gb: round1(total as f64 / KIB_PER_GIB),
        used_gb: round1(used as f64 / KIB_PER_GIB),
        used_percent: round1(used_percent),
        cache_gb: round1(buff_cache as f64 / KIB_PER_GIB),
        available_gb: round1(available as f64 / KIB_PER_GIB),
        severity: status::classify(used_percent, &status::MEMORY),
        error: None,
    })
}
