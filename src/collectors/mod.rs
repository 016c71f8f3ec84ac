pub mod cpu;
pub mod gpu;
pub mod memory;
pub mod network;
pub mod power;
pub mod storage;
pub mod system;

pub use cpu::{CoreSample, CpuCollector, CpuSnapshot};
pub use gpu::{EngineLoad, GpuCollector, GpuDevice, GpuSnapshot, GpuVendor};
pub use memory::{MemoryCollector, MemorySnapshot};
pub use network::{NetworkCollector, NetworkSnapshot, NetworkTtls};
pub use power::{BatteryStatus, PowerCollector, PowerSnapshot};
pub use storage::{StorageCollector, StorageEntry, StorageSnapshot};
pub use system::{SystemCollector, SystemIdentity, Uptime, UptimeCollector};

use regex::Regex;

/// Parses numbers the way tools print them: tolerant of units, brackets and
/// decimal commas. `None` when no digits are present.
pub(crate) fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }

    if let Ok(v) = trimmed.replace(',', ".").parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-' || *c == '+')
        .collect();
    if !filtered.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    filtered.replace(',', ".").parse::<f64>().ok()
}

/// Returns the first capture group of the first pattern that matches.
pub(crate) fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    })
}

/// Compiles a pattern that is a literal in the source.
pub(crate) fn pattern(re: &str) -> Regex {
    match Regex::new(re) {
        Ok(re) => re,
        Err(err) => panic!("invalid built-in pattern {re:?}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_numbers() {
        assert_eq!(parse_f64_loose(" 42 "), Some(42.0));
        assert_eq!(parse_f64_loose("3,5"), Some(3.5));
        assert_eq!(parse_f64_loose("1530 MHz"), Some(1530.0));
        assert_eq!(parse_f64_loose("[N/A]"), None);
        assert_eq!(parse_f64_loose("N/A"), None);
    }

    #[test]
    fn first_matching_pattern_wins() {
        let patterns = [pattern(r"(?m)^Model name:\s+(.+)$"), pattern(r"(?m)^CPU:\s+(.+)$")];
        let text = "CPU:   generic\nModel name:   Ryzen\n";
        assert_eq!(first_capture(&patterns, text).as_deref(), Some("Ryzen"));
        assert_eq!(first_capture(&patterns, "nothing"), None);
    }
}
