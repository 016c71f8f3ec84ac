//! Threshold ladders and the severity levels they map onto.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Cold,
}

impl Severity {
    const LADDER: [Severity; 6] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
        Severity::Cold,
    ];

    pub fn glyph(self) -> &'static str {
        match self {
            Severity::Critical => "🟥",
            Severity::High => "🟧",
            Severity::Medium => "🟨",
            Severity::Low => "🟩",
            Severity::Info => "⬜️",
            Severity::Cold => "🟦",
        }
    }
}

pub const CPU_LOAD: [f64; 4] = [90.0, 70.0, 50.0, 30.0];
pub const MEMORY: [f64; 4] = [90.0, 70.0, 50.0, 30.0];
pub const GPU_VRAM: [f64; 4] = [90.0, 70.0, 50.0, 30.0];
pub const STORAGE: [f64; 4] = [80.0, 60.0, 50.0, 40.0];
pub const TEMPERATURE: [f64; 6] = [80.0, 70.0, 55.0, 40.0, 30.0, 0.0];
pub const GPU_CLOCK: [f64; 6] = [2500.0, 2000.0, 1500.0, 1000.0, 500.0, 0.0];

/// Maps `value` onto a descending threshold ladder.
///
/// The level is chosen by the index of the first threshold `value` reaches.
/// Below every threshold (and for NaN) the bottom tier applies: `Cold` for
/// ladders of six or more steps, `Info` otherwise.
pub fn classify(value: f64, thresholds: &[f64]) -> Severity {
    for (i, t) in thresholds.iter().take(Severity::LADDER.len()).enumerate() {
        if value >= *t {
            return Severity::LADDER[i];
        }
    }
    if thresholds.len() > 5 {
        Severity::Cold
    } else {
        Severity::Info
    }
}

/// Like [`classify`], but an absent reading is neutral.
pub fn classify_opt(value: Option<f64>, thresholds: &[f64]) -> Severity {
    match value {
        Some(v) => classify(v, thresholds),
        None => Severity::Info,
    }
}
