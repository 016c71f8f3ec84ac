use crate::host::HostError;
use thiserror::Error;

/// Why a collector could not produce a fresh value.
///
/// These never reach the renderer: [`crate::cache::Cached::get`] logs them and
/// substitutes the previous value or the collector's fallback.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("{0} is not installed")]
    ToolMissing(String),
    #[error("unexpected output from {source_name}: {detail}")]
    ParseMismatch {
        source_name: &'static str,
        detail: String,
    },
    #[error(transparent)]
    Io(HostError),
}

impl CollectError {
    pub fn parse(source_name: &'static str, detail: impl Into<String>) -> Self {
        CollectError::ParseMismatch {
            source_name,
            detail: detail.into(),
        }
    }
}

impl From<HostError> for CollectError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::NotFound { program } => CollectError::ToolMissing(program),
            other => CollectError::Io(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_becomes_tool_missing() {
        let err: CollectError = HostError::NotFound {
            program: "lscpu".to_string(),
        }
        .into();
        assert!(matches!(err, CollectError::ToolMissing(ref t) if t == "lscpu"));
        assert_eq!(err.to_string(), "lscpu is not installed");
    }

    #[test]
    fn other_host_errors_stay_io() {
        let err: CollectError = HostError::Http {
            url: "https://example.invalid".to_string(),
            reason: "timeout".to_string(),
        }
        .into();
        assert!(matches!(err, CollectError::Io(HostError::Http { .. })));
    }
}
