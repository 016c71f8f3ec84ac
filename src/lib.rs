//! Host telemetry for a desktop status panel.
//!
//! Collectors sample one domain each through a [`host::Host`], every sample
//! is cached for a per-domain TTL, and [`link::SystemLink`] hands out
//! ready-to-render snapshots that never carry errors.

pub mod cache;
pub mod collectors;
pub mod config;
pub mod error;
pub mod host;
pub mod link;
pub mod rate;
pub mod status;

pub use config::{Config, ConfigError};
pub use host::{Host, HostError, SystemHost};
pub use link::{AllInfo, LinkError, Module, ModuleInfo, SystemLink};
pub use status::Severity;
