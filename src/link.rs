//! The facade a panel talks to: one cached collector per domain.

use crate::cache::Cached;
use crate::collectors::{
    CpuCollector, CpuSnapshot, GpuCollector, GpuSnapshot, MemoryCollector, MemorySnapshot,
    NetworkCollector, NetworkSnapshot, PowerCollector, PowerSnapshot, StorageCollector,
    StorageSnapshot, SystemCollector, SystemIdentity, Uptime, UptimeCollector,
};
use crate::config::Config;
use crate::host::Host;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("unknown module '{0}'")]
    UnknownModule(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    System,
    Cpu,
    Gpu,
    Memory,
    Storage,
    Network,
    Power,
    Uptime,
}

impl Module {
    pub const ALL: [Module; 8] = [
        Module::System,
        Module::Cpu,
        Module::Gpu,
        Module::Memory,
        Module::Storage,
        Module::Network,
        Module::Power,
        Module::Uptime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Module::System => "system",
            Module::Cpu => "cpu",
            Module::Gpu => "gpu",
            Module::Memory => "memory",
            Module::Storage => "storage",
            Module::Network => "network",
            Module::Power => "power",
            Module::Uptime => "uptime",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Module {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Module::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| LinkError::UnknownModule(wanted.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "module", content = "info", rename_all = "lowercase")]
pub enum ModuleInfo {
    System(SystemIdentity),
    Cpu(CpuSnapshot),
    Gpu(GpuSnapshot),
    Memory(MemorySnapshot),
    Storage(StorageSnapshot),
    Network(NetworkSnapshot),
    Power(PowerSnapshot),
    Uptime(Uptime),
}

#[derive(Debug, Clone, Serialize)]
pub struct AllInfo {
    pub system: SystemIdentity,
    pub cpu: CpuSnapshot,
    pub gpu: GpuSnapshot,
    pub memory: MemorySnapshot,
    pub storage: StorageSnapshot,
    pub network: NetworkSnapshot,
    pub power: PowerSnapshot,
    pub uptime: Uptime,
}

impl AllInfo {
    /// Plain-text rendering, one titled section per domain.
    pub fn render_text(&self) -> String {
        let mut sections: Vec<(&str, Vec<String>)> = Vec::new();

        let mut system = self.system.render_lines();
        system.push(format!("Uptime : {}", self.uptime.display));
        sections.push(("System", system));

        let mut cpu = vec![format!(
            "{} ({} threads)",
            self.cpu.model_name, self.cpu.core_count
        )];
        cpu.extend(self.cpu.core_lines.iter().cloned());
        sections.push(("CPU", cpu));

        sections.push(("GPU", vec![self.gpu.display.clone()]));
        sections.push(("Memory", self.memory.render_lines()));
        sections.push(("Storage", vec![self.storage.display.trim_end().to_string()]));
        sections.push(("Network", self.network.render_lines()));
        sections.push(("Power", vec![self.power.display()]));

        sections
            .into_iter()
            .map(|(title, lines)| format!("== {title} ==\n{}", lines.join("\n")))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct SystemLink {
    system: Cached<SystemCollector>,
    cpu: Cached<CpuCollector>,
    gpu: Cached<GpuCollector>,
    memory: Cached<MemoryCollector>,
    storage: Cached<StorageCollector>,
    network: Cached<NetworkCollector>,
    power: Cached<PowerCollector>,
    uptime: Cached<UptimeCollector>,
}

impl SystemLink {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self::with_config(host, &Config::default())
    }

    pub fn with_config(host: Arc<dyn Host>, cfg: &Config) -> Self {
        let ttl = &cfg.ttl;
        Self {
            system: Cached::new(SystemCollector::new(host.clone()), ttl.system),
            cpu: Cached::new(CpuCollector::new(host.clone()), ttl.cpu),
            gpu: Cached::new(GpuCollector::new(host.clone()), ttl.gpu),
            memory: Cached::new(MemoryCollector::new(host.clone()), ttl.memory),
            storage: Cached::new(StorageCollector::new(host.clone()), ttl.storage),
            network: Cached::new(
                NetworkCollector::with_settings(
                    host.clone(),
                    &cfg.public_ip_url,
                    ttl.network_ttls(),
                ),
                ttl.network,
            ),
            power: Cached::new(PowerCollector::new(host.clone()), ttl.power),
            uptime: Cached::new(UptimeCollector::new(host), ttl.uptime),
        }
    }

    /// Samples every domain concurrently, each through its own cache.
    pub async fn get_all_info(&mut self) -> AllInfo {
        let (system, cpu, gpu, memory, storage, network, power, uptime) = tokio::join!(
            self.system.get(),
            self.cpu.get(),
            self.gpu.get(),
            self.memory.get(),
            self.storage.get(),
            self.network.get(),
            self.power.get(),
            self.uptime.get(),
        );
        AllInfo {
            system,
            cpu,
            gpu,
            memory,
            storage,
            network,
            power,
            uptime,
        }
    }

    pub async fn get_system_info(&mut self) -> SystemIdentity {
        self.system.get().await
    }

    pub async fn get_cpu_info(&mut self) -> CpuSnapshot {
        self.cpu.get().await
    }

    pub async fn get_gpu_info(&mut self) -> GpuSnapshot {
        self.gpu.get().await
    }

    pub async fn get_memory_info(&mut self) -> MemorySnapshot {
        self.memory.get().await
    }

    pub async fn get_storage_info(&mut self) -> StorageSnapshot {
        self.storage.get().await
    }

    pub async fn get_network_info(&mut self) -> NetworkSnapshot {
        self.network.get().await
    }

    pub async fn get_power_info(&mut self) -> PowerSnapshot {
        self.power.get().await
    }

    pub async fn get_uptime(&mut self) -> Uptime {
        self.uptime.get().await
    }

    pub async fn module_info(&mut self, module: Module) -> ModuleInfo {
        match module {
            Module::System => ModuleInfo::System(self.get_system_info().await),
            Module::Cpu => ModuleInfo::Cpu(self.get_cpu_info().await),
            Module::Gpu => ModuleInfo::Gpu(self.get_gpu_info().await),
            Module::Memory => ModuleInfo::Memory(self.get_memory_info().await),
            Module::Storage => ModuleInfo::Storage(self.get_storage_info().await),
            Module::Network => ModuleInfo::Network(self.get_network_info().await),
            Module::Power => ModuleInfo::Power(self.get_power_info().await),
            Module::Uptime => ModuleInfo::Uptime(self.get_uptime().await),
        }
    }

    pub async fn module_info_by_name(&mut self, name: &str) -> Result<ModuleInfo, LinkError> {
        let module = name.parse::<Module>()?;
        Ok(self.module_info(module).await)
    }

    pub fn available_modules(&self) -> Vec<&'static str> {
        Module::ALL.iter().map(|m| m.name()).collect()
    }

    pub fn clear_cache(&mut self) {
        self.system.clear_cache();
        self.cpu.clear_cache();
        self.gpu.clear_cache();
        self.memory.clear_cache();
        self.storage.clear_cache();
        self.network.clear_cache();
        self.network.collector_mut().clear();
        self.power.clear_cache();
        self.uptime.clear_cache();
        debug!("all caches cleared");
    }
}
