//! Instruments: named metric-sampling capabilities.
//!
//! Each metric kind has its own [`Instrument`] implementation. An
//! [`InstrumentFactory`] builds the concrete set for the host, and
//! [`build_instruments`] assembles the full keyed set from configuration.

mod cgroup;
mod cpu;
mod gpu;
mod network;
mod ram;
mod rate;
mod storage;

pub use cgroup::{CgroupInstrument, CgroupMetric};
pub use cpu::{
    CpuFrequencyInstrument, CpuUtilInstrument, LoadInstrument, SysfsCpuFrequencyInstrument,
};
pub use gpu::{GpuInstrument, GpuMetric};
pub use network::NetworkDataRateInstrument;
pub use ram::{ProcsInstrument, RamInstrument};
pub use storage::DiskDataRateInstrument;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::config::InstrumentsConfig;
use crate::error::Result;
use crate::platform::{detect_block_devices, detect_network_devices, get_gpu_reader, HostPaths};

pub const CPU: &str = "cpu";
pub const FREQ: &str = "freq";
pub const LOAD: &str = "load";
pub const RAM: &str = "ram";
pub const PROCS: &str = "procs";
pub const NET: &str = "net";
pub const DISK: &str = "disk";
pub const GPU_FREQ: &str = "gpu_freq";
pub const GPU_UTIL: &str = "gpu_util";
pub const CGRP_CPU: &str = "cgrp_cpu";
pub const CGRP_BLKIO: &str = "cgrp_blkio";
pub const CGRP_NET: &str = "cgrp_net";

/// Every instrument key the daemon knows about.
pub const ALL_KEYS: [&str; 12] = [
    CPU, FREQ, LOAD, RAM, PROCS, NET, DISK, GPU_FREQ, GPU_UTIL, CGRP_CPU, CGRP_BLKIO, CGRP_NET,
];

/// One measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(f64),
    /// Keyed by device name or container id
    Devices(BTreeMap<String, f64>),
}

/// A metric-sampling capability.
///
/// `measure` is synchronous and expected to be fast; a failure means "no
/// value this time" and is never fatal to the caller.
pub trait Instrument: Send + Sync {
    fn measure(&self) -> Result<Value>;
}

/// Instruments keyed by instrument key.
pub type InstrumentSet = BTreeMap<String, Arc<dyn Instrument>>;

/// Builds the concrete instrument for each metric kind.
///
/// The provided methods are the Linux readers; platform factories override
/// the ones that differ.
pub trait InstrumentFactory {
    fn paths(&self) -> &HostPaths;

    fn new_cpu_util_instrument(&self) -> Arc<dyn Instrument> {
        Arc::new(CpuUtilInstrument::new())
    }

    fn new_cpu_frequency_instrument(&self) -> Arc<dyn Instrument> {
        Arc::new(CpuFrequencyInstrument::new())
    }

    fn new_load_instrument(&self) -> Arc<dyn Instrument> {
        Arc::new(LoadInstrument)
    }

    fn new_ram_instrument(&self) -> Arc<dyn Instrument> {
        Arc::new(RamInstrument::new())
    }

    fn new_procs_instrument(&self) -> Arc<dyn Instrument> {
        Arc::new(ProcsInstrument::new())
    }

    fn new_network_data_rate_instrument(&self, devices: &[String]) -> Arc<dyn Instrument> {
        let paths = self.paths();
        let devices = if devices.is_empty() {
            detect_network_devices(&paths.sys_class_net)
        } else {
            devices.to_vec()
        };
        log::debug!("network devices: {:?}", devices);
        Arc::new(NetworkDataRateInstrument::new(&paths.proc_root, devices))
    }

    fn new_disk_data_rate_instrument(&self, devices: &[String]) -> Arc<dyn Instrument> {
        let paths = self.paths();
        let devices = if devices.is_empty() {
            detect_block_devices(&paths.sys_block)
        } else {
            devices.to_vec()
        };
        log::debug!("disk devices: {:?}", devices);
        Arc::new(DiskDataRateInstrument::new(&paths.proc_root, devices))
    }

    fn new_gpu_frequency_instrument(&self, devices: &[String]) -> Arc<dyn Instrument> {
        Arc::new(self.new_gpu_instrument(GpuMetric::Frequency, devices))
    }

    fn new_gpu_util_instrument(&self, devices: &[String]) -> Arc<dyn Instrument> {
        Arc::new(self.new_gpu_instrument(GpuMetric::Utilization, devices))
    }

    fn new_gpu_instrument(&self, metric: GpuMetric, devices: &[String]) -> GpuInstrument {
        match get_gpu_reader(&self.paths().sys_class_drm) {
            Ok(reader) => {
                let devices = if devices.is_empty() {
                    reader.devices()
                } else {
                    devices.to_vec()
                };
                GpuInstrument::new(metric, reader, devices)
            }
            Err(e) => {
                log::debug!("GPU reader not available: {}", e);
                GpuInstrument::unavailable(metric)
            }
        }
    }

    fn new_cgroup_cpu_instrument(&self) -> Arc<dyn Instrument> {
        Arc::new(CgroupInstrument::new(CgroupMetric::Cpu, self.paths()))
    }

    fn new_cgroup_blkio_instrument(&self) -> Arc<dyn Instrument> {
        Arc::new(CgroupInstrument::new(CgroupMetric::Blkio, self.paths()))
    }

    fn new_cgroup_network_instrument(&self) -> Arc<dyn Instrument> {
        Arc::new(CgroupInstrument::new(CgroupMetric::Network, self.paths()))
    }
}

/// Factory for x86 and other hosts where sysinfo reports CPU frequency.
pub struct DefaultInstrumentFactory {
    paths: HostPaths,
}

impl DefaultInstrumentFactory {
    pub fn new(paths: HostPaths) -> Self {
        Self { paths }
    }
}

impl InstrumentFactory for DefaultInstrumentFactory {
    fn paths(&self) -> &HostPaths {
        &self.paths
    }
}

/// Factory for ARM boards, which report frequency through cpufreq only.
pub struct ArmInstrumentFactory {
    paths: HostPaths,
}

impl ArmInstrumentFactory {
    pub fn new(paths: HostPaths) -> Self {
        Self { paths }
    }
}

impl InstrumentFactory for ArmInstrumentFactory {
    fn paths(&self) -> &HostPaths {
        &self.paths
    }

    fn new_cpu_frequency_instrument(&self) -> Arc<dyn Instrument> {
        Arc::new(SysfsCpuFrequencyInstrument::new(&self.paths.cpu_root))
    }
}

/// Pick the factory for a CPU architecture as named by
/// `std::env::consts::ARCH`.
pub fn new_instrument_factory(arch: &str, paths: HostPaths) -> Box<dyn InstrumentFactory> {
    match arch {
        "arm" | "aarch64" => Box::new(ArmInstrumentFactory::new(paths)),
        _ => Box::new(DefaultInstrumentFactory::new(paths)),
    }
}

/// Build the full instrument set, applying the configured device lists.
pub fn build_instruments(factory: &dyn InstrumentFactory, cfg: &InstrumentsConfig) -> InstrumentSet {
    let instruments: [(&str, Arc<dyn Instrument>); 12] = [
        (CPU, factory.new_cpu_util_instrument()),
        (FREQ, factory.new_cpu_frequency_instrument()),
        (LOAD, factory.new_load_instrument()),
        (RAM, factory.new_ram_instrument()),
        (PROCS, factory.new_procs_instrument()),
        (NET, factory.new_network_data_rate_instrument(&cfg.net.devices)),
        (DISK, factory.new_disk_data_rate_instrument(&cfg.disk.devices)),
        (GPU_FREQ, factory.new_gpu_frequency_instrument(&cfg.gpu.devices)),
        (GPU_UTIL, factory.new_gpu_util_instrument(&cfg.gpu.devices)),
        (CGRP_CPU, factory.new_cgroup_cpu_instrument()),
        (CGRP_BLKIO, factory.new_cgroup_blkio_instrument()),
        (CGRP_NET, factory.new_cgroup_network_instrument()),
    ];

    instruments
        .into_iter()
        .map(|(key, instrument)| (key.to_string(), instrument))
        .collect()
}
