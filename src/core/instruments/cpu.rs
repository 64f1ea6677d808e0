//! CPU utilisation, frequency and load instruments.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Instant;
use sysinfo::{CpuRefreshKind, RefreshKind, System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::{Instrument, Value};
use crate::error::{Result, TelemdError};
use crate::platform::procfs::read_mean_cpu_frequency;

/// Global CPU utilisation in percent since the previous measurement.
///
/// sysinfo needs at least [`MINIMUM_CPU_UPDATE_INTERVAL`] between refreshes
/// for a meaningful value; measurements taken sooner fail and keep the
/// previous baseline.
pub struct CpuUtilInstrument {
    state: Mutex<CpuUsageState>,
}

struct CpuUsageState {
    system: System,
    refreshed_at: Instant,
}

impl CpuUtilInstrument {
    pub fn new() -> Self {
        let refresh_kind =
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage());
        let mut system = System::new_with_specifics(refresh_kind);

        // Usage is a delta; the first refresh sets the baseline
        system.refresh_cpu_usage();

        Self {
            state: Mutex::new(CpuUsageState {
                system,
                refreshed_at: Instant::now(),
            }),
        }
    }
}

impl Default for CpuUtilInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for CpuUtilInstrument {
    fn measure(&self) -> Result<Value> {
        let mut state = self.state.lock();
        let now = Instant::now();
        if now.saturating_duration_since(state.refreshed_at) < MINIMUM_CPU_UPDATE_INTERVAL {
            return Err(TelemdError::instrument("cpu baseline recorded"));
        }

        state.system.refresh_cpu_usage();
        state.refreshed_at = now;
        Ok(Value::Scalar(state.system.global_cpu_usage() as f64))
    }
}

/// Mean CPU frequency in MHz as reported by sysinfo.
pub struct CpuFrequencyInstrument {
    system: Mutex<System>,
}

impl CpuFrequencyInstrument {
    pub fn new() -> Self {
        let refresh_kind =
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_frequency());

        Self {
            system: Mutex::new(System::new_with_specifics(refresh_kind)),
        }
    }
}

impl Default for CpuFrequencyInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for CpuFrequencyInstrument {
    fn measure(&self) -> Result<Value> {
        let mut system = self.system.lock();
        system.refresh_cpu_frequency();

        let cpus = system.cpus();
        if cpus.is_empty() {
            return Err(TelemdError::instrument("no CPU reported"));
        }
        let total: u64 = cpus.iter().map(|cpu| cpu.frequency()).sum();
        Ok(Value::Scalar(total as f64 / cpus.len() as f64))
    }
}

/// Mean CPU frequency in MHz read from cpufreq `scaling_cur_freq`.
pub struct SysfsCpuFrequencyInstrument {
    cpu_root: PathBuf,
}

impl SysfsCpuFrequencyInstrument {
    pub fn new(cpu_root: &Path) -> Self {
        Self {
            cpu_root: cpu_root.to_path_buf(),
        }
    }
}

impl Instrument for SysfsCpuFrequencyInstrument {
    fn measure(&self) -> Result<Value> {
        read_mean_cpu_frequency(&self.cpu_root).map(Value::Scalar)
    }
}

/// One-minute load average.
pub struct LoadInstrument;

impl Instrument for LoadInstrument {
    fn measure(&self) -> Result<Value> {
        Ok(Value::Scalar(System::load_average().one))
    }
}
