//! GPU-specific platform code.
//!
//! Provides per-device GPU utilisation and clock readings.
//! Supports NVIDIA (via NVML) and any DRM driver exposing sysfs counters
//! (amdgpu, i915).

mod drm;
mod nvidia;

pub use drm::{parse_pp_dpm_sclk, DrmGpuReader};
pub use nvidia::NvidiaGpuReader;

use std::path::Path;

use crate::error::{Result, TelemdError};

/// Reads GPU counters for a device identifier (an index for NVML, a DRM card
/// number for sysfs).
pub trait GpuReader: Send {
    /// Current utilisation in percent
    fn utilization(&mut self, device: &str) -> Result<f64>;

    /// Current graphics clock in MHz
    fn frequency_mhz(&mut self, device: &str) -> Result<f64>;

    /// Devices this reader can see, used when none are configured
    fn devices(&self) -> Vec<String>;
}

/// Attempt to get an available GPU reader
///
/// Tries each supported backend in order of preference:
/// 1. NVIDIA (via NVML)
/// 2. DRM sysfs
///
/// Returns error if no GPU is available.
pub fn get_gpu_reader(sys_class_drm: &Path) -> Result<Box<dyn GpuReader>> {
    // Try NVIDIA first
    if let Ok(reader) = NvidiaGpuReader::new() {
        return Ok(Box::new(reader));
    }

    let drm = DrmGpuReader::new(sys_class_drm);
    if !drm.devices().is_empty() {
        return Ok(Box::new(drm));
    }

    Err(TelemdError::unsupported("no supported GPU found"))
}
