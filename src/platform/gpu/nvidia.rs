#[cfg(feature = "nvml")]
use nvml_wrapper::{enum_wrappers::device::Clock, Device, Nvml};

use super::GpuReader;
use crate::error::{Result, TelemdError};

/// NVIDIA GPU reader using NVML
pub struct NvidiaGpuReader {
    #[cfg(feature = "nvml")]
    nvml: Nvml,
}

impl NvidiaGpuReader {
    /// Initialize NVML. Fails when the driver is missing or no device exists.
    pub fn new() -> Result<Self> {
        #[cfg(feature = "nvml")]
        {
            let nvml = Nvml::init()
                .map_err(|e| TelemdError::unsupported(format!("Failed to init NVML: {}", e)))?;

            let count = nvml.device_count().map_err(|e| {
                TelemdError::unsupported(format!("Failed to count NVIDIA devices: {}", e))
            })?;
            if count == 0 {
                return Err(TelemdError::unsupported("no NVIDIA device found"));
            }

            Ok(Self { nvml })
        }
        #[cfg(not(feature = "nvml"))]
        {
            Err(TelemdError::unsupported("NVIDIA GPU support not enabled"))
        }
    }

    #[cfg(feature = "nvml")]
    fn get_device(&self, device: &str) -> Result<Device<'_>> {
        let index: u32 = device
            .parse()
            .map_err(|_| TelemdError::instrument(format!("invalid NVIDIA device '{}'", device)))?;
        self.nvml
            .device_by_index(index)
            .map_err(|e| TelemdError::instrument(format!("GPU {} not found: {}", index, e)))
    }
}

impl GpuReader for NvidiaGpuReader {
    fn utilization(&mut self, device: &str) -> Result<f64> {
        #[cfg(feature = "nvml")]
        {
            let rates = self.get_device(device)?.utilization_rates().map_err(|e| {
                TelemdError::instrument(format!("Failed to get utilization: {}", e))
            })?;
            Ok(rates.gpu as f64)
        }
        #[cfg(not(feature = "nvml"))]
        {
            let _ = device;
            Err(TelemdError::unsupported("NVIDIA GPU support not enabled"))
        }
    }

    fn frequency_mhz(&mut self, device: &str) -> Result<f64> {
        #[cfg(feature = "nvml")]
        {
            let clock = self
                .get_device(device)?
                .clock_info(Clock::Graphics)
                .map_err(|e| {
                    TelemdError::instrument(format!("Failed to get graphics clock: {}", e))
                })?;
            Ok(clock as f64)
        }
        #[cfg(not(feature = "nvml"))]
        {
            let _ = device;
            Err(TelemdError::unsupported("NVIDIA GPU support not enabled"))
        }
    }

    fn devices(&self) -> Vec<String> {
        #[cfg(feature = "nvml")]
        {
            let count = self.nvml.device_count().unwrap_or(0);
            (0..count).map(|i| i.to_string()).collect()
        }
        #[cfg(not(feature = "nvml"))]
        {
            Vec::new()
        }
    }
}
