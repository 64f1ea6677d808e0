use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::{Instrument, Value};
use crate::error::{Result, TelemdError};
use crate::platform::GpuReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuMetric {
    /// Graphics clock in MHz
    Frequency,
    /// Utilisation in percent
    Utilization,
}

/// Per-device GPU reading.
pub struct GpuInstrument {
    metric: GpuMetric,
    reader: Option<Mutex<Box<dyn GpuReader>>>,
    devices: Vec<String>,
}

impl GpuInstrument {
    pub fn new(metric: GpuMetric, reader: Box<dyn GpuReader>, devices: Vec<String>) -> Self {
        Self {
            metric,
            reader: Some(Mutex::new(reader)),
            devices,
        }
    }

    /// An instrument for a host without a usable GPU; every measurement fails.
    pub fn unavailable(metric: GpuMetric) -> Self {
        Self {
            metric,
            reader: None,
            devices: Vec::new(),
        }
    }
}

impl Instrument for GpuInstrument {
    fn measure(&self) -> Result<Value> {
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| TelemdError::unsupported("no GPU available"))?;
        let mut reader = reader.lock();

        let mut values = BTreeMap::new();
        for device in &self.devices {
            let reading = match self.metric {
                GpuMetric::Frequency => reader.frequency_mhz(device),
                GpuMetric::Utilization => reader.utilization(device),
            };
            match reading {
                Ok(value) => {
                    values.insert(device.clone(), value);
                }
                Err(e) => log::debug!("GPU {} {:?} read failed: {}", device, self.metric, e),
            }
        }

        if values.is_empty() {
            return Err(TelemdError::instrument(format!(
                "no GPU {:?} reading for devices {:?}",
                self.metric, self.devices
            )));
        }
        Ok(Value::Devices(values))
    }
}
