//! Disk data rate instrument.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::rate::RateTracker;
use super::{Instrument, Value};
use crate::error::{Result, TelemdError};
use crate::platform::procfs::read_diskstats;

/// Bytes read plus written per second, per configured block device.
pub struct DiskDataRateInstrument {
    proc_root: PathBuf,
    devices: Vec<String>,
    rates: RateTracker,
}

impl DiskDataRateInstrument {
    pub fn new(proc_root: &Path, devices: Vec<String>) -> Self {
        Self {
            proc_root: proc_root.to_path_buf(),
            devices,
            rates: RateTracker::default(),
        }
    }
}

impl Instrument for DiskDataRateInstrument {
    fn measure(&self) -> Result<Value> {
        let counters: BTreeMap<String, u64> = read_diskstats(&self.proc_root)?
            .into_iter()
            .filter(|(name, _)| self.devices.contains(name))
            .map(|(name, counters)| (name, counters.total()))
            .collect();

        if counters.is_empty() {
            return Err(TelemdError::instrument(format!(
                "none of the block devices {:?} found",
                self.devices
            )));
        }

        self.rates
            .update(Instant::now(), counters)
            .map(Value::Devices)
            .ok_or_else(|| TelemdError::instrument("disk baseline recorded"))
    }
}
