use parking_lot::Mutex;
use sysinfo::{MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

use super::{Instrument, Value};
use crate::error::Result;

/// Used memory in bytes.
pub struct RamInstrument {
    system: Mutex<System>,
}

impl RamInstrument {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram());

        Self {
            system: Mutex::new(System::new_with_specifics(refresh_kind)),
        }
    }
}

impl Default for RamInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for RamInstrument {
    fn measure(&self) -> Result<Value> {
        let mut system = self.system.lock();
        system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        Ok(Value::Scalar(system.used_memory() as f64))
    }
}

/// Number of running processes.
pub struct ProcsInstrument {
    system: Mutex<System>,
}

impl ProcsInstrument {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcsInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for ProcsInstrument {
    fn measure(&self) -> Result<Value> {
        let mut system = self.system.lock();
        // Only the process list matters, not per-process details
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        // Linux tasks are listed alongside processes
        let count = system
            .processes()
            .values()
            .filter(|process| process.thread_kind().is_none())
            .count();
        Ok(Value::Scalar(count as f64))
    }
}
