use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{Instrument, Value};
use crate::error::{Result, TelemdError};
use crate::platform::cgroup::{
    list_docker_containers, read_blkio_bytes, read_cpu_usage_usec, read_network_bytes,
    CgroupLayout, Controller,
};
use crate::platform::HostPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupMetric {
    /// Cumulative CPU time in microseconds
    Cpu,
    /// Cumulative bytes read plus written
    Blkio,
    /// Cumulative bytes received plus transmitted
    Network,
}

/// Per-container cgroup counter, keyed by short container id.
pub struct CgroupInstrument {
    metric: CgroupMetric,
    cgroup_root: PathBuf,
    proc_root: PathBuf,
}

impl CgroupInstrument {
    pub fn new(metric: CgroupMetric, paths: &HostPaths) -> Self {
        Self {
            metric,
            cgroup_root: paths.cgroup_root.clone(),
            proc_root: paths.proc_root.clone(),
        }
    }

    fn controller(&self) -> Controller {
        match self.metric {
            CgroupMetric::Blkio => Controller::Blkio,
            CgroupMetric::Cpu | CgroupMetric::Network => Controller::CpuAcct,
        }
    }
}

impl Instrument for CgroupInstrument {
    fn measure(&self) -> Result<Value> {
        let layout = CgroupLayout::detect(&self.cgroup_root);
        let containers = list_docker_containers(&self.cgroup_root, layout, self.controller());

        let mut values = BTreeMap::new();
        for (id, dir) in containers {
            let reading = match self.metric {
                CgroupMetric::Cpu => read_cpu_usage_usec(&dir, layout),
                CgroupMetric::Blkio => read_blkio_bytes(&dir, layout),
                CgroupMetric::Network => read_network_bytes(&dir, &self.proc_root),
            };
            match reading {
                Ok(value) => {
                    values.insert(id, value as f64);
                }
                // containers can disappear between listing and reading
                Err(e) => log::debug!("cgroup {:?} read failed for {}: {}", self.metric, id, e),
            }
        }

        if values.is_empty() {
            return Err(TelemdError::instrument(format!(
                "no containers under {}",
                self.cgroup_root.display()
            )));
        }
        Ok(Value::Devices(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cgroup_cpu_v2() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("cgroup.controllers"), "cpu io").unwrap();
        let scope = root
            .path()
            .join("system.slice")
            .join("docker-0123456789abcdef0123.scope");
        fs::create_dir_all(&scope).unwrap();
        fs::write(scope.join("cpu.stat"), "usage_usec 777\nuser_usec 700\n").unwrap();

        let paths = HostPaths::default().with_cgroup_root(root.path());
        let instrument = CgroupInstrument::new(CgroupMetric::Cpu, &paths);

        assert_eq!(
            instrument.measure().unwrap(),
            Value::Devices(BTreeMap::from([("0123456789ab".to_string(), 777.0)]))
        );
    }

    #[test]
    fn test_no_containers() {
        let root = tempfile::tempdir().unwrap();
        let paths = HostPaths::default().with_cgroup_root(root.path());

        assert!(CgroupInstrument::new(CgroupMetric::Blkio, &paths)
            .measure()
            .is_err());
    }
}
