//! Docker container discovery and counter reading over the cgroup filesystem.
//!
//! Both hierarchies are supported:
//!
//! - cgroup v2 (unified): `<root>/system.slice/docker-<id>.scope` or `<root>/docker/<id>`
//! - cgroup v1: `<root>/<controller>/docker/<id>` or
//!   `<root>/<controller>/system.slice/docker-<id>.scope`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::procfs::parse_net_dev;
use crate::error::{Result, TelemdError};

const SHORT_ID_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupLayout {
    V1,
    V2,
}

impl CgroupLayout {
    pub fn detect(root: &Path) -> Self {
        if root.join("cgroup.controllers").exists() {
            CgroupLayout::V2
        } else {
            CgroupLayout::V1
        }
    }
}

/// Controller a v1 lookup descends into. Ignored on v2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    CpuAcct,
    Blkio,
}

impl Controller {
    fn dir_name(self) -> &'static str {
        match self {
            Controller::CpuAcct => "cpuacct",
            Controller::Blkio => "blkio",
        }
    }
}

/// Map of short container id to the container's cgroup directory.
pub fn list_docker_containers(
    root: &Path,
    layout: CgroupLayout,
    controller: Controller,
) -> BTreeMap<String, PathBuf> {
    let base = match layout {
        CgroupLayout::V2 => root.to_path_buf(),
        CgroupLayout::V1 => root.join(controller.dir_name()),
    };

    let mut containers = BTreeMap::new();

    // cgroupfs driver
    for (name, path) in list_dirs(&base.join("docker")) {
        if is_container_id(&name) {
            containers.insert(short_id(&name), path);
        }
    }

    // systemd driver
    for (name, path) in list_dirs(&base.join("system.slice")) {
        if let Some(id) = name
            .strip_prefix("docker-")
            .and_then(|n| n.strip_suffix(".scope"))
        {
            if is_container_id(id) {
                containers.insert(short_id(id), path);
            }
        }
    }

    containers
}

/// Cumulative CPU time of a cgroup in microseconds.
pub fn read_cpu_usage_usec(dir: &Path, layout: CgroupLayout) -> Result<u64> {
    match layout {
        CgroupLayout::V2 => parse_cpu_stat_usage(&fs::read_to_string(dir.join("cpu.stat"))?),
        CgroupLayout::V1 => {
            let contents = fs::read_to_string(dir.join("cpuacct.usage"))?;
            let nanos: u64 = contents
                .trim()
                .parse()
                .map_err(|_| TelemdError::parse("invalid cpuacct.usage"))?;
            Ok(nanos / 1000)
        }
    }
}

/// Cumulative bytes read plus written by a cgroup across all block devices.
pub fn read_blkio_bytes(dir: &Path, layout: CgroupLayout) -> Result<u64> {
    match layout {
        CgroupLayout::V2 => Ok(parse_io_stat(&fs::read_to_string(dir.join("io.stat"))?)),
        CgroupLayout::V1 => Ok(parse_blkio_service_bytes(&fs::read_to_string(
            dir.join("blkio.throttle.io_service_bytes"),
        )?)),
    }
}

/// Received plus transmitted bytes in the network namespace of the cgroup's
/// first process, loopback excluded.
pub fn read_network_bytes(dir: &Path, proc_root: &Path) -> Result<u64> {
    let procs = fs::read_to_string(dir.join("cgroup.procs"))?;
    let pid = procs
        .lines()
        .find_map(|l| l.trim().parse::<u32>().ok())
        .ok_or_else(|| TelemdError::instrument(format!("no process in {}", dir.display())))?;

    let contents = fs::read_to_string(proc_root.join(pid.to_string()).join("net").join("dev"))?;
    Ok(parse_net_dev(&contents)
        .iter()
        .filter(|(name, _)| name.as_str() != "lo")
        .map(|(_, counters)| counters.total())
        .sum())
}

/// Extract `usage_usec` from a v2 `cpu.stat` file.
pub fn parse_cpu_stat_usage(contents: &str) -> Result<u64> {
    contents
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(' ')?;
            (key == "usage_usec").then(|| value.trim().parse().ok())?
        })
        .ok_or_else(|| TelemdError::parse("usage_usec missing from cpu.stat"))
}

/// Sum `rbytes` and `wbytes` over every device line of a v2 `io.stat` file.
pub fn parse_io_stat(contents: &str) -> u64 {
    contents
        .lines()
        .flat_map(|line| line.split_whitespace().skip(1))
        .filter_map(|field| {
            let (key, value) = field.split_once('=')?;
            matches!(key, "rbytes" | "wbytes").then(|| value.parse::<u64>().ok())?
        })
        .sum()
}

/// Sum the `Read` and `Write` rows of a v1 `blkio.throttle.io_service_bytes` file.
pub fn parse_blkio_service_bytes(contents: &str) -> u64 {
    contents
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [_, "Read", value] | [_, "Write", value] => value.parse::<u64>().ok(),
                _ => None,
            }
        })
        .sum()
}

fn list_dirs(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
        .collect()
}

fn is_container_id(name: &str) -> bool {
    name.len() >= SHORT_ID_LEN && name.chars().all(|c| c.is_ascii_hexdigit())
}

fn short_id(id: &str) -> String {
    id[..SHORT_ID_LEN].to_string()
}
