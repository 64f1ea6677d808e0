//! Parsers for the `/proc` and `/sys` files the instruments read.
//!
//! Every parser is a pure function over the file contents so it can be
//! exercised without a live kernel.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, TelemdError};

/// Bytes per sector as reported in `/proc/diskstats` (always 512, regardless
/// of the device's physical sector size).
pub const DISKSTATS_SECTOR_SIZE: u64 = 512;

/// Cumulative transfer counters for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounters {
    pub read: u64,
    pub written: u64,
}

impl IoCounters {
    pub fn total(&self) -> u64 {
        self.read.saturating_add(self.written)
    }
}

/// Parse `/proc/net/dev` into per-interface received/transmitted byte counters.
pub fn parse_net_dev(contents: &str) -> BTreeMap<String, IoCounters> {
    let mut interfaces = BTreeMap::new();

    // First two lines are headers
    for line in contents.lines().skip(2) {
        let Some((name, stats)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<u64> = stats
            .split_whitespace()
            .filter_map(|f| f.parse().ok())
            .collect();
        // rx: bytes packets errs drop fifo frame compressed multicast, tx: bytes ...
        if fields.len() < 9 {
            continue;
        }
        interfaces.insert(
            name.trim().to_string(),
            IoCounters {
                read: fields[0],
                written: fields[8],
            },
        );
    }

    interfaces
}

/// Parse `/proc/diskstats` into per-device read/written byte counters.
pub fn parse_diskstats(contents: &str) -> BTreeMap<String, IoCounters> {
    let mut devices = BTreeMap::new();

    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // major minor name reads merged sectors_read ms writes merged sectors_written ...
        if fields.len() < 10 {
            continue;
        }
        let (Ok(sectors_read), Ok(sectors_written)) =
            (fields[5].parse::<u64>(), fields[9].parse::<u64>())
        else {
            continue;
        };
        devices.insert(
            fields[2].to_string(),
            IoCounters {
                read: sectors_read * DISKSTATS_SECTOR_SIZE,
                written: sectors_written * DISKSTATS_SECTOR_SIZE,
            },
        );
    }

    devices
}

/// Parse a cpufreq `scaling_cur_freq` value (kHz) into MHz.
pub fn parse_scaling_cur_freq(contents: &str) -> Result<f64> {
    let khz: u64 = contents
        .trim()
        .parse()
        .map_err(|_| TelemdError::parse(format!("invalid cpufreq value '{}'", contents.trim())))?;
    Ok(khz as f64 / 1000.0)
}

pub fn read_net_dev(proc_root: &Path) -> Result<BTreeMap<String, IoCounters>> {
    let contents = fs::read_to_string(proc_root.join("net").join("dev"))?;
    Ok(parse_net_dev(&contents))
}

pub fn read_diskstats(proc_root: &Path) -> Result<BTreeMap<String, IoCounters>> {
    let contents = fs::read_to_string(proc_root.join("diskstats"))?;
    Ok(parse_diskstats(&contents))
}

/// Mean current frequency in MHz over every CPU exposing cpufreq.
pub fn read_mean_cpu_frequency(cpu_root: &Path) -> Result<f64> {
    let mut total = 0.0;
    let mut count = 0usize;

    for entry in fs::read_dir(cpu_root)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(index) = name.strip_prefix("cpu") else {
            continue;
        };
        if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let path = entry.path().join("cpufreq").join("scaling_cur_freq");
        if let Ok(contents) = fs::read_to_string(&path) {
            total += parse_scaling_cur_freq(&contents)?;
            count += 1;
        }
    }

    if count == 0 {
        return Err(TelemdError::unsupported(format!(
            "no cpufreq information under {}",
            cpu_root.display()
        )));
    }
    Ok(total / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     100    0    0    0     0          0         0   123456     100    0    0    0     0       0          0
  eth0: 9876543    5000    0    0    0     0          0        10  1234567    4000    0    0    0     0       0          0
";

    const DISKSTATS: &str = "\
   8       0 sda 1000 10 2048 500 800 20 4096 900 0 1200 1400 0 0 0 0
   8       1 sda1 900 5 1024 400 700 10 2048 800 0 1100 1200 0 0 0 0
   7       0 loop0 bogus
";

    #[test]
    fn test_parse_net_dev() {
        let interfaces = parse_net_dev(NET_DEV);

        assert_eq!(interfaces.len(), 2);
        assert_eq!(
            interfaces["eth0"],
            IoCounters {
                read: 9876543,
                written: 1234567
            }
        );
        assert_eq!(interfaces["lo"].total(), 246912);
    }

    #[test]
    fn test_parse_diskstats() {
        let devices = parse_diskstats(DISKSTATS);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices["sda"].read, 2048 * 512);
        assert_eq!(devices["sda"].written, 4096 * 512);
        assert!(!devices.contains_key("loop0"));
    }

    #[test]
    fn test_parse_scaling_cur_freq() {
        assert_eq!(parse_scaling_cur_freq("1500000\n").unwrap(), 1500.0);
        assert!(parse_scaling_cur_freq("n/a").is_err());
    }

    #[test]
    fn test_read_mean_cpu_frequency() {
        let dir = tempfile::tempdir().unwrap();
        for (cpu, khz) in [("cpu0", "1000000"), ("cpu1", "2000000")] {
            let freq_dir = dir.path().join(cpu).join("cpufreq");
            fs::create_dir_all(&freq_dir).unwrap();
            fs::write(freq_dir.join("scaling_cur_freq"), khz).unwrap();
        }
        fs::create_dir_all(dir.path().join("cpufreq")).unwrap();

        assert_eq!(read_mean_cpu_frequency(dir.path()).unwrap(), 1500.0);
    }

    #[test]
    fn test_read_mean_cpu_frequency_without_cpufreq() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_mean_cpu_frequency(dir.path()).is_err());
    }
}
