//! Device auto-detection used when the configuration leaves a device list empty.

use std::fs;
use std::path::Path;

pub const SYS_CLASS_NET: &str = "/sys/class/net";
pub const SYS_BLOCK: &str = "/sys/block";
pub const SYS_CLASS_DRM: &str = "/sys/class/drm";

/// Network interfaces except loopback.
pub fn detect_network_devices(sys_class_net: &Path) -> Vec<String> {
    list_names(sys_class_net)
        .into_iter()
        .filter(|name| name != "lo")
        .collect()
}

/// Physical block devices, skipping loop, ram and device-mapper nodes.
pub fn detect_block_devices(sys_block: &Path) -> Vec<String> {
    const VIRTUAL_PREFIXES: [&str; 5] = ["loop", "ram", "dm-", "zram", "sr"];

    list_names(sys_block)
        .into_iter()
        .filter(|name| !VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p)))
        .collect()
}

/// DRM card indices (`card0`, `card1`, ...), without connector entries such
/// as `card0-HDMI-A-1`.
pub fn detect_drm_cards(sys_class_drm: &Path) -> Vec<String> {
    list_names(sys_class_drm)
        .into_iter()
        .filter_map(|name| {
            let index = name.strip_prefix("card")?;
            (!index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
                .then(|| index.to_string())
        })
        .collect()
}

fn list_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        log::debug!("cannot list {}", dir.display());
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
