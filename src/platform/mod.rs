// Platform-specific code module

pub mod cgroup;
pub mod devices;
pub mod gpu;
pub mod procfs;

// Re-exports for cleaner imports
pub use devices::{detect_block_devices, detect_drm_cards, detect_network_devices};
pub use gpu::{get_gpu_reader, GpuReader};

use std::path::PathBuf;

/// Filesystem locations the Linux readers consult. Overridable so the readers
/// can be pointed at a fake tree.
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub proc_root: PathBuf,
    pub cpu_root: PathBuf,
    pub sys_class_net: PathBuf,
    pub sys_block: PathBuf,
    pub sys_class_drm: PathBuf,
    pub cgroup_root: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            cpu_root: PathBuf::from("/sys/devices/system/cpu"),
            sys_class_net: PathBuf::from(devices::SYS_CLASS_NET),
            sys_block: PathBuf::from(devices::SYS_BLOCK),
            sys_class_drm: PathBuf::from(devices::SYS_CLASS_DRM),
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
        }
    }
}

impl HostPaths {
    pub fn with_cgroup_root(mut self, cgroup_root: impl Into<PathBuf>) -> Self {
        self.cgroup_root = cgroup_root.into();
        self
    }
}
