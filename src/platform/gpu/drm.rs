use std::fs;
use std::path::{Path, PathBuf};

use super::GpuReader;
use crate::error::{Result, TelemdError};
use crate::platform::devices::detect_drm_cards;

/// GPU reader over `/sys/class/drm/card<N>`.
pub struct DrmGpuReader {
    root: PathBuf,
}

impl DrmGpuReader {
    pub fn new(sys_class_drm: &Path) -> Self {
        Self {
            root: sys_class_drm.to_path_buf(),
        }
    }

    fn card(&self, device: &str) -> PathBuf {
        self.root.join(format!("card{}", device))
    }
}

impl GpuReader for DrmGpuReader {
    fn utilization(&mut self, device: &str) -> Result<f64> {
        let path = self.card(device).join("device").join("gpu_busy_percent");
        let contents = fs::read_to_string(&path)?;
        contents
            .trim()
            .parse()
            .map_err(|_| TelemdError::parse(format!("invalid value in {}", path.display())))
    }

    fn frequency_mhz(&mut self, device: &str) -> Result<f64> {
        let card = self.card(device);

        // i915
        if let Ok(contents) = fs::read_to_string(card.join("gt_cur_freq_mhz")) {
            return contents
                .trim()
                .parse()
                .map_err(|_| TelemdError::parse("invalid gt_cur_freq_mhz"));
        }

        // amdgpu
        let contents = fs::read_to_string(card.join("device").join("pp_dpm_sclk"))?;
        parse_pp_dpm_sclk(&contents)
    }

    fn devices(&self) -> Vec<String> {
        detect_drm_cards(&self.root)
    }
}

/// Active shader clock from an amdgpu `pp_dpm_sclk` table (the row marked `*`).
pub fn parse_pp_dpm_sclk(contents: &str) -> Result<f64> {
    let active = contents
        .lines()
        .find(|line| line.trim_end().ends_with('*'))
        .ok_or_else(|| TelemdError::parse("no active level in pp_dpm_sclk"))?;

    let (_, level) = active
        .split_once(':')
        .ok_or_else(|| TelemdError::parse("malformed pp_dpm_sclk row"))?;
    let mhz = level
        .trim()
        .trim_end_matches('*')
        .trim()
        .to_ascii_lowercase();

    mhz.trim_end_matches("mhz")
        .parse()
        .map_err(|_| TelemdError::parse(format!("invalid clock '{}'", level.trim())))
}
