use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("hostctl"))
}

/// Optional user configuration from `~/.config/hostctl/config.toml`.
/// Everything has a default; the file only exists to override vendor
/// package names or to make hostctl non-interactive on managed hosts.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HostctlConfig {
    /// Answer yes to every confirmation (same as passing --yes).
    #[serde(default)]
    pub assume_yes: bool,

    #[serde(default)]
    pub accel: AccelConfig,

    #[serde(default)]
    pub gpu: GpuConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccelConfig {
    /// DKMS package shipping the accelerator driver.
    #[serde(default = "default_accel_package")]
    pub package: String,
    /// Kernel module name.
    #[serde(default = "default_accel_module")]
    pub module: String,
    /// PCI vendor id used for hardware detection.
    #[serde(default = "default_accel_vendor_id")]
    pub vendor_id: String,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            package: default_accel_package(),
            module: default_accel_module(),
            vendor_id: default_accel_vendor_id(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Driver metapackage from the non-free component.
    #[serde(default = "default_gpu_package")]
    pub package: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            package: default_gpu_package(),
        }
    }
}

fn default_accel_package() -> String {
    "accel-pcie-dkms".to_string()
}

fn default_accel_module() -> String {
    "accel_pcie".to_string()
}

fn default_accel_vendor_id() -> String {
    "1eab".to_string()
}

fn default_gpu_package() -> String {
    "nvidia-driver".to_string()
}

impl HostctlConfig {
    /// Load config.toml, falling back to defaults when the file is absent.
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid format in {}", path.display()))
    }
}
