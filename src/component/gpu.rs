//! Proprietary NVIDIA GPU driver from the non-free component.

use std::path::PathBuf;

use super::{ActionContext, Component, Presence};
use crate::config::GpuConfig;
use crate::error::{HostError, ProbeError};
use crate::gate::Fact;
use crate::host::HostContext;
use crate::probe;
use crate::runner::Runner;
use crate::ui;

const NVIDIA_VENDOR_ID: &str = "10de";

pub struct GpuDriver {
    /// Driver metapackage, e.g. `nvidia-driver`.
    package: String,
    blacklist: PathBuf,
}

impl GpuDriver {
    pub fn new(cfg: &GpuConfig) -> Self {
        Self {
            package: cfg.package.clone(),
            blacklist: PathBuf::from("/etc/modprobe.d/blacklist-nouveau.conf"),
        }
    }

    #[cfg(test)]
    pub fn with_blacklist(mut self, path: PathBuf) -> Self {
        self.blacklist = path;
        self
    }

    fn package_version(&self, runner: &dyn Runner) -> Result<Option<String>, ProbeError> {
        let out = probe::capture(
            runner,
            "dpkg-query",
            &["-W", "-f=${Version}", &self.package],
        )?;
        if out.success() {
            let version = out.stdout_str().trim().to_string();
            Ok((!version.is_empty()).then_some(version))
        } else {
            Ok(None)
        }
    }

    fn module_loaded(&self, runner: &dyn Runner) -> Result<bool, ProbeError> {
        let out = probe::capture_checked(runner, "lsmod", &[])?;
        let stdout = out.stdout_str();
        Ok(stdout
            .lines()
            .any(|line| line.split_whitespace().next() == Some("nvidia")))
    }

    fn hardware_present(&self, runner: &dyn Runner) -> Result<bool, ProbeError> {
        let filter = format!("{NVIDIA_VENDOR_ID}:");
        let out = probe::capture(runner, "lspci", &["-n", "-d", &filter])?;
        Ok(out.success() && !out.stdout_str().trim().is_empty())
    }
}

impl Component for GpuDriver {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn description(&self) -> String {
        format!("proprietary GPU driver ({})", self.package)
    }

    fn required_facts(&self) -> &'static [Fact] {
        &[Fact::DebianFamily, Fact::NonFreeRepo]
    }

    fn probe(&self, _host: &HostContext, runner: &dyn Runner) -> Result<Presence, ProbeError> {
        // nvidia-smi succeeding is the strongest signal: driver loaded and
        // talking to hardware.
        match probe::capture(
            runner,
            "nvidia-smi",
            &["--query-gpu=driver_version", "--format=csv,noheader"],
        ) {
            Ok(out) if out.success() => {
                let stdout = out.stdout_str();
                let version = stdout.lines().next().unwrap_or("").trim().to_string();
                return Ok(Presence::Installed {
                    version: (!version.is_empty()).then_some(version),
                });
            }
            Ok(_) | Err(ProbeError::ToolNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let Some(_version) = self.package_version(runner)? else {
            return Ok(Presence::Absent);
        };

        if self.module_loaded(runner)? {
            return Ok(Presence::InstalledButBroken {
                reason: "driver loaded but nvidia-smi is failing".to_string(),
            });
        }
        if !self.hardware_present(runner)? {
            return Ok(Presence::InstalledButBroken {
                reason: "no NVIDIA device on the PCI bus".to_string(),
            });
        }
        Ok(Presence::InstalledButBroken {
            reason: "kernel module not loaded (reboot pending?)".to_string(),
        })
    }

    fn install(&self, ctx: &ActionContext) -> Result<(), HostError> {
        // nouveau must be out of the way before the proprietary module can
        // bind the device on next boot.
        ctx.write_file(
            &self.blacklist,
            "blacklist nouveau\noptions nouveau modeset=0\n",
        )?;
        ctx.step("update-initramfs", &["-u"])?;

        let headers = format!("linux-headers-{}", ctx.host.kernel_release);
        ctx.step("apt-get", &["update"])?;
        ctx.step(
            "apt-get",
            &["install", "-y", &self.package, "firmware-misc-nonfree", &headers],
        )?;

        ui::warn("A reboot is required before the driver can bind the GPU.");
        if ctx.ask("Reboot now?")? {
            ctx.step("systemctl", &["reboot"])?;
        } else {
            ui::info("Reboot later with: systemctl reboot");
        }
        Ok(())
    }

    fn uninstall(&self, ctx: &ActionContext, _version: Option<&str>) -> Result<(), HostError> {
        ctx.step("apt-get", &["purge", "-y", &self.package, "nvidia-kernel-dkms"])?;
        ctx.step("apt-get", &["autoremove", "-y"])?;
        if ctx.remove_file(&self.blacklist)? {
            ctx.step("update-initramfs", &["-u"])?;
        }
        ui::warn("nouveau takes over after the next reboot.");
        Ok(())
    }

    fn rebuild(&self, ctx: &ActionContext) -> Result<(), HostError> {
        let kernel = &ctx.host.kernel_release;
        let headers = format!("linux-headers-{kernel}");
        ctx.step("apt-get", &["install", "-y", &headers])?;
        ctx.step("dkms", &["autoinstall", "-k", kernel])?;
        ctx.step("modprobe", &["nvidia"])?;
        Ok(())
    }
}
