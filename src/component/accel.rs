//! PCIe machine-learning accelerator driver (DKMS module + udev rule).

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use super::{ActionContext, Component, Presence};
use crate::config::AccelConfig;
use crate::error::{HostError, ProbeError};
use crate::host::HostContext;
use crate::probe;
use crate::runner::Runner;

/// One line of `dkms status`: `name/version, kernel, arch: state`.
static DKMS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[\w.+-]+)/(?P<version>[^,:]+),\s*(?P<kernel>[^,:]+),\s*[^:]+:\s*(?P<state>\w+)")
        .expect("invalid dkms status regex")
});

pub struct AccelDriver {
    /// Vendor DKMS package, e.g. `accel-pcie-dkms`.
    package: String,
    /// Kernel module name, e.g. `accel_pcie`.
    module: String,
    /// PCI vendor id for hardware detection.
    vendor_id: String,
    udev_rule: PathBuf,
}

impl AccelDriver {
    pub fn new(cfg: &AccelConfig) -> Self {
        Self {
            package: cfg.package.clone(),
            module: cfg.module.clone(),
            vendor_id: cfg.vendor_id.clone(),
            udev_rule: PathBuf::from("/etc/udev/rules.d/99-accel.rules"),
        }
    }

    #[cfg(test)]
    pub fn with_udev_rule(mut self, path: PathBuf) -> Self {
        self.udev_rule = path;
        self
    }

    /// DKMS source tree name, by convention the package minus its `-dkms`
    /// suffix.
    fn dkms_name(&self) -> &str {
        self.package.strip_suffix("-dkms").unwrap_or(&self.package)
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

    /// Version of the DKMS tree plus whether it is installed for `kernel`.
    fn dkms_state(
        &self,
        runner: &dyn Runner,
        kernel: &str,
    ) -> Result<(Option<String>, bool), ProbeError> {
        let out = probe::capture(runner, "dkms", &["status", self.dkms_name()])?;
        if !out.success() {
            return Ok((None, false));
        }
        let stdout = out.stdout_str();
        let mut version = None;
        let mut built = false;
        for line in stdout.lines() {
            let Some(caps) = DKMS_LINE.captures(line.trim()) else {
                continue;
            };
            if &caps["name"] != self.dkms_name() {
                continue;
            }
            version.get_or_insert_with(|| caps["version"].trim().to_string());
            if caps["kernel"].trim() == kernel && &caps["state"] == "installed" {
                built = true;
            }
        }
        Ok((version, built))
    }

    fn module_loaded(&self, runner: &dyn Runner) -> Result<bool, ProbeError> {
        let out = probe::capture_checked(runner, "lsmod", &[])?;
        let stdout = out.stdout_str();
        Ok(stdout
            .lines()
            .any(|line| line.split_whitespace().next() == Some(self.module.as_str())))
    }

    fn hardware_present(&self, runner: &dyn Runner) -> Result<bool, ProbeError> {
        let filter = format!("{}:", self.vendor_id);
        let out = probe::capture(runner, "lspci", &["-n", "-d", &filter])?;
        Ok(out.success() && !out.stdout_str().trim().is_empty())
    }
}

impl Component for AccelDriver {
    fn name(&self) -> &'static str {
        "accel"
    }

    fn description(&self) -> String {
        format!("PCIe accelerator driver ({})", self.package)
    }

    fn probe(&self, host: &HostContext, runner: &dyn Runner) -> Result<Presence, ProbeError> {
        let version = self.package_version(runner)?;
        let loaded = self.module_loaded(runner)?;

        let Some(version) = version else {
            // A loaded module without the package is a leftover of a manual
            // install; treat it as partial so reinstall converges it.
            return Ok(if loaded {
                Presence::PartiallyInstalled
            } else {
                Presence::Absent
            });
        };

        let (_, built) = self.dkms_state(runner, &host.kernel_release)?;
        if !built {
            return Ok(Presence::PartiallyInstalled);
        }
        if !self.hardware_present(runner)? {
            return Ok(Presence::InstalledButBroken {
                reason: format!("no device with vendor id {} on the PCI bus", self.vendor_id),
            });
        }
        if !loaded {
            return Ok(Presence::InstalledButBroken {
                reason: format!("kernel module {} not loaded", self.module),
            });
        }
        Ok(Presence::Installed {
            version: Some(version),
        })
    }

    fn install(&self, ctx: &ActionContext) -> Result<(), HostError> {
        let headers = format!("linux-headers-{}", ctx.host.kernel_release);
        ctx.step("apt-get", &["update"])?;
        ctx.step("apt-get", &["install", "-y", "dkms", &headers])?;
        ctx.step("apt-get", &["install", "-y", &self.package])?;

        ctx.write_file(
            &self.udev_rule,
            "# Grant users access to the accelerator character devices.\n\
             KERNEL==\"accel[0-9]*\", MODE=\"0666\"\n",
        )?;
        ctx.step("udevadm", &["control", "--reload-rules"])?;
        ctx.step("udevadm", &["trigger"])?;
        ctx.step("modprobe", &[self.module.as_str()])?;
        Ok(())
    }

    fn uninstall(&self, ctx: &ActionContext, version: Option<&str>) -> Result<(), HostError> {
        if self.module_loaded(ctx.runner)? {
            let out = ctx.try_step("modprobe", &["-r", &self.module])?;
            if !out.success() {
                let stderr = out.stderr_str();
                if stderr.contains("in use") || stderr.contains("busy") {
                    return Err(HostError::ResourceBusy {
                        what: format!("kernel module {}", self.module),
                        detail: crate::error::stderr_tail(&stderr),
                    });
                }
                return Err(HostError::command_failed(
                    format!("modprobe -r {}", self.module),
                    &out,
                ));
            }
        }

        // Prefer the version pinned on the CLI, then whatever DKMS reports.
        let dkms_version = match version {
            Some(v) => Some(v.to_string()),
            None => self.dkms_state(ctx.runner, &ctx.host.kernel_release)?.0,
        };
        if let Some(v) = dkms_version {
            let tree = format!("{}/{}", self.dkms_name(), v);
            ctx.step("dkms", &["remove", &tree, "--all"])?;
        }

        ctx.step("apt-get", &["purge", "-y", &self.package])?;
        ctx.step("apt-get", &["autoremove", "-y"])?;
        if ctx.remove_file(&self.udev_rule)? {
            ctx.step("udevadm", &["control", "--reload-rules"])?;
        }
        Ok(())
    }

    fn rebuild(&self, ctx: &ActionContext) -> Result<(), HostError> {
        let kernel = &ctx.host.kernel_release;
        let version = match self.package_version(ctx.runner)? {
            Some(v) => v,
            None => self
                .dkms_state(ctx.runner, kernel)?
                .0
                .ok_or_else(|| {
                    HostError::MissingPrecondition(format!(
                        "{} is not installed, nothing to rebuild",
                        self.package
                    ))
                })?,
        };

        let headers = format!("linux-headers-{kernel}");
        ctx.step("apt-get", &["install", "-y", &headers])?;
        ctx.step(
            "dkms",
            &["build", "-m", self.dkms_name(), "-v", &version, "-k", kernel],
        )?;
        ctx.step(
            "dkms",
            &[
                "install", "-m", self.dkms_name(), "-v", &version, "-k", kernel, "--force",
            ],
        )?;
        ctx.step("modprobe", &[self.module.as_str()])?;
        Ok(())
    }
}
