//! GPU container toolkit: lets containers see the proprietary driver.
//! Depends on both the GPU driver and the container runtime.

use std::fs;
use std::path::PathBuf;

use super::{ActionContext, Component, Presence};
use crate::error::{HostError, ProbeError};
use crate::host::HostContext;
use crate::probe;
use crate::runner::Runner;
use crate::ui;

const PACKAGE: &str = "nvidia-container-toolkit";

pub struct GpuToolkit {
    daemon_config: PathBuf,
}

impl GpuToolkit {
    pub fn new() -> Self {
        Self {
            daemon_config: PathBuf::from("/etc/docker/daemon.json"),
        }
    }

    #[cfg(test)]
    pub fn with_daemon_config(mut self, path: PathBuf) -> Self {
        self.daemon_config = path;
        self
    }

    fn package_version(&self, runner: &dyn Runner) -> Result<Option<String>, ProbeError> {
        let out = probe::capture(runner, "dpkg-query", &["-W", "-f=${Version}", PACKAGE])?;
        if out.success() {
            let version = out.stdout_str().trim().to_string();
            Ok((!version.is_empty()).then_some(version))
        } else {
            Ok(None)
        }
    }

    /// Whether daemon.json declares the nvidia runtime.
    fn runtime_configured(&self) -> bool {
        fs::read_to_string(&self.daemon_config)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .is_some_and(|json| json.get("runtimes").is_some_and(|r| r.get("nvidia").is_some()))
    }
}

impl Default for GpuToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for GpuToolkit {
    fn name(&self) -> &'static str {
        "gpu-toolkit"
    }

    fn description(&self) -> String {
        format!("GPU container toolkit ({PACKAGE})")
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["gpu", "docker"]
    }

    fn probe(&self, _host: &HostContext, runner: &dyn Runner) -> Result<Presence, ProbeError> {
        let Some(version) = self.package_version(runner)? else {
            return Ok(Presence::Absent);
        };
        if self.runtime_configured() {
            Ok(Presence::Installed {
                version: Some(version),
            })
        } else {
            // Package landed but `nvidia-ctk runtime configure` never ran.
            Ok(Presence::PartiallyInstalled)
        }
    }

    fn install(&self, ctx: &ActionContext) -> Result<(), HostError> {
        ctx.step("apt-get", &["update"])?;
        ctx.step("apt-get", &["install", "-y", PACKAGE])?;
        ctx.step("nvidia-ctk", &["runtime", "configure", "--runtime=docker"])?;
        if ctx.ask("Restart the Docker daemon to pick up the nvidia runtime?")? {
            ctx.step("systemctl", &["restart", "docker"])?;
        } else {
            ui::info("Restart later with: systemctl restart docker");
        }
        Ok(())
    }

    fn uninstall(&self, ctx: &ActionContext, _version: Option<&str>) -> Result<(), HostError> {
        ctx.step("apt-get", &["purge", "-y", PACKAGE])?;
        ctx.step("apt-get", &["autoremove", "-y"])?;
        ui::warn(&format!(
            "{} may still declare the nvidia runtime; edit it if containers fail to start.",
            self.daemon_config.display()
        ));
        Ok(())
    }

    fn rebuild(&self, _ctx: &ActionContext) -> Result<(), HostError> {
        Err(HostError::Unsupported {
            component: "gpu-toolkit",
            operation: "rebuild",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::scripted::StaticConfirm;
    use crate::runner::fake::FakeRunner;
    use tempfile::TempDir;

    const DPKG_QUERY: &str = "dpkg-query -W -f=${Version} nvidia-container-toolkit";

    #[test]
    fn probe_absent_without_package() {
        let dir = TempDir::new().unwrap();
        let toolkit = GpuToolkit::new().with_daemon_config(dir.path().join("daemon.json"));
        let runner = FakeRunner::new().fail(DPKG_QUERY, 1, "no packages found");
        let presence = toolkit.probe(&HostContext::fake(), &runner).unwrap();
        assert_eq!(presence, Presence::Absent);
    }

    #[test]
    fn probe_partial_without_runtime_entry() {
        let dir = TempDir::new().unwrap();
        let daemon = dir.path().join("daemon.json");
        std::fs::write(&daemon, r#"{"log-driver": "json-file"}"#).unwrap();
        let toolkit = GpuToolkit::new().with_daemon_config(daemon);
        let runner = FakeRunner::new().ok(DPKG_QUERY, "1.16.1-1");
        let presence = toolkit.probe(&HostContext::fake(), &runner).unwrap();
        assert_eq!(presence, Presence::PartiallyInstalled);
    }

    #[test]
    fn probe_installed_when_runtime_configured() {
        let dir = TempDir::new().unwrap();
        let daemon = dir.path().join("daemon.json");
        std::fs::write(
            &daemon,
            r#"{"runtimes": {"nvidia": {"path": "nvidia-container-runtime"}}}"#,
        )
        .unwrap();
        let toolkit = GpuToolkit::new().with_daemon_config(daemon);
        let runner = FakeRunner::new().ok(DPKG_QUERY, "1.16.1-1");
        let presence = toolkit.probe(&HostContext::fake(), &runner).unwrap();
        assert_eq!(
            presence,
            Presence::Installed {
                version: Some("1.16.1-1".to_string())
            }
        );
    }

    #[test]
    fn install_configures_runtime() {
        let dir = TempDir::new().unwrap();
        let toolkit = GpuToolkit::new().with_daemon_config(dir.path().join("daemon.json"));
        let host = HostContext::fake();
        let runner = FakeRunner::new();
        let confirm = StaticConfirm::yes();
        let ctx = ActionContext {
            host: &host,
            runner: &runner,
            confirm: &confirm,
            dry_run: false,
        };

        toolkit.install(&ctx).unwrap();
        assert!(runner.called("apt-get install -y nvidia-container-toolkit"));
        assert!(runner.called("nvidia-ctk runtime configure --runtime=docker"));
        assert!(runner.called("systemctl restart docker"));
    }

    #[test]
    fn declares_driver_and_runtime_dependencies() {
        let toolkit = GpuToolkit::new();
        assert_eq!(toolkit.depends_on(), ["gpu", "docker"]);
    }
}
