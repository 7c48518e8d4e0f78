//! Docker container runtime: vendor apt repository, engine packages,
//! daemon configuration, non-root access.

use std::path::PathBuf;

use super::{ActionContext, Component, Presence};
use crate::error::{HostError, ProbeError};
use crate::host::HostContext;
use crate::probe;
use crate::runner::Runner;
use crate::ui;

const GPG_URL: &str = "https://download.docker.com/linux/debian/gpg";
const ENGINE_PACKAGES: [&str; 5] = [
    "docker-ce",
    "docker-ce-cli",
    "containerd.io",
    "docker-buildx-plugin",
    "docker-compose-plugin",
];

pub struct ContainerRuntime {
    keyring: PathBuf,
    sources_list: PathBuf,
    daemon_config: PathBuf,
}

impl ContainerRuntime {
    pub fn new() -> Self {
        Self {
            keyring: PathBuf::from("/etc/apt/keyrings/docker.asc"),
            sources_list: PathBuf::from("/etc/apt/sources.list.d/docker.list"),
            daemon_config: PathBuf::from("/etc/docker/daemon.json"),
        }
    }

    #[cfg(test)]
    pub fn with_paths(keyring: PathBuf, sources_list: PathBuf, daemon_config: PathBuf) -> Self {
        Self {
            keyring,
            sources_list,
            daemon_config,
        }
    }

    fn package_version(&self, runner: &dyn Runner) -> Result<Option<String>, ProbeError> {
        let out = probe::capture(runner, "dpkg-query", &["-W", "-f=${Version}", "docker-ce"])?;
        if out.success() {
            let version = out.stdout_str().trim().to_string();
            Ok((!version.is_empty()).then_some(version))
        } else {
            Ok(None)
        }
    }

    fn dpkg_architecture(&self, runner: &dyn Runner) -> String {
        match probe::capture(runner, "dpkg", &["--print-architecture"]) {
            Ok(out) if out.success() => {
                let arch = out.stdout_str().trim().to_string();
                if arch.is_empty() { "amd64".to_string() } else { arch }
            }
            _ => "amd64".to_string(),
        }
    }
}

impl Default for ContainerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for ContainerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn description(&self) -> String {
        "Docker container runtime".to_string()
    }

    fn probe(&self, _host: &HostContext, runner: &dyn Runner) -> Result<Presence, ProbeError> {
        match probe::capture(
            runner,
            "docker",
            &["version", "--format", "{{.Server.Version}}"],
        ) {
            Ok(out) if out.success() => {
                let stdout = out.stdout_str();
                let version = stdout.trim().to_string();
                Ok(Presence::Installed {
                    version: (!version.is_empty()).then_some(version),
                })
            }
            // CLI present, daemon not answering.
            Ok(_) => Ok(Presence::InstalledButBroken {
                reason: "daemon not reachable".to_string(),
            }),
            Err(ProbeError::ToolNotFound { .. }) => {
                // Engine package without the CLI on PATH is a half-finished
                // install.
                if self.package_version(runner)?.is_some() {
                    Ok(Presence::PartiallyInstalled)
                } else {
                    Ok(Presence::Absent)
                }
            }
            Err(e) => Err(e),
        }
    }

    fn install(&self, ctx: &ActionContext) -> Result<(), HostError> {
        let keyring_dir = self
            .keyring
            .parent()
            .map_or_else(|| "/etc/apt/keyrings".to_string(), |p| p.display().to_string());
        ctx.step("install", &["-m", "0755", "-d", &keyring_dir])?;
        ctx.step(
            "curl",
            &["-fsSL", GPG_URL, "-o", &self.keyring.display().to_string()],
        )?;

        let arch = self.dpkg_architecture(ctx.runner);
        let codename = if ctx.host.codename.is_empty() {
            "stable".to_string()
        } else {
            ctx.host.codename.clone()
        };
        ctx.write_file(
            &self.sources_list,
            &format!(
                "deb [arch={arch} signed-by={}] https://download.docker.com/linux/debian {codename} stable\n",
                self.keyring.display()
            ),
        )?;

        ctx.step("apt-get", &["update"])?;
        let mut install_args = vec!["install", "-y"];
        install_args.extend_from_slice(&ENGINE_PACKAGES);
        ctx.step("apt-get", &install_args)?;

        if !self.daemon_config.exists() {
            let defaults = serde_json::json!({
                "log-driver": "json-file",
                "log-opts": { "max-size": "100m", "max-file": "3" }
            });
            ctx.write_file(
                &self.daemon_config,
                &format!("{:#}\n", defaults),
            )?;
        }

        ctx.step("systemctl", &["enable", "docker"])?;
        if ctx.ask("Restart the Docker daemon now?")? {
            ctx.step("systemctl", &["restart", "docker"])?;
        } else {
            ui::info("Restart later with: systemctl restart docker");
        }
        Ok(())
    }

    fn uninstall(&self, ctx: &ActionContext, _version: Option<&str>) -> Result<(), HostError> {
        // Stopping a daemon that is not running exits non-zero; that is fine.
        let _ = ctx.try_step("systemctl", &["stop", "docker"])?;

        let mut purge_args = vec!["purge", "-y"];
        purge_args.extend_from_slice(&ENGINE_PACKAGES);
        ctx.step("apt-get", &purge_args)?;
        ctx.step("apt-get", &["autoremove", "-y"])?;

        ctx.remove_file(&self.sources_list)?;
        ctx.remove_file(&self.keyring)?;
        ui::warn("/var/lib/docker was left in place; remove it manually to delete images and volumes.");
        Ok(())
    }

    fn rebuild(&self, _ctx: &ActionContext) -> Result<(), HostError> {
        Err(HostError::Unsupported {
            component: "docker",
            operation: "rebuild",
        })
    }

    fn setup_non_root(&self, ctx: &ActionContext, user: &str) -> Result<(), HostError> {
        let group = probe::capture(ctx.runner, "getent", &["group", "docker"])
            .map_err(HostError::Probe)?;
        if !group.success() {
            ctx.step("groupadd", &["docker"])?;
        }
        ctx.step("usermod", &["-aG", "docker", user])?;
        ui::info(&format!(
            "{user} must log out and back in for the group change to apply."
        ));
        Ok(())
    }
}
