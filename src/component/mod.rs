//! Component trait and lifecycle types.
//!
//! Every manageable host component (accelerator driver, GPU driver,
//! container runtime, GPU container toolkit) implements [`Component`]:
//! - a side-effect-free probe deriving [`Presence`] from external tools
//! - mutating lifecycle actions (install/uninstall/rebuild) that run ordered
//!   external commands with first-failure-aborts semantics
//! - declared dependencies and precondition facts

use std::fmt;
use std::fs;
use std::path::Path;

use crate::confirm::Confirm;
use crate::error::{HostError, ProbeError};
use crate::gate::Fact;
use crate::host::HostContext;
use crate::runner::{CommandOutput, Runner, render};
use crate::ui;

/// Installed-ness of a component, derived fresh on every probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// Nothing of the component is on the host.
    Absent,
    /// Some pieces are present but the installation never completed
    /// (e.g. package installed, no DKMS build for the running kernel).
    PartiallyInstalled,
    /// Fully installed and functional.
    Installed { version: Option<String> },
    /// Installed but not working, with the probed reason
    /// (e.g. hardware missing, kernel module not loaded, daemon down).
    InstalledButBroken { reason: String },
}

impl Presence {
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

/// Lifecycle action on a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Uninstall,
    Reinstall,
    Rebuild,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Uninstall => write!(f, "uninstall"),
            Self::Reinstall => write!(f, "reinstall"),
            Self::Rebuild => write!(f, "rebuild"),
        }
    }
}

/// Outcome of one action invocation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct ActionResult {
    pub component: String,
    pub action: Action,
    pub outcome: Outcome,
}

/// Context passed to mutating actions. Probes deliberately get only the
/// host facts and the runner; side effects belong to actions.
pub struct ActionContext<'a> {
    pub host: &'a HostContext,
    pub runner: &'a dyn Runner,
    pub confirm: &'a dyn Confirm,
    pub dry_run: bool,
}

impl ActionContext<'_> {
    /// Run one external step; any non-zero exit aborts the whole action.
    pub fn step(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        let output = self.try_step(cmd, args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(HostError::command_failed(render(cmd, args), &output))
        }
    }

    /// Run one external step but let the caller interpret the exit code
    /// (needed for `modprobe -r` busy detection and best-effort stops).
    pub fn try_step(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        let line = render(cmd, args);
        ui::command(&line);
        if self.dry_run {
            return Ok(CommandOutput {
                stdout: Vec::new(),
                stderr: Vec::new(),
                code: Some(0),
            });
        }
        self.runner.output(cmd, args).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HostError::ToolNotFound {
                    tool: cmd.to_string(),
                }
            } else {
                HostError::Io(e)
            }
        })
    }

    /// Write a file the component owns (udev rule, blacklist, daemon.json).
    pub fn write_file(&self, path: &Path, contents: &str) -> Result<(), HostError> {
        ui::command(&format!("write {}", path.display()));
        if self.dry_run {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// Remove a file the component owns. Returns whether it existed.
    pub fn remove_file(&self, path: &Path) -> Result<bool, HostError> {
        ui::command(&format!("rm -f {}", path.display()));
        if self.dry_run {
            return Ok(false);
        }
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HostError::Io(e)),
        }
    }

    /// Ask the user about an optional in-action step. Safe default is no.
    pub fn ask(&self, prompt: &str) -> Result<bool, HostError> {
        if self.dry_run {
            return Ok(false);
        }
        self.confirm.confirm(prompt)
    }
}

/// A manageable host component. Implementations are immutable and built
/// once at process start by the registry.
pub trait Component {
    /// Short identifier used on the CLI (`accel`, `gpu`, `docker`, ...).
    fn name(&self) -> &'static str;

    /// One-line human description for the status report.
    fn description(&self) -> String;

    /// Names of components that must be installed before this one.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// Facts the precondition gate verifies before mutating actions.
    fn required_facts(&self) -> &'static [Fact] {
        &[Fact::DebianFamily]
    }

    /// Side-effect-free detection of current state.
    fn probe(&self, host: &HostContext, runner: &dyn Runner) -> Result<Presence, ProbeError>;

    fn install(&self, ctx: &ActionContext) -> Result<(), HostError>;

    /// `version` pins the DKMS tree to remove when the package is already
    /// gone and the version can no longer be probed.
    fn uninstall(&self, ctx: &ActionContext, version: Option<&str>) -> Result<(), HostError>;

    fn rebuild(&self, ctx: &ActionContext) -> Result<(), HostError>;

    /// Grant a non-root user access to the component (docker only).
    fn setup_non_root(&self, _ctx: &ActionContext, _user: &str) -> Result<(), HostError> {
        Err(HostError::Unsupported {
            component: self.name(),
            operation: "setup-non-root",
        })
    }
}

pub mod accel;
pub mod docker;
pub mod gpu;
pub mod toolkit;

pub use accel::AccelDriver;
pub use docker::ContainerRuntime;
pub use gpu::GpuDriver;
pub use toolkit::GpuToolkit;
