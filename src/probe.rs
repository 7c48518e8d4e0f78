//! Probe engine: read-only detection of component state.
//!
//! Probes never mutate the host. Each external probe command runs under a
//! deadline; a missing tool, a tool error, or a timeout degrades that
//! component to "unknown" in the report instead of aborting the run.

use std::io;
use std::time::Duration;

use crate::component::{Component, Presence};
use crate::error::ProbeError;
use crate::host::HostContext;
use crate::runner::{CommandOutput, Runner, render};

/// Deadline for a single probe command.
pub const PROBE_TIMEOUT_SECS: u64 = 10;

/// Run a read-only probe command under the probe deadline.
/// A non-zero exit is returned to the caller for interpretation
/// (`dpkg-query` exits 1 for "not installed", which is an answer, not an
/// error).
pub fn capture(
    runner: &dyn Runner,
    tool: &str,
    args: &[&str],
) -> Result<CommandOutput, ProbeError> {
    match runner.output_timeout(tool, args, Duration::from_secs(PROBE_TIMEOUT_SECS)) {
        Ok(Some(output)) => Ok(output),
        Ok(None) => Err(ProbeError::Timeout {
            tool: tool.to_string(),
            seconds: PROBE_TIMEOUT_SECS,
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProbeError::ToolNotFound {
            tool: tool.to_string(),
        }),
        Err(e) => Err(ProbeError::ToolError {
            tool: tool.to_string(),
            message: format!("{}: {e}", render(tool, args)),
        }),
    }
}

/// Like [`capture`] but demands exit 0, mapping failure to a `ToolError`.
pub fn capture_checked(
    runner: &dyn Runner,
    tool: &str,
    args: &[&str],
) -> Result<CommandOutput, ProbeError> {
    let output = capture(runner, tool, args)?;
    if output.success() {
        Ok(output)
    } else {
        Err(ProbeError::ToolError {
            tool: tool.to_string(),
            message: format!(
                "`{}` exited with code {}",
                render(tool, args),
                output.code.unwrap_or(-1)
            ),
        })
    }
}

/// Aggregate health of a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Every probed component is installed and functional.
    Healthy,
    /// At least one component could not be probed.
    Degraded,
    /// At least one component is absent, partial, or broken.
    Unhealthy,
}

/// Per-component outcome of a probe pass.
pub struct ComponentStatus {
    pub name: &'static str,
    pub description: String,
    pub presence: Result<Presence, ProbeError>,
}

/// One probe pass over a set of components. Never cached; derived fresh on
/// each invocation.
pub struct StatusReport {
    pub components: Vec<ComponentStatus>,
}

impl StatusReport {
    pub fn health(&self) -> Health {
        let mut health = Health::Healthy;
        for status in &self.components {
            match &status.presence {
                Ok(Presence::Installed { .. }) => {}
                Ok(_) => return Health::Unhealthy,
                Err(_) => health = Health::Degraded,
            }
        }
        health
    }
}

/// Probe every given component, degrading failures to per-component errors.
pub fn probe_all(
    components: &[&dyn Component],
    host: &HostContext,
    runner: &dyn Runner,
) -> StatusReport {
    let components = components
        .iter()
        .map(|component| {
            let presence = component.probe(host, runner);
            if let Err(e) = &presence {
                log::warn!("probe of {} failed: {e}", component.name());
            }
            ComponentStatus {
                name: component.name(),
                description: component.description(),
                presence,
            }
        })
        .collect();
    StatusReport {
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;

    #[test]
    fn capture_maps_missing_tool() {
        let runner = FakeRunner::new().not_found("lspci -n -d 1eab:");
        let err = capture(&runner, "lspci", &["-n", "-d", "1eab:"]).unwrap_err();
        assert!(matches!(err, ProbeError::ToolNotFound { tool } if tool == "lspci"));
    }

    #[test]
    fn capture_maps_timeout() {
        let runner = FakeRunner::new().times_out("docker info");
        let err = capture(&runner, "docker", &["info"]).unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { seconds, .. } if seconds == PROBE_TIMEOUT_SECS));
    }

    #[test]
    fn capture_passes_through_nonzero_exit() {
        let runner = FakeRunner::new().fail("dpkg-query -W x", 1, "no package");
        let out = capture(&runner, "dpkg-query", &["-W", "x"]).unwrap();
        assert_eq!(out.code, Some(1));
    }

    #[test]
    fn capture_checked_rejects_nonzero_exit() {
        let runner = FakeRunner::new().fail("uname -r", 2, "boom");
        let err = capture_checked(&runner, "uname", &["-r"]).unwrap_err();
        assert!(matches!(err, ProbeError::ToolError { .. }));
    }

    #[test]
    fn health_requires_all_installed() {
        let report = StatusReport {
            components: vec![
                ComponentStatus {
                    name: "a",
                    description: String::new(),
                    presence: Ok(Presence::Installed {
                        version: Some("1.0".into()),
                    }),
                },
                ComponentStatus {
                    name: "b",
                    description: String::new(),
                    presence: Ok(Presence::Absent),
                },
            ],
        };
        assert_eq!(report.health(), Health::Unhealthy);
    }

    #[test]
    fn probe_errors_degrade_instead_of_failing() {
        let report = StatusReport {
            components: vec![
                ComponentStatus {
                    name: "a",
                    description: String::new(),
                    presence: Ok(Presence::Installed { version: None }),
                },
                ComponentStatus {
                    name: "b",
                    description: String::new(),
                    presence: Err(ProbeError::ToolNotFound {
                        tool: "docker".into(),
                    }),
                },
            ],
        };
        assert_eq!(report.health(), Health::Degraded);
    }

    #[test]
    fn all_installed_is_healthy() {
        let report = StatusReport {
            components: vec![ComponentStatus {
                name: "a",
                description: String::new(),
                presence: Ok(Presence::Installed { version: None }),
            }],
        };
        assert_eq!(report.health(), Health::Healthy);
    }
}
