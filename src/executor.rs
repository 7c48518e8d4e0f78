//! Action executor: runs lifecycle actions with idempotency short-circuits,
//! dependency resolution, and first-failure-aborts semantics.
//!
//! State is never persisted between runs; every invocation re-derives
//! component state by probing, mutates through the component's action, then
//! re-probes to report what actually happened.

use crate::component::{Action, ActionContext, ActionResult, Outcome, Presence};
use crate::confirm::Confirm;
use crate::error::HostError;
use crate::gate;
use crate::host::HostContext;
use crate::registry::Registry;
use crate::runner::Runner;
use crate::ui;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Print the step sequence without invoking external tools.
    pub dry_run: bool,
    /// Skip confirmation prompts.
    pub assume_yes: bool,
}

pub struct Executor<'a> {
    registry: &'a Registry,
    host: &'a HostContext,
    runner: &'a dyn Runner,
    confirm: &'a dyn Confirm,
    opts: ExecuteOptions,
}

impl<'a> Executor<'a> {
    pub fn new(
        registry: &'a Registry,
        host: &'a HostContext,
        runner: &'a dyn Runner,
        confirm: &'a dyn Confirm,
        opts: ExecuteOptions,
    ) -> Self {
        Self {
            registry,
            host,
            runner,
            confirm,
            opts,
        }
    }

    /// Run one action on one component. Never panics and never exits the
    /// process; every path reports through the returned `ActionResult`.
    pub fn execute(&self, name: &str, action: Action, version: Option<&str>) -> ActionResult {
        let mut stack = Vec::new();
        let outcome = self.run(name, action, version, &mut stack);
        ActionResult {
            component: name.to_string(),
            action,
            outcome,
        }
    }

    fn run(
        &self,
        name: &str,
        action: Action,
        version: Option<&str>,
        stack: &mut Vec<String>,
    ) -> Outcome {
        let Some(component) = self.registry.get(name) else {
            return Outcome::Failed {
                reason: format!("unknown component `{name}`"),
            };
        };

        // Gate before anything mutates. Dry runs mutate nothing, so they
        // are allowed through for planning on an unprivileged shell.
        if !self.opts.dry_run {
            if let Err(e) = gate::check(self.host, component.required_facts()) {
                return Outcome::Failed {
                    reason: e.to_string(),
                };
            }
        }

        // Presence is advisory: a failed probe degrades to unknown and the
        // action is still attempted (matching `--reinstall` recovery flows).
        let presence = match component.probe(self.host, self.runner) {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("probe of {name} failed, proceeding without it: {e}");
                None
            }
        };

        match (action, &presence) {
            (Action::Install, Some(p)) if p.is_installed() => {
                return Outcome::Skipped {
                    reason: "already satisfied".to_string(),
                };
            }
            (Action::Uninstall, Some(Presence::Absent)) => {
                return Outcome::Skipped {
                    reason: "not installed".to_string(),
                };
            }
            (Action::Rebuild, Some(Presence::Absent | Presence::PartiallyInstalled)) => {
                return Outcome::Failed {
                    reason: HostError::MissingPrecondition(format!(
                        "{name} has never been fully installed, nothing to rebuild"
                    ))
                    .to_string(),
                };
            }
            _ => {}
        }

        if matches!(action, Action::Install | Action::Reinstall | Action::Rebuild) {
            if let Err(reason) = self.ensure_dependencies(name, component.depends_on(), stack) {
                return Outcome::Failed { reason };
            }
        }

        let ctx = ActionContext {
            host: self.host,
            runner: self.runner,
            confirm: self.confirm,
            dry_run: self.opts.dry_run,
        };

        ui::section(&format!("{action} {name}"));
        let result = match action {
            Action::Install => component.install(&ctx),
            Action::Uninstall => self
                .confirm_removal(name)
                .and_then(|()| component.uninstall(&ctx, version)),
            Action::Rebuild => component.rebuild(&ctx),
            Action::Reinstall => {
                let removed = if matches!(presence, Some(Presence::Absent)) {
                    Ok(())
                } else {
                    component.uninstall(&ctx, version)
                };
                removed.and_then(|()| component.install(&ctx))
            }
        };

        match result {
            Ok(()) => {
                if !self.opts.dry_run && action != Action::Uninstall {
                    self.verify(name);
                }
                Outcome::Ok
            }
            Err(HostError::UserDeclined(_)) => Outcome::Skipped {
                reason: "declined".to_string(),
            },
            Err(e) => Outcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Removal is the one action that always asks first. A decline is a
    /// [`HostError::UserDeclined`], which the caller maps to a skip.
    fn confirm_removal(&self, name: &str) -> Result<(), HostError> {
        if self.opts.dry_run || self.opts.assume_yes {
            return Ok(());
        }
        let prompt = format!("Uninstall {name}?");
        if self.confirm.confirm(&prompt)? {
            Ok(())
        } else {
            Err(HostError::UserDeclined(prompt))
        }
    }

    /// Install missing dependencies first, depth-first in declared order.
    fn ensure_dependencies(
        &self,
        name: &str,
        deps: &[&str],
        stack: &mut Vec<String>,
    ) -> Result<(), String> {
        if deps.is_empty() {
            return Ok(());
        }
        if stack.iter().any(|n| n.as_str() == name) {
            return Err(format!("dependency cycle through `{name}`"));
        }
        stack.push(name.to_string());

        for dep in deps {
            let Some(dep_component) = self.registry.get(dep) else {
                stack.pop();
                return Err(format!("unknown dependency `{dep}` of `{name}`"));
            };
            let installed = dep_component
                .probe(self.host, self.runner)
                .map(|p| p.is_installed())
                .unwrap_or(false);
            if installed {
                continue;
            }

            ui::info(&format!("{name} requires {dep}, installing it first"));
            match self.run(dep, Action::Install, None, stack) {
                Outcome::Ok | Outcome::Skipped { .. } => {}
                Outcome::Failed { reason } => {
                    stack.pop();
                    return Err(format!("dependency `{dep}` install failed: {reason}"));
                }
            }
        }

        stack.pop();
        Ok(())
    }

    /// Re-probe after a mutating action. A broken-but-present result (e.g.
    /// driver installed on a machine without the hardware) is a warning,
    /// not a failure of the action.
    fn verify(&self, name: &str) {
        let Some(component) = self.registry.get(name) else {
            return;
        };
        match component.probe(self.host, self.runner) {
            Ok(Presence::InstalledButBroken { reason }) => {
                ui::warn(&format!("{name} is installed but not functional: {reason}"));
            }
            Ok(Presence::PartiallyInstalled) => {
                ui::warn(&format!("{name} still looks partially installed"));
            }
            Ok(_) => {}
            Err(e) => log::warn!("post-action probe of {name} failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::confirm::scripted::StaticConfirm;
    use crate::error::ProbeError;
    use crate::gate::Fact;
    use crate::runner::fake::FakeRunner;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Scripted component with interior state so tests can watch the
    /// executor drive it.
    struct FakeState {
        name: &'static str,
        deps: &'static [&'static str],
        facts: &'static [Fact],
        presence: RefCell<Presence>,
        probe_fails: Cell<bool>,
        install_fails: bool,
        install_declines: bool,
        broken_after_install: bool,
        installs: Cell<usize>,
        uninstalls: Cell<usize>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl FakeState {
        fn new(name: &'static str, presence: Presence, log: Rc<RefCell<Vec<String>>>) -> Rc<Self> {
            Rc::new(Self {
                name,
                deps: &[],
                facts: &[Fact::DebianFamily],
                presence: RefCell::new(presence),
                probe_fails: Cell::new(false),
                install_fails: false,
                install_declines: false,
                broken_after_install: false,
                installs: Cell::new(0),
                uninstalls: Cell::new(0),
                log,
            })
        }
    }

    struct Fake(Rc<FakeState>);

    impl Component for Fake {
        fn name(&self) -> &'static str {
            self.0.name
        }

        fn description(&self) -> String {
            format!("fake {}", self.0.name)
        }

        fn depends_on(&self) -> &'static [&'static str] {
            self.0.deps
        }

        fn required_facts(&self) -> &'static [Fact] {
            self.0.facts
        }

        fn probe(&self, _host: &HostContext, _runner: &dyn Runner) -> Result<Presence, ProbeError> {
            if self.0.probe_fails.get() {
                return Err(ProbeError::ToolNotFound {
                    tool: "dpkg-query".to_string(),
                });
            }
            Ok(self.0.presence.borrow().clone())
        }

        fn install(&self, _ctx: &ActionContext) -> Result<(), HostError> {
            self.0.log.borrow_mut().push(format!("install {}", self.0.name));
            if self.0.install_fails {
                return Err(HostError::ExternalCommandFailed {
                    command: "apt-get install".to_string(),
                    code: 100,
                    stderr: "unmet dependencies".to_string(),
                });
            }
            if self.0.install_declines {
                return Err(HostError::UserDeclined("Proceed?".to_string()));
            }
            self.0.installs.set(self.0.installs.get() + 1);
            self.0.probe_fails.set(false);
            *self.0.presence.borrow_mut() = if self.0.broken_after_install {
                Presence::InstalledButBroken {
                    reason: "hardware not detected".to_string(),
                }
            } else {
                Presence::Installed {
                    version: Some("1.0".to_string()),
                }
            };
            Ok(())
        }

        fn uninstall(&self, _ctx: &ActionContext, _version: Option<&str>) -> Result<(), HostError> {
            self.0.log.borrow_mut().push(format!("uninstall {}", self.0.name));
            self.0.uninstalls.set(self.0.uninstalls.get() + 1);
            *self.0.presence.borrow_mut() = Presence::Absent;
            Ok(())
        }

        fn rebuild(&self, _ctx: &ActionContext) -> Result<(), HostError> {
            self.0.log.borrow_mut().push(format!("rebuild {}", self.0.name));
            *self.0.presence.borrow_mut() = Presence::Installed {
                version: Some("1.0".to_string()),
            };
            Ok(())
        }
    }

    struct Harness {
        registry: Registry,
        host: HostContext,
        runner: FakeRunner,
    }

    impl Harness {
        fn new(states: &[Rc<FakeState>]) -> Self {
            let components: Vec<Box<dyn Component>> = states
                .iter()
                .map(|s| Box::new(Fake(Rc::clone(s))) as Box<dyn Component>)
                .collect();
            Self {
                registry: Registry::from_components(components),
                host: HostContext::fake(),
                runner: FakeRunner::new(),
            }
        }

        fn execute_with(
            &self,
            confirm: &dyn Confirm,
            opts: ExecuteOptions,
            name: &str,
            action: Action,
        ) -> ActionResult {
            let executor = Executor::new(&self.registry, &self.host, &self.runner, confirm, opts);
            executor.execute(name, action, None)
        }

        fn execute(&self, name: &str, action: Action) -> ActionResult {
            let confirm = StaticConfirm::yes();
            self.execute_with(
                &confirm,
                ExecuteOptions {
                    dry_run: false,
                    assume_yes: true,
                },
                name,
                action,
            )
        }
    }

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn install_converges_to_installed() {
        let state = FakeState::new("accel", Presence::Absent, log());
        let harness = Harness::new(&[Rc::clone(&state)]);

        let result = harness.execute("accel", Action::Install);
        assert_eq!(result.outcome, Outcome::Ok);
        assert!(state.presence.borrow().is_installed());
        assert_eq!(state.installs.get(), 1);
    }

    #[test]
    fn second_install_is_skipped_as_satisfied() {
        let state = FakeState::new("accel", Presence::Absent, log());
        let harness = Harness::new(&[Rc::clone(&state)]);

        assert_eq!(harness.execute("accel", Action::Install).outcome, Outcome::Ok);
        let second = harness.execute("accel", Action::Install);
        assert_eq!(
            second.outcome,
            Outcome::Skipped {
                reason: "already satisfied".to_string()
            }
        );
        assert_eq!(state.installs.get(), 1);
    }

    #[test]
    fn uninstall_converges_to_absent() {
        let state = FakeState::new(
            "docker",
            Presence::Installed {
                version: Some("27.1".to_string()),
            },
            log(),
        );
        let harness = Harness::new(&[Rc::clone(&state)]);

        let result = harness.execute("docker", Action::Uninstall);
        assert_eq!(result.outcome, Outcome::Ok);
        assert_eq!(*state.presence.borrow(), Presence::Absent);
    }

    #[test]
    fn uninstall_of_absent_component_is_skipped() {
        let state = FakeState::new("docker", Presence::Absent, log());
        let harness = Harness::new(&[Rc::clone(&state)]);

        let result = harness.execute("docker", Action::Uninstall);
        assert_eq!(
            result.outcome,
            Outcome::Skipped {
                reason: "not installed".to_string()
            }
        );
        assert_eq!(state.uninstalls.get(), 0);
    }

    #[test]
    fn uninstall_requires_confirmation() {
        let state = FakeState::new(
            "docker",
            Presence::Installed { version: None },
            log(),
        );
        let harness = Harness::new(&[Rc::clone(&state)]);

        let confirm = StaticConfirm::no();
        let result = harness.execute_with(
            &confirm,
            ExecuteOptions::default(),
            "docker",
            Action::Uninstall,
        );
        assert_eq!(
            result.outcome,
            Outcome::Skipped {
                reason: "declined".to_string()
            }
        );
        assert_eq!(state.uninstalls.get(), 0);
        assert_eq!(confirm.prompts.borrow().as_slice(), ["Uninstall docker?"]);
    }

    #[test]
    fn decline_raised_by_an_action_is_skipped_not_failed() {
        let log = log();
        let state = Rc::new(FakeState {
            install_declines: true,
            ..Rc::try_unwrap(FakeState::new("accel", Presence::Absent, Rc::clone(&log)))
                .unwrap_or_else(|_| unreachable!())
        });
        let harness = Harness::new(&[Rc::clone(&state)]);

        let result = harness.execute("accel", Action::Install);
        assert_eq!(
            result.outcome,
            Outcome::Skipped {
                reason: "declined".to_string()
            }
        );
    }

    #[test]
    fn gate_blocks_non_root_regardless_of_state() {
        let state = FakeState::new("accel", Presence::Absent, log());
        let mut harness = Harness::new(&[Rc::clone(&state)]);
        harness.host.euid = 1000;

        let result = harness.execute("accel", Action::Install);
        match result.outcome {
            Outcome::Failed { reason } => assert!(reason.contains("root")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(state.installs.get(), 0);
    }

    #[test]
    fn gate_blocks_missing_fact() {
        let log = log();
        let state = Rc::new(FakeState {
            facts: &[Fact::DebianFamily, Fact::NonFreeRepo],
            ..Rc::try_unwrap(FakeState::new("gpu", Presence::Absent, Rc::clone(&log)))
                .unwrap_or_else(|_| unreachable!())
        });
        let mut harness = Harness::new(&[Rc::clone(&state)]);
        harness.host.non_free_enabled = false;

        let result = harness.execute("gpu", Action::Install);
        match result.outcome {
            Outcome::Failed { reason } => assert!(reason.contains("non-free")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn rebuild_without_prior_install_fails_with_precondition() {
        let state = FakeState::new("accel", Presence::Absent, log());
        let harness = Harness::new(&[Rc::clone(&state)]);

        let result = harness.execute("accel", Action::Rebuild);
        match result.outcome {
            Outcome::Failed { reason } => {
                assert!(reason.contains("precondition"));
                assert!(reason.contains("rebuild"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn rebuild_of_broken_install_is_allowed() {
        let state = FakeState::new(
            "accel",
            Presence::InstalledButBroken {
                reason: "kernel module not loaded".to_string(),
            },
            log(),
        );
        let harness = Harness::new(&[Rc::clone(&state)]);

        let result = harness.execute("accel", Action::Rebuild);
        assert_eq!(result.outcome, Outcome::Ok);
    }

    #[test]
    fn hardware_absent_install_is_ok_not_failed() {
        let log = log();
        let state = Rc::new(FakeState {
            broken_after_install: true,
            ..Rc::try_unwrap(FakeState::new("accel", Presence::Absent, Rc::clone(&log)))
                .unwrap_or_else(|_| unreachable!())
        });
        let harness = Harness::new(&[Rc::clone(&state)]);

        // The driver lands fine on a machine without the device; only the
        // post-probe reports broken, and that must not fail the action.
        let result = harness.execute("accel", Action::Install);
        assert_eq!(result.outcome, Outcome::Ok);
        assert!(matches!(
            &*state.presence.borrow(),
            Presence::InstalledButBroken { .. }
        ));
    }

    #[test]
    fn missing_dependency_is_installed_first() {
        let log = log();
        let gpu = FakeState::new("gpu", Presence::Absent, Rc::clone(&log));
        let docker = FakeState::new(
            "docker",
            Presence::Installed { version: None },
            Rc::clone(&log),
        );
        let toolkit = Rc::new(FakeState {
            deps: &["gpu", "docker"],
            ..Rc::try_unwrap(FakeState::new(
                "gpu-toolkit",
                Presence::Absent,
                Rc::clone(&log),
            ))
            .unwrap_or_else(|_| unreachable!())
        });
        let harness = Harness::new(&[Rc::clone(&gpu), Rc::clone(&docker), Rc::clone(&toolkit)]);

        let result = harness.execute("gpu-toolkit", Action::Install);
        assert_eq!(result.outcome, Outcome::Ok);
        // gpu was missing and got installed first; docker was satisfied.
        assert_eq!(
            log.borrow().as_slice(),
            ["install gpu", "install gpu-toolkit"]
        );
        assert_eq!(docker.installs.get(), 0);
    }

    #[test]
    fn failed_dependency_fails_dependent_without_running_it() {
        let log = log();
        let gpu = Rc::new(FakeState {
            install_fails: true,
            ..Rc::try_unwrap(FakeState::new("gpu", Presence::Absent, Rc::clone(&log)))
                .unwrap_or_else(|_| unreachable!())
        });
        let toolkit = Rc::new(FakeState {
            deps: &["gpu"],
            ..Rc::try_unwrap(FakeState::new(
                "gpu-toolkit",
                Presence::Absent,
                Rc::clone(&log),
            ))
            .unwrap_or_else(|_| unreachable!())
        });
        let harness = Harness::new(&[Rc::clone(&gpu), Rc::clone(&toolkit)]);

        let result = harness.execute("gpu-toolkit", Action::Install);
        match result.outcome {
            Outcome::Failed { reason } => {
                assert!(reason.contains("dependency `gpu`"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(toolkit.installs.get(), 0);
    }

    #[test]
    fn probe_failure_degrades_but_action_still_runs() {
        let state = FakeState::new("accel", Presence::Absent, log());
        state.probe_fails.set(true);
        let harness = Harness::new(&[Rc::clone(&state)]);

        let result = harness.execute("accel", Action::Install);
        assert_eq!(result.outcome, Outcome::Ok);
        assert_eq!(state.installs.get(), 1);
    }

    #[test]
    fn reinstall_uninstalls_then_installs() {
        let log = log();
        let state = FakeState::new(
            "accel",
            Presence::Installed {
                version: Some("1.0".to_string()),
            },
            Rc::clone(&log),
        );
        let harness = Harness::new(&[Rc::clone(&state)]);

        let result = harness.execute("accel", Action::Reinstall);
        assert_eq!(result.outcome, Outcome::Ok);
        assert_eq!(
            log.borrow().as_slice(),
            ["uninstall accel", "install accel"]
        );
    }

    #[test]
    fn reinstall_of_absent_component_just_installs() {
        let log = log();
        let state = FakeState::new("accel", Presence::Absent, Rc::clone(&log));
        let harness = Harness::new(&[Rc::clone(&state)]);

        let result = harness.execute("accel", Action::Reinstall);
        assert_eq!(result.outcome, Outcome::Ok);
        assert_eq!(log.borrow().as_slice(), ["install accel"]);
    }

    #[test]
    fn unknown_component_fails() {
        let harness = Harness::new(&[]);
        let result = harness.execute("postgres", Action::Install);
        assert!(matches!(result.outcome, Outcome::Failed { reason } if reason.contains("unknown")));
    }

    #[test]
    fn dry_run_skips_the_privilege_gate() {
        let state = FakeState::new("accel", Presence::Absent, log());
        let mut harness = Harness::new(&[Rc::clone(&state)]);
        harness.host.euid = 1000;

        let confirm = StaticConfirm::yes();
        let result = harness.execute_with(
            &confirm,
            ExecuteOptions {
                dry_run: true,
                assume_yes: true,
            },
            "accel",
            Action::Install,
        );
        assert_ne!(
            result.outcome,
            Outcome::Failed {
                reason: HostError::MissingPrivilege.to_string()
            }
        );
    }
}
