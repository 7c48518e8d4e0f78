//! Mutating lifecycle commands. All of them gather host facts once, build
//! the standard registry, and hand off to the executor; the process exit
//! code reflects the outcome.

use anyhow::{Result, bail};

use crate::Context;
use crate::component::{Action, ActionContext, Outcome};
use crate::config::HostctlConfig;
use crate::confirm::TerminalConfirm;
use crate::executor::{ExecuteOptions, Executor};
use crate::gate;
use crate::host::HostContext;
use crate::registry::Registry;
use crate::runner::SystemRunner;
use crate::ui;

pub struct LifecycleArgs<'a> {
    pub component: &'a str,
    pub action: Action,
    pub yes: bool,
    pub dry_run: bool,
    /// Only meaningful for uninstall; pins the DKMS tree version.
    pub version: Option<&'a str>,
}

pub fn run(_ctx: &Context, args: &LifecycleArgs) -> Result<()> {
    let cfg = HostctlConfig::load()?;
    let registry = Registry::standard(&cfg);
    let runner = SystemRunner;
    let host = HostContext::gather(&runner)?;

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        assume_yes: args.yes || cfg.assume_yes,
    };
    let confirm = TerminalConfirm {
        assume_yes: opts.assume_yes,
    };

    if args.dry_run {
        ui::info("Dry run: no command below will actually execute.");
    }

    let executor = Executor::new(&registry, &host, &runner, &confirm, opts);
    let result = executor.execute(args.component, args.action, args.version);

    println!();
    match result.outcome {
        Outcome::Ok => {
            ui::success(&format!("{} {}: done", result.action, result.component));
            Ok(())
        }
        Outcome::Skipped { reason } => {
            ui::info(&format!(
                "{} {}: skipped ({reason})",
                result.action, result.component
            ));
            Ok(())
        }
        Outcome::Failed { reason } => {
            ui::error(&format!(
                "{} {}: failed",
                result.action, result.component
            ));
            bail!("{reason}");
        }
    }
}

/// `hostctl setup-non-root [USER]`: group membership for the container
/// runtime. Resolves the invoking user through SUDO_USER so `sudo hostctl
/// setup-non-root` does the expected thing.
pub fn setup_non_root(_ctx: &Context, user: Option<&str>) -> Result<()> {
    let Some(user) = user.map(str::to_string).or_else(invoking_user) else {
        bail!("could not determine the target user; pass one explicitly");
    };
    if user == "root" {
        bail!("root already has access; pass the target user explicitly");
    }

    let cfg = HostctlConfig::load()?;
    let registry = Registry::standard(&cfg);
    let runner = SystemRunner;
    let host = HostContext::gather(&runner)?;

    let Some(component) = registry.get("docker") else {
        bail!("container runtime component is not registered");
    };
    gate::check(&host, component.required_facts())?;

    let confirm = TerminalConfirm { assume_yes: false };
    let ctx = ActionContext {
        host: &host,
        runner: &runner,
        confirm: &confirm,
        dry_run: false,
    };
    component.setup_non_root(&ctx, &user)?;
    ui::success(&format!("{user} can use the container runtime after re-login"));
    Ok(())
}

fn invoking_user() -> Option<String> {
    std::env::var("SUDO_USER")
        .or_else(|_| std::env::var("USER"))
        .ok()
        .filter(|u| !u.is_empty())
}
