//! `hostctl status`: probe every component and print what the host looks
//! like right now. Read-only; producing the report always succeeds even
//! when individual probes cannot.

use anyhow::{Result, bail};
use colored::Colorize;

use crate::Context;
use crate::component::Presence;
use crate::config::HostctlConfig;
use crate::error::ProbeError;
use crate::host::HostContext;
use crate::probe::{self, Health, StatusReport};
use crate::progress;
use crate::registry::Registry;
use crate::runner::SystemRunner;
use crate::ui;

pub fn run(ctx: &Context, component: Option<&str>) -> Result<()> {
    let cfg = HostctlConfig::load()?;
    let registry = Registry::standard(&cfg);
    let runner = SystemRunner;

    let mut components = registry.components();
    if let Some(name) = component {
        components.retain(|c| c.name() == name);
        if components.is_empty() {
            bail!(
                "unknown component `{name}` (available: {})",
                registry.names().join(", ")
            );
        }
    }

    let spinner = (!ctx.quiet).then(|| progress::spinner("Probing components..."));
    let host = HostContext::gather(&runner)?;
    let report = probe::probe_all(&components, &host, &runner);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    print_host(&host);
    print_report(&report, ctx.verbose > 0);
    Ok(())
}

fn print_host(host: &HostContext) {
    ui::header("Host");
    let distro = if host.codename.is_empty() {
        host.distro_id.clone()
    } else {
        format!("{} ({})", host.distro_id, host.codename)
    };
    ui::kv("distro", &distro);
    ui::kv("kernel", &host.kernel_release);
    ui::kv("non-free repo", if host.non_free_enabled { "enabled" } else { "not enabled" });
    if host.reboot_pending {
        ui::warn("a reboot is pending");
    }
}

fn print_report(report: &StatusReport, verbose: bool) {
    ui::header("Components");
    for status in &report.components {
        println!(
            "  {} {:<12} {}",
            glyph(&status.presence),
            status.name,
            detail(&status.presence).dimmed()
        );
        if verbose {
            ui::dim(&format!("  {}", status.description));
        }
    }

    println!();
    match report.health() {
        Health::Healthy => ui::success("All components installed and functional"),
        Health::Degraded => ui::warn("Some components could not be probed"),
        Health::Unhealthy => ui::info("Some components are missing or not functional"),
    }
}

fn glyph(presence: &Result<Presence, ProbeError>) -> String {
    match presence {
        Ok(Presence::Installed { .. }) => "✓".green().to_string(),
        Ok(Presence::Absent) => "○".dimmed().to_string(),
        Ok(Presence::PartiallyInstalled) => "◐".yellow().to_string(),
        Ok(Presence::InstalledButBroken { .. }) => "✗".red().to_string(),
        Err(_) => "?".yellow().to_string(),
    }
}

fn detail(presence: &Result<Presence, ProbeError>) -> String {
    match presence {
        Ok(Presence::Installed { version: Some(v) }) => format!("installed ({v})"),
        Ok(Presence::Installed { version: None }) => "installed".to_string(),
        Ok(Presence::Absent) => "not installed".to_string(),
        Ok(Presence::PartiallyInstalled) => "partially installed".to_string(),
        Ok(Presence::InstalledButBroken { reason }) => format!("broken: {reason}"),
        Err(e) => format!("unknown: {e}"),
    }
}
