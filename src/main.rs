mod cli;
mod commands;
mod component;
mod config;
mod confirm;
mod error;
mod executor;
mod gate;
mod host;
mod probe;
mod progress;
mod registry;
mod runner;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::lifecycle::{self, LifecycleArgs};
use component::Action;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Status { component } => commands::status::run(&ctx, component.as_deref()),
        Command::Install(args) => lifecycle::run(
            &ctx,
            &LifecycleArgs {
                component: &args.component,
                action: Action::Install,
                yes: args.yes,
                dry_run: args.dry_run,
                version: None,
            },
        ),
        Command::Uninstall(args) => lifecycle::run(
            &ctx,
            &LifecycleArgs {
                component: &args.action.component,
                action: Action::Uninstall,
                yes: args.action.yes,
                dry_run: args.action.dry_run,
                version: args.driver_version.as_deref(),
            },
        ),
        Command::Reinstall(args) => lifecycle::run(
            &ctx,
            &LifecycleArgs {
                component: &args.component,
                action: Action::Reinstall,
                yes: args.yes,
                dry_run: args.dry_run,
                version: None,
            },
        ),
        Command::Rebuild(args) => lifecycle::run(
            &ctx,
            &LifecycleArgs {
                component: &args.component,
                action: Action::Rebuild,
                yes: args.yes,
                dry_run: args.dry_run,
                version: None,
            },
        ),
        Command::SetupNonRoot { user } => lifecycle::setup_non_root(&ctx, user.as_deref()),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "hostctl", &mut io::stdout());
            Ok(())
        }
    }
}
