use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "hostctl")]
#[command(version)]
#[command(about = "Manage accelerator, GPU, and container components on this host", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Probe current component state and print a report
    Status {
        /// Restrict the report to one component
        component: Option<String>,
    },

    /// Install a component (missing dependencies are installed first)
    Install(ActionArgs),

    /// Uninstall a component
    Uninstall(UninstallArgs),

    /// Uninstall then install a component from scratch
    Reinstall(ActionArgs),

    /// Rebuild a component's kernel module against the running kernel
    Rebuild(ActionArgs),

    /// Let a non-root user talk to the container runtime
    SetupNonRoot {
        /// User to grant access (defaults to the invoking user)
        user: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ActionArgs {
    /// Component to act on (see `hostctl status` for names)
    pub component: String,

    /// Answer yes to every confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Print the step sequence without running anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct UninstallArgs {
    #[command(flatten)]
    pub action: ActionArgs,

    /// DKMS tree version to remove when the package is already gone and the
    /// version can no longer be probed
    #[arg(long, value_name = "VERSION")]
    pub driver_version: Option<String>,
}
