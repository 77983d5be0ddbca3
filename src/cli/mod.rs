//! Command-line interface definitions for the `lambda` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Top-level CLI for the `lambda` binary.
#[derive(Debug, Parser)]
#[command(
    name = "lambda",
    version,
    about = "Create, connect to, and provision Lambda Cloud GPU instances",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Flags accepted by every subcommand.
    #[command(flatten)]
    pub(crate) global: GlobalArgs,
    /// Subcommand to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Flags shared by all subcommands.
#[derive(Debug, Args)]
pub(crate) struct GlobalArgs {
    /// Lambda Cloud API key (overrides LAMBDA_API_KEY).
    #[arg(long, global = true, value_name = "KEY")]
    pub(crate) api_key: Option<String>,
    /// Private key used for SSH (overrides LAMBDA_SSH_KEY_PATH).
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) ssh_key_path: Option<String>,
    /// SSH key name registered with Lambda Cloud (overrides
    /// LAMBDA_SSH_KEY_NAME).
    #[arg(long, global = true, value_name = "NAME")]
    pub(crate) ssh_key_name: Option<String>,
    /// Output format: `table` or `json`.
    #[arg(long, short = 'o', global = true, default_value = "table")]
    pub(crate) output: String,
    /// Increase log verbosity (repeatable).
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,
    /// Only log warnings and errors.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub(crate) quiet: bool,
}

/// Subcommands of `lambda`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Launch an instance and wait until it is reachable.
    Create(CreateCommand),
    /// Open an interactive shell on an instance.
    Connect(TargetCommand),
    /// Push and run the provisioning script on an instance.
    Setup(SetupCommand),
    /// Terminate an instance.
    #[command(alias = "terminate")]
    Delete(TargetCommand),
    /// Restart an instance.
    Restart(TargetCommand),
    /// List instances.
    List(ListCommand),
    /// Print a shell completion script.
    Completion(CompletionCommand),
}

/// Arguments for `lambda create`.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Instance specification such as `1xa10` or `8xh100`.
    #[arg(value_name = "SPEC")]
    pub(crate) spec: String,
    /// Region to launch in; defaults to the configured region, then any
    /// `us-` region with capacity.
    #[arg(value_name = "REGION")]
    pub(crate) region: Option<String>,
    /// Prefix for the generated instance name.
    #[arg(long, default_value = "generic")]
    pub(crate) prefix: String,
    /// Skip the launch when this many instances of the GPU family are active.
    #[arg(long, default_value_t = 2)]
    pub(crate) max_instances_per_type: usize,
}

/// Arguments for commands addressing one instance.
#[derive(Debug, Args)]
pub(crate) struct TargetCommand {
    /// Instance ID or name.
    #[arg(value_name = "INSTANCE")]
    pub(crate) identifier: String,
}

/// Arguments for `lambda setup`.
#[derive(Debug, Args)]
pub(crate) struct SetupCommand {
    /// Instance ID or name.
    #[arg(value_name = "INSTANCE")]
    pub(crate) identifier: String,
    /// Stage the extended profile and import the GPG key.
    #[arg(long)]
    pub(crate) dix: bool,
    /// Run setup again on a host that already completed it.
    #[arg(long, short = 'f')]
    pub(crate) force: bool,
}

/// Arguments for `lambda list`.
#[derive(Debug, Args)]
pub(crate) struct ListCommand {
    /// Include instances that are not active.
    #[arg(long)]
    pub(crate) all: bool,
}

/// Arguments for `lambda completion`.
#[derive(Debug, Args)]
pub(crate) struct CompletionCommand {
    /// Target shell.
    #[arg(value_enum)]
    pub(crate) shell: Shell,
}
