//! Binary entry point for the `lambda` CLI.

mod cli;

use std::env;
use std::error::Error as _;
use std::io::{self, Write};
use std::process;

use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use thiserror::Error;
use tracing::{debug, info};

use cli::{Cli, Command, CreateCommand, GlobalArgs, SetupCommand};
use lambda_cli::config::ConfigOverrides;
use lambda_cli::logging::{self, Verbosity};
use lambda_cli::provision::{
    ProcessCommandRunner, SetupSettings, VAULT_SESSION_VAR, setup_password_present,
};
use lambda_cli::render::{
    CreatedSummary, OutputFormatError, render_created, render_instances, render_operation,
    render_quota_reached,
};
use lambda_cli::ssh::{self, CrosstermTerminal, RusshConnector, TerminalPrompt};
use lambda_cli::{
    ApiError, ConfigError, CreateOutcome, CreateRequest, HttpLambdaApi, InstanceSpec,
    LambdaConfig, LifecycleError, Orchestrator, OutputFormat, ProvisionError, SetupOptions,
    SetupWorkflow, SpecError, SshError,
};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    OutputFormat(#[from] OutputFormatError),
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Ssh(#[from] SshError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let Cli { global, command } = cli;
    let mut stdout = io::stdout();
    match command {
        Command::Completion(args) => {
            write_completion(args.shell, &mut stdout);
            Ok(0)
        }
        Command::Create(args) => {
            let context = Context::load(global)?;
            create(&context, args, &mut stdout).await
        }
        Command::Connect(args) => {
            let context = Context::load(global)?;
            connect(&context, &args.identifier).await
        }
        Command::Setup(args) => {
            let context = Context::load(global)?;
            setup(&context, &args, &mut stdout).await
        }
        Command::Delete(args) => {
            let context = Context::load(global)?;
            let outcome = context.orchestrator.terminate(&args.identifier).await?;
            render_operation(&mut stdout, &outcome, context.format)?;
            Ok(0)
        }
        Command::Restart(args) => {
            let context = Context::load(global)?;
            let outcome = context.orchestrator.restart(&args.identifier).await?;
            render_operation(&mut stdout, &outcome, context.format)?;
            Ok(0)
        }
        Command::List(args) => {
            let context = Context::load(global)?;
            let instances = context.orchestrator.list().await?;
            render_instances(&mut stdout, &instances, context.format, args.all)?;
            Ok(0)
        }
    }
}

/// State shared by every command that talks to the API.
struct Context {
    format: OutputFormat,
    config: LambdaConfig,
    orchestrator: Orchestrator<HttpLambdaApi>,
}

impl Context {
    fn load(global: GlobalArgs) -> Result<Self, CliError> {
        let format: OutputFormat = global.output.parse()?;
        if let Err(err) = logging::init(Verbosity {
            verbose: global.verbose,
            quiet: global.quiet,
        }) {
            writeln!(io::stderr(), "warning: logging unavailable: {err}").ok();
        }

        let mut config = LambdaConfig::load_without_cli_args()?;
        config.apply_overrides(&ConfigOverrides {
            api_key: global.api_key,
            ssh_key_path: global.ssh_key_path,
            ssh_key_name: global.ssh_key_name,
        });
        config.validate()?;

        let api = HttpLambdaApi::new(config.api_url.trim(), config.api_key()?)?;
        let orchestrator = Orchestrator::new(api, config.lifecycle_settings());
        Ok(Self {
            format,
            config,
            orchestrator,
        })
    }
}

async fn create(
    context: &Context,
    args: CreateCommand,
    out: &mut dyn Write,
) -> Result<i32, CliError> {
    let spec = InstanceSpec::parse(&args.spec)?;
    context.config.ssh_key_name()?;
    debug!(
        count = spec.gpu_count(),
        gpu_type = spec.gpu_type(),
        "parsed instance specification"
    );

    let request = CreateRequest::new(args.spec)
        .with_region(args.region)
        .with_prefix(args.prefix)
        .with_max_per_type(args.max_instances_per_type);
    match context.orchestrator.create(&request).await? {
        CreateOutcome::Created {
            instance,
            filesystem,
        } => {
            let summary = CreatedSummary {
                instance: &instance,
                filesystem: &filesystem,
                remote_user: context.config.remote_user.trim(),
                suggest_setup: setup_password_present(),
            };
            render_created(out, &summary, context.format)?;
        }
        CreateOutcome::QuotaReached {
            family,
            limit,
            existing,
        } => render_quota_reached(out, &family, limit, &existing, context.format)?,
    }
    Ok(0)
}

async fn connect(context: &Context, identifier: &str) -> Result<i32, CliError> {
    let instance = context.orchestrator.resolve_ready(identifier).await?;
    let host = instance
        .usable_ip()
        .ok_or_else(|| LifecycleError::NotReady {
            identifier: identifier.to_owned(),
            status: instance.status,
        })?;
    let settings = context.config.ssh_settings()?;
    info!(name = %instance.name, ip = host, "connecting");

    let mut session = ssh::connect(host, &settings, &TerminalPrompt).await?;
    let outcome = session.interactive(&mut CrosstermTerminal).await;
    session.close().await;
    if let Some(status) = outcome? {
        debug!(status, "remote shell exited");
    }
    Ok(0)
}

async fn setup(
    context: &Context,
    args: &SetupCommand,
    out: &mut dyn Write,
) -> Result<i32, CliError> {
    let settings = SetupSettings::from_config(&context.config, env::var(VAULT_SESSION_VAR).ok());
    let workflow = SetupWorkflow::new(ProcessCommandRunner, settings);
    let connector = RusshConnector::new(context.config.ssh_settings()?, TerminalPrompt);
    let options = SetupOptions {
        dix: args.dix,
        force: args.force,
    };

    let mut stderr = io::stderr();
    let instance = workflow
        .run(
            &context.orchestrator,
            &connector,
            &args.identifier,
            options,
            out,
            &mut stderr,
        )
        .await?;
    writeln!(
        out,
        "Setup complete. Connect with: lambda connect {}",
        instance.name
    )?;
    Ok(0)
}

fn write_completion(shell: Shell, out: &mut dyn Write) {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "lambda", out);
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

/// Writes `err` followed by any cause whose text it does not already carry.
fn write_error(mut target: impl Write, err: &CliError) {
    let mut rendered = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        let text = inner.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        cause = inner.source();
    }
    writeln!(target, "error: {rendered}").ok();
}
