//! Remote provisioning for `lambda setup`.
//!
//! The workflow resolves a ready instance, pulls secrets from the Bitwarden
//! CLI, renders the setup script, optionally stages the extended profile,
//! then pushes and runs the script over one SSH session.

mod runner;
mod secrets;
mod staging;
mod template;

use std::env;
use std::io::Write;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::api::{Instance, LambdaApi};
use crate::config::LambdaConfig;
use crate::lifecycle::{LifecycleError, Orchestrator};
use crate::ssh::{Connector, RemoteSession, SshError, Transport};

pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use secrets::{VAULT_SESSION_VAR, fetch_note, require_unlocked_vault};
pub use staging::{
    SETUP_PASSWORD_FILE, StagedItem, StagedKind, setup_password_present, stage_profile,
};
pub use template::{ScriptParams, render_setup_script};

const SCRIPT_MODE: u32 = 0o755;

/// Errors raised while provisioning an instance.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// No unlocked Bitwarden session is available.
    #[error("bitwarden vault is locked: run 'bw unlock' and export BW_SESSION")]
    VaultLocked,
    /// A local helper program could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program name.
        program: String,
        /// Operating system error.
        message: String,
    },
    /// The vault lookup failed.
    #[error("failed to read '{note}' from bitwarden: {message}")]
    SecretLookup {
        /// Vault item name.
        note: String,
        /// Helper diagnostics.
        message: String,
    },
    /// The vault item exists but its notes are blank.
    #[error("bitwarden note '{note}' is empty")]
    EmptySecret {
        /// Vault item name.
        note: String,
    },
    /// The setup script could not be rendered.
    #[error("failed to render setup script: {message}")]
    Template {
        /// Template engine diagnostics.
        message: String,
    },
    /// Connection, copy, or remote execution failed.
    #[error(transparent)]
    Ssh(#[from] SshError),
    /// The target instance could not be resolved.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Flags of `lambda setup`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetupOptions {
    /// Stage the extended profile and fetch the GPG passphrase.
    pub dix: bool,
    /// Repeat setup on a host that already completed it.
    pub force: bool,
}

/// Configuration the workflow needs, detached from the loader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetupSettings {
    /// Vault note holding the GitHub token.
    pub secret_note: String,
    /// Vault note holding the GPG passphrase.
    pub gpg_secret_note: Option<String>,
    /// Login user on the instance.
    pub remote_user: String,
    /// Password to set for the login user.
    pub remote_password: Option<String>,
    /// Value of `BW_SESSION`.
    pub vault_session: Option<String>,
}

impl SetupSettings {
    /// Builds settings from `config` and the current `BW_SESSION`.
    #[must_use]
    pub fn from_config(config: &LambdaConfig, vault_session: Option<String>) -> Self {
        Self {
            secret_note: config.secret_note.trim().to_owned(),
            gpg_secret_note: config
                .gpg_secret_note
                .as_deref()
                .map(str::trim)
                .filter(|note| !note.is_empty())
                .map(str::to_owned),
            remote_user: config.remote_user.trim().to_owned(),
            remote_password: config
                .remote_password
                .clone()
                .filter(|password| !password.is_empty()),
            vault_session,
        }
    }
}

/// Everything decided locally before touching the instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetupPlan {
    /// Instance label used for the script path and `INSTANCE_ID`.
    pub instance_label: String,
    /// Rendered script.
    pub script: String,
    /// Where the script is written on the instance.
    pub script_path: String,
    /// Files copied before the script runs.
    pub staged: Vec<StagedItem>,
}

impl SetupPlan {
    /// Command that runs the script.
    #[must_use]
    pub fn run_command(&self) -> String {
        format!(
            "INSTANCE_ID={} bash {}",
            shell_escape::unix::escape(self.instance_label.as_str().into()),
            shell_escape::unix::escape(self.script_path.as_str().into())
        )
    }

    /// Command that removes the script afterwards.
    #[must_use]
    pub fn cleanup_command(&self) -> String {
        format!(
            "rm -f {}",
            shell_escape::unix::escape(self.script_path.as_str().into())
        )
    }
}

/// Reads an environment variable for profile overrides.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Drives `lambda setup`.
pub struct SetupWorkflow<R> {
    runner: R,
    settings: SetupSettings,
    lookup: EnvLookup,
}

impl<R: CommandRunner> SetupWorkflow<R> {
    /// Workflow reading profile overrides from the process environment.
    #[must_use]
    pub fn new(runner: R, settings: SetupSettings) -> Self {
        Self {
            runner,
            settings,
            lookup: Arc::new(|name| env::var(name).ok()),
        }
    }

    /// Replaces the environment lookup used for profile overrides.
    #[must_use]
    pub fn with_env_lookup(mut self, lookup: EnvLookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Fetches secrets, renders the script, and resolves staged files.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::VaultLocked`] without a vault session, the
    /// lookup errors from [`fetch_note`], and [`ProvisionError::Template`].
    pub fn prepare(
        &self,
        instance: &Instance,
        options: SetupOptions,
    ) -> Result<SetupPlan, ProvisionError> {
        require_unlocked_vault(self.settings.vault_session.as_deref())?;
        let gh_token = fetch_note(&self.runner, &self.settings.secret_note)?;
        let gpg_passphrase = if options.dix {
            match &self.settings.gpg_secret_note {
                Some(note) => Some(fetch_note(&self.runner, note)?),
                None => {
                    warn!("no GPG secret note configured; GPG key import is skipped");
                    None
                }
            }
        } else {
            None
        };

        let script = render_setup_script(&ScriptParams {
            remote_user: self.settings.remote_user.clone(),
            remote_password: self.settings.remote_password.clone(),
            gh_token,
            gpg_passphrase,
            dix: options.dix,
            force: options.force,
        })?;
        let staged = if options.dix {
            stage_profile(|name| (self.lookup)(name))
        } else {
            Vec::new()
        };

        let instance_label = if instance.name.is_empty() {
            instance.id.clone()
        } else {
            instance.name.clone()
        };
        Ok(SetupPlan {
            script_path: format!("/tmp/setup_remote_{instance_label}.sh"),
            instance_label,
            script,
            staged,
        })
    }

    /// Copies staged files and the script, runs it, then removes it.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Ssh`] when a copy or remote command fails.
    pub async fn apply<T: Transport>(
        &self,
        session: &mut RemoteSession<T>,
        plan: &SetupPlan,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<(), ProvisionError> {
        for item in &plan.staged {
            match item.kind {
                StagedKind::File => session.push_file(&item.local, &item.remote).await?,
                StagedKind::Directory => session.push_dir(&item.local, &item.remote).await?,
            }
        }

        session
            .push_bytes(plan.script.as_bytes(), &plan.script_path, SCRIPT_MODE)
            .await?;
        info!(host = session.host(), "running setup script; this may take a while");
        session.run(&plan.run_command(), stdout, stderr).await?;
        session.run_captured(&plan.cleanup_command()).await?;
        Ok(())
    }

    /// Resolves `identifier`, connects, and provisions the instance.
    ///
    /// The SSH session is closed on every path once it is open.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] from any step.
    pub async fn run<A, C>(
        &self,
        orchestrator: &Orchestrator<A>,
        connector: &C,
        identifier: &str,
        options: SetupOptions,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<Instance, ProvisionError>
    where
        A: LambdaApi,
        C: Connector,
    {
        require_unlocked_vault(self.settings.vault_session.as_deref())?;
        let instance = orchestrator.resolve_ready(identifier).await?;
        let host = instance
            .usable_ip()
            .ok_or_else(|| LifecycleError::NotReady {
                identifier: identifier.to_owned(),
                status: instance.status,
            })?
            .to_owned();
        info!(name = %instance.name, id = %instance.id, ip = %host, "provisioning instance");

        let plan = self.prepare(&instance, options)?;
        let mut session = connector.connect(&host).await?;
        let outcome = self.apply(&mut session, &plan, stdout, stderr).await;
        session.close().await;
        outcome?;

        info!(name = %instance.name, "setup finished; next: lambda connect {}", instance.name);
        Ok(instance)
    }
}

#[cfg(test)]
mod tests;
