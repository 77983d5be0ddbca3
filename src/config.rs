//! Configuration loading via `ortho-config`.

use std::env;
use std::ffi::OsString;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::lifecycle::LifecycleSettings;
use crate::ssh::SshSettings;

/// Tool configuration derived from defaults, `lambda.toml`, `LAMBDA_*`
/// environment variables, and the global command-line flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "LAMBDA")]
pub struct LambdaConfig {
    /// Bearer token for the cloud API. Required for every API call.
    pub api_key: Option<String>,
    /// Base URL of the cloud API.
    #[ortho_config(default = "https://cloud.lambda.ai/api/v1".to_owned())]
    pub api_url: String,
    /// Private key used to reach instances. `~/` is expanded.
    #[ortho_config(default = "~/.ssh/id_ed25519".to_owned())]
    pub ssh_key_path: String,
    /// Name of the SSH key registered with the provider; installed on new
    /// instances.
    pub ssh_key_name: Option<String>,
    /// Known-hosts store checked when connecting.
    #[ortho_config(default = "~/.ssh/known_hosts".to_owned())]
    pub known_hosts_path: String,
    /// Login user on instances.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub remote_user: String,
    /// Region preferred when the request names none.
    #[ortho_config(default = "us-south-3".to_owned())]
    pub default_region: String,
    /// Prefix of the per-region filesystem name.
    #[ortho_config(default = "lambda".to_owned())]
    pub filesystem_prefix: String,
    /// Bitwarden note holding the provisioning token.
    #[ortho_config(default = "lambda-github-token".to_owned())]
    pub secret_note: String,
    /// Bitwarden note holding the GPG passphrase, fetched for `--dix` setups.
    pub gpg_secret_note: Option<String>,
    /// Password set for the remote user during setup.
    pub remote_password: Option<String>,
}

/// Values supplied through the global command-line flags. Each one, when
/// present, replaces whatever the other sources produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--api-key`.
    pub api_key: Option<String>,
    /// `--ssh-key-path`.
    pub ssh_key_path: Option<String>,
    /// `--ssh-key-name`.
    pub ssh_key_name: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [lambda] in lambda.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const API_KEY: FieldMetadata = FieldMetadata::new("API key", "LAMBDA_API_KEY", "api_key");
const SSH_KEY_NAME: FieldMetadata =
    FieldMetadata::new("SSH key name", "LAMBDA_SSH_KEY_NAME", "ssh_key_name");

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

impl LambdaConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables; the
    /// binary applies its own flags afterwards through
    /// [`Self::apply_overrides`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("lambda")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Replaces fields with the flags that were given.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(api_key) = &overrides.api_key {
            self.api_key = Some(api_key.clone());
        }
        if let Some(path) = &overrides.ssh_key_path {
            self.ssh_key_path.clone_from(path);
        }
        if let Some(name) = &overrides.ssh_key_name {
            self.ssh_key_name = Some(name.clone());
        }
    }

    /// The API key, required before any API call.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming `LAMBDA_API_KEY` when
    /// the key is unset or blank.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        non_blank(self.api_key.as_deref()).ok_or_else(|| API_KEY.missing())
    }

    /// The provider-registered SSH key name, required to launch.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming `LAMBDA_SSH_KEY_NAME`
    /// when the name is unset or blank.
    pub fn ssh_key_name(&self) -> Result<&str, ConfigError> {
        non_blank(self.ssh_key_name.as_deref()).ok_or_else(|| SSH_KEY_NAME.missing())
    }

    /// Performs semantic validation on the fields that carry defaults. Error
    /// messages include guidance on how to provide missing values via
    /// environment variables or configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (&self.api_url, FieldMetadata::new("API URL", "LAMBDA_API_URL", "api_url")),
            (
                &self.ssh_key_path,
                FieldMetadata::new("SSH key path", "LAMBDA_SSH_KEY_PATH", "ssh_key_path"),
            ),
            (
                &self.known_hosts_path,
                FieldMetadata::new(
                    "known-hosts path",
                    "LAMBDA_KNOWN_HOSTS_PATH",
                    "known_hosts_path",
                ),
            ),
            (
                &self.remote_user,
                FieldMetadata::new("remote user", "LAMBDA_REMOTE_USER", "remote_user"),
            ),
            (
                &self.default_region,
                FieldMetadata::new("default region", "LAMBDA_DEFAULT_REGION", "default_region"),
            ),
            (
                &self.filesystem_prefix,
                FieldMetadata::new(
                    "filesystem prefix",
                    "LAMBDA_FILESYSTEM_PREFIX",
                    "filesystem_prefix",
                ),
            ),
            (
                &self.secret_note,
                FieldMetadata::new("secret note", "LAMBDA_SECRET_NOTE", "secret_note"),
            ),
        ];
        for (value, metadata) in &required {
            if value.trim().is_empty() {
                return Err(metadata.missing());
            }
        }
        Ok(())
    }

    /// Settings handed to the lifecycle orchestrator. The SSH key name is
    /// left empty when unset; [`Self::ssh_key_name`] guards launches.
    #[must_use]
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            default_region: self.default_region.trim().to_owned(),
            filesystem_prefix: self.filesystem_prefix.trim().to_owned(),
            ssh_key_name: non_blank(self.ssh_key_name.as_deref())
                .unwrap_or_default()
                .to_owned(),
        }
    }

    /// Connection settings with key and known-hosts paths expanded.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPath`] when a path cannot be expanded.
    pub fn ssh_settings(&self) -> Result<SshSettings, ConfigError> {
        let key_path = expand_tilde(&self.ssh_key_path)?;
        let known_hosts = expand_tilde(&self.known_hosts_path)?;
        Ok(SshSettings::new(key_path, known_hosts).with_user(self.remote_user.trim()))
    }
}

/// Expands a leading `~` to the current user's home directory.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPath`] for an empty path, or when the path
/// starts with `~` and `HOME` is unset or not UTF-8.
pub fn expand_tilde(path: &str) -> Result<Utf8PathBuf, ConfigError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidPath {
            path: path.to_owned(),
            message: "path cannot be empty".to_owned(),
        });
    }
    let rest = match trimmed {
        "~" => "",
        _ => match trimmed.strip_prefix("~/") {
            Some(rest) => rest,
            None => return Ok(Utf8PathBuf::from(trimmed)),
        },
    };
    let home = env::var("HOME").map_err(|err| ConfigError::InvalidPath {
        path: path.to_owned(),
        message: format!("cannot resolve home directory: {err}"),
    })?;
    let home_dir = Utf8PathBuf::from(home);
    Ok(if rest.is_empty() {
        home_dir
    } else {
        home_dir.join(rest)
    })
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("{0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// A configured path could not be resolved.
    #[error("invalid path '{path}': {message}")]
    InvalidPath {
        /// Path as configured.
        path: String,
        /// Why it could not be used.
        message: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
