//! Dialling and authenticating an SSH connection.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use russh::client;
use tokio::time::timeout;
use tracing::{debug, info};

use super::channel::{ClientHandler, RejectionSlot, RusshTransport, SshFuture, Transport, take_rejection};
use super::keys::{PassphrasePrompt, load_private_key};
use super::known_hosts::HostKeyPolicy;
use super::session::RemoteSession;
use super::SshError;

/// Default dial timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;
/// Default login user on provider images.
pub const DEFAULT_USER: &str = "ubuntu";

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEPALIVE_MAX: usize = 3;

/// Where and how to connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshSettings {
    /// Login user.
    pub user: String,
    /// TCP port.
    pub port: u16,
    /// Private key file.
    pub key_path: Utf8PathBuf,
    /// Known-hosts file; when absent every host key is accepted.
    pub known_hosts_path: Utf8PathBuf,
    /// Dial timeout.
    pub connect_timeout: Duration,
}

impl SshSettings {
    /// Settings with the default user, port, and timeout.
    #[must_use]
    pub fn new(key_path: Utf8PathBuf, known_hosts_path: Utf8PathBuf) -> Self {
        Self {
            user: DEFAULT_USER.to_owned(),
            port: DEFAULT_PORT,
            key_path,
            known_hosts_path,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Overrides the login user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Host key policy for these settings: verify against the known-hosts
    /// file when it exists.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::KnownHosts`] when the file cannot be checked.
    pub fn host_key_policy(&self) -> Result<HostKeyPolicy, SshError> {
        HostKeyPolicy::for_path(&self.known_hosts_path)
    }
}

/// Loads the key, dials `host`, verifies its key, and authenticates.
///
/// # Errors
///
/// Returns [`SshError::ConnectTimeout`], [`SshError::ConnectionRefused`],
/// [`SshError::HostKeyVerificationFailed`], or
/// [`SshError::AuthenticationFailed`] for the matching failure, and the key
/// loading errors from [`load_private_key`].
pub async fn connect(
    host: &str,
    settings: &SshSettings,
    prompt: &dyn PassphrasePrompt,
) -> Result<RemoteSession<RusshTransport>, SshError> {
    let key = load_private_key(&settings.key_path, prompt)?;
    let policy = settings.host_key_policy()?;
    let rejection: RejectionSlot = Arc::new(Mutex::new(None));
    let handler = ClientHandler::new(
        host.to_owned(),
        settings.port,
        policy,
        Arc::clone(&rejection),
    );
    let config = Arc::new(client::Config {
        keepalive_interval: Some(KEEPALIVE_INTERVAL),
        keepalive_max: KEEPALIVE_MAX,
        ..Default::default()
    });

    debug!(host, port = settings.port, "dialling");
    let dial = client::connect(config, (host, settings.port), handler);
    let mut handle = match timeout(settings.connect_timeout, dial).await {
        Err(_) => {
            return Err(SshError::ConnectTimeout {
                host: host.to_owned(),
                port: settings.port,
                seconds: settings.connect_timeout.as_secs(),
            });
        }
        Ok(Err(err)) => {
            return Err(take_rejection(&rejection)
                .unwrap_or_else(|| classify_dial_error(host, settings.port, err)));
        }
        Ok(Ok(handle)) => handle,
    };

    let authenticated = handle
        .authenticate_publickey(settings.user.as_str(), Arc::new(key))
        .await?;
    if !authenticated {
        return Err(SshError::AuthenticationFailed {
            user: settings.user.clone(),
            key_path: settings.key_path.to_string(),
        });
    }

    info!(host, user = %settings.user, "connected");
    Ok(RemoteSession::new(RusshTransport::new(handle), host))
}

/// Opens sessions to hosts. Lets workflows run against scripted transports.
pub trait Connector {
    /// Transport produced by a successful connection.
    type Transport: Transport;

    /// Connects to `host`.
    fn connect<'a>(&'a self, host: &'a str) -> SshFuture<'a, RemoteSession<Self::Transport>>;
}

/// [`Connector`] dialling real hosts with fixed settings.
pub struct RusshConnector<P> {
    settings: SshSettings,
    prompt: P,
}

impl<P: PassphrasePrompt> RusshConnector<P> {
    /// Connector using `settings`, asking `prompt` for key passphrases.
    #[must_use]
    pub const fn new(settings: SshSettings, prompt: P) -> Self {
        Self { settings, prompt }
    }
}

impl<P: PassphrasePrompt> Connector for RusshConnector<P> {
    type Transport = RusshTransport;

    fn connect<'a>(&'a self, host: &'a str) -> SshFuture<'a, RemoteSession<RusshTransport>> {
        Box::pin(connect(host, &self.settings, &self.prompt))
    }
}

fn classify_dial_error(host: &str, port: u16, err: russh::Error) -> SshError {
    match err {
        russh::Error::IO(io_err)
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
            ) =>
        {
            SshError::ConnectionRefused {
                host: host.to_owned(),
                port,
                message: io_err.to_string(),
            }
        }
        other => SshError::from(other),
    }
}
