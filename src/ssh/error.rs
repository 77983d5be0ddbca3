//! Error types for the remote session bridge.

use thiserror::Error;

/// Errors raised while connecting to or talking with a remote host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SshError {
    /// Raised when the private key file cannot be read.
    #[error("failed to read SSH key {path}: {message}")]
    KeyRead {
        /// Key path.
        path: String,
        /// I/O error text.
        message: String,
    },
    /// Raised when the key is not a supported private key.
    #[error("failed to parse SSH key {path}: {message}")]
    KeyDecode {
        /// Key path.
        path: String,
        /// Decoder message.
        message: String,
    },
    /// Raised when an encrypted key cannot be opened with the passphrase.
    #[error("failed to decrypt SSH key {path}: wrong passphrase?")]
    KeyDecryptionFailed {
        /// Key path.
        path: String,
    },
    /// Raised when the passphrase prompt itself fails.
    #[error("failed to read passphrase: {message}")]
    PassphrasePrompt {
        /// Prompt error text.
        message: String,
    },
    /// Raised when the known-hosts file exists but cannot be checked.
    #[error("failed to check known hosts file {path}: {message}")]
    KnownHosts {
        /// Known-hosts path.
        path: String,
        /// Underlying error text.
        message: String,
    },
    /// Raised when the host key is unknown or differs from the recorded key.
    #[error(
        "host key verification failed for {host} using {path}; connect once with plain \
         `ssh` to review and accept the host key"
    )]
    HostKeyVerificationFailed {
        /// Remote host.
        host: String,
        /// Known-hosts path consulted.
        path: String,
    },
    /// Raised when the TCP/SSH handshake exceeds the dial timeout.
    #[error("timed out after {seconds}s connecting to {host}:{port}")]
    ConnectTimeout {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Timeout in seconds.
        seconds: u64,
    },
    /// Raised when the host actively refused or reset the connection.
    #[error("connection to {host}:{port} refused: {message}")]
    ConnectionRefused {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Underlying error text.
        message: String,
    },
    /// Raised when the server rejects the public key.
    #[error("authentication failed for {user} with key {key_path}; is the key registered?")]
    AuthenticationFailed {
        /// Remote user.
        user: String,
        /// Key path used.
        key_path: String,
    },
    /// Raised for other SSH protocol failures.
    #[error("SSH transport error: {message}")]
    Transport {
        /// Underlying error text.
        message: String,
    },
    /// Raised when the peer closed the session. Treated as a normal end of an
    /// interactive shell.
    #[error("session closed")]
    SessionClosed,
    /// Raised when the local terminal cannot be configured.
    #[error("terminal error: {message}")]
    Terminal {
        /// Underlying error text.
        message: String,
    },
    /// Raised when a remote command exits non-zero.
    #[error("remote command `{command}` exited with status {exit_code}{}", stderr_suffix(.stderr))]
    RemoteCommandFailed {
        /// Command that was run.
        command: String,
        /// Exit status reported by the server.
        exit_code: u32,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when a non-interactive command ends without an exit status.
    #[error("remote command `{command}` ended without an exit status")]
    MissingExitStatus {
        /// Command that was run.
        command: String,
    },
    /// Raised when the remote `scp` receiver reports an error.
    #[error("scp to {destination} failed: {message}")]
    Scp {
        /// Remote destination path.
        destination: String,
        /// Message from the receiver.
        message: String,
    },
    /// Raised for local I/O failures while bridging streams or reading files.
    #[error("I/O error on {context}: {message}")]
    Io {
        /// What was being read or written.
        context: String,
        /// Underlying error text.
        message: String,
    },
}

impl SshError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let label = context.into();
        move |err| Self::Io {
            context: label,
            message: err.to_string(),
        }
    }
}

impl From<russh::Error> for SshError {
    fn from(value: russh::Error) -> Self {
        match value {
            russh::Error::Disconnect
            | russh::Error::HUP
            | russh::Error::SendError
            | russh::Error::WrongChannel => Self::SessionClosed,
            russh::Error::IO(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                Self::SessionClosed
            }
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io;

    #[rstest]
    #[case(russh::Error::Disconnect)]
    #[case(russh::Error::HUP)]
    #[case(russh::Error::SendError)]
    #[case(russh::Error::WrongChannel)]
    #[case(russh::Error::IO(io::Error::from(io::ErrorKind::BrokenPipe)))]
    fn remote_close_ends_the_session(#[case] err: russh::Error) {
        assert!(matches!(SshError::from(err), SshError::SessionClosed));
    }

    #[rstest]
    #[case(russh::Error::ConnectionTimeout)]
    #[case(russh::Error::IO(io::Error::from(io::ErrorKind::AddrNotAvailable)))]
    fn other_russh_errors_are_transport_errors(#[case] err: russh::Error) {
        assert!(matches!(SshError::from(err), SshError::Transport { .. }));
    }
}
