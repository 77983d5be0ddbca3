//! Host key verification against an OpenSSH known-hosts file.

use camino::{Utf8Path, Utf8PathBuf};
use russh_keys::key::PublicKey;
use tracing::{debug, warn};

use super::SshError;
use crate::paths;

/// How server host keys are checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Require a matching entry in the given known-hosts file.
    Verify(Utf8PathBuf),
    /// Accept any key. Only chosen when no known-hosts file exists.
    AcceptAny,
}

impl HostKeyPolicy {
    /// Chooses [`Self::Verify`] when `path` exists, else [`Self::AcceptAny`].
    ///
    /// # Errors
    ///
    /// Returns [`SshError::KnownHosts`] when existence cannot be determined.
    pub fn for_path(path: &Utf8Path) -> Result<Self, SshError> {
        let present = paths::exists(path).map_err(|err| SshError::KnownHosts {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        if present {
            Ok(Self::Verify(path.to_path_buf()))
        } else {
            warn!(
                known_hosts = %path,
                "known hosts file not found; accepting any host key (INSECURE)"
            );
            Ok(Self::AcceptAny)
        }
    }
}

/// Checks `key` for `host:port` under `policy`.
///
/// # Errors
///
/// Returns [`SshError::HostKeyVerificationFailed`] when the host is unknown
/// or its key changed, and [`SshError::KnownHosts`] when the file cannot be
/// parsed.
pub fn verify_host_key(
    policy: &HostKeyPolicy,
    host: &str,
    port: u16,
    key: &PublicKey,
) -> Result<(), SshError> {
    let path = match policy {
        HostKeyPolicy::AcceptAny => {
            warn!(host, "skipping host key verification");
            return Ok(());
        }
        HostKeyPolicy::Verify(path) => path,
    };

    match russh_keys::check_known_hosts_path(host, port, key, path.as_std_path()) {
        Ok(true) => {
            debug!(host, known_hosts = %path, "host key verified");
            Ok(())
        }
        Ok(false) | Err(russh_keys::Error::KeyChanged { .. }) => {
            Err(SshError::HostKeyVerificationFailed {
                host: host.to_owned(),
                path: path.to_string(),
            })
        }
        Err(err) => Err(SshError::KnownHosts {
            path: path.to_string(),
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const PLAIN: &str = include_str!("../../tests/fixtures/id_ed25519_plain");
    const OTHER: &str = include_str!("../../tests/fixtures/id_ed25519_encrypted");
    const KNOWN_HOST: &str = "203.0.113.7";

    fn fixture_path(name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    #[fixture]
    fn policy() -> HostKeyPolicy {
        HostKeyPolicy::for_path(&fixture_path("known_hosts")).expect("policy")
    }

    fn public_key(secret: &str, passphrase: Option<&str>) -> PublicKey {
        russh_keys::decode_secret_key(secret, passphrase)
            .expect("decode key")
            .clone_public_key()
            .expect("public key")
    }

    #[rstest]
    fn recorded_key_is_accepted(policy: HostKeyPolicy) {
        assert!(matches!(policy, HostKeyPolicy::Verify(_)));
        verify_host_key(&policy, KNOWN_HOST, 22, &public_key(PLAIN, None)).expect("verified");
    }

    #[rstest]
    fn changed_key_is_rejected(policy: HostKeyPolicy) {
        let err = verify_host_key(
            &policy,
            KNOWN_HOST,
            22,
            &public_key(OTHER, Some("correct horse")),
        )
        .expect_err("mismatch");
        assert!(
            matches!(err, SshError::HostKeyVerificationFailed { .. }),
            "{err:?}"
        );
    }

    #[rstest]
    fn unknown_host_is_rejected(policy: HostKeyPolicy) {
        let err = verify_host_key(&policy, "198.51.100.99", 22, &public_key(PLAIN, None))
            .expect_err("unknown host");
        assert!(matches!(err, SshError::HostKeyVerificationFailed { .. }));
    }

    #[test]
    fn missing_file_accepts_any_key() {
        let policy = HostKeyPolicy::for_path(&fixture_path("no_such_known_hosts")).expect("policy");
        assert_eq!(policy, HostKeyPolicy::AcceptAny);
        verify_host_key(&policy, "198.51.100.99", 22, &public_key(PLAIN, None))
            .expect("accepted");
    }
}
