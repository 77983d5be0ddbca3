//! Private key loading with on-demand passphrase prompting.

use camino::Utf8Path;
use inquire::{Password, PasswordDisplayMode};
use russh_keys::key::KeyPair;
use tracing::debug;

use super::SshError;
use crate::paths;

const LEGACY_PEM_ENCRYPTED: &str = "Proc-Type: 4,ENCRYPTED";
const PKCS8_ENCRYPTED: &str = "BEGIN ENCRYPTED PRIVATE KEY";

/// Whether a private key needs a passphrase before it can be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyProtection {
    /// Usable as-is.
    Plain,
    /// Encrypted with a passphrase.
    Encrypted,
}

/// Inspects key material without decrypting it.
///
/// OpenSSH-format keys are checked through their cipher header; legacy PEM
/// and PKCS#8 keys through their armour.
#[must_use]
pub fn key_protection(contents: &str) -> KeyProtection {
    if let Ok(key) = ssh_key::PrivateKey::from_openssh(contents) {
        return if key.is_encrypted() {
            KeyProtection::Encrypted
        } else {
            KeyProtection::Plain
        };
    }
    if contents.contains(LEGACY_PEM_ENCRYPTED) || contents.contains(PKCS8_ENCRYPTED) {
        KeyProtection::Encrypted
    } else {
        KeyProtection::Plain
    }
}

/// Source of passphrases for encrypted keys.
pub trait PassphrasePrompt: Send + Sync {
    /// Asks for the passphrase protecting `key_path`.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::PassphrasePrompt`] when no passphrase can be read.
    fn passphrase(&self, key_path: &Utf8Path) -> Result<String, SshError>;
}

/// Prompts on the controlling terminal without echo.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompt;

impl PassphrasePrompt for TerminalPrompt {
    fn passphrase(&self, key_path: &Utf8Path) -> Result<String, SshError> {
        let message = format!("Enter passphrase for {key_path}:");
        Password::new(&message)
            .without_confirmation()
            .with_display_mode(PasswordDisplayMode::Hidden)
            .prompt()
            .map_err(|err| SshError::PassphrasePrompt {
                message: err.to_string(),
            })
    }
}

/// Loads the private key at `path`, prompting once when it is encrypted.
///
/// # Errors
///
/// Returns [`SshError::KeyRead`] when the file cannot be read,
/// [`SshError::KeyDecode`] for unparseable plain keys, and
/// [`SshError::KeyDecryptionFailed`] when the passphrase does not open the
/// key.
pub fn load_private_key(
    path: &Utf8Path,
    prompt: &dyn PassphrasePrompt,
) -> Result<KeyPair, SshError> {
    let contents = paths::read_to_string(path).map_err(|err| SshError::KeyRead {
        path: path.to_string(),
        message: err.to_string(),
    })?;

    match key_protection(&contents) {
        KeyProtection::Plain => {
            debug!(key = %path, "loading unencrypted key");
            russh_keys::decode_secret_key(&contents, None).map_err(|err| SshError::KeyDecode {
                path: path.to_string(),
                message: err.to_string(),
            })
        }
        KeyProtection::Encrypted => {
            debug!(key = %path, "key is encrypted; prompting for passphrase");
            let passphrase = prompt.passphrase(path)?;
            russh_keys::decode_secret_key(&contents, Some(&passphrase)).map_err(|_| {
                SshError::KeyDecryptionFailed {
                    path: path.to_string(),
                }
            })
        }
    }
}
