//! Secret retrieval through the Bitwarden CLI.

use std::ffi::OsString;

use tracing::{debug, info};

use super::ProvisionError;
use super::runner::CommandRunner;

/// Environment variable holding an unlocked Bitwarden session.
pub const VAULT_SESSION_VAR: &str = "BW_SESSION";

const BITWARDEN: &str = "bw";

/// Fails with [`ProvisionError::VaultLocked`] unless a session token is set.
///
/// # Errors
///
/// Returns [`ProvisionError::VaultLocked`] when `session` is unset or blank.
pub fn require_unlocked_vault(session: Option<&str>) -> Result<(), ProvisionError> {
    match session.map(str::trim) {
        Some(token) if !token.is_empty() => Ok(()),
        _ => Err(ProvisionError::VaultLocked),
    }
}

/// Reads the notes field of the vault item `note`, trimmed.
///
/// # Errors
///
/// Returns [`ProvisionError::SecretLookup`] when `bw` cannot run or exits
/// non-zero, and [`ProvisionError::EmptySecret`] when the note is blank.
pub fn fetch_note(runner: &dyn CommandRunner, note: &str) -> Result<String, ProvisionError> {
    debug!(note, "reading secret from vault");
    let args = [
        OsString::from("get"),
        OsString::from("notes"),
        OsString::from(note),
    ];
    let output = runner
        .run(BITWARDEN, &args)
        .map_err(|err| ProvisionError::SecretLookup {
            note: note.to_owned(),
            message: err.to_string(),
        })?;
    if !output.is_success() {
        let stderr = output.stderr.trim();
        return Err(ProvisionError::SecretLookup {
            note: note.to_owned(),
            message: if stderr.is_empty() {
                format!("bw exited with status {:?}", output.code)
            } else {
                stderr.to_owned()
            },
        });
    }
    let secret = output.stdout.trim();
    if secret.is_empty() {
        return Err(ProvisionError::EmptySecret {
            note: note.to_owned(),
        });
    }
    info!(note, "secret retrieved");
    Ok(secret.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;
    use rstest::rstest;

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("  "))]
    fn locked_vault_is_rejected(#[case] session: Option<&str>) {
        assert_eq!(
            require_unlocked_vault(session),
            Err(ProvisionError::VaultLocked)
        );
    }

    #[test]
    fn unlocked_vault_passes() {
        assert_eq!(require_unlocked_vault(Some("abc123")), Ok(()));
    }

    #[test]
    fn note_is_trimmed_and_lookup_recorded() {
        let runner = ScriptedRunner::new();
        runner.push_stdout("ghp_token\n");

        let secret = fetch_note(&runner, "lambda-github-token").expect("secret");

        assert_eq!(secret, "ghp_token");
        let invocations = runner.invocations();
        assert_eq!(
            invocations.first().map(|call| call.command_string()),
            Some("bw get notes lambda-github-token".to_owned())
        );
    }

    #[test]
    fn blank_note_is_an_error() {
        let runner = ScriptedRunner::new();
        runner.push_stdout("  \n");

        assert_eq!(
            fetch_note(&runner, "gpg"),
            Err(ProvisionError::EmptySecret {
                note: "gpg".to_owned()
            })
        );
    }

    #[test]
    fn failing_bw_surfaces_stderr() {
        let runner = ScriptedRunner::new();
        runner.push_failure(1, "Not found.\n");

        assert_eq!(
            fetch_note(&runner, "missing"),
            Err(ProvisionError::SecretLookup {
                note: "missing".to_owned(),
                message: "Not found.".to_owned(),
            })
        );
    }
}
