//! Local subprocess execution behind a seam, so secret lookups can be
//! scripted in tests.

use std::ffi::OsString;
use std::process::Command;

use super::ProvisionError;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ProvisionError>;
}

/// Real command runner that shells out to the host operating system.
/// The child inherits the environment, including `BW_SESSION`.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ProvisionError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| ProvisionError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = ProcessCommandRunner
            .run("lambda-cli-definitely-not-installed", &[])
            .expect_err("program does not exist");
        assert!(matches!(err, ProvisionError::Spawn { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn captures_exit_code_and_streams() {
        let output = ProcessCommandRunner
            .run(
                "sh",
                &[
                    OsString::from("-c"),
                    OsString::from("printf out; printf err >&2; exit 3"),
                ],
            )
            .expect("sh runs");
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert!(!output.is_success());
    }
}
