//! Diagnostic logging setup.
//!
//! Logs go to stderr so that tables and JSON on stdout stay machine
//! readable.

use std::io;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;

/// How chatty the logger should be when `RUST_LOG` is unset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Verbosity {
    /// Number of `-v` flags.
    pub verbose: u8,
    /// `-q` was given.
    pub quiet: bool,
}

impl Verbosity {
    /// Filter directive for this verbosity.
    #[must_use]
    pub const fn directive(self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "lambda=debug,lambda_cli=debug,info",
            _ => "trace",
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over
/// `verbosity`.
///
/// # Errors
///
/// Returns [`TryInitError`] when a global subscriber is already installed.
pub fn init(verbosity: Verbosity) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
}
