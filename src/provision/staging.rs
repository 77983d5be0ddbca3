//! Files copied to the instance by extended (`--dix`) setups.

use camino::Utf8PathBuf;
use tracing::{debug, warn};

use crate::config::expand_tilde;
use crate::paths::{self, EntryKind};

/// One profile entry: the environment variable overriding the local path,
/// the default local path, and the remote destination.
struct ProfileEntry {
    env_var: &'static str,
    default_local: &'static str,
    remote: &'static str,
}

const PROFILE: [ProfileEntry; 7] = [
    ProfileEntry {
        env_var: "SSH_KNOWN_HOSTS_FILE",
        default_local: "~/.ssh/known_hosts",
        remote: "~/.ssh/known_hosts",
    },
    ProfileEntry {
        env_var: "SSH_ID_FILE",
        default_local: "~/.ssh/id_ed25519-github",
        remote: "~/.ssh/id_ed25519-github",
    },
    ProfileEntry {
        env_var: "BW_PASS_FILE",
        default_local: "~/bw.pass",
        remote: "~/bw.pass",
    },
    ProfileEntry {
        env_var: "IPYTHON_DIRECTORY",
        default_local: "~/.ipython",
        remote: "~/.ipython",
    },
    ProfileEntry {
        env_var: "ATUIN_PASS_FILE",
        default_local: "~/atuin.key",
        remote: "~/atuin.key",
    },
    ProfileEntry {
        env_var: "YATAI_CONFIG_FILE",
        default_local: "~/.local/share/bentoml/.yatai.yaml",
        remote: "~/.yatai.yaml",
    },
    ProfileEntry {
        env_var: "GPG_PRIVATE_KEY_FILE",
        default_local: "~/gpg-private-lambdalabs.key",
        remote: "~/gpg-private-lambdalabs.key",
    },
];

/// Local file whose presence enables the `lambda setup` hint after create.
pub const SETUP_PASSWORD_FILE: &str = "~/bw.pass";

/// Whether a staged path is copied as a file or a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StagedKind {
    /// A regular file.
    File,
    /// A directory copied recursively.
    Directory,
}

/// A local path and where it goes on the instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedItem {
    /// Expanded local path.
    pub local: Utf8PathBuf,
    /// Remote destination, `~/`-relative paths allowed.
    pub remote: String,
    /// File or directory.
    pub kind: StagedKind,
}

/// Resolves the extended profile. `lookup` reads environment overrides.
/// Entries whose local path cannot be expanded or does not exist are
/// skipped with a warning.
#[must_use]
pub fn stage_profile(lookup: impl Fn(&str) -> Option<String>) -> Vec<StagedItem> {
    PROFILE
        .iter()
        .filter_map(|entry| {
            let configured = lookup(entry.env_var).unwrap_or_else(|| entry.default_local.to_owned());
            let local = match expand_tilde(&configured) {
                Ok(path) => path,
                Err(err) => {
                    warn!(path = %configured, error = %err, "cannot expand local path; skipping");
                    return None;
                }
            };
            let kind = match paths::entry_kind(&local) {
                Ok(EntryKind::File) => StagedKind::File,
                Ok(EntryKind::Directory) => StagedKind::Directory,
                Ok(EntryKind::Missing) => {
                    warn!(path = %local, "local file does not exist; skipping copy");
                    return None;
                }
                Err(err) => {
                    warn!(path = %local, error = %err, "cannot inspect local path; skipping");
                    return None;
                }
            };
            debug!(local = %local, remote = entry.remote, "staging");
            Some(StagedItem {
                local,
                remote: entry.remote.to_owned(),
                kind,
            })
        })
        .collect()
}

/// Whether the setup password file exists locally.
#[must_use]
pub fn setup_password_present() -> bool {
    expand_tilde(SETUP_PASSWORD_FILE)
        .ok()
        .and_then(|path| paths::exists(&path).ok())
        .unwrap_or(false)
}
