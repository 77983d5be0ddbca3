//! Rendering of the remote setup script.

use shell_escape::unix::escape;
use tera::{Context, Tera};

use super::ProvisionError;

const SETUP_TEMPLATE: &str = include_str!("setup_remote.sh.tera");

/// Values substituted into the setup script.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptParams {
    /// Login user on the instance.
    pub remote_user: String,
    /// Password to set for the user, when configured.
    pub remote_password: Option<String>,
    /// GitHub token fetched from the vault.
    pub gh_token: String,
    /// GPG passphrase, fetched only for extended setups.
    pub gpg_passphrase: Option<String>,
    /// Extended profile enabled.
    pub dix: bool,
    /// Repeat setup even when it already ran.
    pub force: bool,
}

fn quoted(value: &str) -> String {
    escape(value.into()).into_owned()
}

/// Renders the embedded setup script. Every string value is shell-quoted
/// before substitution.
///
/// # Errors
///
/// Returns [`ProvisionError::Template`] when rendering fails.
pub fn render_setup_script(params: &ScriptParams) -> Result<String, ProvisionError> {
    let mut context = Context::new();
    context.insert("remote_user", &quoted(&params.remote_user));
    context.insert(
        "remote_password",
        &params.remote_password.as_deref().map(quoted),
    );
    context.insert("gh_token", &quoted(&params.gh_token));
    context.insert(
        "gpg_passphrase",
        &params.gpg_passphrase.as_deref().map(quoted),
    );
    context.insert("dix", &params.dix);
    context.insert("force", &params.force);
    Tera::one_off(SETUP_TEMPLATE, &context, false).map_err(|err| ProvisionError::Template {
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn params() -> ScriptParams {
        ScriptParams {
            remote_user: "ubuntu".to_owned(),
            remote_password: None,
            gh_token: "ghp_abc".to_owned(),
            gpg_passphrase: None,
            dix: false,
            force: false,
        }
    }

    #[rstest]
    fn renders_user_token_and_flags(params: ScriptParams) {
        let script = render_setup_script(&params).expect("render");
        assert!(script.starts_with("#!/usr/bin/env bash"));
        assert!(script.contains("REMOTE_USER=ubuntu"), "{script}");
        assert!(script.contains("export GH_TOKEN=ghp_abc"), "{script}");
        assert!(script.contains("FORCE=false"), "{script}");
        assert!(script.contains("DIX=false"), "{script}");
        assert!(!script.contains("chpasswd"), "{script}");
        assert!(!script.contains("--passphrase"), "{script}");
    }

    #[rstest]
    fn optional_secrets_enable_their_sections(mut params: ScriptParams) {
        params.remote_password = Some("hunter two".to_owned());
        params.gpg_passphrase = Some("gpg pass".to_owned());
        params.dix = true;
        params.force = true;

        let script = render_setup_script(&params).expect("render");

        assert!(script.contains("'hunter two' | sudo chpasswd"), "{script}");
        assert!(script.contains("--passphrase 'gpg pass'"), "{script}");
        assert!(script.contains("DIX=true"), "{script}");
        assert!(script.contains("FORCE=true"), "{script}");
    }

    #[rstest]
    fn hostile_token_is_quoted(mut params: ScriptParams) {
        params.gh_token = "x; rm -rf /".to_owned();
        let script = render_setup_script(&params).expect("render");
        assert!(script.contains("export GH_TOKEN='x; rm -rf /'"), "{script}");
    }
}
