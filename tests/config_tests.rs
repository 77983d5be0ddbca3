//! Tests for configuration validation and the settings derived from it.

use camino::Utf8PathBuf;
use lambda_cli::ssh::HostKeyPolicy;
use lambda_cli::{ConfigError, LambdaConfig, SetupSettings};
use rstest::*;

#[fixture]
fn valid_config() -> LambdaConfig {
    LambdaConfig {
        api_key: Some(String::from("secret_example")),
        api_url: String::from("https://cloud.lambda.ai/api/v1"),
        ssh_key_path: String::from("/keys/id_ed25519"),
        ssh_key_name: Some(String::from("workstation")),
        known_hosts_path: String::from("/keys/known_hosts"),
        remote_user: String::from("ubuntu"),
        default_region: String::from("us-south-3"),
        filesystem_prefix: String::from("lambda"),
        secret_note: String::from("lambda-github-token"),
        gpg_secret_note: None,
        remote_password: None,
    }
}

#[rstest]
fn valid_config_passes_validation(valid_config: LambdaConfig) {
    assert!(valid_config.validate().is_ok());
}

/// Every required field names its environment variable and TOML key.
#[rstest]
#[case::api_url("LAMBDA_API_URL", "api_url")]
#[case::ssh_key_path("LAMBDA_SSH_KEY_PATH", "ssh_key_path")]
#[case::known_hosts("LAMBDA_KNOWN_HOSTS_PATH", "known_hosts_path")]
#[case::remote_user("LAMBDA_REMOTE_USER", "remote_user")]
#[case::region("LAMBDA_DEFAULT_REGION", "default_region")]
#[case::prefix("LAMBDA_FILESYSTEM_PREFIX", "filesystem_prefix")]
#[case::secret_note("LAMBDA_SECRET_NOTE", "secret_note")]
fn validation_errors_are_actionable(
    valid_config: LambdaConfig,
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    let field = match toml_key {
        "api_url" => &mut cfg.api_url,
        "ssh_key_path" => &mut cfg.ssh_key_path,
        "known_hosts_path" => &mut cfg.known_hosts_path,
        "remote_user" => &mut cfg.remote_user,
        "default_region" => &mut cfg.default_region,
        "filesystem_prefix" => &mut cfg.filesystem_prefix,
        _ => &mut cfg.secret_note,
    };
    *field = String::from("  ");

    let error = cfg.validate().expect_err("blank field must fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(message.contains(env_var), "should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "should mention {toml_key}: {message}");
    assert!(message.contains("lambda.toml"), "should mention file: {message}");
}

#[rstest]
fn ssh_settings_keep_absolute_paths(valid_config: LambdaConfig) {
    let mut cfg = valid_config;
    cfg.remote_user = String::from(" admin ");

    let settings = cfg.ssh_settings().expect("settings");

    assert_eq!(settings.key_path, Utf8PathBuf::from("/keys/id_ed25519"));
    assert_eq!(settings.known_hosts_path, Utf8PathBuf::from("/keys/known_hosts"));
    assert_eq!(settings.user, "admin");
    assert_eq!(settings.port, 22);
}

#[rstest]
fn provisioning_settings_verify_against_an_existing_known_hosts_file(
    valid_config: LambdaConfig,
) {
    let known_hosts = Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/known_hosts");
    let mut cfg = valid_config;
    cfg.known_hosts_path = known_hosts.to_string();

    let policy = cfg
        .ssh_settings()
        .expect("settings")
        .host_key_policy()
        .expect("policy");

    assert_eq!(policy, HostKeyPolicy::Verify(known_hosts));
}

#[rstest]
fn setup_settings_drop_blank_optional_values(valid_config: LambdaConfig) {
    let mut cfg = valid_config;
    cfg.gpg_secret_note = Some(String::from("   "));
    cfg.remote_password = Some(String::new());

    let settings = SetupSettings::from_config(&cfg, Some(String::from("session")));

    assert_eq!(settings.secret_note, "lambda-github-token");
    assert_eq!(settings.gpg_secret_note, None);
    assert_eq!(settings.remote_password, None);
    assert_eq!(settings.vault_session.as_deref(), Some("session"));
}

#[rstest]
fn setup_settings_keep_configured_gpg_note(valid_config: LambdaConfig) {
    let mut cfg = valid_config;
    cfg.gpg_secret_note = Some(String::from(" gpg-passphrase "));
    cfg.remote_password = Some(String::from("hunter2"));

    let settings = SetupSettings::from_config(&cfg, None);

    assert_eq!(settings.gpg_secret_note.as_deref(), Some("gpg-passphrase"));
    assert_eq!(settings.remote_password.as_deref(), Some("hunter2"));
    assert_eq!(settings.vault_session, None);
}
