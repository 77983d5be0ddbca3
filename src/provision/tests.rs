//! Unit tests for the setup workflow.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::api::InstanceStatus;
use crate::lifecycle::LifecycleSettings;
use crate::ssh::ChannelEvent;
use crate::test_support::{
    ChannelStep, FakeChannel, FakeConnector, FakeTransport, ScriptedApi, ScriptedRunner,
    instance,
};

fn settings(gpg_secret_note: Option<&str>) -> SetupSettings {
    SetupSettings {
        secret_note: "lambda-github-token".to_owned(),
        gpg_secret_note: gpg_secret_note.map(str::to_owned),
        remote_user: "ubuntu".to_owned(),
        remote_password: None,
        vault_session: Some("unlocked".to_owned()),
    }
}

fn orchestrator(api: &ScriptedApi) -> Orchestrator<ScriptedApi> {
    Orchestrator::new(
        api.clone(),
        LifecycleSettings {
            default_region: "us-south-3".to_owned(),
            filesystem_prefix: "lambda".to_owned(),
            ssh_key_name: "workstation".to_owned(),
        },
    )
    .with_poll_interval(Duration::ZERO)
}

#[fixture]
fn api() -> ScriptedApi {
    let api = ScriptedApi::new();
    api.push_instances(vec![
        instance(
            "inst-1",
            "box",
            "gpu_1x_a10",
            InstanceStatus::Active,
            Some("203.0.113.9"),
        ),
        instance("inst-2", "booting", "gpu_1x_a10", InstanceStatus::Booking, None),
    ]);
    api
}

fn script_channels(transport: FakeTransport) -> FakeTransport {
    transport
        .with_channel(FakeChannel::exit_steps(0))
        .with_channel(FakeChannel::scp_accepting_steps())
        .with_channel(vec![
            ChannelStep::Event(ChannelEvent::Stdout(b"done\n".to_vec())),
            ChannelStep::Event(ChannelEvent::ExitStatus(0)),
            ChannelStep::Event(ChannelEvent::Closed),
        ])
        .with_channel(FakeChannel::exit_steps(0))
}

#[rstest]
#[tokio::test]
async fn setup_pushes_runs_and_removes_the_script(api: ScriptedApi) {
    let runner = ScriptedRunner::new();
    runner.push_stdout("ghp_token\n");
    let transport = script_channels(FakeTransport::new());
    let log = transport.log();
    let disconnected = transport.disconnected();
    let connector = FakeConnector::new(transport);
    let workflow = SetupWorkflow::new(runner.clone(), settings(None));
    let mut stdout: Vec<u8> = Vec::new();
    let mut stderr: Vec<u8> = Vec::new();

    let provisioned = workflow
        .run(
            &orchestrator(&api),
            &connector,
            "box",
            SetupOptions::default(),
            &mut stdout,
            &mut stderr,
        )
        .await
        .expect("setup succeeds");

    assert_eq!(provisioned.id, "inst-1");
    assert_eq!(connector.hosts(), vec!["203.0.113.9".to_owned()]);
    assert_eq!(
        log.commands(),
        vec![
            "mkdir -p /tmp".to_owned(),
            "scp -qt /tmp".to_owned(),
            "INSTANCE_ID=box bash /tmp/setup_remote_box.sh".to_owned(),
            "rm -f /tmp/setup_remote_box.sh".to_owned(),
        ]
    );
    let sent = String::from_utf8(log.sent_bytes()).expect("utf8");
    assert!(sent.starts_with("C0755 "), "{sent}");
    assert!(sent.contains("export GH_TOKEN=ghp_token"), "{sent}");
    assert_eq!(stdout, b"done\n");
    assert!(disconnected.load(Ordering::SeqCst));
    assert_eq!(runner.invocations().len(), 1);
}

#[rstest]
#[tokio::test]
async fn locked_vault_stops_before_any_call(api: ScriptedApi) {
    let mut locked = settings(None);
    locked.vault_session = None;
    let connector = FakeConnector::new(FakeTransport::new());
    let workflow = SetupWorkflow::new(ScriptedRunner::new(), locked);

    let err = workflow
        .run(
            &orchestrator(&api),
            &connector,
            "box",
            SetupOptions::default(),
            &mut std::io::sink(),
            &mut std::io::sink(),
        )
        .await
        .expect_err("vault is locked");

    assert_eq!(err, ProvisionError::VaultLocked);
    assert!(api.calls().is_empty());
    assert!(connector.hosts().is_empty());
}

#[rstest]
#[tokio::test]
async fn instance_that_is_not_ready_is_rejected(api: ScriptedApi) {
    let connector = FakeConnector::new(FakeTransport::new());
    let workflow = SetupWorkflow::new(ScriptedRunner::new(), settings(None));

    let err = workflow
        .run(
            &orchestrator(&api),
            &connector,
            "booting",
            SetupOptions::default(),
            &mut std::io::sink(),
            &mut std::io::sink(),
        )
        .await
        .expect_err("instance still booting");

    assert!(
        matches!(err, ProvisionError::Lifecycle(LifecycleError::NotReady { .. })),
        "{err:?}"
    );
    assert!(connector.hosts().is_empty());
}

#[rstest]
#[tokio::test]
async fn failing_script_still_closes_the_session(api: ScriptedApi) {
    let runner = ScriptedRunner::new();
    runner.push_stdout("ghp_token");
    let transport = FakeTransport::new()
        .with_channel(FakeChannel::exit_steps(0))
        .with_channel(FakeChannel::scp_accepting_steps())
        .with_channel(FakeChannel::exit_steps(2));
    let log = transport.log();
    let disconnected = transport.disconnected();
    let connector = FakeConnector::new(transport);
    let workflow = SetupWorkflow::new(runner, settings(None));

    let err = workflow
        .run(
            &orchestrator(&api),
            &connector,
            "inst-1",
            SetupOptions::default(),
            &mut std::io::sink(),
            &mut std::io::sink(),
        )
        .await
        .expect_err("script fails");

    assert!(
        matches!(
            err,
            ProvisionError::Ssh(SshError::RemoteCommandFailed { exit_code: 2, .. })
        ),
        "{err:?}"
    );
    assert!(disconnected.load(Ordering::SeqCst));
    assert!(
        !log.commands().iter().any(|command| command.starts_with("rm ")),
        "cleanup only runs after a successful script"
    );
}

#[rstest]
#[tokio::test]
async fn secret_lookup_failure_never_connects(api: ScriptedApi) {
    let runner = ScriptedRunner::new();
    runner.push_failure(1, "Vault is locked.");
    let connector = FakeConnector::new(FakeTransport::new());
    let workflow = SetupWorkflow::new(runner, settings(None));

    let err = workflow
        .run(
            &orchestrator(&api),
            &connector,
            "box",
            SetupOptions::default(),
            &mut std::io::sink(),
            &mut std::io::sink(),
        )
        .await
        .expect_err("lookup fails");

    assert!(matches!(err, ProvisionError::SecretLookup { .. }), "{err:?}");
    assert!(connector.hosts().is_empty());
}

fn staged_profile_dir() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    std::fs::write(root.join("bw.pass"), "vault-password\n").expect("write");
    (dir, root)
}

#[test]
fn dix_fetches_gpg_passphrase_and_stages_present_files() {
    let (_dir, root) = staged_profile_dir();
    let bw_pass = root.join("bw.pass").to_string();
    let missing = root.join("absent").to_string();
    let runner = ScriptedRunner::new();
    runner.push_stdout("ghp_token");
    runner.push_stdout("gpg secret");
    let workflow = SetupWorkflow::new(runner.clone(), settings(Some("gpg-note")))
        .with_env_lookup(Arc::new(move |name| {
            Some(if name == "BW_PASS_FILE" {
                bw_pass.clone()
            } else {
                missing.clone()
            })
        }));
    let target = instance("inst-1", "box", "gpu_1x_a10", InstanceStatus::Active, None);

    let plan = workflow
        .prepare(
            &target,
            SetupOptions {
                dix: true,
                force: true,
            },
        )
        .expect("plan");

    assert_eq!(
        runner
            .invocations()
            .iter()
            .map(|call| call.command_string())
            .collect::<Vec<_>>(),
        vec![
            "bw get notes lambda-github-token".to_owned(),
            "bw get notes gpg-note".to_owned(),
        ]
    );
    assert!(plan.script.contains("--passphrase 'gpg secret'"), "{}", plan.script);
    assert!(plan.script.contains("FORCE=true"));
    assert_eq!(
        plan.staged,
        vec![StagedItem {
            local: root.join("bw.pass"),
            remote: "~/bw.pass".to_owned(),
            kind: StagedKind::File,
        }]
    );
}

#[test]
fn plain_setup_fetches_only_the_token() {
    let runner = ScriptedRunner::new();
    runner.push_stdout("ghp_token");
    let workflow = SetupWorkflow::new(runner.clone(), settings(Some("gpg-note")));
    let target = instance("inst-1", "", "gpu_1x_a10", InstanceStatus::Active, None);

    let plan = workflow
        .prepare(&target, SetupOptions::default())
        .expect("plan");

    assert_eq!(runner.invocations().len(), 1);
    assert!(plan.staged.is_empty());
    assert_eq!(plan.script_path, "/tmp/setup_remote_inst-1.sh");
    assert_eq!(
        plan.run_command(),
        "INSTANCE_ID=inst-1 bash /tmp/setup_remote_inst-1.sh"
    );
}

#[tokio::test]
async fn apply_copies_staged_files_before_the_script() {
    let (_dir, root) = staged_profile_dir();
    let plan = SetupPlan {
        instance_label: "box".to_owned(),
        script: "#!/bin/bash\n".to_owned(),
        script_path: "/tmp/setup_remote_box.sh".to_owned(),
        staged: vec![StagedItem {
            local: root.join("bw.pass"),
            remote: "~/bw.pass".to_owned(),
            kind: StagedKind::File,
        }],
    };
    let transport = script_channels(
        FakeTransport::new()
            .with_channel(FakeChannel::exit_steps(0))
            .with_channel(FakeChannel::scp_accepting_steps()),
    );
    let log = transport.log();
    let mut session = RemoteSession::new(transport, "203.0.113.9");
    let workflow = SetupWorkflow::new(ScriptedRunner::new(), settings(None));

    workflow
        .apply(&mut session, &plan, &mut std::io::sink(), &mut std::io::sink())
        .await
        .expect("apply");

    let commands = log.commands();
    assert_eq!(commands.first().map(String::as_str), Some("mkdir -p ."));
    assert_eq!(commands.get(1).map(String::as_str), Some("scp -qt ."));
    assert_eq!(commands.len(), 6);
}
