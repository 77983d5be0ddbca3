//! End-to-end lifecycle scenarios through the public library API, with the
//! cloud API scripted and the results rendered as the CLI would.

use std::time::Duration;

use lambda_cli::render::{CreatedSummary, render_created, render_instances, render_operation};
use lambda_cli::test_support::{ApiCall, ScriptedApi, instance, instance_type};
use lambda_cli::{
    CreateOutcome, CreateRequest, InstanceStatus, LifecycleError, LifecycleSettings,
    Orchestrator, OutputFormat,
};
use rstest::{fixture, rstest};
use serde_json::Value;

#[fixture]
fn api() -> ScriptedApi {
    let api = ScriptedApi::new();
    api.set_instance_types(vec![
        instance_type("gpu_1x_a10", &["us-west-1", "us-south-3"]),
        instance_type("gpu_8x_h100_sxm5", &["us-east-3"]),
    ]);
    api.set_launch_ids(&["inst-9"]);
    api
}

fn orchestrator(api: &ScriptedApi) -> Orchestrator<ScriptedApi> {
    Orchestrator::new(
        api.clone(),
        LifecycleSettings {
            default_region: "us-south-3".to_owned(),
            filesystem_prefix: "team".to_owned(),
            ssh_key_name: "laptop".to_owned(),
        },
    )
    .with_poll_interval(Duration::ZERO)
    .with_max_poll_attempts(4)
}

fn render(f: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>) -> String {
    let mut buf: Vec<u8> = Vec::new();
    f(&mut buf).expect("render");
    String::from_utf8(buf).expect("utf8")
}

#[rstest]
#[tokio::test]
async fn create_then_list_then_delete(api: ScriptedApi) {
    api.push_instances(Vec::new());
    api.push_instances(vec![instance(
        "inst-9",
        "trainer-1_a10-0001",
        "gpu_1x_a10",
        InstanceStatus::Booking,
        None,
    )]);
    api.push_instances(vec![
        instance(
            "inst-9",
            "trainer-1_a10-0001",
            "gpu_1x_a10",
            InstanceStatus::Active,
            Some("192.0.2.44"),
        ),
        instance("inst-3", "old", "gpu_1x_a10", InstanceStatus::Terminated, None),
    ]);
    let lifecycle = orchestrator(&api);

    let outcome = lifecycle
        .create(&CreateRequest::new("1xa10").with_prefix("trainer"))
        .await
        .expect("create");
    let CreateOutcome::Created {
        instance: created,
        filesystem,
    } = outcome
    else {
        panic!("expected a created instance, got {outcome:?}");
    };
    assert_eq!(filesystem, "team-us-south-3");

    let summary = CreatedSummary {
        instance: &created,
        filesystem: &filesystem,
        remote_user: "ubuntu",
        suggest_setup: false,
    };
    let json: Value = serde_json::from_str(&render(|out| {
        render_created(out, &summary, OutputFormat::Json)
    }))
    .expect("json");
    assert_eq!(json["instance_id"], "inst-9");
    assert_eq!(json["ip"], "192.0.2.44");
    assert_eq!(json["region"], "us-east-1");

    let listed = lifecycle.list().await.expect("list");
    let table = render(|out| render_instances(out, &listed, OutputFormat::Table, false));
    assert!(table.contains("trainer-1_a10-0001"), "{table}");
    assert!(!table.contains("inst-3"), "{table}");

    let deleted = lifecycle.terminate("trainer-1_a10-0001").await.expect("terminate");
    let line = render(|out| render_operation(out, &deleted, OutputFormat::Table));
    assert_eq!(line, "Terminate initiated for instance trainer-1_a10-0001 (inst-9).\n");
    assert!(api
        .calls()
        .contains(&ApiCall::Terminate(vec!["inst-9".to_owned()])));
}

#[rstest]
#[tokio::test]
async fn explicit_region_without_capacity_lists_alternatives(api: ScriptedApi) {
    api.push_instances(Vec::new());

    let err = orchestrator(&api)
        .create(&CreateRequest::new("8xh100_sxm5").with_region(Some("us-west-1".to_owned())))
        .await
        .expect_err("region has no capacity");

    assert!(
        matches!(err, LifecycleError::RegionUnavailable { ref available, .. } if available == &vec!["us-east-3".to_owned()]),
        "{err:?}"
    );
    assert!(api.launches().is_empty());
}

#[rstest]
#[tokio::test]
async fn quota_blocks_a_third_instance_of_the_family(api: ScriptedApi) {
    api.push_instances(vec![
        instance("a", "one", "gpu_1x_a10", InstanceStatus::Active, Some("192.0.2.1")),
        instance("b", "two", "gpu_2x_a10", InstanceStatus::Active, Some("192.0.2.2")),
    ]);

    let outcome = orchestrator(&api)
        .create(&CreateRequest::new("1xa10"))
        .await
        .expect("quota is not an error");

    let CreateOutcome::QuotaReached {
        family, existing, ..
    } = outcome
    else {
        panic!("expected quota outcome, got {outcome:?}");
    };
    assert_eq!(family.to_lowercase(), "a10");
    assert_eq!(existing.len(), 2);
    assert_eq!(api.calls(), vec![ApiCall::ListInstances]);
}
