//! Unit tests for the lifecycle orchestrator, driven by [`ScriptedApi`].

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::api::{ApiError, Filesystem, InstanceStatus};
use crate::test_support::{ApiCall, ScriptedApi, instance, instance_type};

fn settings() -> LifecycleSettings {
    LifecycleSettings {
        default_region: "us-south-3".to_owned(),
        filesystem_prefix: "lambda".to_owned(),
        ssh_key_name: "workstation".to_owned(),
    }
}

fn orchestrator(api: &ScriptedApi) -> Orchestrator<ScriptedApi> {
    Orchestrator::new(api.clone(), settings())
        .with_poll_interval(Duration::ZERO)
        .with_max_poll_attempts(5)
}

fn list_error() -> ApiError {
    ApiError::Transport {
        method: "GET".to_owned(),
        path: "/instances".to_owned(),
        message: "connection reset".to_owned(),
    }
}

#[fixture]
fn h100_api() -> ScriptedApi {
    let api = ScriptedApi::new();
    api.push_instances(Vec::new());
    api.set_instance_types(vec![
        instance_type("gpu_2x_H100_SXM5", &["us-east-1"]),
        instance_type("gpu_1x_a10", &["us-west-1", "us-south-3"]),
        instance_type("gpu_8x_v100", &[]),
    ]);
    api.set_launch_ids(&["inst-new"]);
    api
}

#[rstest]
#[tokio::test]
async fn create_launches_in_only_region_with_capacity(h100_api: ScriptedApi) {
    h100_api.push_instances(vec![instance(
        "inst-new",
        "generic-2_H100_SXM5-abcd1234",
        "gpu_2x_H100_SXM5",
        InstanceStatus::Active,
        Some("198.51.100.4"),
    )]);

    let outcome = orchestrator(&h100_api)
        .create(&CreateRequest::new("2xH100_SXM5"))
        .await
        .expect("create succeeds");

    let CreateOutcome::Created {
        instance,
        filesystem,
    } = outcome
    else {
        panic!("expected a created instance, got {outcome:?}");
    };
    assert_eq!(instance.id, "inst-new");
    assert_eq!(filesystem, "lambda-us-east-1");

    let launches = h100_api.launches();
    let [launch] = launches.as_slice() else {
        panic!("expected exactly one launch, got {launches:?}");
    };
    assert_eq!(launch.region_name, "us-east-1");
    assert_eq!(launch.instance_type_name, "gpu_2x_H100_SXM5");
    assert_eq!(launch.ssh_key_names, vec!["workstation".to_owned()]);
    assert_eq!(launch.file_system_names, vec!["lambda-us-east-1".to_owned()]);
    assert!(launch.name.starts_with("generic-2_H100_SXM5-"), "{}", launch.name);
    assert!(h100_api.calls().contains(&ApiCall::CreateFilesystem {
        name: "lambda-us-east-1".to_owned(),
        region: "us-east-1".to_owned(),
    }));
}

#[tokio::test]
async fn quota_reached_skips_launch() {
    let api = ScriptedApi::new();
    api.push_instances(vec![
        instance("a", "one", "gpu_1x_a10", InstanceStatus::Active, Some("10.0.0.1")),
        instance("b", "two", "gpu_1x_A10", InstanceStatus::Active, Some("10.0.0.2")),
        instance("c", "three", "gpu_1x_a10", InstanceStatus::Booking, None),
    ]);

    let outcome = orchestrator(&api)
        .create(&CreateRequest::new("1xa10"))
        .await
        .expect("quota is not an error");

    match outcome {
        CreateOutcome::QuotaReached {
            family,
            limit,
            existing,
        } => {
            assert_eq!(family, "a10");
            assert_eq!(limit, 2);
            assert_eq!(existing.len(), 2);
        }
        CreateOutcome::Created { .. } => panic!("launch must be skipped"),
    }
    assert_eq!(api.calls(), vec![ApiCall::ListInstances]);
}

#[tokio::test]
async fn raised_quota_allows_launch() {
    let api = ScriptedApi::new();
    api.push_instances(vec![
        instance("a", "one", "gpu_1x_a10", InstanceStatus::Active, Some("10.0.0.1")),
        instance("b", "two", "gpu_1x_a10", InstanceStatus::Active, Some("10.0.0.2")),
    ]);
    api.push_instances(vec![instance(
        "inst-new",
        "x",
        "gpu_1x_a10",
        InstanceStatus::Active,
        Some("10.0.0.3"),
    )]);
    api.set_instance_types(vec![instance_type("gpu_1x_a10", &["us-south-3"])]);
    api.set_launch_ids(&["inst-new"]);

    let outcome = orchestrator(&api)
        .create(&CreateRequest::new("1xa10").with_max_per_type(3))
        .await
        .expect("create succeeds");

    assert!(matches!(outcome, CreateOutcome::Created { .. }), "{outcome:?}");
}

#[tokio::test]
async fn invalid_spec_makes_no_api_calls() {
    let api = ScriptedApi::new();

    let err = orchestrator(&api)
        .create(&CreateRequest::new("two-h100"))
        .await
        .expect_err("spec is malformed");

    assert!(matches!(err, LifecycleError::InvalidSpec(_)), "{err:?}");
    assert!(api.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn unknown_type_lists_types_with_capacity(h100_api: ScriptedApi) {
    let err = orchestrator(&h100_api)
        .create(&CreateRequest::new("4xb200"))
        .await
        .expect_err("type is not offered");

    assert_eq!(
        err,
        LifecycleError::UnknownInstanceType {
            name: "gpu_4x_b200".to_owned(),
            available: vec![
                "gpu_1x_a10 (us-west-1, us-south-3)".to_owned(),
                "gpu_2x_H100_SXM5 (us-east-1)".to_owned(),
            ],
        }
    );
    assert!(h100_api.launches().is_empty());
}

#[rstest]
#[tokio::test]
async fn requested_region_without_capacity_fails(h100_api: ScriptedApi) {
    let err = orchestrator(&h100_api)
        .create(&CreateRequest::new("2xH100_SXM5").with_region(Some("us-west-1".to_owned())))
        .await
        .expect_err("region lacks capacity");

    assert!(
        matches!(err, LifecycleError::RegionUnavailable { ref region, .. } if region == "us-west-1"),
        "{err:?}"
    );
    assert!(h100_api.launches().is_empty());
}

#[rstest]
#[tokio::test]
async fn default_region_is_preferred_when_it_has_capacity(h100_api: ScriptedApi) {
    h100_api.push_instances(vec![instance(
        "inst-new",
        "x",
        "gpu_1x_a10",
        InstanceStatus::Active,
        Some("10.0.0.9"),
    )]);

    orchestrator(&h100_api)
        .create(&CreateRequest::new("1xa10"))
        .await
        .expect("create succeeds");

    let launches = h100_api.launches();
    assert_eq!(
        launches.first().map(|launch| launch.region_name.as_str()),
        Some("us-south-3")
    );
}

#[rstest]
#[tokio::test]
async fn existing_filesystem_is_reused(h100_api: ScriptedApi) {
    h100_api.set_filesystems(vec![Filesystem {
        id: Some("fs-1".to_owned()),
        name: "lambda-us-east-1".to_owned(),
        region: "us-east-1".to_owned(),
    }]);
    h100_api.push_instances(vec![instance(
        "inst-new",
        "x",
        "gpu_2x_H100_SXM5",
        InstanceStatus::Active,
        Some("10.0.0.9"),
    )]);

    orchestrator(&h100_api)
        .create(&CreateRequest::new("2xH100_SXM5"))
        .await
        .expect("create succeeds");

    assert!(
        !h100_api
            .calls()
            .iter()
            .any(|call| matches!(call, ApiCall::CreateFilesystem { .. }))
    );
}

#[rstest]
#[tokio::test]
async fn mismatched_filesystem_name_still_launches_with_requested_name(h100_api: ScriptedApi) {
    h100_api.set_created_filesystem_name("something-else");
    h100_api.push_instances(vec![instance(
        "inst-new",
        "x",
        "gpu_2x_H100_SXM5",
        InstanceStatus::Active,
        Some("10.0.0.9"),
    )]);

    orchestrator(&h100_api)
        .create(&CreateRequest::new("2xH100_SXM5"))
        .await
        .expect("create succeeds");

    let launches = h100_api.launches();
    assert_eq!(
        launches.first().map(|launch| launch.file_system_names.clone()),
        Some(vec!["lambda-us-east-1".to_owned()])
    );
}

#[rstest]
#[tokio::test]
async fn launch_without_ids_fails(h100_api: ScriptedApi) {
    h100_api.set_launch_ids(&[]);

    let err = orchestrator(&h100_api)
        .create(&CreateRequest::new("2xH100_SXM5"))
        .await
        .expect_err("no instance ID returned");

    assert!(matches!(err, LifecycleError::LaunchFailed { .. }), "{err:?}");
}

#[rstest]
#[tokio::test]
async fn poll_times_out_after_exactly_the_attempt_budget(h100_api: ScriptedApi) {
    h100_api.push_instances(vec![instance(
        "inst-new",
        "x",
        "gpu_2x_H100_SXM5",
        InstanceStatus::Booking,
        None,
    )]);

    let err = orchestrator(&h100_api)
        .create(&CreateRequest::new("2xH100_SXM5"))
        .await
        .expect_err("instance never becomes ready");

    assert_eq!(
        err,
        LifecycleError::PollTimeout {
            instance_id: "inst-new".to_owned(),
            attempts: 5,
        }
    );
    // One quota check plus five readiness checks.
    assert_eq!(h100_api.list_instance_calls(), 6);
}

#[rstest]
#[tokio::test]
async fn active_without_ip_keeps_polling(h100_api: ScriptedApi) {
    h100_api.push_instances(vec![instance(
        "inst-new",
        "x",
        "gpu_2x_H100_SXM5",
        InstanceStatus::Active,
        Some("null"),
    )]);
    h100_api.push_instances(vec![instance(
        "inst-new",
        "x",
        "gpu_2x_H100_SXM5",
        InstanceStatus::Active,
        Some("198.51.100.4"),
    )]);

    let outcome = orchestrator(&h100_api)
        .create(&CreateRequest::new("2xH100_SXM5"))
        .await
        .expect("create succeeds");

    assert!(matches!(outcome, CreateOutcome::Created { .. }));
    assert_eq!(h100_api.list_instance_calls(), 3);
}

#[rstest]
#[case(InstanceStatus::Terminated)]
#[case(InstanceStatus::Failed)]
#[tokio::test]
async fn terminal_status_fails_fast(h100_api: ScriptedApi, #[case] status: InstanceStatus) {
    h100_api.push_instances(vec![instance(
        "inst-new",
        "x",
        "gpu_2x_H100_SXM5",
        status,
        None,
    )]);

    let err = orchestrator(&h100_api)
        .create(&CreateRequest::new("2xH100_SXM5"))
        .await
        .expect_err("terminal status ends the wait");

    assert_eq!(
        err,
        LifecycleError::TerminalState {
            instance_id: "inst-new".to_owned(),
            status,
        }
    );
    assert_eq!(h100_api.list_instance_calls(), 2);
}

#[rstest]
#[tokio::test]
async fn list_errors_while_polling_are_tolerated(h100_api: ScriptedApi) {
    h100_api.push_list_error(list_error());
    h100_api.push_instances(Vec::new());
    h100_api.push_instances(vec![instance(
        "inst-new",
        "x",
        "gpu_2x_H100_SXM5",
        InstanceStatus::Active,
        Some("198.51.100.4"),
    )]);

    let outcome = orchestrator(&h100_api)
        .create(&CreateRequest::new("2xH100_SXM5"))
        .await
        .expect("transient errors are retried");

    assert!(matches!(outcome, CreateOutcome::Created { .. }));
    assert_eq!(h100_api.list_instance_calls(), 4);
}

#[tokio::test]
async fn quota_list_failure_is_fatal() {
    let api = ScriptedApi::new();
    api.push_list_error(list_error());

    let err = orchestrator(&api)
        .create(&CreateRequest::new("1xa10"))
        .await
        .expect_err("quota check needs the listing");

    assert!(matches!(err, LifecycleError::Api { .. }), "{err:?}");
}

fn fleet() -> ScriptedApi {
    let api = ScriptedApi::new();
    api.push_instances(vec![
        instance("inst-1", "trainer", "gpu_1x_a10", InstanceStatus::Active, Some("10.0.0.1")),
        instance("inst-2", "trainer", "gpu_1x_a10", InstanceStatus::Active, Some("10.0.0.2")),
        instance("inst-3", "notebook", "gpu_1x_a10", InstanceStatus::Booking, None),
    ]);
    api
}

#[tokio::test]
async fn terminate_by_id_submits_that_id() {
    let api = fleet();

    let outcome = orchestrator(&api)
        .terminate("inst-2")
        .await
        .expect("terminate");

    assert_eq!(outcome.action, InstanceAction::Terminate);
    assert_eq!(outcome.instance.id, "inst-2");
    assert!(api.calls().contains(&ApiCall::Terminate(vec!["inst-2".to_owned()])));
}

#[tokio::test]
async fn ambiguous_name_is_never_terminated() {
    let api = fleet();

    let err = orchestrator(&api)
        .terminate("trainer")
        .await
        .expect_err("two instances share the name");

    assert_eq!(
        err,
        LifecycleError::Ambiguous {
            identifier: "trainer".to_owned(),
            matches: vec!["inst-1".to_owned(), "inst-2".to_owned()],
        }
    );
    assert!(
        !api
            .calls()
            .iter()
            .any(|call| matches!(call, ApiCall::Terminate(_)))
    );
}

#[tokio::test]
async fn unknown_identifier_is_not_found() {
    let api = fleet();

    let err = orchestrator(&api)
        .restart("ghost")
        .await
        .expect_err("nothing matches");

    assert!(matches!(err, LifecycleError::NotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn unconfirmed_operation_is_an_error() {
    let api = fleet();
    api.set_restart_response(&["inst-9"]);

    let err = orchestrator(&api)
        .restart("notebook")
        .await
        .expect_err("response omits the instance");

    assert_eq!(
        err,
        LifecycleError::OperationNotConfirmed {
            action: "restart".to_owned(),
            instance_id: "inst-3".to_owned(),
        }
    );
}

#[tokio::test]
async fn restart_by_unique_name() {
    let api = fleet();

    let outcome = orchestrator(&api).restart("notebook").await.expect("restart");

    assert_eq!(outcome.instance.id, "inst-3");
    assert!(api.calls().contains(&ApiCall::Restart(vec!["inst-3".to_owned()])));
}

#[tokio::test]
async fn resolve_ready_rejects_booking_instance() {
    let api = fleet();

    let err = orchestrator(&api)
        .resolve_ready("notebook")
        .await
        .expect_err("instance still booting");

    assert_eq!(
        err,
        LifecycleError::NotReady {
            identifier: "notebook".to_owned(),
            status: InstanceStatus::Booking,
        }
    );
}

#[tokio::test]
async fn resolve_ready_returns_reachable_instance() {
    let api = fleet();

    let instance = orchestrator(&api)
        .resolve_ready("inst-1")
        .await
        .expect("ready");

    assert_eq!(instance.usable_ip(), Some("10.0.0.1"));
}
