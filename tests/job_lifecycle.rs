//! Job Lifecycle Tests
//!
//! End-to-end runs of the pipeline against the in-process mock cluster and
//! result store: submit, poll, retrieve, status, and the exit code of every
//! failure path.

use std::sync::Arc;
use std::time::Duration;

use policy_reco::config::Settings;
use policy_reco::job::{JobArguments, JobSpecBuilder};
use policy_reco::mock::{MockCluster, MockStore};
use policy_reco::signal::SignalState;
use policy_reco::{
    JobId, Pipeline, PipelineError, PollConfig, RetrievalOptions, RunOptions, RunOutcome,
};
use reco_params::{validate, IsolationOption, RawParams};
use reco_protocol::ApplicationState;

const OPERATOR: &str = "app.kubernetes.io/name=spark-operator";
const ARTIFACT: &str = "apiVersion: crd.antrea.io/v1alpha1\nkind: ClusterNetworkPolicy\n";

fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(1),
        timeout: Duration::from_secs(10),
    }
}

/// Cluster with a running operator and a ready result store.
fn ready_cluster() -> MockCluster {
    let store = Settings::default().store;
    MockCluster::new()
        .with_running_pods(OPERATOR, 1)
        .with_running_pods(&store.pod_selector, 1)
        .with_secret(&store.credentials_secret, &store.username_key, "clickhouse_operator")
        .with_secret(&store.credentials_secret, &store.password_key, "clickhouse_operator_password")
        .with_service_ip(&store.service, "10.96.44.2")
        .with_forward_port(45678)
}

fn pipeline<'a>(cluster: &'a MockCluster, store: &'a MockStore) -> Pipeline<'a> {
    Pipeline::new(cluster, store, Settings::default()).with_poll_config(fast_poll())
}

fn wait() -> RunOptions {
    RunOptions {
        wait: true,
        retrieval: RetrievalOptions::default(),
    }
}

// =============================================================================
// run
// =============================================================================

#[test]
fn test_run_without_wait_reports_job_id() {
    let cluster = ready_cluster();
    let store = MockStore::new();
    let params = RawParams {
        limit: 10000,
        start_time: "2022-01-01 00:00:00".to_string(),
        end_time: "2022-01-31 23:59:59".to_string(),
        ..RawParams::default()
    };

    let mut out = Vec::new();
    let outcome = pipeline(&cluster, &store)
        .run(&params, &RunOptions::default(), &mut out)
        .unwrap();

    let handle = match outcome {
        RunOutcome::Submitted(handle) => handle,
        other => panic!("expected Submitted, got {other:?}"),
    };
    assert_eq!(
        String::from_utf8(out).unwrap(),
        format!("Successfully created policy recommendation job with ID {}\n", handle.job_id)
    );

    let created = cluster.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].metadata.name, format!("policy-reco-{}", handle.job_id));
    assert_eq!(created[0].metadata.namespace, "flow-visibility");

    let args = JobArguments::parse(&created[0].spec.arguments).unwrap();
    assert_eq!(args.limit, 10000);
    assert_eq!(args.option, IsolationOption::AnpDenyApplied);
    assert_eq!(args.option.code(), 1);
    assert_eq!(args.id, handle.job_id);
    assert!(args.rm_labels);
    assert!(args.to_services);

    assert_eq!(cluster.status_queries(), 0);
    assert!(store.queries().is_empty());
}

#[test]
fn test_run_wait_prints_artifact() {
    let cluster = ready_cluster().with_submitted_states(&["RUNNING", "RUNNING", "COMPLETED"]);
    let store = MockStore::new().with_default_artifact(ARTIFACT);

    let mut out = Vec::new();
    let outcome = pipeline(&cluster, &store)
        .run(&RawParams::default(), &wait(), &mut out)
        .unwrap();

    match &outcome {
        RunOutcome::Completed { report, .. } => {
            assert_eq!(report.queries, 3);
            assert_eq!(report.state, ApplicationState::Completed);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "apiVersion: crd.antrea.io/v1alpha1\nkind: ClusterNetworkPolicy"
    );

    let queries = store.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].job_id, outcome.handle().job_id);
    assert!(queries[0].tunneled);
    assert_eq!(queries[0].base_url, "http://127.0.0.1:45678/");
    assert_eq!(cluster.open_tunnels(), 0, "tunnel must be released");
}

#[test]
fn test_run_wait_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recommendation.yaml");
    std::fs::write(&path, "stale").unwrap();

    let cluster = ready_cluster().with_submitted_states(&["COMPLETED"]);
    let store = MockStore::new().with_default_artifact("kind: NetworkPolicy");
    let options = RunOptions {
        wait: true,
        retrieval: RetrievalOptions {
            use_cluster_ip: true,
            output: Some(path.clone()),
            ..RetrievalOptions::default()
        },
    };

    let mut out = Vec::new();
    pipeline(&cluster, &store)
        .run(&RawParams::default(), &options, &mut out)
        .unwrap();

    assert!(out.is_empty(), "file sink must not print");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "kind: NetworkPolicy");
    assert_eq!(store.queries()[0].base_url, "http://10.96.44.2:8123/");
    assert_eq!(cluster.tunnels_opened(), 0);
}

#[test]
fn test_run_wait_failed_state() {
    let cluster = ready_cluster().with_submitted_states(&["RUNNING", "FAILED"]);
    let store = MockStore::new().with_default_artifact(ARTIFACT);

    let mut out = Vec::new();
    let err = pipeline(&cluster, &store)
        .run(&RawParams::default(), &wait(), &mut out)
        .unwrap_err();

    assert_eq!(err.exit_code(), 50);
    assert!(err.to_string().contains("FAILED"));
    assert_eq!(cluster.status_queries(), 2);
    assert!(store.queries().is_empty(), "no retrieval after failure");
    assert!(out.is_empty());
}

#[test]
fn test_run_wait_timeout() {
    let cluster = ready_cluster().with_submitted_states(&["RUNNING"]);
    let store = MockStore::new();
    let poll = PollConfig {
        interval: Duration::from_millis(1),
        timeout: Duration::from_millis(25),
    };

    let err = Pipeline::new(&cluster, &store, Settings::default())
        .with_poll_config(poll)
        .run(&RawParams::default(), &wait(), &mut Vec::new())
        .unwrap_err();

    assert_eq!(err.exit_code(), 51);
    assert!(store.queries().is_empty());
}

#[test]
fn test_run_wait_cancelled() {
    let cluster = ready_cluster().with_submitted_states(&["RUNNING"]);
    let store = MockStore::new();
    let signals = Arc::new(SignalState::new());
    signals.handle_signal();

    let err = pipeline(&cluster, &store)
        .with_cancellation(signals)
        .run(&RawParams::default(), &wait(), &mut Vec::new())
        .unwrap_err();

    assert_eq!(err.exit_code(), 80);
    assert_eq!(cluster.created().len(), 1, "the job is submitted before waiting");
}

#[test]
fn test_invalid_parameters_create_nothing() {
    let cases = [
        RawParams { limit: -1, ..RawParams::default() },
        RawParams { option: "bogus".to_string(), ..RawParams::default() },
        RawParams {
            start_time: "2022-01-31 00:00:00".to_string(),
            end_time: "2022-01-01 00:00:00".to_string(),
            ..RawParams::default()
        },
        RawParams { driver_memory: "1BB".to_string(), ..RawParams::default() },
    ];

    for params in cases {
        let cluster = ready_cluster();
        let store = MockStore::new();
        let err = pipeline(&cluster, &store)
            .run(&params, &wait(), &mut Vec::new())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Params(_)), "{err}");
        assert_eq!(err.exit_code(), 10);
        assert!(cluster.created().is_empty());
    }
}

#[test]
fn test_invalid_endpoint_rejected_before_submission() {
    let cluster = ready_cluster();
    let store = MockStore::new();
    let options = RunOptions {
        wait: true,
        retrieval: RetrievalOptions {
            endpoint: Some("clickhouse:8123".to_string()),
            ..RetrievalOptions::default()
        },
    };

    let err = pipeline(&cluster, &store)
        .run(&RawParams::default(), &options, &mut Vec::new())
        .unwrap_err();

    assert_eq!(err.exit_code(), 60);
    assert!(cluster.created().is_empty());
}

#[test]
fn test_operator_not_running() {
    let store_settings = Settings::default().store;
    let cluster = MockCluster::new().with_running_pods(&store_settings.pod_selector, 1);
    let store = MockStore::new();

    let err = pipeline(&cluster, &store)
        .run(&RawParams::default(), &RunOptions::default(), &mut Vec::new())
        .unwrap_err();

    assert_eq!(err.exit_code(), 20);
    assert!(cluster.created().is_empty());
}

#[test]
fn test_submission_rejected() {
    let cluster = ready_cluster().fail_create("sparkapplications.sparkoperator.k8s.io is forbidden");
    let store = MockStore::new();

    let err = pipeline(&cluster, &store)
        .run(&RawParams::default(), &RunOptions::default(), &mut Vec::new())
        .unwrap_err();

    assert_eq!(err.exit_code(), 20);
    assert!(err.to_string().contains("forbidden"));
}

#[test]
fn test_concurrent_runs_get_distinct_ids() {
    let cluster = ready_cluster();
    let store = MockStore::new();
    let p = pipeline(&cluster, &store);

    let a = p.run(&RawParams::default(), &RunOptions::default(), &mut Vec::new()).unwrap();
    let b = p.run(&RawParams::default(), &RunOptions::default(), &mut Vec::new()).unwrap();

    assert_ne!(a.handle().job_id, b.handle().job_id);
    assert_eq!(cluster.created().len(), 2);
}

// =============================================================================
// status
// =============================================================================

fn existing_job(cluster: MockCluster, params: RawParams, states: &[&str]) -> (MockCluster, JobId) {
    let settings = Settings::default();
    let spec = JobSpecBuilder::new(&settings.namespace, &settings.job, &settings.store)
        .build(&validate(&params).unwrap());
    let job_id = spec.job_id;
    let cluster = cluster
        .with_application(spec.application)
        .with_states(job_id, states);
    (cluster, job_id)
}

#[test]
fn test_status_prints_state() {
    let (cluster, job_id) = existing_job(ready_cluster(), RawParams::default(), &["RUNNING"]);
    let store = MockStore::new();

    let mut out = Vec::new();
    let report = pipeline(&cluster, &store).status(job_id, false, &mut out).unwrap();

    assert_eq!(report.state, "RUNNING");
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Status of this policy recommendation job is RUNNING\n"
    );
}

#[test]
fn test_status_json_includes_arguments() {
    let params = RawParams {
        option: "k8s-np".to_string(),
        ns_allow_list: r#"["kube-system"]"#.to_string(),
        ..RawParams::default()
    };
    let (cluster, job_id) = existing_job(ready_cluster(), params, &["COMPLETED"]);
    let store = MockStore::new();

    let mut out = Vec::new();
    pipeline(&cluster, &store).status(job_id, true, &mut out).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["state"], "COMPLETED");
    assert_eq!(value["job_id"], job_id.to_string());
    assert_eq!(value["arguments"]["option"], "k8s-np");
    assert_eq!(value["arguments"]["ns_allow_list"][0], "kube-system");
}

/// Job whose stored arguments predate `--to_services`.
fn job_without_to_services(states: &[&str]) -> (MockCluster, JobId) {
    let settings = Settings::default();
    let mut spec = JobSpecBuilder::new(&settings.namespace, &settings.job, &settings.store)
        .build(&validate(&RawParams::default()).unwrap());
    let args = &mut spec.application.spec.arguments;
    let at = args.iter().position(|a| a == "--to_services").unwrap();
    args.drain(at..at + 2);
    let job_id = spec.job_id;
    let cluster = ready_cluster()
        .with_application(spec.application)
        .with_states(job_id, states);
    (cluster, job_id)
}

#[test]
fn test_status_ignores_undecodable_arguments() {
    let (cluster, job_id) = job_without_to_services(&["RUNNING"]);
    let store = MockStore::new();

    let mut out = Vec::new();
    let report = pipeline(&cluster, &store).status(job_id, false, &mut out).unwrap();

    assert_eq!(report.state, "RUNNING");
    assert!(report.arguments.is_none());
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Status of this policy recommendation job is RUNNING\n"
    );
}

#[test]
fn test_status_json_rejects_undecodable_arguments() {
    let (cluster, job_id) = job_without_to_services(&["RUNNING"]);
    let store = MockStore::new();

    let mut out = Vec::new();
    let err = pipeline(&cluster, &store).status(job_id, true, &mut out).unwrap_err();

    assert!(matches!(err, PipelineError::Arguments(_)));
    assert_eq!(err.exit_code(), 20);
    assert!(out.is_empty());
}

#[test]
fn test_status_unknown_job() {
    let cluster = ready_cluster();
    let store = MockStore::new();
    let err = pipeline(&cluster, &store)
        .status(JobId::new(), false, &mut Vec::new())
        .unwrap_err();
    assert_eq!(err.exit_code(), 20);
    assert!(err.to_string().contains("not found"));
}

// =============================================================================
// retrieve
// =============================================================================

#[test]
fn test_retrieve_with_endpoint() {
    let cluster = ready_cluster();
    let job_id = JobId::new();
    let store = MockStore::new().with_artifact(job_id, "kind: NetworkPolicy\n");
    let options = RetrievalOptions {
        endpoint: Some("http://127.0.0.1:18123".to_string()),
        use_cluster_ip: true,
        output: None,
    };

    let mut out = Vec::new();
    pipeline(&cluster, &store).retrieve(job_id, &options, &mut out).unwrap();

    assert_eq!(out, b"kind: NetworkPolicy");
    assert_eq!(store.queries()[0].base_url, "http://127.0.0.1:18123/");
    assert_eq!(cluster.tunnels_opened(), 0);
}

#[test]
fn test_retrieve_empty_result_prints_nothing() {
    let cluster = ready_cluster();
    let store = MockStore::new();

    let mut out = Vec::new();
    pipeline(&cluster, &store)
        .retrieve(JobId::new(), &RetrievalOptions::default(), &mut out)
        .unwrap();

    assert!(out.is_empty());
    assert_eq!(cluster.open_tunnels(), 0);
}

#[test]
fn test_retrieve_store_not_ready() {
    let cluster = MockCluster::new().with_running_pods(OPERATOR, 1);
    let store = MockStore::new();

    let err = pipeline(&cluster, &store)
        .retrieve(JobId::new(), &RetrievalOptions::default(), &mut Vec::new())
        .unwrap_err();

    assert_eq!(err.exit_code(), 60);
    assert_eq!(cluster.tunnels_opened(), 0);
}

#[test]
fn test_retrieve_query_failure_releases_tunnel() {
    let cluster = ready_cluster();
    let store = MockStore::new().failing("Code: 516. DB::Exception: Authentication failed");

    let err = pipeline(&cluster, &store)
        .retrieve(JobId::new(), &RetrievalOptions::default(), &mut Vec::new())
        .unwrap_err();

    assert_eq!(err.exit_code(), 70);
    assert_eq!(cluster.tunnels_opened(), 1);
    assert_eq!(cluster.open_tunnels(), 0);
}

#[test]
fn test_retrieve_cancelled_releases_tunnel() {
    let cluster = ready_cluster();
    let job_id = JobId::new();
    let store = MockStore::new().with_artifact(job_id, ARTIFACT);
    let signals = Arc::new(SignalState::new());
    signals.handle_signal();

    let mut out = Vec::new();
    let err = pipeline(&cluster, &store)
        .with_cancellation(signals)
        .retrieve(job_id, &RetrievalOptions::default(), &mut out)
        .unwrap_err();

    assert_eq!(err.exit_code(), 80);
    assert_eq!(cluster.tunnels_opened(), 1);
    assert_eq!(cluster.open_tunnels(), 0);
    assert!(store.queries().is_empty());
    assert!(out.is_empty());
}
