//! Mock control plane.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reco_protocol::{
    ApplicationState, ApplicationStateInfo, ObjectMeta, SparkApplication, SparkApplicationSpec,
    SparkApplicationStatus,
};

use crate::cluster::{Cluster, ClusterError, Tunnel};
use crate::job::JobId;

/// Port reported by mock port-forwards unless configured otherwise.
const DEFAULT_FORWARD_PORT: u16 = 38123;

#[derive(Debug, Default)]
struct MockApp {
    app: Option<SparkApplication>,
    script: VecDeque<ApplicationState>,
    current: ApplicationState,
    error_message: Option<String>,
}

impl MockApp {
    /// Advance the script by one query.
    fn next_state(&mut self) -> ApplicationState {
        if let Some(next) = self.script.pop_front() {
            self.current = next;
        }
        self.current.clone()
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    apps: HashMap<String, MockApp>,
    created: Vec<SparkApplication>,
    running_pods: HashMap<String, usize>,
    service_ips: HashMap<String, String>,
    secrets: HashMap<(String, String), String>,
    create_failure: Option<String>,
    submitted_script: Vec<ApplicationState>,
    forward_port: Option<u16>,
    status_queries: usize,
    tunnels_opened: usize,
}

/// Scripted in-process [`Cluster`].
#[derive(Debug, Default)]
pub struct MockCluster {
    state: Mutex<ClusterState>,
    open_tunnels: Arc<AtomicUsize>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// States returned by successive status queries of `job_id`.
    pub fn with_states(self, job_id: JobId, states: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let app = state.apps.entry(job_id.application_name()).or_default();
            app.script = states.iter().map(|s| ApplicationState::parse(s)).collect();
        }
        self
    }

    /// States followed by every application created through this cluster
    /// that has no script of its own.
    pub fn with_submitted_states(self, states: &[&str]) -> Self {
        self.state.lock().unwrap().submitted_script =
            states.iter().map(|s| ApplicationState::parse(s)).collect();
        self
    }

    pub fn with_error_message(self, job_id: JobId, message: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let app = state.apps.entry(job_id.application_name()).or_default();
            app.error_message = Some(message.to_string());
        }
        self
    }

    /// Register an already existing application (e.g. created by an earlier run).
    pub fn with_application(self, app: SparkApplication) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let entry = state.apps.entry(app.metadata.name.clone()).or_default();
            entry.current = app.state();
            entry.app = Some(app);
        }
        self
    }

    pub fn with_running_pods(self, selector: &str, count: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .running_pods
            .insert(selector.to_string(), count);
        self
    }

    pub fn with_service_ip(self, service: &str, ip: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .service_ips
            .insert(service.to_string(), ip.to_string());
        self
    }

    pub fn with_secret(self, secret: &str, key: &str, value: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .secrets
            .insert((secret.to_string(), key.to_string()), value.to_string());
        self
    }

    pub fn with_forward_port(self, port: u16) -> Self {
        self.state.lock().unwrap().forward_port = Some(port);
        self
    }

    /// Make every create call fail with `message`.
    pub fn fail_create(self, message: &str) -> Self {
        self.state.lock().unwrap().create_failure = Some(message.to_string());
        self
    }

    /// Applications accepted by `create_application`, in order.
    pub fn created(&self) -> Vec<SparkApplication> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn status_queries(&self) -> usize {
        self.state.lock().unwrap().status_queries
    }

    pub fn tunnels_opened(&self) -> usize {
        self.state.lock().unwrap().tunnels_opened
    }

    /// Tunnels whose guard has not been dropped yet.
    pub fn open_tunnels(&self) -> usize {
        self.open_tunnels.load(Ordering::SeqCst)
    }
}

fn placeholder_application(name: &str, namespace: &str) -> SparkApplication {
    SparkApplication::new(
        ObjectMeta {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        },
        SparkApplicationSpec::default(),
    )
}

impl Cluster for MockCluster {
    fn create_application(&self, app: &SparkApplication) -> Result<SparkApplication, ClusterError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.create_failure {
            return Err(ClusterError::CommandFailed {
                command: "create sparkapplication".to_string(),
                status: "exit status: 1".to_string(),
                stderr: message.clone(),
            });
        }

        let mut stored = app.clone();
        stored.metadata.uid = Some(format!("uid-{}", state.created.len() + 1));
        state.created.push(app.clone());

        let script = state.submitted_script.clone();
        let entry = state.apps.entry(app.metadata.name.clone()).or_default();
        if entry.script.is_empty() {
            entry.script = script.into();
        }
        entry.app = Some(stored.clone());
        Ok(stored)
    }

    fn get_application(&self, namespace: &str, name: &str) -> Result<SparkApplication, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.status_queries += 1;

        let entry = state.apps.get_mut(name).ok_or_else(|| ClusterError::NotFound {
            kind: "SparkApplication",
            name: name.to_string(),
            namespace: namespace.to_string(),
        })?;

        let current = entry.next_state();
        let mut app = entry
            .app
            .clone()
            .unwrap_or_else(|| placeholder_application(name, namespace));
        let status = app.status.get_or_insert_with(SparkApplicationStatus::default);
        status.application_state = ApplicationStateInfo {
            state: current,
            error_message: entry.error_message.clone(),
        };
        Ok(app)
    }

    fn running_pods(&self, _namespace: &str, selector: &str) -> Result<usize, ClusterError> {
        let state = self.state.lock().unwrap();
        Ok(state.running_pods.get(selector).copied().unwrap_or(0))
    }

    fn service_cluster_ip(&self, namespace: &str, service: &str) -> Result<String, ClusterError> {
        let state = self.state.lock().unwrap();
        state
            .service_ips
            .get(service)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "service",
                name: service.to_string(),
                namespace: namespace.to_string(),
            })
    }

    fn secret_value(&self, namespace: &str, secret: &str, key: &str) -> Result<String, ClusterError> {
        let state = self.state.lock().unwrap();
        state
            .secrets
            .get(&(secret.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "secret",
                name: format!("{}/{}", secret, key),
                namespace: namespace.to_string(),
            })
    }

    fn port_forward(
        &self,
        _namespace: &str,
        _service: &str,
        _remote_port: u16,
    ) -> Result<Box<dyn Tunnel>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.tunnels_opened += 1;
        self.open_tunnels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTunnel {
            port: state.forward_port.unwrap_or(DEFAULT_FORWARD_PORT),
            open: Arc::clone(&self.open_tunnels),
        }))
    }
}

/// Tunnel guard that decrements the cluster's open-tunnel count on drop.
#[derive(Debug)]
pub struct MockTunnel {
    port: u16,
    open: Arc<AtomicUsize>,
}

impl Tunnel for MockTunnel {
    fn local_port(&self) -> u16 {
        self.port
    }
}

impl Drop for MockTunnel {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
