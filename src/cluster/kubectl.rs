//! `kubectl`-backed [`Cluster`].

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use base64::Engine;
use reco_protocol::{SparkApplication, RESOURCE};
use serde_json::Value;
use tracing::{debug, info};

use super::{Cluster, ClusterError, Tunnel};
use crate::signal::SignalState;

/// How long to wait for `kubectl port-forward` to report its local port.
const PORT_PARSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shells out to `kubectl` for every operation.
#[derive(Debug, Clone)]
pub struct Kubectl {
    program: String,
    kubeconfig: Option<String>,
    signals: Option<Arc<SignalState>>,
}

impl Kubectl {
    pub fn new(program: impl Into<String>, kubeconfig: Option<String>) -> Self {
        Self {
            program: program.into(),
            kubeconfig,
            signals: None,
        }
    }

    /// Register port-forward children so an immediate exit can kill them.
    pub fn with_signal_state(mut self, signals: Arc<SignalState>) -> Self {
        self.signals = Some(signals);
        self
    }

    fn command(&self, namespace: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.args(["--kubeconfig", kubeconfig]);
        }
        cmd.args(["-n", namespace]).args(args);
        cmd
    }

    /// Run to completion and return stdout, mapping NotFound from stderr.
    fn run(
        &self,
        namespace: &str,
        args: &[&str],
        stdin: Option<&str>,
        target: (&'static str, &str),
    ) -> Result<String, ClusterError> {
        let rendered = format!("{} {}", self.program, args.join(" "));
        debug!(command = %rendered, namespace, "running kubectl");

        let mut cmd = self.command(namespace, args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        let mut child = cmd.spawn().map_err(|source| ClusterError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .map_err(|source| ClusterError::Spawn {
                    program: self.program.clone(),
                    source,
                })?;
        }

        let output = child.wait_with_output().map_err(|source| ClusterError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_not_found(&stderr) {
                return Err(ClusterError::NotFound {
                    kind: target.0,
                    name: target.1.to_string(),
                    namespace: namespace.to_string(),
                });
            }
            return Err(ClusterError::CommandFailed {
                command: rendered,
                status: output.status.to_string(),
                stderr,
            });
        }

        String::from_utf8(output.stdout).map_err(|e| ClusterError::Decode(e.to_string()))
    }

    fn get_json(&self, namespace: &str, kind: &'static str, resource: &str, name: &str) -> Result<Value, ClusterError> {
        let stdout = self.run(namespace, &["get", resource, name, "-o", "json"], None, (kind, name))?;
        serde_json::from_str(&stdout).map_err(|e| ClusterError::Decode(e.to_string()))
    }
}

impl Cluster for Kubectl {
    fn create_application(&self, app: &SparkApplication) -> Result<SparkApplication, ClusterError> {
        let manifest = app.to_json().map_err(|e| ClusterError::Decode(e.to_string()))?;
        let stdout = self.run(
            &app.metadata.namespace,
            &["create", "-f", "-", "-o", "json"],
            Some(&manifest),
            ("namespace", app.metadata.namespace.as_str()),
        )?;
        SparkApplication::from_json(&stdout).map_err(|e| ClusterError::Decode(e.to_string()))
    }

    fn get_application(&self, namespace: &str, name: &str) -> Result<SparkApplication, ClusterError> {
        let stdout = self.run(
            namespace,
            &["get", RESOURCE, name, "-o", "json"],
            None,
            ("SparkApplication", name),
        )?;
        SparkApplication::from_json(&stdout).map_err(|e| ClusterError::Decode(e.to_string()))
    }

    fn running_pods(&self, namespace: &str, selector: &str) -> Result<usize, ClusterError> {
        let stdout = self.run(
            namespace,
            &["get", "pods", "-l", selector, "-o", "json"],
            None,
            ("pods", selector),
        )?;
        let list: Value = serde_json::from_str(&stdout).map_err(|e| ClusterError::Decode(e.to_string()))?;
        Ok(count_running_pods(&list))
    }

    fn service_cluster_ip(&self, namespace: &str, service: &str) -> Result<String, ClusterError> {
        let svc = self.get_json(namespace, "service", "service", service)?;
        cluster_ip(&svc).ok_or_else(|| {
            ClusterError::Decode(format!("service '{}' has no cluster IP", service))
        })
    }

    fn secret_value(&self, namespace: &str, secret: &str, key: &str) -> Result<String, ClusterError> {
        let obj = self.get_json(namespace, "secret", "secret", secret)?;
        decode_secret_key(&obj, key).map_err(|reason| {
            ClusterError::Decode(format!("secret '{}' key '{}': {}", secret, key, reason))
        })
    }

    fn port_forward(
        &self,
        namespace: &str,
        service: &str,
        remote_port: u16,
    ) -> Result<Box<dyn Tunnel>, ClusterError> {
        let forward = KubectlPortForward::start(self, namespace, service, remote_port)?;
        Ok(Box::new(forward))
    }
}

/// `kubectl port-forward` child process; killed on drop.
pub struct KubectlPortForward {
    child: Arc<Mutex<Child>>,
    pid: u32,
    local_port: u16,
    target: String,
    signals: Option<Arc<SignalState>>,
}

impl KubectlPortForward {
    fn start(kubectl: &Kubectl, namespace: &str, service: &str, remote_port: u16) -> Result<Self, ClusterError> {
        let target = format!("service/{}", service);
        let mut child = kubectl
            .command(namespace, &["port-forward", &target, &format!(":{}", remote_port)])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ClusterError::Spawn {
                program: kubectl.program.clone(),
                source,
            })?;

        let local_port = match read_forwarded_port(&mut child) {
            Ok(port) => port,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        info!(forward = %target, local_port, "port-forward established");
        let pid = child.id();
        let child = Arc::new(Mutex::new(child));
        if let Some(signals) = &kubectl.signals {
            signals.track_child(pid, Arc::clone(&child));
        }
        Ok(Self {
            child,
            pid,
            local_port,
            target,
            signals: kubectl.signals.clone(),
        })
    }
}

impl Tunnel for KubectlPortForward {
    fn local_port(&self) -> u16 {
        self.local_port
    }
}

impl Drop for KubectlPortForward {
    fn drop(&mut self) {
        debug!(forward = %self.target, local_port = self.local_port, "stopping port-forward");
        {
            let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(signals) = &self.signals {
            signals.untrack_child(self.pid);
        }
    }
}

/// Read kubectl's stdout on a helper thread until the forwarded port shows up.
fn read_forwarded_port(child: &mut Child) -> Result<u16, ClusterError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ClusterError::PortForward("kubectl stdout not captured".to_string()))?;

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines().map_while(Result::ok) {
            if line.contains("Forwarding from") {
                let _ = tx.send(line);
                return;
            }
        }
    });

    let line = rx.recv_timeout(PORT_PARSE_TIMEOUT).map_err(|_| {
        ClusterError::PortForward("timeout waiting for kubectl to report forwarded port".to_string())
    })?;

    parse_forwarded_port(&line)
        .ok_or_else(|| ClusterError::PortForward(format!("cannot parse port from '{}'", line)))
}

/// Local port from `Forwarding from 127.0.0.1:54321 -> 8123` (or `[::1]:54321`).
pub fn parse_forwarded_port(line: &str) -> Option<u16> {
    line.split("Forwarding from ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|addr| addr.rsplit_once(':'))
        .and_then(|(_, port)| port.parse().ok())
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("(NotFound)")
}

fn count_running_pods(list: &Value) -> usize {
    list.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|pod| pod.pointer("/status/phase").and_then(Value::as_str) == Some("Running"))
                .count()
        })
        .unwrap_or(0)
}

fn cluster_ip(service: &Value) -> Option<String> {
    service
        .pointer("/spec/clusterIP")
        .and_then(Value::as_str)
        .filter(|ip| !ip.is_empty() && *ip != "None")
        .map(str::to_string)
}

fn decode_secret_key(secret: &Value, key: &str) -> Result<String, String> {
    let encoded = secret
        .get("data")
        .and_then(|data| data.get(key))
        .and_then(Value::as_str)
        .ok_or_else(|| "key not present".to_string())?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}
