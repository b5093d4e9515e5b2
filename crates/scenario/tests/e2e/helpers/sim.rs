//! Simulated cluster backend.
//!
//! `SimCluster` implements every capability trait against one in-memory
//! cluster model, so a whole fixture -> upgrade -> checks run can be driven
//! without real machines. Behavior is keyed off the commands the engine sends:
//!
//! - `tar -xzf <archive>` stages a tool version (read from the archive name)
//! - `install apply` installs the staged version and registers every plan host
//! - `upgrade` moves the cluster to the staged version
//! - `iptables` severs a node's outbound access, `curl --head` observes it
//! - `kubectl get node <host>` succeeds only for registered hosts
//! - terminated nodes refuse every remote command

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use keel_core::types::Node;
use keel_remote::{
    NodeOutcome, NodeProvisioner, ProbeOutcome, ProcessOutcome, ProcessRunner,
    ReachabilityProber, RemoteError, RemoteExecutor, SshCredentials, ToolCommand,
};

/// Version carried by the historical release archive.
pub const SOURCE_VERSION: &str = "1.4.1";

/// Version carried by the current release archive.
pub const CURRENT_VERSION: &str = "1.5.0";

/// One outbound reachability observation made from a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundProbe {
    pub hostname: String,
    pub reachable: bool,
}

#[derive(Debug, Default)]
struct SimState {
    staged_version: Option<String>,
    cluster_version: Option<String>,
    registered: BTreeSet<String>,
    added_workers: Vec<String>,
    volumes: Vec<String>,
    isolated: BTreeSet<String>,
    outbound: Vec<OutboundProbe>,
    terminated: Vec<Node>,
    packages_removed: BTreeSet<String>,
    packages_installed: BTreeSet<String>,
    tool_calls: Vec<String>,
    remote_calls: Vec<String>,
}

/// Failure knobs.
#[derive(Debug, Default, Clone)]
pub struct SimFaults {
    /// Exit code returned by `upgrade`.
    pub upgrade_exit: Option<i32>,
    /// Exit code returned by `diagnose`.
    pub diagnose_exit: Option<i32>,
    /// Version reported by `info` regardless of the real cluster version.
    pub reported_version: Option<String>,
    /// Hosts whose firewall rules have no effect.
    pub leaky_hosts: Vec<String>,
    /// Ingress answers with 503.
    pub ingress_unavailable: bool,
    /// Hosts whose SSH session times out on the outbound check.
    pub probe_unreachable_hosts: Vec<String>,
}

/// In-memory cluster implementing all capability traits.
#[derive(Debug, Default)]
pub struct SimCluster {
    state: Mutex<SimState>,
    faults: SimFaults,
}

#[allow(dead_code)]
impl SimCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: SimFaults) -> Self {
        Self {
            state: Mutex::default(),
            faults,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("sim state poisoned")
    }

    pub fn cluster_version(&self) -> Option<String> {
        self.state().cluster_version.clone()
    }

    pub fn is_registered(&self, hostname: &str) -> bool {
        self.state().registered.contains(hostname)
    }

    pub fn added_workers(&self) -> Vec<String> {
        self.state().added_workers.clone()
    }

    pub fn volumes(&self) -> Vec<String> {
        self.state().volumes.clone()
    }

    pub fn isolated(&self) -> BTreeSet<String> {
        self.state().isolated.clone()
    }

    pub fn outbound_probes(&self) -> Vec<OutboundProbe> {
        self.state().outbound.clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.state()
            .terminated
            .iter()
            .map(|n| n.hostname.clone())
            .collect()
    }

    pub fn packages_removed(&self) -> BTreeSet<String> {
        self.state().packages_removed.clone()
    }

    pub fn packages_installed(&self) -> BTreeSet<String> {
        self.state().packages_installed.clone()
    }

    /// Number of tool invocations whose rendered command contains `needle`.
    pub fn tool_count(&self, needle: &str) -> usize {
        self.state()
            .tool_calls
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }

    pub fn tool_calls(&self) -> Vec<String> {
        self.state().tool_calls.clone()
    }

    pub fn remote_calls(&self) -> Vec<String> {
        self.state().remote_calls.clone()
    }

    fn exit(code: i32) -> ProcessOutcome {
        ProcessOutcome {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: if code == 0 {
                String::new()
            } else {
                "simulated failure".to_owned()
            },
        }
    }

    fn plan_hosts(command: &ToolCommand) -> Vec<String> {
        let Some(pos) = command.args.iter().position(|a| a == "-f") else {
            return Vec::new();
        };
        let Some(plan) = command.args.get(pos + 1) else {
            return Vec::new();
        };
        let path = command
            .working_dir
            .clone()
            .unwrap_or_default()
            .join(PathBuf::from(plan));
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        let Ok(plan) = serde_yaml::from_str::<serde_yaml::Value>(&raw) else {
            return Vec::new();
        };
        let mut hosts = Vec::new();
        for group in ["etcd", "master", "worker", "ingress", "storage"] {
            if let Some(nodes) = plan[group]["nodes"].as_sequence() {
                hosts.extend(
                    nodes
                        .iter()
                        .filter_map(|n| n["host"].as_str().map(str::to_owned)),
                );
            }
        }
        hosts
    }

    fn run_tool(&self, command: &ToolCommand) -> ProcessOutcome {
        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        let mut state = self.state();
        state.tool_calls.push(command.to_string());

        if command.program == "tar" {
            let archive = args.get(1).copied().unwrap_or_default();
            let version = if archive.contains(&format!("v{SOURCE_VERSION}")) {
                SOURCE_VERSION
            } else {
                CURRENT_VERSION
            };
            state.staged_version = Some(version.to_owned());
            return Self::exit(0);
        }

        match args.as_slice() {
            ["install", "apply", ..] => {
                let Some(version) = state.staged_version.clone() else {
                    return Self::exit(127);
                };
                state.cluster_version = Some(version);
                state.registered.extend(Self::plan_hosts(command));
                Self::exit(0)
            }
            ["install", "add-worker", host, ..] => {
                state.registered.insert((*host).to_owned());
                state.added_workers.push((*host).to_owned());
                Self::exit(0)
            }
            ["volume", "add", _, name, ..] => {
                state.volumes.push((*name).to_owned());
                Self::exit(0)
            }
            ["upgrade", ..] => {
                if let Some(code) = self.faults.upgrade_exit {
                    return Self::exit(code);
                }
                state.cluster_version = state.staged_version.clone();
                Self::exit(0)
            }
            ["diagnose", ..] => Self::exit(self.faults.diagnose_exit.unwrap_or(0)),
            ["info", ..] => {
                let version = self
                    .faults
                    .reported_version
                    .clone()
                    .or_else(|| state.cluster_version.clone())
                    .unwrap_or_default();
                ProcessOutcome {
                    exit_code: Some(0),
                    stdout: format!(
                        r#"{{"earliestVersion":"{version}","latestVersion":"{version}"}}"#
                    ),
                    stderr: String::new(),
                }
            }
            _ => Self::exit(0),
        }
    }

    fn run_on_node(&self, joined: &str, node: &Node) -> NodeOutcome {
        let mut state = self.state();
        let refused = |output: &str| NodeOutcome {
            node: node.clone(),
            exit_code: Some(255),
            output: output.to_owned(),
            timed_out: false,
        };
        if state.terminated.iter().any(|t| t.id == node.id) {
            return refused("ssh: connect to host: Connection refused");
        }
        if joined.contains("remove 'kismatic-*'") || joined.contains("purge 'kismatic-*'") {
            state.packages_removed.insert(node.hostname.clone());
        }
        if joined.contains("yum -y install") || joined.contains("apt-get -y install") {
            state.packages_installed.insert(node.hostname.clone());
        }
        if joined.contains("iptables") && !self.faults.leaky_hosts.contains(&node.hostname) {
            state.isolated.insert(node.hostname.clone());
        }
        if joined.contains("curl --head") {
            if self.faults.probe_unreachable_hosts.contains(&node.hostname) {
                return NodeOutcome {
                    node: node.clone(),
                    exit_code: None,
                    output: "ssh: connect to host: Connection timed out".to_owned(),
                    timed_out: true,
                };
            }
            let reachable = !state.isolated.contains(&node.hostname);
            state.outbound.push(OutboundProbe {
                hostname: node.hostname.clone(),
                reachable,
            });
            if !reachable {
                return NodeOutcome {
                    node: node.clone(),
                    exit_code: Some(28),
                    output: "curl: (28) Connection timed out".to_owned(),
                    timed_out: false,
                };
            }
        }
        if let Some(rest) = joined.split("kubectl get node ").nth(1) {
            let host = rest.split_whitespace().next().unwrap_or_default();
            if !state.registered.contains(host) {
                return refused(&format!("Error from server (NotFound): nodes \"{host}\" not found"));
            }
        }
        NodeOutcome {
            node: node.clone(),
            exit_code: Some(0),
            output: String::new(),
            timed_out: false,
        }
    }
}

impl ProcessRunner for SimCluster {
    async fn run(
        &self,
        command: &ToolCommand,
        _timeout: Duration,
    ) -> Result<ProcessOutcome, RemoteError> {
        Ok(self.run_tool(command))
    }
}

impl RemoteExecutor for SimCluster {
    async fn run(
        &self,
        commands: &[String],
        nodes: &[Node],
        _credentials: &SshCredentials,
        _timeout: Duration,
    ) -> Result<Vec<NodeOutcome>, RemoteError> {
        if commands.is_empty() {
            return Err(RemoteError::InvalidArgument("no commands".to_owned()));
        }
        let joined = commands.join(" && ");
        self.state().remote_calls.push(joined.clone());
        Ok(nodes.iter().map(|n| self.run_on_node(&joined, n)).collect())
    }
}

impl ReachabilityProber for SimCluster {
    async fn probe(&self, url: &str, _timeout: Duration) -> Result<ProbeOutcome, RemoteError> {
        let state = self.state();
        let down = state
            .terminated
            .iter()
            .any(|n| url.contains(&format!("@{}:", n.public_ip)) || url.contains(&format!("//{}/", n.public_ip)));
        if down {
            return Err(RemoteError::Http {
                url: keel_remote::redact(url),
                reason: "connection refused".to_owned(),
            });
        }
        let status = if url.contains("/echo") && self.faults.ingress_unavailable {
            503
        } else {
            200
        };
        Ok(ProbeOutcome { status })
    }
}

impl NodeProvisioner for SimCluster {
    async fn terminate_node(&self, node: &Node) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.registered.remove(&node.hostname);
        state.terminated.push(node.clone());
        Ok(())
    }
}
