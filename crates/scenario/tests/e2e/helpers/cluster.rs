//! Cluster layouts and a wired-up harness over `SimCluster`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use keel_core::types::{ClusterHandle, Distro, Node, NodeRole};
use keel_remote::SshCredentials;
use keel_scenario::{
    CheckContext, CheckSettings, ClusterTool, FixtureSettings, UpgradeController,
    VersionTransitionFixture,
};
use tempfile::TempDir;

use super::sim::{CURRENT_VERSION, SimCluster};

pub const SSH_KEY: &str = "/keys/kismatic-integration-testing.pem";

/// Creates a node whose addresses are derived from `octet`.
pub fn node(hostname: &str, octet: u8) -> Node {
    Node {
        id: format!("i-{hostname}"),
        hostname: hostname.to_owned(),
        public_ip: format!("52.0.0.{octet}"),
        private_ip: format!("10.0.0.{octet}"),
        ssh_user: "centos".to_owned(),
    }
}

fn numbered(prefix: &str, count: u8, base: u8) -> Vec<Node> {
    (1..=count)
        .map(|i| node(&format!("{prefix}{i:02}"), base + i))
        .collect()
}

/// 3 etcd / 1 master / 1 worker.
pub fn offline_layout() -> ClusterHandle {
    ClusterHandle::new(SSH_KEY)
        .with_nodes(NodeRole::Etcd, numbered("etcd", 3, 0))
        .with_nodes(NodeRole::Master, numbered("master", 1, 10))
        .with_nodes(NodeRole::Worker, numbered("worker", 1, 20))
}

/// 3 etcd / 2 master / 3 worker / 2 ingress / 2 storage.
#[allow(dead_code)]
pub fn skunkworks_layout() -> ClusterHandle {
    ClusterHandle::new(SSH_KEY)
        .with_nodes(NodeRole::Etcd, numbered("etcd", 3, 0))
        .with_nodes(NodeRole::Master, numbered("master", 2, 10))
        .with_nodes(NodeRole::Worker, numbered("worker", 3, 20))
        .with_nodes(NodeRole::Ingress, numbered("ingress", 2, 30))
        .with_nodes(NodeRole::Storage, numbered("storage", 2, 40))
}

/// Fixture, controller and check context sharing one simulated cluster.
pub struct Harness {
    pub sim: Arc<SimCluster>,
    pub tool: Arc<ClusterTool<SimCluster>>,
    pub fixture: VersionTransitionFixture<SimCluster, SimCluster>,
    _work_dir: TempDir,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(sim: SimCluster) -> Self {
        let work_dir = tempfile::tempdir().expect("temp dir");
        let sim = Arc::new(sim);
        let tool = Arc::new(ClusterTool::new(
            Arc::clone(&sim),
            "./kismatic",
            work_dir.path(),
            "kismatic-testing.yaml",
            Duration::from_secs(60),
        ));
        let settings = FixtureSettings {
            source_archive: PathBuf::from("artifacts/kismatic-v1.4.1-linux-amd64.tar.gz"),
            current_archive: PathBuf::from("artifacts/kismatic.tar.gz"),
            distro: Distro::CentOs7,
            credentials: credentials(),
            remote_timeout: Duration::from_secs(300),
            external_url: "https://www.google.com".to_owned(),
            admin_password: "abbazabba".to_owned(),
        };
        let fixture = VersionTransitionFixture::new(Arc::clone(&tool), Arc::clone(&sim), settings);
        Self {
            sim,
            tool,
            fixture,
            _work_dir: work_dir,
        }
    }

    pub fn controller(&self) -> UpgradeController<SimCluster> {
        let expected = semver::Version::parse(CURRENT_VERSION).expect("valid version");
        UpgradeController::new(Arc::clone(&self.tool), expected)
    }

    pub fn checks(
        &self,
        cluster: ClusterHandle,
    ) -> CheckContext<SimCluster, SimCluster, SimCluster, SimCluster> {
        CheckContext::new(
            Arc::clone(&self.tool),
            Arc::clone(&self.sim),
            Arc::clone(&self.sim),
            Arc::clone(&self.sim),
            cluster,
            CheckSettings {
                credentials: credentials(),
                remote_timeout: Duration::from_secs(300),
                probe_timeout: Duration::from_secs(10),
                dashboard_user: "admin".to_owned(),
                dashboard_password: "abbazabba".to_owned(),
            },
        )
    }
}

fn credentials() -> SshCredentials {
    SshCredentials::new(SSH_KEY, 22)
}
