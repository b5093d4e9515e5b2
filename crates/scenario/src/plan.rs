//! 클러스터 plan 파일 생성
//!
//! 관리 대상 도구가 읽는 YAML plan을 [`ClusterHandle`]과 [`InstallOptions`]로부터
//! 만듭니다. 검증에 필요한 필드만 기록합니다.

use std::path::Path;

use keel_core::types::{ClusterHandle, Node, NodeRole};
use serde::Serialize;
use tracing::info;

use crate::error::FixtureError;

/// 설치 옵션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// 노드에 패키지를 설치하지 않음 (사전 설치 가정)
    pub disable_package_installation: bool,
    /// 외부 저장소 없이 설치
    pub disconnected_installation: bool,
    /// 노드의 hosts 파일 수정
    pub modify_hosts_files: bool,
    /// 내부 Docker 레지스트리 자동 구성
    pub auto_configure_docker_registry: bool,
}

impl InstallOptions {
    /// 네트워크 차단 후 사용할 옵션
    pub fn offline() -> Self {
        Self {
            disable_package_installation: true,
            disconnected_installation: true,
            modify_hosts_files: true,
            auto_configure_docker_registry: true,
        }
    }
}

/// plan 파일 최상위 구조
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub cluster: ClusterSection,
    pub docker_registry: RegistrySection,
    pub etcd: NodeGroup,
    pub master: MasterNodeGroup,
    pub worker: NodeGroup,
    pub ingress: NodeGroup,
    pub storage: NodeGroup,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSection {
    pub name: String,
    pub admin_password: String,
    pub disable_package_installation: bool,
    pub disconnected_installation: bool,
    pub networking: NetworkingSection,
    pub certificates: CertificatesSection,
    pub ssh: SshSection,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkingSection {
    #[serde(rename = "type")]
    pub kind: String,
    pub pod_cidr_block: String,
    pub service_cidr_block: String,
    pub update_hosts_files: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificatesSection {
    pub expiry: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SshSection {
    pub user: String,
    pub ssh_key: String,
    pub ssh_port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrySection {
    pub setup_internal: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeGroup {
    pub expected_count: usize,
    pub nodes: Vec<PlanNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MasterNodeGroup {
    pub expected_count: usize,
    pub load_balanced_fqdn: String,
    pub load_balanced_short_name: String,
    pub nodes: Vec<PlanNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanNode {
    pub host: String,
    pub ip: String,
    pub internalip: String,
}

impl From<&Node> for PlanNode {
    fn from(node: &Node) -> Self {
        Self {
            host: node.hostname.clone(),
            ip: node.public_ip.clone(),
            internalip: node.private_ip.clone(),
        }
    }
}

fn group(handle: &ClusterHandle, role: NodeRole) -> NodeGroup {
    let nodes: Vec<PlanNode> = handle.nodes(role).iter().map(PlanNode::from).collect();
    NodeGroup {
        expected_count: nodes.len(),
        nodes,
    }
}

impl Plan {
    /// 핸들의 현재 역할 구성으로 plan을 만듭니다.
    ///
    /// master 로드밸런서 주소는 첫 번째 master의 public IP입니다.
    pub fn build(
        handle: &ClusterHandle,
        options: InstallOptions,
        admin_password: &str,
        ssh_port: u16,
    ) -> Result<Self, FixtureError> {
        let masters = handle.nodes(NodeRole::Master);
        let first_master = masters
            .first()
            .ok_or_else(|| FixtureError::Topology("plan requires a master node".to_owned()))?;
        let ssh_user = first_master.ssh_user.clone();

        Ok(Self {
            cluster: ClusterSection {
                name: "kismatic-cluster".to_owned(),
                admin_password: admin_password.to_owned(),
                disable_package_installation: options.disable_package_installation,
                disconnected_installation: options.disconnected_installation,
                networking: NetworkingSection {
                    kind: "overlay".to_owned(),
                    pod_cidr_block: "172.16.0.0/16".to_owned(),
                    service_cidr_block: "172.20.0.0/16".to_owned(),
                    update_hosts_files: options.modify_hosts_files,
                },
                certificates: CertificatesSection {
                    expiry: "17520h".to_owned(),
                },
                ssh: SshSection {
                    user: ssh_user,
                    ssh_key: handle.ssh_key().display().to_string(),
                    ssh_port,
                },
            },
            docker_registry: RegistrySection {
                setup_internal: options.auto_configure_docker_registry,
            },
            etcd: group(handle, NodeRole::Etcd),
            master: MasterNodeGroup {
                expected_count: masters.len(),
                load_balanced_fqdn: first_master.public_ip.clone(),
                load_balanced_short_name: first_master.public_ip.clone(),
                nodes: masters.iter().map(PlanNode::from).collect(),
            },
            worker: group(handle, NodeRole::Worker),
            ingress: group(handle, NodeRole::Ingress),
            storage: group(handle, NodeRole::Storage),
        })
    }

    pub fn to_yaml(&self) -> Result<String, FixtureError> {
        serde_yaml::to_string(self).map_err(|e| FixtureError::Plan(e.to_string()))
    }

    /// 기존 plan을 지우고 새로 기록합니다.
    pub async fn write(&self, path: &Path) -> Result<(), FixtureError> {
        let yaml = self.to_yaml()?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "removed previous plan file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::write(path, yaml).await?;
        info!(path = %path.display(), "wrote plan file");
        Ok(())
    }
}
