//! 노드 인벤토리: inventory.toml 파싱
//!
//! 외부에서 프로비저닝된 노드 목록을 역할과 함께 기술합니다.
//!
//! ```toml
//! ssh_key = "kismatic-integration-testing.pem"
//! distro = "centos7"
//!
//! [[nodes]]
//! id = "i-0a1b2c"
//! hostname = "etcd01"
//! public_ip = "52.10.0.1"
//! private_ip = "10.0.0.1"
//! ssh_user = "centos"
//! roles = ["etcd"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, KeelError};
use crate::types::{ClusterHandle, Distro, Node, NodeRole};

/// 인벤토리 파일의 최상위 구조
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    /// SSH 키 경로 (미지정 시 `remote.ssh_key` 사용)
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
    /// 모든 노드의 배포판
    #[serde(default = "default_distro")]
    pub distro: Distro,
    /// 노드 목록
    #[serde(default)]
    pub nodes: Vec<InventoryNode>,
}

fn default_distro() -> Distro {
    Distro::CentOs7
}

/// 인벤토리 노드 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryNode {
    pub id: String,
    pub hostname: String,
    pub public_ip: String,
    pub private_ip: String,
    pub ssh_user: String,
    pub roles: Vec<NodeRole>,
}

impl InventoryNode {
    fn to_node(&self) -> Node {
        Node {
            id: self.id.clone(),
            hostname: self.hostname.clone(),
            public_ip: self.public_ip.clone(),
            private_ip: self.private_ip.clone(),
            ssh_user: self.ssh_user.clone(),
        }
    }
}

impl Inventory {
    /// 파일에서 인벤토리를 로드하고 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, KeelError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KeelError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                KeelError::Io(e)
            }
        })?;
        let inventory = Self::parse(&content)?;
        inventory.validate()?;
        Ok(inventory)
    }

    pub fn parse(toml_str: &str) -> Result<Self, KeelError> {
        toml::from_str(toml_str).map_err(|e| {
            KeelError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 노드 ID 중복, 역할 누락, 필수 역할 부재를 검사합니다.
    pub fn validate(&self) -> Result<(), KeelError> {
        if self.nodes.is_empty() {
            return Err(invalid("nodes", "inventory must list at least one node"));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(invalid("nodes", &format!("duplicate node id '{}'", node.id)));
            }
            if node.roles.is_empty() {
                return Err(invalid(
                    "nodes.roles",
                    &format!("node '{}' has no roles", node.id),
                ));
            }
        }

        for role in [NodeRole::Etcd, NodeRole::Master, NodeRole::Worker] {
            if !self.nodes.iter().any(|n| n.roles.contains(&role)) {
                return Err(invalid(
                    "nodes.roles",
                    &format!("at least one {role} node is required"),
                ));
            }
        }

        Ok(())
    }

    /// 클러스터 핸들로 변환합니다.
    ///
    /// 인벤토리에 SSH 키가 없으면 `fallback_key`를 사용합니다.
    pub fn to_handle(&self, fallback_key: &Path) -> ClusterHandle {
        let key = self
            .ssh_key
            .clone()
            .unwrap_or_else(|| fallback_key.to_path_buf());
        let mut handle = ClusterHandle::new(key);
        for role in NodeRole::ALL {
            let nodes: Vec<Node> = self
                .nodes
                .iter()
                .filter(|n| n.roles.contains(&role))
                .map(InventoryNode::to_node)
                .collect();
            if !nodes.is_empty() {
                handle = handle.with_nodes(role, nodes);
            }
        }
        handle
    }
}

fn invalid(field: &str, reason: &str) -> KeelError {
    ConfigError::InvalidValue {
        field: format!("inventory.{field}"),
        reason: reason.to_owned(),
    }
    .into()
}
