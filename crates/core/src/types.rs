//! 도메인 타입: 클러스터 핸들, 노드, 역할, 업그레이드 모드
//!
//! [`ClusterHandle`]은 검증 대상 클러스터의 역할별 노드 집합입니다.
//! 업그레이드 컨트롤러에 전달된 이후에는 [`ClusterHandle::remove_node`]를
//! 통해서만 역할 구성이 바뀝니다.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 프로비저닝된 단일 노드
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// 인프라 제공자의 인스턴스 ID
    pub id: String,
    /// 호스트명
    pub hostname: String,
    /// 외부 접근용 IP
    pub public_ip: String,
    /// 클러스터 내부 IP
    pub private_ip: String,
    /// SSH 접속 사용자
    pub ssh_user: String,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hostname, self.public_ip)
    }
}

/// 노드 역할
///
/// `Master`는 control-plane, `Etcd`는 coordination 역할입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Etcd,
    Master,
    Worker,
    Ingress,
    Storage,
}

impl NodeRole {
    /// 모든 역할 (plan 파일 기록 순서)
    pub const ALL: [NodeRole; 5] = [
        NodeRole::Etcd,
        NodeRole::Master,
        NodeRole::Worker,
        NodeRole::Ingress,
        NodeRole::Storage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Etcd => "etcd",
            Self::Master => "master",
            Self::Worker => "worker",
            Self::Ingress => "ingress",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 역할별 노드 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCount {
    pub etcd: u16,
    pub master: u16,
    pub worker: u16,
    pub ingress: u16,
    pub storage: u16,
}

impl NodeCount {
    /// 역할별 노드 수의 합 (같은 노드가 여러 역할을 가지면 중복 집계)
    pub fn total(&self) -> u16 {
        self.etcd + self.master + self.worker + self.ingress + self.storage
    }

    pub fn get(&self, role: NodeRole) -> u16 {
        match role {
            NodeRole::Etcd => self.etcd,
            NodeRole::Master => self.master,
            NodeRole::Worker => self.worker,
            NodeRole::Ingress => self.ingress,
            NodeRole::Storage => self.storage,
        }
    }
}

/// 검증 대상 클러스터 핸들
///
/// 역할별로 분할된 노드 집합과 SSH 키 경로(인증 참조)를 보관합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHandle {
    nodes: BTreeMap<NodeRole, Vec<Node>>,
    ssh_key: PathBuf,
}

impl ClusterHandle {
    /// 빈 핸들을 생성합니다.
    pub fn new(ssh_key: impl Into<PathBuf>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            ssh_key: ssh_key.into(),
        }
    }

    /// 모든 역할을 하나의 노드가 담당하는 핸들을 생성합니다.
    pub fn single_node(node: Node, ssh_key: impl Into<PathBuf>) -> Self {
        let mut handle = Self::new(ssh_key);
        for role in NodeRole::ALL {
            handle.nodes.insert(role, vec![node.clone()]);
        }
        handle
    }

    /// 역할에 노드 목록을 지정합니다.
    pub fn with_nodes(mut self, role: NodeRole, nodes: Vec<Node>) -> Self {
        self.nodes.insert(role, nodes);
        self
    }

    /// 역할에 속한 노드 목록
    pub fn nodes(&self, role: NodeRole) -> &[Node] {
        self.nodes.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 중복 없이 모든 노드를 역할 순서대로 반환합니다.
    pub fn all_nodes(&self) -> Vec<Node> {
        let mut seen = Vec::<&str>::new();
        let mut all = Vec::new();
        for node in self.nodes.values().flatten() {
            if !seen.contains(&node.id.as_str()) {
                seen.push(&node.id);
                all.push(node.clone());
            }
        }
        all
    }

    /// 모든 역할이 같은 단일 노드에 있는지 여부
    pub fn is_single_node(&self) -> bool {
        self.all_nodes().len() == 1
    }

    /// 역할별 노드 수
    pub fn count(&self) -> NodeCount {
        NodeCount {
            etcd: self.role_len(NodeRole::Etcd),
            master: self.role_len(NodeRole::Master),
            worker: self.role_len(NodeRole::Worker),
            ingress: self.role_len(NodeRole::Ingress),
            storage: self.role_len(NodeRole::Storage),
        }
    }

    fn role_len(&self, role: NodeRole) -> u16 {
        u16::try_from(self.nodes(role).len()).unwrap_or(u16::MAX)
    }

    /// 마지막 worker를 클러스터 구성에서 빼서 예비 노드로 반환합니다.
    ///
    /// add-worker 검증용 노드를 확보할 때 fixture 단계에서만 사용합니다.
    pub fn reserve_last_worker(&mut self) -> Option<Node> {
        self.nodes.get_mut(&NodeRole::Worker).and_then(Vec::pop)
    }

    /// 노드를 모든 역할에서 제거합니다.
    ///
    /// 업그레이드 이후 역할 구성을 바꾸는 유일한 경로입니다.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let mut removed = None;
        for nodes in self.nodes.values_mut() {
            if let Some(pos) = nodes.iter().position(|n| n.id == id) {
                removed = Some(nodes.remove(pos));
            }
        }
        removed
    }

    /// SSH 키 경로
    pub fn ssh_key(&self) -> &Path {
        &self.ssh_key
    }
}

/// 노드 운영체제 배포판
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distro {
    #[serde(rename = "centos7")]
    CentOs7,
    #[serde(rename = "rhel7")]
    RedHat7,
    #[serde(rename = "ubuntu1604")]
    Ubuntu1604,
}

impl Distro {
    /// yum 계열 여부
    pub fn is_rpm_based(&self) -> bool {
        matches!(self, Self::CentOs7 | Self::RedHat7)
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CentOs7 => write!(f, "centos7"),
            Self::RedHat7 => write!(f, "rhel7"),
            Self::Ubuntu1604 => write!(f, "ubuntu1604"),
        }
    }
}

/// 업그레이드 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeMode {
    /// 외부 네트워크 의존 없음 (isolated)
    Offline,
    /// 외부 네트워크 사용 가능 (networked)
    Online,
}

impl UpgradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
        }
    }

    /// 모드별 기본 안전 점검 정책
    ///
    /// online 모드의 안전 점검은 오프라인 제약을 전제로 하므로 기본적으로 우회합니다.
    pub fn default_safety_checks(&self) -> SafetyChecks {
        match self {
            Self::Offline => SafetyChecks::Enforced,
            Self::Online => SafetyChecks::Bypassed,
        }
    }
}

impl fmt::Display for UpgradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpgradeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(Self::Offline),
            "online" => Ok(Self::Online),
            other => Err(ConfigError::InvalidValue {
                field: "upgrade.mode".to_owned(),
                reason: format!("unknown mode '{other}', expected 'offline' or 'online'"),
            }),
        }
    }
}

/// 업그레이드 안전 점검 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyChecks {
    Enforced,
    Bypassed,
}

impl fmt::Display for SafetyChecks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enforced => write!(f, "enforced"),
            Self::Bypassed => write!(f, "bypassed"),
        }
    }
}
