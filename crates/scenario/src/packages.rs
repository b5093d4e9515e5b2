//! 배포판별 패키지 명령
//!
//! 오프라인 fixture는 이전 버전 패키지를 지우고 새 패키지를 노드 역할에 맞게
//! 미리 설치합니다.

use std::collections::BTreeMap;

use keel_core::types::{ClusterHandle, Distro, Node, NodeRole};

const RPM_REPO: &str = "https://kismatic-packages-rpm.s3-accelerate.amazonaws.com/kismatic.repo";
const DEB_REPO: &str = "https://kismatic-packages-deb.s3-accelerate.amazonaws.com";

/// 역할에 필요한 패키지 목록 (정렬, 중복 없음)
pub fn packages_for(roles: &[NodeRole]) -> Vec<&'static str> {
    let mut packages = vec!["kismatic-docker-engine"];
    for role in roles {
        match role {
            NodeRole::Etcd => packages.push("kismatic-etcd"),
            NodeRole::Master => {
                packages.push("kismatic-kubernetes-master");
                packages.push("kismatic-kubernetes-networking");
            }
            NodeRole::Worker | NodeRole::Ingress => {
                packages.push("kismatic-kubernetes-node");
                packages.push("kismatic-kubernetes-networking");
            }
            NodeRole::Storage => {
                packages.push("kismatic-kubernetes-node");
                packages.push("glusterfs-server");
            }
        }
    }
    packages.sort_unstable();
    packages.dedup();
    packages
}

/// 이전 버전 패키지 제거 명령
pub fn remove_commands(distro: Distro) -> Vec<String> {
    if distro.is_rpm_based() {
        vec!["sudo yum -y remove 'kismatic-*'".to_owned()]
    } else {
        vec!["sudo apt-get -y purge 'kismatic-*'".to_owned()]
    }
}

/// 패키지 저장소 등록 + 설치 명령
pub fn install_commands(distro: Distro, packages: &[&str]) -> Vec<String> {
    let list = packages.join(" ");
    if distro.is_rpm_based() {
        vec![
            format!("sudo curl -s {RPM_REPO} -o /etc/yum.repos.d/kismatic.repo"),
            format!("sudo yum -y install {list}"),
        ]
    } else {
        vec![
            format!("wget -qO - {DEB_REPO}/public.key | sudo apt-key add -"),
            format!(
                "echo 'deb {DEB_REPO} xenial main' | sudo tee /etc/apt/sources.list.d/kismatic.list"
            ),
            "sudo apt-get update".to_owned(),
            format!("sudo apt-get -y install {list}"),
        ]
    }
}

/// 노드를 필요한 패키지 집합별로 묶습니다.
pub fn group_by_packages(handle: &ClusterHandle) -> BTreeMap<Vec<&'static str>, Vec<Node>> {
    let mut groups: BTreeMap<Vec<&'static str>, Vec<Node>> = BTreeMap::new();
    for node in handle.all_nodes() {
        let roles: Vec<NodeRole> = NodeRole::ALL
            .into_iter()
            .filter(|role| handle.nodes(*role).iter().any(|n| n.id == node.id))
            .collect();
        groups.entry(packages_for(&roles)).or_default().push(node);
    }
    groups
}
