//! 버전 전환 fixture
//!
//! 이전 버전 도구로 클러스터를 세우고, 현재 버전 도구를 작업 디렉토리에 준비합니다.
//! 실패는 모두 치명적이며, 실패 시 어떤 검증 단계도 실행되지 않습니다.
//!
//! # 네트워크 차단 변형
//!
//! 1. 네트워크가 있는 상태로 이전 버전 설치
//! 2. 현재 버전 도구 준비
//! 3. 이전 패키지 제거
//! 4. 오프라인용 plan 재작성
//! 5. 모든 노드에 새 패키지 사전 설치
//! 6. 모든 노드의 외부 HTTP(S) 출구 차단
//! 7. 모든 노드에서 외부 주소 도달이 실패하는지 확인 (하나라도 성공하면 무결성 위반)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use keel_core::types::{ClusterHandle, Distro, Node, NodeCount, NodeRole};
use keel_remote::{
    NodeOutcome, ProcessRunner, RemoteExecutor, SshCredentials, ToolCommand, run_checked,
};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{FixtureError, ToolError};
use crate::packages;
use crate::plan::{InstallOptions, Plan};
use crate::tool::ClusterTool;

/// 요청 토폴로지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// 역할별 노드 수가 정확히 일치해야 함
    MultiRole(NodeCount),
    /// 모든 역할이 한 노드에 있음
    SingleNode,
}

impl Topology {
    /// 모든 기능 검증용 다중 역할 클러스터
    pub fn skunkworks() -> Self {
        Self::MultiRole(NodeCount {
            etcd: 3,
            master: 2,
            worker: 3,
            ingress: 2,
            storage: 2,
        })
    }

    /// 네트워크 차단 업그레이드용 클러스터
    pub fn offline() -> Self {
        Self::MultiRole(NodeCount {
            etcd: 3,
            master: 1,
            worker: 1,
            ingress: 0,
            storage: 0,
        })
    }

    pub fn mini() -> Self {
        Self::SingleNode
    }

    fn check(&self, handle: &ClusterHandle) -> Result<(), FixtureError> {
        match self {
            Self::SingleNode => {
                let all = handle.all_nodes();
                let covers_roles = NodeRole::ALL
                    .into_iter()
                    .all(|role| handle.nodes(role).len() == 1);
                if all.len() != 1 || !covers_roles {
                    return Err(FixtureError::Topology(format!(
                        "single-node layout needs one node holding every role, found {} node(s)",
                        all.len()
                    )));
                }
            }
            Self::MultiRole(expected) => {
                let actual = handle.count();
                for role in NodeRole::ALL {
                    if actual.get(role) != expected.get(role) {
                        return Err(FixtureError::Topology(format!(
                            "expected {} {role} node(s), found {}",
                            expected.get(role),
                            actual.get(role)
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// fixture 요청
#[derive(Debug, Clone, Copy)]
pub struct FixtureRequest {
    pub topology: Topology,
    pub options: InstallOptions,
    /// 설치 후 외부 네트워크 차단
    pub disconnected: bool,
    /// 마지막 worker를 add-worker 검증용 예비 노드로 남김
    pub reserve_spare_worker: bool,
}

impl FixtureRequest {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            options: InstallOptions::default(),
            disconnected: false,
            reserve_spare_worker: false,
        }
    }

    /// 3 etcd / 1 master / 1 worker, 네트워크 차단
    pub fn offline() -> Self {
        Self {
            topology: Topology::offline(),
            options: InstallOptions {
                modify_hosts_files: true,
                auto_configure_docker_registry: true,
                ..InstallOptions::default()
            },
            disconnected: true,
            reserve_spare_worker: false,
        }
    }

    /// 다중 역할 클러스터, 마지막 worker 예약
    pub fn skunkworks() -> Self {
        Self {
            reserve_spare_worker: true,
            ..Self::new(Topology::skunkworks())
        }
    }

    pub fn with_options(mut self, options: InstallOptions) -> Self {
        self.options = options;
        self
    }
}

/// fixture 환경 설정
#[derive(Debug, Clone)]
pub struct FixtureSettings {
    /// 이전 버전 릴리스 아카이브
    pub source_archive: PathBuf,
    /// 현재 버전 릴리스 아카이브
    pub current_archive: PathBuf,
    pub distro: Distro,
    pub credentials: SshCredentials,
    pub remote_timeout: Duration,
    /// 네트워크 차단 확인용 외부 주소
    pub external_url: String,
    pub admin_password: String,
}

/// 준비 완료된 클러스터
#[derive(Debug, Clone)]
pub struct PreparedCluster {
    pub handle: ClusterHandle,
    /// add-worker 검증용 예비 노드
    pub spare_worker: Option<Node>,
}

/// 버전 전환 fixture
pub struct VersionTransitionFixture<P: ProcessRunner, R: RemoteExecutor> {
    tool: Arc<ClusterTool<P>>,
    remote: Arc<R>,
    settings: FixtureSettings,
}

impl<P: ProcessRunner, R: RemoteExecutor> VersionTransitionFixture<P, R> {
    pub fn new(tool: Arc<ClusterTool<P>>, remote: Arc<R>, settings: FixtureSettings) -> Self {
        Self {
            tool,
            remote,
            settings,
        }
    }

    pub fn settings(&self) -> &FixtureSettings {
        &self.settings
    }

    /// 이전 버전 클러스터를 세우고 현재 버전 도구를 준비합니다.
    pub async fn establish(
        &self,
        mut handle: ClusterHandle,
        request: FixtureRequest,
    ) -> Result<PreparedCluster, FixtureError> {
        let span = info_span!(
            "fixture",
            run_id = %Uuid::new_v4(),
            disconnected = request.disconnected,
        );
        async move {
            request.topology.check(&handle)?;

            let spare_worker = if request.reserve_spare_worker {
                let spare = handle.reserve_last_worker().ok_or_else(|| {
                    FixtureError::Topology("no worker available to reserve".to_owned())
                })?;
                info!(node = %spare, "reserved spare worker");
                Some(spare)
            } else {
                None
            };

            let install_options = if request.disconnected {
                // 이전 버전은 패키지 저장소를 사용해 설치
                InstallOptions {
                    disable_package_installation: false,
                    disconnected_installation: false,
                    ..request.options
                }
            } else {
                request.options
            };

            info!(archive = %self.settings.source_archive.display(), "installing previous version");
            self.stage_release(&self.settings.source_archive).await?;
            self.write_plan(&handle, install_options).await?;
            self.tool.install_apply().await?;

            info!(archive = %self.settings.current_archive.display(), "staging current version");
            self.stage_release(&self.settings.current_archive).await?;

            if request.disconnected {
                self.prepare_disconnected(&handle, request.options).await?;
            }

            info!(nodes = handle.all_nodes().len(), "fixture ready");
            Ok(PreparedCluster {
                handle,
                spare_worker,
            })
        }
        .instrument(span)
        .await
        .inspect_err(|e| error!(error = %e, "fixture failed"))
    }

    async fn prepare_disconnected(
        &self,
        handle: &ClusterHandle,
        options: InstallOptions,
    ) -> Result<(), FixtureError> {
        let nodes = handle.all_nodes();

        info!("removing old packages");
        run_checked(
            self.remote.as_ref(),
            &packages::remove_commands(self.settings.distro),
            &nodes,
            &self.settings.credentials,
            self.settings.remote_timeout,
        )
        .await?;

        info!("rewriting plan for offline use");
        self.write_plan(
            handle,
            InstallOptions {
                disable_package_installation: true,
                disconnected_installation: true,
                ..options
            },
        )
        .await?;

        info!("pre-installing current packages");
        for (packages, group) in packages::group_by_packages(handle) {
            run_checked(
                self.remote.as_ref(),
                &packages::install_commands(self.settings.distro, &packages),
                &group,
                &self.settings.credentials,
                self.settings.remote_timeout,
            )
            .await?;
        }

        self.sever_network(&nodes).await?;
        self.verify_isolation(&nodes).await
    }

    /// 릴리스 아카이브를 작업 디렉토리에 풉니다.
    pub async fn stage_release(&self, archive: &std::path::Path) -> Result<(), FixtureError> {
        let command = ToolCommand::new("tar")
            .arg("-xzf")
            .arg(archive.display().to_string())
            .arg("-C")
            .arg(self.tool.work_dir().display().to_string())
            .capture();
        let outcome = self.tool.run(&command, self.tool.timeout()).await?;
        if !outcome.success() {
            return Err(ToolError::Failed {
                command: command.to_string(),
                summary: outcome.failure_summary(),
            }
            .into());
        }
        Ok(())
    }

    async fn write_plan(
        &self,
        handle: &ClusterHandle,
        options: InstallOptions,
    ) -> Result<(), FixtureError> {
        let plan = Plan::build(
            handle,
            options,
            &self.settings.admin_password,
            self.settings.credentials.port,
        )?;
        plan.write(&self.tool.plan_path()).await
    }

    /// 모든 노드의 외부 HTTP(S) 출구를 차단합니다.
    pub async fn sever_network(&self, nodes: &[Node]) -> Result<(), FixtureError> {
        info!(nodes = nodes.len(), "disabling outbound internet access");
        run_checked(
            self.remote.as_ref(),
            &isolation_commands(),
            nodes,
            &self.settings.credentials,
            self.settings.remote_timeout,
        )
        .await?;
        Ok(())
    }

    /// 모든 노드에서 외부 주소 도달이 실패하는지 확인합니다.
    ///
    /// 한 노드라도 도달하면 [`FixtureError::EnvironmentIntegrity`]입니다.
    /// curl의 네트워크 실패 코드만 차단으로 인정하며, 전송 실패나 타임아웃,
    /// 그 밖의 종료 코드는 [`FixtureError::IsolationUnverified`]입니다.
    pub async fn verify_isolation(&self, nodes: &[Node]) -> Result<(), FixtureError> {
        let probe = vec![format!(
            "curl --head --silent --max-time 5 {}",
            self.settings.external_url
        )];
        let outcomes = self
            .remote
            .run(
                &probe,
                nodes,
                &self.settings.credentials,
                self.settings.remote_timeout,
            )
            .await?;
        let reachable: Vec<String> = outcomes
            .iter()
            .filter(|o| o.success())
            .map(|o| o.node.hostname.clone())
            .collect();
        if !reachable.is_empty() {
            return Err(FixtureError::EnvironmentIntegrity(reachable.join(", ")));
        }

        let unverified: Vec<String> = outcomes
            .iter()
            .filter(|o| !outbound_blocked(o))
            .map(|o| {
                let status = match o.exit_code {
                    _ if o.timed_out => "timed out".to_owned(),
                    Some(code) => format!("exit status {code}"),
                    None => "not executed".to_owned(),
                };
                format!("{} ({status})", o.node.hostname)
            })
            .collect();
        if !unverified.is_empty() {
            warn!(nodes = %unverified.join(", "), "isolation check did not run to a network failure");
            return Err(FixtureError::IsolationUnverified(unverified.join(", ")));
        }

        info!(url = %self.settings.external_url, "outbound access confirmed blocked");
        Ok(())
    }
}

/// curl 종료 코드: 6 이름 해석 실패, 7 연결 실패, 28 타임아웃
const CURL_NETWORK_FAILURES: [i32; 3] = [6, 7, 28];

fn outbound_blocked(outcome: &NodeOutcome) -> bool {
    !outcome.timed_out
        && outcome
            .exit_code
            .is_some_and(|code| CURL_NETWORK_FAILURES.contains(&code))
}

fn isolation_commands() -> Vec<String> {
    ["80", "443"]
        .into_iter()
        .map(|port| format!("sudo iptables -A OUTPUT -p tcp --dport {port} -j DROP"))
        .collect()
}
