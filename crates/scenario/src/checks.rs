//! 업그레이드된 클러스터 검증 단계
//!
//! 각 검증은 [`CheckContext`]를 소유한 채 실행되는 독립 비동기 작업입니다.
//! [`register`]로 시나리오에 원하는 순서대로 등록합니다.
//!
//! | 검증 | 수행 내용 |
//! |------|-----------|
//! | `Storage` | 볼륨 추가 후 상태 저장 워크로드의 쓰기/읽기 |
//! | `AddWorker` | 예비 노드를 worker로 추가하고 노드 등록 확인 |
//! | `Ingress` | ingress 배포 후 모든 ingress 노드에서 2xx 응답 |
//! | `Dashboard` | 첫 번째 master의 dashboard 응답 |
//! | `NetworkPolicy` | 기본 거부 정책 적용 후 접근 차단 확인 |
//! | `HighAvailability` | 첫 번째 master 종료 후 두 번째 master에서 smoke test |
//!
//! `HighAvailability`는 클러스터 구성을 바꾸므로 마지막에 등록해야 합니다.

use std::sync::Arc;
use std::time::Duration;

use keel_core::types::{ClusterHandle, Node, NodeRole};
use keel_remote::{
    NodeProvisioner, ProcessRunner, ReachabilityProber, RemoteError, RemoteExecutor,
    SshCredentials, probe_success, redact, run_checked,
};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::CheckError;
use crate::scenario::Scenario;
use crate::tool::ClusterTool;

/// master 종료 후 smoke test 타임아웃
pub const FAILOVER_TIMEOUT: Duration = Duration::from_secs(300);

/// 검증 단계들이 공유하는 클러스터 핸들
pub type SharedCluster = Arc<Mutex<ClusterHandle>>;

/// 검증 설정
#[derive(Debug, Clone)]
pub struct CheckSettings {
    pub credentials: SshCredentials,
    pub remote_timeout: Duration,
    pub probe_timeout: Duration,
    pub dashboard_user: String,
    pub dashboard_password: String,
}

/// 검증 실행 컨텍스트
///
/// 모든 백엔드는 `Arc`로 공유되므로 복제 비용이 작습니다.
pub struct CheckContext<P, R, H, N>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    pub tool: Arc<ClusterTool<P>>,
    pub remote: Arc<R>,
    pub prober: Arc<H>,
    pub provisioner: Arc<N>,
    pub cluster: SharedCluster,
    pub settings: Arc<CheckSettings>,
}

impl<P, R, H, N> Clone for CheckContext<P, R, H, N>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    fn clone(&self) -> Self {
        Self {
            tool: Arc::clone(&self.tool),
            remote: Arc::clone(&self.remote),
            prober: Arc::clone(&self.prober),
            provisioner: Arc::clone(&self.provisioner),
            cluster: Arc::clone(&self.cluster),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<P, R, H, N> CheckContext<P, R, H, N>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    pub fn new(
        tool: Arc<ClusterTool<P>>,
        remote: Arc<R>,
        prober: Arc<H>,
        provisioner: Arc<N>,
        cluster: ClusterHandle,
        settings: CheckSettings,
    ) -> Self {
        Self {
            tool,
            remote,
            prober,
            provisioner,
            cluster: Arc::new(Mutex::new(cluster)),
            settings: Arc::new(settings),
        }
    }

    /// 현재 첫 번째 master
    async fn first_master(&self) -> Result<Node, CheckError> {
        self.cluster
            .lock()
            .await
            .nodes(NodeRole::Master)
            .first()
            .cloned()
            .ok_or_else(|| CheckError::Precondition("cluster has no master node".to_owned()))
    }

    /// 첫 번째 master에서 명령을 실행합니다.
    async fn on_master(&self, commands: &[String], timeout: Duration) -> Result<(), CheckError> {
        let master = self.first_master().await?;
        run_checked(
            self.remote.as_ref(),
            commands,
            std::slice::from_ref(&master),
            &self.settings.credentials,
            timeout,
        )
        .await?;
        Ok(())
    }
}

/// 등록 가능한 검증 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Storage,
    AddWorker,
    Ingress,
    Dashboard,
    NetworkPolicy,
    HighAvailability,
}

impl Check {
    /// 권장 실행 순서
    pub const ALL: [Check; 6] = [
        Check::Storage,
        Check::AddWorker,
        Check::Ingress,
        Check::Dashboard,
        Check::NetworkPolicy,
        Check::HighAvailability,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            Self::Storage => "should support stateful workloads on storage volumes",
            Self::AddWorker => "should allow adding a worker node",
            Self::Ingress => "should serve ingress traffic on every ingress node",
            Self::Dashboard => "should have an accessible dashboard",
            Self::NetworkPolicy => "should enforce network policies",
            Self::HighAvailability => "should remain functional after losing the first master",
        }
    }
}

/// 검증들을 주어진 순서로 시나리오에 등록합니다.
///
/// `spare_worker`가 없으면 `AddWorker`는 전제 조건 실패로 기록됩니다.
pub fn register<P, R, H, N>(
    scenario: &mut Scenario,
    ctx: &CheckContext<P, R, H, N>,
    checks: &[Check],
    spare_worker: Option<Node>,
) where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    for check in checks {
        let ctx = ctx.clone();
        let description = check.description();
        match check {
            Check::Storage => {
                scenario.add(description, move || verify_storage(ctx));
            }
            Check::AddWorker => {
                let spare = spare_worker.clone();
                scenario.add(description, move || verify_add_worker(ctx, spare));
            }
            Check::Ingress => {
                scenario.add(description, move || verify_ingress(ctx));
            }
            Check::Dashboard => {
                scenario.add(description, move || verify_dashboard(ctx));
            }
            Check::NetworkPolicy => {
                scenario.add(description, move || verify_network_policy(ctx));
            }
            Check::HighAvailability => {
                scenario.add(description, move || verify_high_availability(ctx));
            }
        }
    }
}

/// JSON 매니페스트를 적용하는 명령
///
/// JSON은 작은따옴표를 포함하지 않으므로 셸 인용에 안전합니다.
fn apply_manifest(manifest: &serde_json::Value) -> String {
    format!("echo '{manifest}' | sudo kubectl apply -f -")
}

fn storage_commands() -> Vec<String> {
    let claim = json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": {
            "name": "keel-storage-claim",
            "annotations": {"volume.beta.kubernetes.io/storage-class": "kismatic"}
        },
        "spec": {
            "accessModes": ["ReadWriteMany"],
            "resources": {"requests": {"storage": "1Gi"}}
        }
    });
    let job = |name: &str, script: &str| {
        json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {"name": name},
            "spec": {"template": {"spec": {
                "restartPolicy": "Never",
                "containers": [{
                    "name": name,
                    "image": "busybox",
                    "command": ["sh", "-c", script],
                    "volumeMounts": [{"name": "data", "mountPath": "/data"}]
                }],
                "volumes": [{
                    "name": "data",
                    "persistentVolumeClaim": {"claimName": "keel-storage-claim"}
                }]
            }}}
        })
    };
    vec![
        apply_manifest(&claim),
        apply_manifest(&job("keel-storage-writer", "echo keel > /data/keel-check")),
        "sudo kubectl wait --for=condition=complete job/keel-storage-writer --timeout=240s"
            .to_owned(),
        apply_manifest(&job("keel-storage-reader", "grep -q keel /data/keel-check")),
        "sudo kubectl wait --for=condition=complete job/keel-storage-reader --timeout=240s"
            .to_owned(),
    ]
}

/// 상태 저장 워크로드 검증
pub async fn verify_storage<P, R, H, N>(ctx: CheckContext<P, R, H, N>) -> Result<(), CheckError>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    ctx.tool.add_volume(1, "storage01").await?;
    ctx.on_master(&storage_commands(), ctx.settings.remote_timeout)
        .await
}

/// worker 추가 검증
pub async fn verify_add_worker<P, R, H, N>(
    ctx: CheckContext<P, R, H, N>,
    spare: Option<Node>,
) -> Result<(), CheckError>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    let spare = spare
        .ok_or_else(|| CheckError::Precondition("no spare worker was reserved".to_owned()))?;
    ctx.tool.add_worker(&spare).await?;
    info!(node = %spare, "worker added");
    ctx.on_master(
        &[format!("sudo kubectl get node {}", spare.hostname)],
        ctx.settings.remote_timeout,
    )
    .await
}

fn ingress_commands() -> Vec<String> {
    let deployment = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": "keel-echo"},
        "spec": {
            "replicas": 1,
            "selector": {"matchLabels": {"app": "keel-echo"}},
            "template": {
                "metadata": {"labels": {"app": "keel-echo"}},
                "spec": {"containers": [{
                    "name": "echo",
                    "image": "gcr.io/google_containers/echoserver:1.4",
                    "ports": [{"containerPort": 8080}]
                }]}
            }
        }
    });
    let service = json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": "keel-echo"},
        "spec": {
            "selector": {"app": "keel-echo"},
            "ports": [{"port": 80, "targetPort": 8080}]
        }
    });
    let ingress = json!({
        "apiVersion": "extensions/v1beta1",
        "kind": "Ingress",
        "metadata": {"name": "keel-echo"},
        "spec": {"rules": [{"http": {"paths": [{
            "path": "/echo",
            "backend": {"serviceName": "keel-echo", "servicePort": 80}
        }]}}]}
    });
    vec![
        apply_manifest(&deployment),
        apply_manifest(&service),
        apply_manifest(&ingress),
        "sudo kubectl rollout status deployment/keel-echo --timeout=240s".to_owned(),
    ]
}

/// ingress 검증
///
/// 모든 ingress 노드를 확인하고 실패한 노드를 모두 보고합니다.
pub async fn verify_ingress<P, R, H, N>(ctx: CheckContext<P, R, H, N>) -> Result<(), CheckError>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    let ingress_nodes = ctx.cluster.lock().await.nodes(NodeRole::Ingress).to_vec();
    if ingress_nodes.is_empty() {
        return Err(CheckError::Precondition(
            "cluster has no ingress node".to_owned(),
        ));
    }
    ctx.on_master(&ingress_commands(), ctx.settings.remote_timeout)
        .await?;

    let mut failures = Vec::new();
    for node in &ingress_nodes {
        let url = format!("http://{}/echo", node.public_ip);
        match probe_success(ctx.prober.as_ref(), &url, ctx.settings.probe_timeout).await {
            Ok(outcome) => info!(node = %node, status = outcome.status, "ingress reachable"),
            Err(e) => {
                warn!(node = %node, error = %e, "ingress unreachable");
                failures.push(format!("{}: {e}", node.hostname));
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(RemoteError::Command {
            count: failures.len(),
            details: failures.join("; "),
        }
        .into())
    }
}

/// dashboard 검증. 응답이 오기만 하면 통과입니다.
pub async fn verify_dashboard<P, R, H, N>(ctx: CheckContext<P, R, H, N>) -> Result<(), CheckError>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    let master = ctx.first_master().await?;
    let url = format!(
        "https://{}:{}@{}:6443/ui",
        ctx.settings.dashboard_user, ctx.settings.dashboard_password, master.public_ip
    );
    let outcome = ctx
        .prober
        .probe(&url, ctx.settings.probe_timeout)
        .await?;
    info!(url = %redact(&url), status = outcome.status, "dashboard responded");
    Ok(())
}

fn network_policy_commands() -> Vec<String> {
    let namespace = "keel-policy";
    let server = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "keel-policy-server", "namespace": namespace,
                     "labels": {"app": "keel-policy-server"}},
        "spec": {"containers": [{
            "name": "nginx",
            "image": "nginx:stable-alpine",
            "ports": [{"containerPort": 80}]
        }]}
    });
    let service = json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": "keel-policy-server", "namespace": namespace},
        "spec": {
            "selector": {"app": "keel-policy-server"},
            "ports": [{"port": 80}]
        }
    });
    let deny_all = json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "NetworkPolicy",
        "metadata": {"name": "keel-deny-all", "namespace": namespace},
        "spec": {"podSelector": {}}
    });
    let client = format!(
        "sudo kubectl run keel-policy-client --namespace {namespace} --rm -i --restart=Never \
         --image=busybox -- wget -q -T 5 -O - http://keel-policy-server"
    );
    let body = [
        apply_manifest(&server),
        apply_manifest(&service),
        format!(
            "sudo kubectl wait --for=condition=Ready pod/keel-policy-server \
             --namespace {namespace} --timeout=240s"
        ),
        client.clone(),
        apply_manifest(&deny_all),
        format!("! {client}"),
    ]
    .join(" && ");
    let cleanup = format!("sudo kubectl delete namespace {namespace} --ignore-not-found");
    vec![
        format!("{cleanup} --wait=true"),
        format!("sudo kubectl create namespace {namespace}"),
        // 검증 결과와 무관하게 네임스페이스를 지우고 원래 종료 코드로 끝냄
        format!("( {body} ); rc=$?; {cleanup}; exit $rc"),
    ]
}

/// 네트워크 정책 검증
///
/// 정책 적용 전에는 접근 가능하고, 기본 거부 정책 적용 후에는 차단되어야 합니다.
pub async fn verify_network_policy<P, R, H, N>(
    ctx: CheckContext<P, R, H, N>,
) -> Result<(), CheckError>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    ctx.on_master(&network_policy_commands(), ctx.settings.remote_timeout)
        .await
}

/// 고가용성 검증
///
/// 첫 번째 master를 종료하고 핸들에서 제거한 뒤, 남은 master에서
/// `kuberang` smoke test를 실행합니다.
pub async fn verify_high_availability<P, R, H, N>(
    ctx: CheckContext<P, R, H, N>,
) -> Result<(), CheckError>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    let victim = {
        let cluster = ctx.cluster.lock().await;
        let masters = cluster.nodes(NodeRole::Master);
        if masters.len() < 2 {
            return Err(CheckError::Precondition(format!(
                "high availability needs at least 2 masters, found {}",
                masters.len()
            )));
        }
        masters[0].clone()
    };

    ctx.provisioner.terminate_node(&victim).await?;
    ctx.cluster.lock().await.remove_node(&victim.id);
    info!(node = %victim, "first master terminated and removed from cluster");

    ctx.on_master(&["sudo kuberang".to_owned()], FAILOVER_TIMEOUT)
        .await
}
