//! 원격 명령 실행 추상화
//!
//! [`RemoteExecutor`]는 노드 집합에 명령 목록을 실행하고 노드별 결과를 반환합니다.
//! [`SshExecutor`]는 시스템 `ssh` 클라이언트를 [`ProcessRunner`]로 실행하며,
//! 노드들을 동시에 처리하고 결과는 입력 순서대로 돌려줍니다.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use keel_core::types::Node;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::process::{LocalProcessRunner, ProcessRunner, ToolCommand};

/// SSH 인증 정보 참조
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCredentials {
    /// 개인 키 파일 경로
    pub key_file: PathBuf,
    /// SSH 포트
    pub port: u16,
}

impl SshCredentials {
    pub fn new(key_file: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            key_file: key_file.into(),
            port,
        }
    }
}

/// 노드 하나에 대한 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    pub node: Node,
    /// 원격 명령 종료 코드 (실행 불가 또는 타임아웃이면 `None`)
    pub exit_code: Option<i32>,
    /// 합쳐진 stdout + stderr, 또는 전송 에러 메시지
    pub output: String,
    pub timed_out: bool,
}

impl NodeOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn describe_failure(&self) -> String {
        let status = if self.timed_out {
            "timed out".to_owned()
        } else {
            match self.exit_code {
                Some(code) => format!("exit status {code}"),
                None => "not executed".to_owned(),
            }
        };
        let tail = self
            .output
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(str::trim)
            .unwrap_or("");
        if tail.is_empty() {
            format!("{}: {status}", self.node.hostname)
        } else {
            format!("{}: {status}: {tail}", self.node.hostname)
        }
    }
}

/// 원격 명령 실행 trait
pub trait RemoteExecutor: Send + Sync + 'static {
    /// 각 노드에서 `commands`를 순서대로 실행합니다.
    ///
    /// 반환 벡터는 `nodes`와 같은 순서, 같은 길이입니다. 노드별 실패는
    /// [`NodeOutcome`]에 기록되며, 호출 자체가 잘못된 경우에만 `Err`를 반환합니다.
    fn run(
        &self,
        commands: &[String],
        nodes: &[Node],
        credentials: &SshCredentials,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<NodeOutcome>, RemoteError>> + Send;
}

/// 모든 노드에서 성공해야 하는 원격 실행
///
/// 하나라도 실패하면 실패 노드를 모두 나열한 [`RemoteError::Command`]를 반환합니다.
pub async fn run_checked<R: RemoteExecutor>(
    executor: &R,
    commands: &[String],
    nodes: &[Node],
    credentials: &SshCredentials,
    timeout: Duration,
) -> Result<Vec<NodeOutcome>, RemoteError> {
    let outcomes = executor.run(commands, nodes, credentials, timeout).await?;
    let failures: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.success())
        .map(NodeOutcome::describe_failure)
        .collect();
    if failures.is_empty() {
        Ok(outcomes)
    } else {
        Err(RemoteError::Command {
            count: failures.len(),
            details: failures.join("; "),
        })
    }
}

/// 시스템 `ssh` 클라이언트 기반 프로덕션 구현
pub struct SshExecutor<P: ProcessRunner = LocalProcessRunner> {
    runner: Arc<P>,
    connect_timeout_secs: u64,
}

impl SshExecutor<LocalProcessRunner> {
    pub fn new(connect_timeout_secs: u64) -> Self {
        Self::with_runner(Arc::new(LocalProcessRunner::new()), connect_timeout_secs)
    }
}

impl<P: ProcessRunner> SshExecutor<P> {
    pub fn with_runner(runner: Arc<P>, connect_timeout_secs: u64) -> Self {
        Self {
            runner,
            connect_timeout_secs,
        }
    }

    fn ssh_command(&self, node: &Node, commands: &[String], credentials: &SshCredentials) -> ToolCommand {
        ToolCommand::new("ssh")
            .arg("-i")
            .arg(credentials.key_file.display().to_string())
            .arg("-p")
            .arg(credentials.port.to_string())
            .args([
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "BatchMode=yes",
                "-o",
            ])
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
            .arg(format!("{}@{}", node.ssh_user, node.public_ip))
            .arg(commands.join(" && "))
            .capture()
    }
}

impl<P: ProcessRunner> RemoteExecutor for SshExecutor<P> {
    async fn run(
        &self,
        commands: &[String],
        nodes: &[Node],
        credentials: &SshCredentials,
        timeout: Duration,
    ) -> Result<Vec<NodeOutcome>, RemoteError> {
        if commands.is_empty() {
            return Err(RemoteError::InvalidArgument(
                "no commands to run".to_owned(),
            ));
        }

        let mut tasks = JoinSet::new();
        for (idx, node) in nodes.iter().enumerate() {
            let runner = Arc::clone(&self.runner);
            let ssh = self.ssh_command(node, commands, credentials);
            let node = node.clone();
            tasks.spawn(async move {
                debug!(node = %node, "running remote command");
                let outcome = match runner.run(&ssh, timeout).await {
                    Ok(out) => NodeOutcome {
                        node,
                        exit_code: out.exit_code,
                        output: format!("{}{}", out.stdout, out.stderr),
                        timed_out: false,
                    },
                    Err(e) => {
                        let timed_out = matches!(e, RemoteError::Timeout { .. });
                        warn!(node = %node, error = %e, "remote command transport failure");
                        NodeOutcome {
                            node,
                            exit_code: None,
                            output: e.to_string(),
                            timed_out,
                        }
                    }
                };
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<NodeOutcome>> = vec![None; nodes.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "remote command task aborted"),
            }
        }

        Ok(slots
            .into_iter()
            .zip(nodes)
            .map(|(slot, node)| {
                slot.unwrap_or_else(|| NodeOutcome {
                    node: node.clone(),
                    exit_code: None,
                    output: "remote command task aborted".to_owned(),
                    timed_out: false,
                })
            })
            .collect())
    }
}

/// 테스트용 Mock 원격 실행기
///
/// 호스트명 기준으로 실패를 지정할 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockRemoteExecutor {
    pub calls: std::sync::Mutex<Vec<(Vec<String>, Vec<String>)>>,
    pub failing_hosts: Vec<String>,
}

#[cfg(test)]
impl MockRemoteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_host(mut self, hostname: &str) -> Self {
        self.failing_hosts.push(hostname.to_owned());
        self
    }
}

#[cfg(test)]
impl RemoteExecutor for MockRemoteExecutor {
    async fn run(
        &self,
        commands: &[String],
        nodes: &[Node],
        _credentials: &SshCredentials,
        _timeout: Duration,
    ) -> Result<Vec<NodeOutcome>, RemoteError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((
                commands.to_vec(),
                nodes.iter().map(|n| n.hostname.clone()).collect(),
            ));
        }
        Ok(nodes
            .iter()
            .map(|node| {
                let failing = self.failing_hosts.contains(&node.hostname);
                NodeOutcome {
                    node: node.clone(),
                    exit_code: Some(if failing { 1 } else { 0 }),
                    output: if failing { "mock failure".to_owned() } else { String::new() },
                    timed_out: false,
                }
            })
            .collect())
    }
}
