//! 관리 대상 클러스터 도구 호출
//!
//! [`ClusterTool`]은 도구의 프로세스 인터페이스를 감쌉니다.
//! 모든 호출은 작업 디렉토리에서 plan 파일을 `-f`로 전달합니다.
//!
//! | 작업 | 명령 |
//! |------|------|
//! | 설치 | `install apply -f <plan>` |
//! | 워커 추가 | `install add-worker <host> <ip> <internal-ip> -f <plan>` |
//! | 볼륨 추가 | `volume add <size-gb> <name> -f <plan>` |
//! | 업그레이드 | `upgrade {offline\|online} -f <plan> [--ignore-safety-checks]` |
//! | 진단 | `diagnose -f <plan>` |
//! | 버전 조회 | `info -f <plan> -o json` |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use keel_core::types::Node;
use keel_remote::{ProcessOutcome, ProcessRunner, ToolCommand};
use serde::Deserialize;
use tracing::info;

use crate::error::ToolError;

/// `info -o json` 출력
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    /// 클러스터 노드 중 가장 오래된 버전
    pub earliest_version: String,
    /// 클러스터 노드 중 가장 최신 버전
    pub latest_version: String,
}

impl ClusterInfo {
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        serde_json::from_str(raw.trim()).map_err(|e| ToolError::InvalidInfo(e.to_string()))
    }
}

/// 관리 대상 도구 핸들
pub struct ClusterTool<P: ProcessRunner> {
    runner: Arc<P>,
    binary: String,
    work_dir: PathBuf,
    plan_file: String,
    timeout: Duration,
}

impl<P: ProcessRunner> ClusterTool<P> {
    pub fn new(
        runner: Arc<P>,
        binary: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        plan_file: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            binary: binary.into(),
            work_dir: work_dir.into(),
            plan_file: plan_file.into(),
            timeout,
        }
    }

    pub fn runner(&self) -> &Arc<P> {
        &self.runner
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn plan_file(&self) -> &str {
        &self.plan_file
    }

    /// 작업 디렉토리 기준 plan 파일 전체 경로
    pub fn plan_path(&self) -> PathBuf {
        self.work_dir.join(&self.plan_file)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `<binary> <args...> -f <plan>` 명령을 구성합니다.
    pub fn command<I, S>(&self, args: I) -> ToolCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ToolCommand::new(&self.binary)
            .args(args)
            .args(["-f", self.plan_file.as_str()])
            .current_dir(&self.work_dir)
    }

    /// 명령을 실행하고 종료 코드와 무관하게 결과를 반환합니다.
    pub async fn run(
        &self,
        command: &ToolCommand,
        timeout: Duration,
    ) -> Result<ProcessOutcome, ToolError> {
        info!(command = %command, "running cluster tool");
        Ok(self.runner.run(command, timeout).await?)
    }

    /// 명령을 실행하고 0이 아닌 종료 코드를 에러로 변환합니다.
    pub async fn run_checked(&self, command: &ToolCommand) -> Result<ProcessOutcome, ToolError> {
        let outcome = self.run(command, self.timeout).await?;
        if outcome.success() {
            Ok(outcome)
        } else {
            Err(ToolError::Failed {
                command: command.to_string(),
                summary: outcome.failure_summary(),
            })
        }
    }

    pub async fn install_apply(&self) -> Result<(), ToolError> {
        self.run_checked(&self.command(["install", "apply"])).await?;
        Ok(())
    }

    pub async fn add_worker(&self, node: &Node) -> Result<(), ToolError> {
        let command = self.command([
            "install",
            "add-worker",
            node.hostname.as_str(),
            node.public_ip.as_str(),
            node.private_ip.as_str(),
        ]);
        self.run_checked(&command).await?;
        Ok(())
    }

    pub async fn add_volume(&self, size_gb: u32, name: &str) -> Result<(), ToolError> {
        let size = size_gb.to_string();
        self.run_checked(&self.command(["volume", "add", size.as_str(), name]))
            .await?;
        Ok(())
    }

    /// 진단 정보를 수집합니다. 출력은 운영자에게 그대로 전달됩니다.
    pub async fn diagnose(&self) -> Result<(), ToolError> {
        self.run_checked(&self.command(["diagnose"])).await?;
        Ok(())
    }

    /// 클러스터가 보고하는 버전 정보를 조회합니다.
    pub async fn info(&self) -> Result<ClusterInfo, ToolError> {
        let outcome = self
            .run_checked(&self.command(["info"]).args(["-o", "json"]).capture())
            .await?;
        ClusterInfo::parse(&outcome.stdout)
    }
}
