//! 업그레이드 실행 컨트롤러
//!
//! [`UpgradeController`]는 관리 대상 도구의 업그레이드를 정확히 한 번 실행합니다.
//!
//! - 실패(0이 아닌 종료, 실행 불가, 타임아웃): 즉시 `diagnose`를 한 번 실행한 뒤
//!   원래 업그레이드 에러를 반환합니다. 진단 실패는 로그로만 남습니다.
//! - 성공: `info`로 보고된 버전이 기대 버전과 같은지 확인합니다.
//!
//! ```text
//! NotStarted ──> Running ──┬──> Succeeded
//!                          ├──> FailedWithDiagnostics
//!                          └──> FailedVersionMismatch
//! ```

use std::fmt;
use std::sync::Arc;

use keel_core::types::{SafetyChecks, UpgradeMode};
use keel_remote::ProcessRunner;
use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{ToolError, UpgradeError};
use crate::tool::{ClusterInfo, ClusterTool};

/// 업그레이드 호출 정의
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeInvocation {
    pub mode: UpgradeMode,
    pub safety_checks: SafetyChecks,
}

impl UpgradeInvocation {
    /// 모드 기본 안전 점검 정책으로 호출을 만듭니다.
    pub fn new(mode: UpgradeMode) -> Self {
        Self {
            mode,
            safety_checks: mode.default_safety_checks(),
        }
    }

    /// 격리(offline) 모드, 안전 점검 수행
    pub fn offline() -> Self {
        Self::new(UpgradeMode::Offline)
    }

    /// 네트워크(online) 모드, 안전 점검 우회
    pub fn online() -> Self {
        Self::new(UpgradeMode::Online)
    }

    pub fn with_safety_checks(mut self, safety_checks: SafetyChecks) -> Self {
        self.safety_checks = safety_checks;
        self
    }

    /// 안전 점검 우회는 online 모드에서만 허용됩니다.
    pub fn validate(&self) -> Result<(), UpgradeError> {
        if self.mode == UpgradeMode::Offline && self.safety_checks == SafetyChecks::Bypassed {
            return Err(UpgradeError::InvalidInvocation(
                "safety checks can only be bypassed in online mode".to_owned(),
            ));
        }
        Ok(())
    }

    /// plan 플래그를 제외한 도구 인자
    fn args(&self) -> Vec<&'static str> {
        let mut args = vec!["upgrade", self.mode.as_str()];
        if self.safety_checks == SafetyChecks::Bypassed {
            args.push("--ignore-safety-checks");
        }
        args
    }
}

/// 컨트롤러 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    NotStarted,
    Running,
    Succeeded,
    FailedWithDiagnostics,
    FailedVersionMismatch,
}

impl UpgradeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Running)
    }
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::FailedWithDiagnostics => write!(f, "failed (diagnostics captured)"),
            Self::FailedVersionMismatch => write!(f, "failed (version mismatch)"),
        }
    }
}

/// 진단 수집 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum DiagnosticsOutcome {
    Captured,
    Failed(String),
}

/// 업그레이드 실행 컨트롤러
pub struct UpgradeController<P: ProcessRunner> {
    tool: Arc<ClusterTool<P>>,
    expected_version: semver::Version,
    state: UpgradeState,
    diagnostics: Option<DiagnosticsOutcome>,
    run_id: Uuid,
}

impl<P: ProcessRunner> UpgradeController<P> {
    pub fn new(tool: Arc<ClusterTool<P>>, expected_version: semver::Version) -> Self {
        Self {
            tool,
            expected_version,
            state: UpgradeState::NotStarted,
            diagnostics: None,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn state(&self) -> UpgradeState {
        self.state
    }

    /// 진단 수집 시도 결과 (업그레이드 실패 시에만 존재)
    pub fn diagnostics(&self) -> Option<&DiagnosticsOutcome> {
        self.diagnostics.as_ref()
    }

    pub fn expected_version(&self) -> &semver::Version {
        &self.expected_version
    }

    /// 업그레이드를 실행하고 확인된 클러스터 버전을 반환합니다.
    pub async fn upgrade(
        &mut self,
        invocation: &UpgradeInvocation,
    ) -> Result<semver::Version, UpgradeError> {
        if self.state != UpgradeState::NotStarted {
            return Err(UpgradeError::AlreadyInvoked);
        }
        invocation.validate()?;

        let span = info_span!(
            "upgrade",
            run_id = %self.run_id,
            mode = %invocation.mode,
            safety_checks = %invocation.safety_checks,
        );
        self.state = UpgradeState::Running;
        let result = self.execute(invocation).instrument(span).await;
        info!(run_id = %self.run_id, state = %self.state, "upgrade finished");
        result
    }

    async fn execute(
        &mut self,
        invocation: &UpgradeInvocation,
    ) -> Result<semver::Version, UpgradeError> {
        let command = self.tool.command(invocation.args());
        info!(command = %command, "starting upgrade");

        let upgrade_result = match self.tool.run(&command, self.tool.timeout()).await {
            Ok(outcome) if outcome.success() => Ok(()),
            Ok(outcome) => Err(ToolError::Failed {
                command: command.to_string(),
                summary: outcome.failure_summary(),
            }),
            Err(e) => Err(e),
        };

        if let Err(upgrade_err) = upgrade_result {
            error!(error = %upgrade_err, "upgrade failed, running diagnostics");
            self.capture_diagnostics().await;
            self.state = UpgradeState::FailedWithDiagnostics;
            return Err(UpgradeError::Failed(upgrade_err));
        }

        match self.verify_version().await {
            Ok(version) => {
                self.state = UpgradeState::Succeeded;
                info!(version = %version, "cluster reports expected version");
                Ok(version)
            }
            Err(e) => {
                self.state = UpgradeState::FailedVersionMismatch;
                error!(error = %e, "cluster version check failed");
                Err(e)
            }
        }
    }

    async fn capture_diagnostics(&mut self) {
        let outcome = match self.tool.diagnose().await {
            Ok(()) => DiagnosticsOutcome::Captured,
            Err(e) => {
                warn!(error = %e, "error running diagnose command");
                DiagnosticsOutcome::Failed(e.to_string())
            }
        };
        self.diagnostics = Some(outcome);
    }

    async fn verify_version(&self) -> Result<semver::Version, UpgradeError> {
        let info = self
            .tool
            .info()
            .await
            .map_err(|e| UpgradeError::VersionUnverifiable(e.to_string()))?;
        check_version(&info, &self.expected_version)
    }
}

/// 모든 노드가 기대 버전에 있는지 확인합니다.
fn check_version(
    info: &ClusterInfo,
    expected: &semver::Version,
) -> Result<semver::Version, UpgradeError> {
    for reported in [&info.earliest_version, &info.latest_version] {
        let parsed = semver::Version::parse(reported.trim().trim_start_matches('v'))
            .map_err(|e| {
                UpgradeError::VersionUnverifiable(format!("'{reported}' is not a version: {e}"))
            })?;
        if &parsed != expected {
            return Err(UpgradeError::VersionMismatch {
                expected: expected.clone(),
                actual: reported.clone(),
            });
        }
    }
    Ok(expected.clone())
}
