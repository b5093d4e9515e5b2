//! 검증 오케스트레이션 에러 타입
//!
//! 각 컴포넌트는 자체 에러 enum을 가지며, 모두 `From` 변환으로
//! [`KeelError`]의 `Verification` 또는 `Transport` 분류에 합류합니다.

use keel_core::error::{KeelError, VerificationError};
use keel_remote::RemoteError;

use crate::scenario::ScenarioReport;

/// 관리 대상 도구 호출 에러
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// 실행 불가 또는 타임아웃
    #[error(transparent)]
    Transport(#[from] RemoteError),

    /// 종료 코드가 0이 아님
    #[error("'{command}' failed: {summary}")]
    Failed { command: String, summary: String },

    /// `info` 출력을 해석할 수 없음
    #[error("unreadable cluster info: {0}")]
    InvalidInfo(String),
}

/// 업그레이드 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    /// 유효하지 않은 호출 (예: offline 모드에서 안전 점검 우회)
    #[error("invalid upgrade invocation: {0}")]
    InvalidInvocation(String),

    /// 같은 컨트롤러에서 두 번째 호출
    #[error("upgrade already invoked on this controller")]
    AlreadyInvoked,

    /// 업그레이드 명령 실패 (진단 수집 후 보고)
    #[error("upgrade failed: {0}")]
    Failed(#[source] ToolError),

    /// 업그레이드는 성공했으나 보고된 버전이 다름
    #[error("cluster reports version {actual}, expected {expected}")]
    VersionMismatch {
        expected: semver::Version,
        actual: String,
    },

    /// 업그레이드 후 버전을 확인할 수 없음
    #[error("could not verify cluster version: {0}")]
    VersionUnverifiable(String),
}

/// fixture 준비 에러 (치명적)
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// 노드 구성이 요청된 토폴로지와 다름
    #[error("topology mismatch: {0}")]
    Topology(String),

    /// 도구 호출 실패
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// 원격 명령 실패
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// plan 파일 직렬화 실패
    #[error("failed to render plan: {0}")]
    Plan(String),

    /// plan 파일 I/O 실패
    #[error("plan file io error: {0}")]
    Io(#[from] std::io::Error),

    /// 네트워크 차단 후에도 외부에 도달 가능
    #[error("outbound access still available on: {0}")]
    EnvironmentIntegrity(String),

    /// 차단 확인 명령이 네트워크 실패 이외의 이유로 끝남
    #[error("isolation could not be verified on: {0}")]
    IsolationUnverified(String),
}

/// 검증 단계(check) 실패
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// 도구 호출 실패
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// 원격 명령 또는 프로브 실패
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// 검증을 수행할 수 없는 클러스터 상태
    #[error("precondition not met: {0}")]
    Precondition(String),
}

/// 시나리오 실패
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// 하나 이상의 단계 실패
    #[error("scenario '{}' failed: {}", .0.title, .0.failure_summary())]
    StepsFailed(ScenarioReport),
}

impl From<ToolError> for KeelError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Transport(e) => e.into(),
            other => KeelError::Verification(VerificationError::Upgrade(other.to_string())),
        }
    }
}

impl From<UpgradeError> for KeelError {
    fn from(err: UpgradeError) -> Self {
        KeelError::Verification(VerificationError::Upgrade(err.to_string()))
    }
}

impl From<FixtureError> for KeelError {
    fn from(err: FixtureError) -> Self {
        let verification = match &err {
            FixtureError::EnvironmentIntegrity(nodes) => {
                VerificationError::EnvironmentIntegrity(nodes.clone())
            }
            _ => VerificationError::Fixture(err.to_string()),
        };
        KeelError::Verification(verification)
    }
}

impl From<CheckError> for KeelError {
    fn from(err: CheckError) -> Self {
        KeelError::Verification(VerificationError::Scenario(err.to_string()))
    }
}

impl From<ScenarioError> for KeelError {
    fn from(err: ScenarioError) -> Self {
        KeelError::Verification(VerificationError::Scenario(err.to_string()))
    }
}
