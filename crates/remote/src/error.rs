//! 원격/외부 호출 에러 타입
//!
//! [`RemoteError`]는 프로세스 실행, SSH, HTTP 프로브, 프로비저너 호출 중
//! 발생하는 에러를 표현합니다. `From<RemoteError> for KeelError` 변환으로
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use keel_core::error::{KeelError, TransportError};

/// 외부 협력자 호출 에러
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// 프로세스 실행 실패 (바이너리 없음, 권한 등)
    #[error("failed to launch '{program}': {reason}")]
    Spawn {
        /// 실행하려던 프로그램
        program: String,
        /// 실패 사유
        reason: String,
    },

    /// 타임아웃 초과
    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout {
        /// 타임아웃된 작업 설명
        operation: String,
        /// 적용된 타임아웃 (초)
        timeout_secs: u64,
    },

    /// 하나 이상의 노드에서 원격 명령 실패
    #[error("remote command failed on {count} node(s): {details}")]
    Command {
        /// 실패한 노드 수
        count: usize,
        /// 노드별 실패 내역
        details: String,
    },

    /// HTTP 요청 실패
    #[error("http request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// 프로비저너 작업 실패
    #[error("provisioner error: {0}")]
    Provisioner(String),

    /// 잘못된 호출 인자
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<RemoteError> for KeelError {
    fn from(err: RemoteError) -> Self {
        let transport = match &err {
            RemoteError::Spawn { .. } | RemoteError::Timeout { .. } => {
                TransportError::Process(err.to_string())
            }
            RemoteError::Command { .. } | RemoteError::InvalidArgument(_) => {
                TransportError::Remote(err.to_string())
            }
            RemoteError::Http { .. } => TransportError::Probe(err.to_string()),
            RemoteError::Provisioner(msg) => TransportError::Provisioner(msg.clone()),
        };
        KeelError::Transport(transport)
    }
}
