//! 에러 타입: 도메인별 에러 정의
//!
//! 각 크레이트는 자체 에러 enum을 가지며 `From` 변환으로 [`KeelError`]에 합류합니다.

/// keel 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum KeelError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 원격 실행 / 프로세스 / 프로브 에러
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// 검증 실패 (fixture, 업그레이드, 시나리오)
    #[error("verification error: {0}")]
    Verification(#[from] VerificationError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 외부 협력자(프로세스, SSH, HTTP, 프로비저너) 호출 에러
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 프로세스 실행 실패
    #[error("process error: {0}")]
    Process(String),

    /// 원격 명령 실행 실패
    #[error("remote execution error: {0}")]
    Remote(String),

    /// 도달성 프로브 실패
    #[error("probe error: {0}")]
    Probe(String),

    /// 노드 프로비저닝 작업 실패
    #[error("provisioner error: {0}")]
    Provisioner(String),
}

/// 검증 실패
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// fixture 준비 실패 (치명적)
    #[error("fixture failed: {0}")]
    Fixture(String),

    /// 환경 무결성 위반 (치명적)
    #[error("environment integrity violated: {0}")]
    EnvironmentIntegrity(String),

    /// 업그레이드 작업 실패
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    /// 하나 이상의 검증 단계 실패
    #[error("scenario failed: {0}")]
    Scenario(String),
}
