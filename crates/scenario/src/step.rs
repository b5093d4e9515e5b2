//! 검증 단계: 이름 있는, 독립적으로 실패할 수 있는 검사
//!
//! [`VerificationStep`]은 설명과 지연 실행 액션의 쌍입니다. 액션은 등록 시점에는
//! 실행되지 않고, 시나리오 평가 시 정확히 한 번 실행된 뒤 폐기됩니다.
//!
//! 단계 경계에서 다음이 모두 실패 결과로 변환됩니다:
//! - 액션이 반환한 에러
//! - 액션 내부의 panic
//! - 단계 타임아웃 초과

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

/// `Send` 가능한 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type StepAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

/// 단계 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "cause", rename_all = "lowercase")]
pub enum StepOutcome {
    Passed,
    Failed(String),
}

impl StepOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// 단계 하나의 평가 기록
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub description: String,
    pub outcome: StepOutcome,
    pub elapsed_ms: u64,
}

/// 검증 단계
pub struct VerificationStep {
    description: String,
    action: StepAction,
}

impl VerificationStep {
    /// 새 단계를 생성합니다. 액션은 아직 실행되지 않습니다.
    pub fn new<F, Fut, E>(description: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display,
    {
        let action: StepAction = Box::new(move || -> BoxFuture<'static, Result<(), String>> {
            Box::pin(async move { action().await.map_err(|e| e.to_string()) })
        });
        Self {
            description: description.into(),
            action,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// 액션을 별도 태스크에서 실행하고 결과를 기록합니다.
    ///
    /// 타임아웃이 초과되면 태스크를 중단합니다.
    pub(crate) async fn execute(self, timeout: Duration) -> StepResult {
        let Self {
            description,
            action,
        } = self;
        let started = Instant::now();

        let mut handle = tokio::spawn(async move { action().await });
        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => StepOutcome::Passed,
            Ok(Ok(Err(cause))) => StepOutcome::Failed(cause),
            Ok(Err(join_err)) if join_err.is_panic() => {
                StepOutcome::Failed(format!("panicked: {}", panic_message(join_err.into_panic())))
            }
            Ok(Err(_)) => StepOutcome::Failed("step was cancelled".to_owned()),
            Err(_) => {
                handle.abort();
                StepOutcome::Failed(format!("timed out after {}s", timeout.as_secs()))
            }
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &outcome {
            StepOutcome::Passed => info!(step = %description, elapsed_ms, "step passed"),
            StepOutcome::Failed(cause) => {
                warn!(step = %description, elapsed_ms, cause = %cause, "step failed");
            }
        }

        StepResult {
            description,
            outcome,
            elapsed_ms,
        }
    }
}

impl fmt::Debug for VerificationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationStep")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
