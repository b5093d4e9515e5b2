//! 집계 시나리오 실행기
//!
//! [`Scenario`]는 하나의 공유 환경에 대한 검증 단계들을 등록 순서대로 모아 두고,
//! 평가 시 모든 단계를 실행한 뒤 실패를 하나의 판정으로 합칩니다.
//! 앞선 단계가 실패해도 뒤 단계는 건너뛰지 않습니다.
//!
//! # 평가 보장
//!
//! - [`Scenario::finalize`]는 `self`를 소비하므로 두 번 호출할 수 없습니다.
//! - finalize 없이 drop되면 drop 시점에 남은 단계를 평가합니다.
//!   - 스코프가 panic으로 풀리는 중이면 집계 결과를 로그로만 남기고 원래 panic을 유지합니다.
//!   - 그렇지 않고 실패가 있으면 집계 메시지로 panic하여 둘러싼 테스트를 실패시킵니다.
//! - drop 경로의 단계는 별도 스레드의 전용 current-thread 런타임에서 실행되고,
//!   호출 스레드는 그 완료까지 블록됩니다. 바깥 런타임이 구동하는 자원에 의존하는
//!   단계는 단계 타임아웃으로만 끝날 수 있으므로 async 코드에서는
//!   `finalize().await`를 사용하세요.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), keel_scenario::ScenarioError> {
//! use keel_scenario::Scenario;
//!
//! let mut scenario = Scenario::begin("Using an upgraded cluster");
//! scenario.add("should have an accessible dashboard", || async {
//!     Ok::<(), String>(())
//! });
//! let report = scenario.finalize().await?;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::error::ScenarioError;
use crate::step::{StepOutcome, StepResult, VerificationStep};

/// 기본 단계 타임아웃
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(900);

/// 검증 시나리오
pub struct Scenario {
    title: String,
    run_id: Uuid,
    step_timeout: Duration,
    steps: Vec<VerificationStep>,
    /// drop 시 평가가 필요한지 여부
    pending: bool,
}

impl Scenario {
    /// 새 시나리오를 시작합니다.
    pub fn begin(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            run_id: Uuid::new_v4(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
            steps: Vec::new(),
            pending: true,
        }
    }

    /// 단계별 타임아웃을 지정합니다.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// 단계를 등록합니다. 실행하지 않습니다.
    pub fn add<F, Fut, E>(&mut self, description: impl Into<String>, action: F) -> &mut Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display,
    {
        self.steps.push(VerificationStep::new(description, action));
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// 등록된 단계 수
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 모든 단계를 실행하고 실패가 있으면 집계 에러를 반환합니다.
    pub async fn finalize(self) -> Result<ScenarioReport, ScenarioError> {
        self.evaluate().await.into_result()
    }

    /// 모든 단계를 실행하고 결과 보고서를 반환합니다.
    pub async fn evaluate(mut self) -> ScenarioReport {
        self.pending = false;
        let steps = std::mem::take(&mut self.steps);
        run_steps(
            self.title.clone(),
            self.run_id,
            self.step_timeout,
            steps,
        )
        .await
    }
}

impl Drop for Scenario {
    fn drop(&mut self) {
        if !self.pending {
            return;
        }
        self.pending = false;

        let steps = std::mem::take(&mut self.steps);
        let title = self.title.clone();
        let run_id = self.run_id;
        let timeout = self.step_timeout;

        // drop은 비동기 컨텍스트 안에서도 호출되므로 전용 런타임 스레드에서 평가
        let evaluated = std::thread::spawn(move || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map(|rt| rt.block_on(run_steps(title, run_id, timeout, steps)))
        })
        .join();

        let report = match evaluated {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(scenario = %self.title, error = %e, "failed to build runtime for scenario evaluation");
                return;
            }
            Err(_) => {
                error!(scenario = %self.title, "scenario evaluation thread panicked");
                return;
            }
        };

        if report.passed() {
            return;
        }
        let aggregate = ScenarioError::StepsFailed(report);
        if std::thread::panicking() {
            error!(error = %aggregate, "scenario failed while unwinding from an earlier panic");
        } else {
            panic!("{aggregate}");
        }
    }
}

async fn run_steps(
    title: String,
    run_id: Uuid,
    timeout: Duration,
    steps: Vec<VerificationStep>,
) -> ScenarioReport {
    let span = info_span!("scenario", run_id = %run_id, title = %title);
    async move {
        info!(steps = steps.len(), "evaluating scenario");
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            results.push(step.execute(timeout).await);
        }
        let report = ScenarioReport {
            title,
            run_id: run_id.to_string(),
            results,
        };
        info!(
            executed = report.executed(),
            failed = report.failures().count(),
            "scenario evaluated"
        );
        report
    }
    .instrument(span)
    .await
}

/// 시나리오 평가 보고서
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub title: String,
    pub run_id: String,
    /// 등록 순서의 단계별 결과
    pub results: Vec<StepResult>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_passed())
    }

    /// 실행된 단계 수
    pub fn executed(&self) -> usize {
        self.results.len()
    }

    /// 실패한 단계 (등록 순서)
    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| !r.outcome.is_passed())
    }

    /// `설명: 원인` 목록을 `; `로 이은 요약
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(|r| match &r.outcome {
                StepOutcome::Failed(cause) => format!("{}: {cause}", r.description),
                StepOutcome::Passed => r.description.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// 실패가 있으면 집계 에러로 변환합니다.
    pub fn into_result(self) -> Result<Self, ScenarioError> {
        if self.passed() {
            Ok(self)
        } else {
            Err(ScenarioError::StepsFailed(self))
        }
    }
}
