//! 로컬 프로세스 실행 추상화
//!
//! [`ProcessRunner`]는 관리 대상 클러스터 도구(`install`, `upgrade`, `diagnose`, ...)와
//! 같은 로컬 바이너리를 실행합니다. 프로덕션은 [`LocalProcessRunner`]를,
//! 테스트는 `MockProcessRunner`를 사용합니다.
//!
//! 출력은 [`OutputMode::Inherit`]이면 운영자 터미널로 그대로 전달되고,
//! [`OutputMode::Capture`]이면 [`ProcessOutcome`]에 수집됩니다.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RemoteError;

/// 출력 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// 부모 프로세스의 stdout/stderr로 전달
    #[default]
    Inherit,
    /// 수집하여 반환
    Capture,
}

/// 실행할 명령
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputMode,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            output: OutputMode::Inherit,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// 출력을 수집하도록 설정합니다.
    pub fn capture(mut self) -> Self {
        self.output = OutputMode::Capture;
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// 프로세스 실행 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    /// 종료 코드 (시그널로 종료되면 `None`)
    pub exit_code: Option<i32>,
    /// 수집된 stdout (Inherit 모드에서는 빈 문자열)
    pub stdout: String,
    /// 수집된 stderr (Inherit 모드에서는 빈 문자열)
    pub stderr: String,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// 실패 원인 요약 (종료 코드 + stderr 마지막 줄)
    pub fn failure_summary(&self) -> String {
        let code = match self.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_owned(),
        };
        match self.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => format!("{code}: {}", line.trim()),
            None => code,
        }
    }
}

/// 로컬 프로세스 실행 trait
///
/// 종료 코드가 0이 아닌 것은 에러가 아니라 [`ProcessOutcome`]으로 보고됩니다.
/// 실행 자체가 불가능하거나 타임아웃이 초과된 경우에만 `Err`를 반환합니다.
pub trait ProcessRunner: Send + Sync + 'static {
    fn run(
        &self,
        command: &ToolCommand,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProcessOutcome, RemoteError>> + Send;
}

/// `tokio::process` 기반 프로덕션 구현
///
/// 타임아웃이 초과되면 자식 프로세스를 종료합니다.
#[derive(Debug, Clone, Default)]
pub struct LocalProcessRunner;

impl LocalProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for LocalProcessRunner {
    async fn run(
        &self,
        command: &ToolCommand,
        timeout: Duration,
    ) -> Result<ProcessOutcome, RemoteError> {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args).kill_on_drop(true).stdin(Stdio::null());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        match command.output {
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        debug!(command = %command, "launching process");
        let child = cmd.spawn().map_err(|e| RemoteError::Spawn {
            program: command.program.clone(),
            reason: e.to_string(),
        })?;

        // 타임아웃으로 future가 drop되면 kill_on_drop이 자식을 정리함
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!(command = %command, timeout_secs = timeout.as_secs(), "process timed out");
                RemoteError::Timeout {
                    operation: command.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
            })?
            .map_err(|e| RemoteError::Spawn {
                program: command.program.clone(),
                reason: e.to_string(),
            })?;

        Ok(ProcessOutcome {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// 테스트용 Mock 프로세스 실행기
///
/// 실행된 명령을 기록하고, 인자에 특정 문자열이 포함된 명령을 실패시킬 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockProcessRunner {
    /// 실행된 명령 기록
    pub calls: std::sync::Mutex<Vec<ToolCommand>>,
    /// (부분 문자열, 종료 코드) 실패 규칙
    pub failures: Vec<(String, i32)>,
    /// Capture 모드에서 반환할 stdout
    pub stdout: String,
    /// 모든 호출을 실행 불가로 처리
    pub unlaunchable: bool,
}

#[cfg(test)]
impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 명령 문자열에 `needle`이 포함되면 `exit_code`로 종료하도록 설정합니다.
    pub fn with_failure(mut self, needle: &str, exit_code: i32) -> Self {
        self.failures.push((needle.to_owned(), exit_code));
        self
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_owned();
        self
    }

    pub fn with_unlaunchable(mut self) -> Self {
        self.unlaunchable = true;
        self
    }

    pub fn recorded(&self) -> Vec<ToolCommand> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl ProcessRunner for MockProcessRunner {
    async fn run(
        &self,
        command: &ToolCommand,
        _timeout: Duration,
    ) -> Result<ProcessOutcome, RemoteError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }
        if self.unlaunchable {
            return Err(RemoteError::Spawn {
                program: command.program.clone(),
                reason: "No such file or directory (os error 2)".to_owned(),
            });
        }
        let rendered = command.to_string();
        let exit_code = self
            .failures
            .iter()
            .find(|(needle, _)| rendered.contains(needle.as_str()))
            .map_or(0, |(_, code)| *code);
        let captured = command.output == OutputMode::Capture;
        Ok(ProcessOutcome {
            exit_code: Some(exit_code),
            stdout: if captured { self.stdout.clone() } else { String::new() },
            stderr: if captured && exit_code != 0 {
                format!("mock failure for {rendered}")
            } else {
                String::new()
            },
        })
    }
}
