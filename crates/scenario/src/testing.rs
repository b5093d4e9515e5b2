//! 테스트용 스크립트 백엔드
//!
//! 명령 문자열의 부분 일치 규칙으로 결과를 정하고, 모든 호출을 기록합니다.

use std::sync::Mutex;
use std::time::Duration;

use keel_core::types::Node;
use keel_remote::{
    NodeOutcome, NodeProvisioner, OutputMode, ProbeOutcome, ProcessOutcome, ProcessRunner,
    ReachabilityProber, RemoteError, RemoteExecutor, SshCredentials, ToolCommand,
};

/// 스크립트 프로세스 실행기
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<String>>,
    exits: Vec<(String, i32)>,
    stdouts: Vec<(String, String)>,
    unlaunchable: Vec<String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit(mut self, needle: &str, code: i32) -> Self {
        self.exits.push((needle.to_owned(), code));
        self
    }

    pub fn with_stdout(mut self, needle: &str, stdout: &str) -> Self {
        self.stdouts.push((needle.to_owned(), stdout.to_owned()));
        self
    }

    pub fn with_unlaunchable(mut self, needle: &str) -> Self {
        self.unlaunchable.push(needle.to_owned());
        self
    }

    pub fn rendered(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.rendered().iter().filter(|c| c.contains(needle)).count()
    }
}

impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &ToolCommand,
        _timeout: Duration,
    ) -> Result<ProcessOutcome, RemoteError> {
        let rendered = command.to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(rendered.clone());
        }
        if self.unlaunchable.iter().any(|n| rendered.contains(n.as_str())) {
            return Err(RemoteError::Spawn {
                program: command.program.clone(),
                reason: "No such file or directory (os error 2)".to_owned(),
            });
        }
        let exit_code = self
            .exits
            .iter()
            .find(|(n, _)| rendered.contains(n.as_str()))
            .map_or(0, |(_, c)| *c);
        let stdout = match command.output {
            OutputMode::Capture => self
                .stdouts
                .iter()
                .find(|(n, _)| rendered.contains(n.as_str()))
                .map(|(_, s)| s.clone())
                .unwrap_or_default(),
            OutputMode::Inherit => String::new(),
        };
        Ok(ProcessOutcome {
            exit_code: Some(exit_code),
            stdout,
            stderr: String::new(),
        })
    }
}

/// 스크립트 원격 실행기
#[derive(Default)]
pub struct ScriptedRemote {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    /// (명령 부분 문자열, 호스트명 또는 전체, 종료 코드) 실패 규칙
    failures: Vec<(String, Option<String>, Option<i32>)>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(self, needle: &str) -> Self {
        self.with_exit(needle, Some(1))
    }

    pub fn with_failure_on(self, needle: &str, hostname: &str) -> Self {
        self.with_exit_on(needle, hostname, Some(1))
    }

    /// `None`은 명령이 실행되지 못한 전송 실패입니다.
    pub fn with_exit(mut self, needle: &str, exit_code: Option<i32>) -> Self {
        self.failures.push((needle.to_owned(), None, exit_code));
        self
    }

    pub fn with_exit_on(mut self, needle: &str, hostname: &str, exit_code: Option<i32>) -> Self {
        self.failures
            .push((needle.to_owned(), Some(hostname.to_owned()), exit_code));
        self
    }

    /// (합쳐진 명령, 대상 호스트 목록) 기록
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.calls().iter().any(|(cmd, _)| cmd.contains(needle))
    }
}

impl RemoteExecutor for ScriptedRemote {
    async fn run(
        &self,
        commands: &[String],
        nodes: &[Node],
        _credentials: &SshCredentials,
        _timeout: Duration,
    ) -> Result<Vec<NodeOutcome>, RemoteError> {
        let joined = commands.join(" && ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((
                joined.clone(),
                nodes.iter().map(|n| n.hostname.clone()).collect(),
            ));
        }
        Ok(nodes
            .iter()
            .map(|node| {
                let failure = self.failures.iter().find(|(needle, host, _)| {
                    joined.contains(needle.as_str())
                        && host.as_ref().is_none_or(|h| *h == node.hostname)
                });
                match failure {
                    Some((_, _, exit_code)) => NodeOutcome {
                        node: node.clone(),
                        exit_code: *exit_code,
                        output: "scripted failure".to_owned(),
                        timed_out: exit_code.is_none(),
                    },
                    None => NodeOutcome {
                        node: node.clone(),
                        exit_code: Some(0),
                        output: String::new(),
                        timed_out: false,
                    },
                }
            })
            .collect())
    }
}

/// 스크립트 프로브
#[derive(Default)]
pub struct ScriptedProber {
    urls: Mutex<Vec<String>>,
    statuses: Vec<(String, u16)>,
    unreachable: Vec<String>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, needle: &str, status: u16) -> Self {
        self.statuses.push((needle.to_owned(), status));
        self
    }

    pub fn with_unreachable(mut self, needle: &str) -> Self {
        self.unreachable.push(needle.to_owned());
        self
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

impl ReachabilityProber for ScriptedProber {
    async fn probe(&self, url: &str, _timeout: Duration) -> Result<ProbeOutcome, RemoteError> {
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_owned());
        }
        if self.unreachable.iter().any(|n| url.contains(n.as_str())) {
            return Err(RemoteError::Http {
                url: url.to_owned(),
                reason: "connection refused".to_owned(),
            });
        }
        let status = self
            .statuses
            .iter()
            .find(|(n, _)| url.contains(n.as_str()))
            .map_or(200, |(_, s)| *s);
        Ok(ProbeOutcome { status })
    }
}

/// 스크립트 프로비저너
#[derive(Default)]
pub struct ScriptedProvisioner {
    terminated: Mutex<Vec<String>>,
    fail: bool,
}

impl ScriptedProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl NodeProvisioner for ScriptedProvisioner {
    async fn terminate_node(&self, node: &Node) -> Result<(), RemoteError> {
        if self.fail {
            return Err(RemoteError::Provisioner(format!(
                "terminating {} was rejected",
                node.id
            )));
        }
        if let Ok(mut terminated) = self.terminated.lock() {
            terminated.push(node.id.clone());
        }
        Ok(())
    }
}

pub fn node(hostname: &str, last_octet: u8) -> Node {
    Node {
        id: format!("i-{hostname}"),
        hostname: hostname.to_owned(),
        public_ip: format!("52.0.0.{last_octet}"),
        private_ip: format!("10.0.0.{last_octet}"),
        ssh_user: "centos".to_owned(),
    }
}
