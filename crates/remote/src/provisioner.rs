//! 노드 프로비저닝 작업 추상화
//!
//! 고가용성 검증은 control-plane 노드 하나를 실제로 종료해야 합니다.
//! [`CommandProvisioner`]는 설정된 argv 템플릿의 `{node_id}`를 치환해 실행합니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keel_core::config::NODE_ID_PLACEHOLDER;
use keel_core::types::Node;
use tracing::info;

use crate::error::RemoteError;
use crate::process::{LocalProcessRunner, ProcessRunner, ToolCommand};

/// 노드 프로비저너 trait
pub trait NodeProvisioner: Send + Sync + 'static {
    /// 노드를 종료합니다. 반환 시점에 종료 요청이 수락되어 있어야 합니다.
    fn terminate_node(&self, node: &Node) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// 외부 명령 기반 프로비저너
pub struct CommandProvisioner<P: ProcessRunner = LocalProcessRunner> {
    runner: Arc<P>,
    template: Vec<String>,
    timeout: Duration,
}

impl CommandProvisioner<LocalProcessRunner> {
    pub fn new(template: Vec<String>, timeout: Duration) -> Self {
        Self::with_runner(Arc::new(LocalProcessRunner::new()), template, timeout)
    }
}

impl<P: ProcessRunner> CommandProvisioner<P> {
    pub fn with_runner(runner: Arc<P>, template: Vec<String>, timeout: Duration) -> Self {
        Self {
            runner,
            template,
            timeout,
        }
    }

    fn render(&self, node: &Node) -> Result<ToolCommand, RemoteError> {
        let mut argv = self
            .template
            .iter()
            .map(|arg| arg.replace(NODE_ID_PLACEHOLDER, &node.id));
        let program = argv.next().ok_or_else(|| {
            RemoteError::Provisioner("no terminate command configured".to_owned())
        })?;
        Ok(ToolCommand::new(program).args(argv).capture())
    }
}

impl<P: ProcessRunner> NodeProvisioner for CommandProvisioner<P> {
    async fn terminate_node(&self, node: &Node) -> Result<(), RemoteError> {
        let command = self.render(node)?;
        info!(node = %node, node_id = %node.id, "terminating node");
        let outcome = self.runner.run(&command, self.timeout).await?;
        if outcome.success() {
            Ok(())
        } else {
            Err(RemoteError::Provisioner(format!(
                "terminating {} failed: {}",
                node.id,
                outcome.failure_summary()
            )))
        }
    }
}
