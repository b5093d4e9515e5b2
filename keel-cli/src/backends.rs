//! Production capability backends built from `KeelConfig`.

use std::sync::Arc;

use keel_core::config::KeelConfig;
use keel_remote::{
    CommandProvisioner, HttpProber, LocalProcessRunner, NodeProvisioner, ProcessRunner,
    ReachabilityProber, RemoteExecutor, SshExecutor,
};
use keel_scenario::ClusterTool;

use crate::error::CliError;

/// One instance of every capability the engine needs.
pub struct Backends<P, R, H, N>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    pub runner: Arc<P>,
    pub remote: Arc<R>,
    pub prober: Arc<H>,
    pub provisioner: Arc<N>,
}

/// Backends that talk to real machines.
pub type LocalBackends = Backends<LocalProcessRunner, SshExecutor, HttpProber, CommandProvisioner>;

impl LocalBackends {
    pub fn from_config(config: &KeelConfig) -> Result<Self, CliError> {
        let runner = Arc::new(LocalProcessRunner::new());
        Ok(Self {
            remote: Arc::new(SshExecutor::with_runner(
                Arc::clone(&runner),
                config.remote.connect_timeout_secs,
            )),
            prober: Arc::new(HttpProber::new()?),
            provisioner: Arc::new(CommandProvisioner::with_runner(
                Arc::clone(&runner),
                config.provisioner.terminate_command.clone(),
                config.remote.command_timeout(),
            )),
            runner,
        })
    }
}

/// Managed tool handle rooted at `general.work_dir`.
pub fn cluster_tool<P: ProcessRunner>(config: &KeelConfig, runner: Arc<P>) -> Arc<ClusterTool<P>> {
    Arc::new(ClusterTool::new(
        runner,
        config.tool.binary.clone(),
        config.general.work_dir.clone(),
        config.tool.plan_file.clone(),
        config.upgrade.timeout(),
    ))
}
