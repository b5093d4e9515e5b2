//! `keel verify` command handler
//!
//! Fixture -> upgrade -> checks. A fixture failure stops the run before the
//! upgrade; an upgrade failure stops it before the checks.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, info, info_span};

use keel_core::config::KeelConfig;
use keel_core::inventory::Inventory;
use keel_core::types::{ClusterHandle, Distro, UpgradeMode};
use keel_remote::{
    NodeProvisioner, ProcessRunner, ReachabilityProber, RemoteExecutor, SshCredentials,
};
use keel_scenario::{
    Check, CheckContext, CheckSettings, FixtureRequest, FixtureSettings, Scenario,
    ScenarioReport, StepOutcome, UpgradeController, UpgradeInvocation,
    VersionTransitionFixture, register,
};

use crate::backends::{Backends, LocalBackends, cluster_tool};
use crate::cli::{TopologyArg, VerifyArgs};
use crate::commands::upgrade::{UpgradeSummary, run_upgrade};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `verify` command.
pub async fn execute(
    args: VerifyArgs,
    config: &KeelConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let plan = VerifyPlan::resolve(config, &args)?;
    let inventory = Inventory::load(&args.inventory).await?;
    let handle = inventory.to_handle(&config.remote.ssh_key);
    let backends = LocalBackends::from_config(config)?;

    let report = run(&plan, config, handle, inventory.distro, backends).await?;
    writer.render(&report)?;

    if report.passed() {
        Ok(())
    } else {
        Err(CliError::Verification(report.failure_summary()))
    }
}

/// Resolved inputs of one verification run.
#[derive(Debug, Clone)]
pub struct VerifyPlan {
    pub topology: TopologyArg,
    pub source_version: String,
    pub expected_version: semver::Version,
    pub request: FixtureRequest,
    pub invocation: UpgradeInvocation,
    pub checks: Vec<Check>,
}

impl VerifyPlan {
    /// Combines config and CLI arguments, rejecting contradictory settings.
    pub fn resolve(config: &KeelConfig, args: &VerifyArgs) -> Result<Self, CliError> {
        let config_err = |e: keel_core::error::ConfigError| CliError::Config(e.to_string());

        let source_version = args
            .source_version
            .clone()
            .or_else(|| config.tool.source_versions.first().cloned())
            .ok_or_else(|| {
                CliError::Config("no source version given and tool.source_versions is empty".to_owned())
            })?;
        let expected_version = config.tool.expected_version().map_err(config_err)?;

        let request = args.topology.request();
        let mode = config.upgrade.mode().map_err(config_err)?;
        let invocation = if request.disconnected {
            if mode != UpgradeMode::Offline {
                return Err(CliError::Config(
                    "the offline topology requires upgrade.mode = \"offline\"".to_owned(),
                ));
            }
            UpgradeInvocation::offline()
        } else {
            UpgradeInvocation::new(mode)
                .with_safety_checks(config.upgrade.safety_checks().map_err(config_err)?)
        };
        invocation
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let checks = if args.checks.is_empty() {
            args.topology.default_checks()
        } else {
            args.checks.iter().copied().map(Check::from).collect()
        };

        Ok(Self {
            topology: args.topology,
            source_version,
            expected_version,
            request,
            invocation,
            checks,
        })
    }
}

/// Runs fixture, upgrade and checks against the given backends.
pub async fn run<P, R, H, N>(
    plan: &VerifyPlan,
    config: &KeelConfig,
    handle: ClusterHandle,
    distro: Distro,
    backends: Backends<P, R, H, N>,
) -> Result<VerifyReport, CliError>
where
    P: ProcessRunner,
    R: RemoteExecutor,
    H: ReachabilityProber,
    N: NodeProvisioner,
{
    let span = info_span!(
        "verify",
        source_version = %plan.source_version,
        topology = ?plan.topology,
    );
    async move {
        let tool = cluster_tool(config, Arc::clone(&backends.runner));
        let credentials = SshCredentials::new(handle.ssh_key(), config.remote.ssh_port);

        let fixture = VersionTransitionFixture::new(
            Arc::clone(&tool),
            Arc::clone(&backends.remote),
            FixtureSettings {
                source_archive: config.tool.source_archive(&plan.source_version),
                current_archive: config.tool.current_archive_path(),
                distro,
                credentials: credentials.clone(),
                remote_timeout: config.remote.command_timeout(),
                external_url: config.probe.external_url.clone(),
                admin_password: config.probe.dashboard_password.clone(),
            },
        );
        let prepared = fixture.establish(handle, plan.request).await?;

        let mut controller = UpgradeController::new(Arc::clone(&tool), plan.expected_version.clone());
        let upgrade = run_upgrade(&mut controller, &plan.invocation).await;
        if !upgrade.succeeded() || plan.checks.is_empty() {
            return Ok(VerifyReport {
                source_version: plan.source_version.clone(),
                upgrade,
                scenario: None,
            });
        }

        let ctx = CheckContext::new(
            tool,
            backends.remote,
            backends.prober,
            backends.provisioner,
            prepared.handle,
            CheckSettings {
                credentials,
                remote_timeout: config.remote.command_timeout(),
                probe_timeout: config.probe.timeout(),
                dashboard_user: config.probe.dashboard_user.clone(),
                dashboard_password: config.probe.dashboard_password.clone(),
            },
        );
        let mut scenario = Scenario::begin(format!(
            "Upgrading a cluster from {} to {}",
            plan.source_version, plan.expected_version
        ))
        .with_step_timeout(config.scenario.step_timeout());
        register(&mut scenario, &ctx, &plan.checks, prepared.spare_worker);
        info!(checks = scenario.len(), "running post-upgrade checks");
        let scenario = scenario.evaluate().await;

        Ok(VerifyReport {
            source_version: plan.source_version.clone(),
            upgrade,
            scenario: Some(scenario),
        })
    }
    .instrument(span)
    .await
}

/// Result of one verification run.
#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub source_version: String,
    pub upgrade: UpgradeSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioReport>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.upgrade.succeeded() && self.scenario.as_ref().is_none_or(ScenarioReport::passed)
    }

    pub fn failure_summary(&self) -> String {
        match (&self.upgrade.error, &self.scenario) {
            (Some(error), _) => error.clone(),
            (None, Some(scenario)) => scenario.failure_summary(),
            (None, None) => String::new(),
        }
    }
}

impl Render for VerifyReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Source version: {}", self.source_version.bold())?;
        self.upgrade.render_text(w)?;

        let Some(ref scenario) = self.scenario else {
            return Ok(());
        };
        writeln!(w)?;
        writeln!(w, "{}", scenario.title.bold())?;
        for result in &scenario.results {
            match result.outcome {
                StepOutcome::Passed => {
                    writeln!(w, "  {} {}", "PASS".green().bold(), result.description)?;
                }
                StepOutcome::Failed(ref cause) => {
                    writeln!(w, "  {} {}", "FAIL".red().bold(), result.description)?;
                    writeln!(w, "       {}", cause.red())?;
                }
            }
        }
        let failed = scenario.failures().count();
        writeln!(
            w,
            "{} checks, {} failed",
            scenario.executed(),
            if failed == 0 {
                failed.to_string().green()
            } else {
                failed.to_string().red()
            }
        )?;
        Ok(())
    }
}
