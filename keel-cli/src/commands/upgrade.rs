//! `keel upgrade` command handler

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use keel_core::config::KeelConfig;
use keel_core::types::SafetyChecks;
use keel_remote::{LocalProcessRunner, ProcessRunner};
use keel_scenario::{DiagnosticsOutcome, UpgradeController, UpgradeInvocation};

use crate::backends::cluster_tool;
use crate::cli::UpgradeArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `upgrade` command against the plan in `general.work_dir`.
pub async fn execute(
    args: UpgradeArgs,
    config: &KeelConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let invocation = resolve_invocation(config, &args)?;
    let expected = config.tool.expected_version().map_err(|e| CliError::Config(e.to_string()))?;
    let tool = cluster_tool(config, Arc::new(LocalProcessRunner::new()));

    info!(mode = %invocation.mode, plan = %tool.plan_path().display(), "upgrading cluster");
    let mut controller = UpgradeController::new(tool, expected);
    let summary = run_upgrade(&mut controller, &invocation).await;
    writer.render(&summary)?;

    match summary.error {
        Some(error) => Err(CliError::Verification(error)),
        None => Ok(()),
    }
}

/// Builds the invocation from config, with CLI flags taking precedence.
pub fn resolve_invocation(
    config: &KeelConfig,
    args: &UpgradeArgs,
) -> Result<UpgradeInvocation, CliError> {
    let config_err = |e: keel_core::error::ConfigError| CliError::Config(e.to_string());
    let mut invocation = match args.mode {
        Some(mode) => UpgradeInvocation::new(mode.into()),
        None => UpgradeInvocation::new(config.upgrade.mode().map_err(config_err)?)
            .with_safety_checks(config.upgrade.safety_checks().map_err(config_err)?),
    };
    if args.ignore_safety_checks {
        invocation = invocation.with_safety_checks(SafetyChecks::Bypassed);
    }
    invocation
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(invocation)
}

/// Runs the upgrade and records the outcome.
pub async fn run_upgrade<P: ProcessRunner>(
    controller: &mut UpgradeController<P>,
    invocation: &UpgradeInvocation,
) -> UpgradeSummary {
    let result = controller.upgrade(invocation).await;
    UpgradeSummary {
        mode: invocation.mode.as_str().to_owned(),
        safety_checks: invocation.safety_checks.to_string(),
        state: controller.state().to_string(),
        version: result.as_ref().ok().map(ToString::to_string),
        error: result.err().map(|e| e.to_string()),
        diagnostics: controller.diagnostics().cloned(),
    }
}

/// Outcome of one upgrade invocation.
#[derive(Debug, Serialize)]
pub struct UpgradeSummary {
    pub mode: String,
    pub safety_checks: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticsOutcome>,
}

impl UpgradeSummary {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl Render for UpgradeSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Upgrade ({}, safety checks {}): {}",
            self.mode.bold(),
            self.safety_checks,
            if self.succeeded() {
                self.state.green().bold()
            } else {
                self.state.red().bold()
            }
        )?;
        if let Some(ref version) = self.version {
            writeln!(w, "  Version: {version}")?;
        }
        if let Some(ref error) = self.error {
            writeln!(w, "  Error: {}", error.red())?;
        }
        match self.diagnostics {
            Some(DiagnosticsOutcome::Captured) => writeln!(w, "  Diagnostics: captured")?,
            Some(DiagnosticsOutcome::Failed(ref reason)) => {
                writeln!(w, "  Diagnostics: {}", format!("failed ({reason})").yellow())?;
            }
            None => {}
        }
        Ok(())
    }
}
