//! `keel config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use keel_core::config::KeelConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &str = "general, tool, upgrade, remote, probe, scenario, provisioner";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load and validate the configuration file, reporting any errors.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");
    let report = validate_report(config_path).await;
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

pub async fn validate_report(config_path: &Path) -> ConfigValidationReport {
    let errors = match KeelConfig::load(config_path).await {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    };
    ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    }
}

/// Display the effective configuration with the dashboard password redacted.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");
    let config = KeelConfig::load(config_path).await?;
    let report = show_report(config, config_path, section)?;
    writer.render(&report)?;
    Ok(())
}

pub fn show_report(
    mut config: KeelConfig,
    config_path: &Path,
    section: Option<String>,
) -> Result<ConfigReport, CliError> {
    redact_credentials(&mut config);

    let rendered = match section.as_deref() {
        None => toml::to_string_pretty(&config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("tool") => toml::to_string_pretty(&config.tool),
        Some("upgrade") => toml::to_string_pretty(&config.upgrade),
        Some("remote") => toml::to_string_pretty(&config.remote),
        Some("probe") => toml::to_string_pretty(&config.probe),
        Some("scenario") => toml::to_string_pretty(&config.scenario),
        Some("provisioner") => toml::to_string_pretty(&config.provisioner),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: {SECTIONS})"
            )));
        }
    };

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section,
        config_toml: rendered.unwrap_or_else(|e| format!("(serialization error: {e})")),
    })
}

fn redact_credentials(config: &mut KeelConfig) {
    if !config.probe.dashboard_password.is_empty() {
        config.probe.dashboard_password = "***REDACTED***".to_owned();
    }
}

/// Configuration display report.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML (text rendering only)
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{section}]");
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;
        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty if valid
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
