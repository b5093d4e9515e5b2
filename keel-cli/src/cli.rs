//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use keel_core::types::UpgradeMode;
use keel_scenario::{Check, FixtureRequest, Topology};

/// keel -- upgrade validation for a cluster-management tool.
///
/// Use `keel <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "keel", version, about, long_about = None)]
pub struct Cli {
    /// Path to the keel.toml configuration file.
    #[arg(short, long, default_value = "keel.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upgrade the cluster described by the current plan file.
    Upgrade(UpgradeArgs),

    /// Install a historical version, upgrade it, and run checks.
    Verify(VerifyArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- upgrade ----

/// Run one upgrade against an existing cluster.
#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Override `upgrade.mode`.
    #[arg(long)]
    pub mode: Option<ModeArg>,

    /// Bypass the tool's safety checks (online mode only).
    #[arg(long)]
    pub ignore_safety_checks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Offline,
    Online,
}

impl From<ModeArg> for UpgradeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Offline => UpgradeMode::Offline,
            ModeArg::Online => UpgradeMode::Online,
        }
    }
}

// ---- verify ----

/// Stand up a cluster at a historical version, upgrade it, and verify it.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Node inventory describing the provisioned machines.
    #[arg(short, long, default_value = "inventory.toml")]
    pub inventory: PathBuf,

    /// Cluster layout the inventory must match.
    #[arg(long, default_value = "skunkworks")]
    pub topology: TopologyArg,

    /// Historical version to install (default: first of `tool.source_versions`).
    #[arg(long)]
    pub source_version: Option<String>,

    /// Checks to run after the upgrade, in order (default depends on topology).
    #[arg(long = "check", value_name = "CHECK")]
    pub checks: Vec<CheckArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TopologyArg {
    /// 3 etcd / 2 master / 3 worker / 2 ingress / 2 storage, last worker kept as spare.
    Skunkworks,
    /// 3 etcd / 1 master / 1 worker with outbound access removed.
    Offline,
    /// Every role on one node.
    Mini,
}

impl TopologyArg {
    pub fn request(&self) -> FixtureRequest {
        match self {
            Self::Skunkworks => FixtureRequest::skunkworks(),
            Self::Offline => FixtureRequest::offline(),
            Self::Mini => FixtureRequest::new(Topology::mini()),
        }
    }

    pub fn default_checks(&self) -> Vec<Check> {
        match self {
            Self::Skunkworks => Check::ALL.to_vec(),
            Self::Offline => Vec::new(),
            Self::Mini => vec![
                Check::Storage,
                Check::Ingress,
                Check::Dashboard,
                Check::NetworkPolicy,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CheckArg {
    Storage,
    AddWorker,
    Ingress,
    Dashboard,
    NetworkPolicy,
    HighAvailability,
}

impl From<CheckArg> for Check {
    fn from(check: CheckArg) -> Self {
        match check {
            CheckArg::Storage => Check::Storage,
            CheckArg::AddWorker => Check::AddWorker,
            CheckArg::Ingress => Check::Ingress,
            CheckArg::Dashboard => Check::Dashboard,
            CheckArg::NetworkPolicy => Check::NetworkPolicy,
            CheckArg::HighAvailability => Check::HighAvailability,
        }
    }
}

// ---- config ----

/// Manage keel configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, tool, upgrade, remote, probe, scenario, provisioner).
        #[arg(long)]
        section: Option<String>,
    },
}
