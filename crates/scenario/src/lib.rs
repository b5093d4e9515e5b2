#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`step`]: Verification step (`VerificationStep`, `StepOutcome`)
//! - [`scenario`]: Aggregated runner with drop guard (`Scenario`, `ScenarioReport`)
//! - [`tool`]: Managed cluster tool invocation (`ClusterTool`, `ClusterInfo`)
//! - [`upgrade`]: Upgrade execution controller (`UpgradeController`, `UpgradeInvocation`)
//! - [`plan`]: Plan file writer (`Plan`, `InstallOptions`)
//! - [`packages`]: Distro-aware package commands
//! - [`fixture`]: Version transition fixture (`VersionTransitionFixture`)
//! - [`checks`]: Checks against the upgraded cluster (`Check`, `CheckContext`)
//! - [`error`]: Domain error types

pub mod checks;
pub mod error;
pub mod fixture;
pub mod packages;
pub mod plan;
pub mod scenario;
pub mod step;
pub mod tool;
pub mod upgrade;

#[cfg(test)]
mod testing;

pub use checks::{Check, CheckContext, CheckSettings, SharedCluster, register};
pub use error::{CheckError, FixtureError, ScenarioError, ToolError, UpgradeError};
pub use fixture::{
    FixtureRequest, FixtureSettings, PreparedCluster, Topology, VersionTransitionFixture,
};
pub use plan::{InstallOptions, Plan};
pub use scenario::{DEFAULT_STEP_TIMEOUT, Scenario, ScenarioReport};
pub use step::{StepOutcome, StepResult, VerificationStep};
pub use tool::{ClusterInfo, ClusterTool};
pub use upgrade::{DiagnosticsOutcome, UpgradeController, UpgradeInvocation, UpgradeState};
