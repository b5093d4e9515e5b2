#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error type (`RemoteError`)
//! - [`process`]: Local process execution (`ProcessRunner`, `LocalProcessRunner`)
//! - [`ssh`]: Remote command execution (`RemoteExecutor`, `SshExecutor`)
//! - [`probe`]: HTTP(S) reachability (`ReachabilityProber`, `HttpProber`)
//! - [`provisioner`]: Node lifecycle (`NodeProvisioner`, `CommandProvisioner`)

pub mod error;
pub mod probe;
pub mod process;
pub mod provisioner;
pub mod ssh;

pub use error::RemoteError;
pub use probe::{HttpProber, ProbeOutcome, ReachabilityProber, probe_success, redact};
pub use process::{LocalProcessRunner, OutputMode, ProcessOutcome, ProcessRunner, ToolCommand};
pub use provisioner::{CommandProvisioner, NodeProvisioner};
pub use ssh::{NodeOutcome, RemoteExecutor, SshCredentials, SshExecutor, run_checked};
