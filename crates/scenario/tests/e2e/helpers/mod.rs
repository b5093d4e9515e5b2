//! Shared E2E test helpers.
//!
//! Provides the simulated cluster backend and cluster layouts used to drive
//! fixture, upgrade and check flows end to end.

pub mod cluster;
pub mod sim;
