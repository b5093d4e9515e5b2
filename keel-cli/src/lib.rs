//! keel CLI library.
//!
//! Exposes the command handlers for integration testing.
//! In production, `keel` is used as a binary (main.rs).

pub mod backends;
pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
