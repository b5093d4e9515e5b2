//! CLI-specific error types and exit code mapping

use keel_core::error::KeelError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration or inventory loading / validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Fixture, upgrade or scenario verification failed.
    #[error("verification failed: {0}")]
    Verification(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from keel-core.
    #[error("{0}")]
    Core(#[from] KeelError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                         |
    /// |------|---------------------------------|
    /// | 0    | Success                         |
    /// | 1    | General / command error         |
    /// | 2    | Configuration error             |
    /// | 4    | Verification failure            |
    /// | 10   | IO error                        |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Verification(_) => 4,
            Self::Io(_) => 10,
            Self::Core(KeelError::Config(_)) => 2,
            Self::Core(KeelError::Verification(_)) => 4,
            Self::Core(KeelError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<keel_scenario::FixtureError> for CliError {
    fn from(e: keel_scenario::FixtureError) -> Self {
        Self::Core(e.into())
    }
}

impl From<keel_remote::RemoteError> for CliError {
    fn from(e: keel_remote::RemoteError) -> Self {
        Self::Core(e.into())
    }
}
