//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use nimbus_config::ConfigError;
use nimbus_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const REJECTED: i32 = 4;
    pub const CONFIG: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Nimbus API at {url}")]
    #[diagnostic(
        code(nimbus::connection_failed),
        help(
            "Check your network connection and the API root.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(nimbus::auth_failed),
        help(
            "The pairing token may have been revoked.\n\
             Pair again with: nimbus pair --username <email> --save"
        )
    )]
    AuthFailed { message: String },

    #[error("No pairing token configured for profile '{profile}'")]
    #[diagnostic(
        code(nimbus::no_credentials),
        help(
            "Obtain one with: nimbus pair --username <email> --save\n\
             Or set the NIMBUS_PAIRING_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Remote ───────────────────────────────────────────────────────
    #[error("Request rejected (HTTP {status}): {message}")]
    #[diagnostic(code(nimbus::rejected))]
    Rejected { status: u16, message: String },

    #[error("Unexpected response from the Nimbus API: {message}")]
    #[diagnostic(
        code(nimbus::malformed_response),
        help("Re-run with -vv to log the raw response.")
    )]
    MalformedResponse { message: String },

    #[error("Could not apply state change: {message}")]
    #[diagnostic(code(nimbus::sync))]
    Sync { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(nimbus::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(nimbus::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(nimbus::config),
        help("Run: nimbus config path to locate the config file")
    )]
    Config { message: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(nimbus::timeout),
        help("Increase the limit with --timeout or check the service status.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not encode output: {0}")]
    #[diagnostic(code(nimbus::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            Self::ProfileNotFound { .. } | Self::Config { .. } => exit_code::CONFIG,
            Self::MalformedResponse { .. } | Self::Sync { .. } | Self::Io(_) | Self::Json(_) => {
                exit_code::GENERAL
            }
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Connection { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Rejected { status, message } => Self::Rejected { status, message },
            CoreError::MalformedPayload { message } => Self::MalformedResponse { message },
            CoreError::Validation { message } => Self::Validation {
                field: "request".into(),
                reason: message,
            },
            CoreError::Config { message } => Self::Config { message },
            CoreError::UpdateFailed { source } => Self::from(*source),
            other @ (CoreError::InvalidPath { .. }
            | CoreError::MergeInconsistency { .. }
            | CoreError::InvalidTimestamp { .. }) => Self::Sync {
                message: other.to_string(),
            },
        }
    }
}

impl From<nimbus_api::Error> for CliError {
    fn from(err: nimbus_api::Error) -> Self {
        Self::from(CoreError::from(err))
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Io(e) => Self::Io(e),
            other @ (ConfigError::Keyring(_)
            | ConfigError::Serialization(_)
            | ConfigError::Figment(_)) => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_failures_unwrap_to_their_cause() {
        let err = CliError::from(CoreError::update_failed(CoreError::Timeout {
            timeout_secs: 120,
        }));
        assert!(matches!(err, CliError::Timeout { seconds: 120 }));
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);
    }

    #[test]
    fn auth_errors_exit_with_auth_code() {
        let err = CliError::from(CoreError::AuthenticationFailed {
            message: "revoked".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);

        let missing = CliError::from(ConfigError::NoCredentials {
            profile: "home".into(),
        });
        assert_eq!(missing.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn merge_failures_are_general_errors() {
        let err = CliError::from(CoreError::MergeInconsistency {
            path: "a.b".into(),
            reason: "not an object".into(),
        });
        assert!(matches!(err, CliError::Sync { .. }));
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
