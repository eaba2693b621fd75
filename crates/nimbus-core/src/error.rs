// ── Core error types ──
//
// Synchronization-level errors. Callers of nimbus-core never match on
// raw HTTP details; the `From<nimbus_api::Error>` impl translates
// request-layer failures into the categories the sync loop cares about.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach Nimbus API at {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Remote errors ────────────────────────────────────────────────
    /// The remote refused the request (HTTP 400 is the only status the
    /// request layer gives up on immediately).
    #[error("Request rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Invalid request: {message}")]
    Validation { message: String },

    // ── Replica errors ───────────────────────────────────────────────
    #[error("Invalid patch path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A patch path does not fit the current document shape.
    #[error("Cannot merge '{path}': {reason}")]
    MergeInconsistency { path: String, reason: String },

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    // ── Sync errors ──────────────────────────────────────────────────
    /// A tick failed; every replica kept its pre-tick contents.
    #[error("Update cycle failed: {source}")]
    UpdateFailed {
        #[source]
        source: Box<CoreError>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Whether a later tick could plausibly succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. }
            | Self::Timeout { .. }
            | Self::MalformedPayload { .. }
            | Self::MergeInconsistency { .. } => true,
            Self::Rejected { status, .. } => *status != 400,
            Self::UpdateFailed { source } => source.is_retryable(),
            Self::AuthenticationFailed { .. }
            | Self::Validation { .. }
            | Self::InvalidPath { .. }
            | Self::InvalidTimestamp { .. }
            | Self::Config { .. } => false,
        }
    }

    /// Wrap a tick failure. Already-wrapped errors are not nested again.
    pub fn update_failed(source: CoreError) -> Self {
        match source {
            wrapped @ Self::UpdateFailed { .. } => wrapped,
            other => Self::UpdateFailed {
                source: Box::new(other),
            },
        }
    }
}

// ── Conversion from request-layer errors ─────────────────────────────

impl From<nimbus_api::Error> for CoreError {
    fn from(err: nimbus_api::Error) -> Self {
        match err {
            nimbus_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            nimbus_api::Error::Transport(ref e) => {
                let url = e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string);
                if e.is_timeout() {
                    CoreError::Connection {
                        url,
                        reason: format!("request timed out: {e}"),
                    }
                } else if let Some(status) = e.status() {
                    CoreError::Rejected {
                        status: status.as_u16(),
                        message: e.to_string(),
                    }
                } else {
                    CoreError::Connection {
                        url,
                        reason: e.to_string(),
                    }
                }
            }
            nimbus_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            nimbus_api::Error::Status { status, url, body } => match status {
                401 | 403 => CoreError::AuthenticationFailed {
                    message: format!("HTTP {status} from {url}"),
                },
                _ => CoreError::Rejected {
                    status,
                    message: if body.is_empty() { url } else { body },
                },
            },
            nimbus_api::Error::Deserialization { message, body: _ } => {
                CoreError::MalformedPayload { message }
            }
            nimbus_api::Error::InvalidRequest(message) => CoreError::Validation { message },
        }
    }
}
