use thiserror::Error;

/// Top-level error type for the `nimbus-api` crate.
///
/// Covers every failure mode of the request layer: transport,
/// HTTP status, authentication, and payload decoding.
/// `nimbus-core` maps these into synchronization-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token refresh or pairing failed. There is no partial-credential
    /// state: the client holds either a usable token or none at all.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Connection-level failure (refused, DNS, TLS, timeout, body read).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── HTTP ────────────────────────────────────────────────────────
    /// The remote answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Caller ──────────────────────────────────────────────────────
    /// The request could not be built from the given arguments.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Returns `true` if another attempt could plausibly succeed.
    ///
    /// Only HTTP 400 is treated as a caller error; every other status
    /// and every connection-level failure is retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status != 400,
            Self::Transport(e) => e.status().is_none_or(|s| s.as_u16() != 400),
            Self::Authentication { .. } | Self::Deserialization { .. } => true,
            Self::InvalidUrl(_) | Self::InvalidRequest(_) => false,
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if the remote rejected our credentials.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::Authentication { .. })
            || matches!(self.status(), Some(401 | 403))
    }
}
