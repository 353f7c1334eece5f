use thiserror::Error;

/// Errors that end a relay call.
///
/// Every call resolves to either the complete set of responses or exactly one of
/// these. Partial provider failures and unverified signatures never surface
/// directly; they only shape the diagnostic carried by [`RelayError::Consensus`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    /// A provider reported a total failure: its connection is unusable for the
    /// whole request.
    #[error("{message}")]
    ProviderFailure {
        /// Provider that reported the failure.
        provider_id: String,
        /// Provider-specific failure code.
        code: i32,
        /// Failure message as reported by the relay.
        message: String,
    },

    /// The call deadline elapsed before the reply stream completed.
    #[error("Timeout: {reason} (after {timeout_ms}ms)")]
    Timeout {
        /// Configured deadline in milliseconds.
        timeout_ms: u64,
        /// Caller-supplied context.
        reason: String,
    },

    /// At least one subrequest never collected enough identical, verified replies.
    #[error("Consensus failure, response is not trustworthy: {0}")]
    Consensus(String),

    /// Fewer subrequests were fulfilled than were sent.
    #[error("Partial request results, not enough data received or errors happened")]
    PartialResults {
        /// Subrequest ids that never produced a result.
        missing: Vec<String>,
    },

    /// The relay rejected the request as a whole (bad credential, unknown network...).
    #[error("{message}")]
    Relay {
        /// Relay error code.
        code: i32,
        /// Relay error message.
        message: String,
    },

    /// Failed to establish a connection to the relay.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A persistent connection went away while the call was in flight.
    #[error("Connection closed unexpectedly with error")]
    ConnectionClosed,

    /// HTTP-level error (non-2xx status code).
    ///
    /// First field is the HTTP status code, second is the (truncated) body.
    #[error("HTTP error: {0}")]
    HttpError(u16, String),

    /// Network-level error from the underlying HTTP client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The relay answered with something that is not a valid protocol message.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The call could not be built from the caller's input.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Client settings are inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    /// Returns `true` if this is the timeout race firing.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the providers answered but could not be trusted.
    #[must_use]
    pub fn is_consensus_failure(&self) -> bool {
        matches!(self, Self::Consensus(_) | Self::PartialResults { .. })
    }

    /// Returns `true` if issuing the same call again may succeed.
    ///
    /// Consensus failures are deliberately not transient: the same providers are
    /// likely to disagree the same way.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } |
            Self::Network(_) |
            Self::ConnectionFailed(_) |
            Self::ConnectionClosed |
            Self::ProviderFailure { .. } => true,
            Self::HttpError(status, _) => (500..=599).contains(status) || *status == 429,
            _ => false,
        }
    }

    /// Returns a static label for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderFailure { .. } => "provider_failure",
            Self::Timeout { .. } => "timeout",
            Self::Consensus(_) => "consensus",
            Self::PartialResults { .. } => "partial_results",
            Self::Relay { .. } => "relay",
            Self::ConnectionFailed(_) | Self::ConnectionClosed => "connection",
            Self::HttpError(..) | Self::Network(_) => "http",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Config(_) => "config",
        }
    }
}
