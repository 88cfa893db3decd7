use thiserror::Error;

/// Failures seen at the engine / relay-client boundary. None of them are fatal
/// to the process; the engine logs them and carries on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("capture device unavailable: {0}")]
    Device(String),
    #[error("relay unreachable: {0}")]
    RelayUnreachable(String),
    #[error("relay rejected request ({status}): {reason}")]
    RelayRejected { status: u16, reason: String },
    #[error("invalid session description: {0}")]
    InvalidPayload(String),
    #[error("invalid connectivity candidate: {0}")]
    InvalidCandidate(String),
    #[error("relay endpoint is not configured")]
    MisconfiguredEndpoint,
    #[error("connectivity engine failure: {0}")]
    Connectivity(String),
}

impl NegotiationError {
    /// Stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NegotiationError::Device(_) => "device_error",
            NegotiationError::RelayUnreachable(_) => "relay_unreachable",
            NegotiationError::RelayRejected { .. } => "relay_rejected",
            NegotiationError::InvalidPayload(_) => "invalid_payload",
            NegotiationError::InvalidCandidate(_) => "invalid_candidate",
            NegotiationError::MisconfiguredEndpoint => "misconfigured_endpoint",
            NegotiationError::Connectivity(_) => "connectivity",
        }
    }

    /// Whether repeating the same relay request on a later cycle can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NegotiationError::RelayUnreachable(_))
    }
}
