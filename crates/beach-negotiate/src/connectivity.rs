use async_trait::async_trait;
use std::sync::Arc;

use crate::error::NegotiationError;
use crate::proto::{ConnectivityCandidate, SdpKind, SessionDescription};

/// The transport engine that discovers network paths and carries media.
///
/// Implementations report malformed descriptions as
/// [`NegotiationError::InvalidPayload`] and malformed candidates as
/// [`NegotiationError::InvalidCandidate`]. Applying a candidate that was already
/// applied must be harmless.
#[async_trait]
pub trait ConnectivityEngine: Send + Sync {
    /// Creates a description of `kind` and installs it as the local description.
    async fn create_local_description(
        &self,
        kind: SdpKind,
    ) -> Result<SessionDescription, NegotiationError>;

    async fn apply_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError>;

    async fn apply_remote_candidate(
        &self,
        candidate: &ConnectivityCandidate,
    ) -> Result<(), NegotiationError>;
}

#[async_trait]
impl<T> ConnectivityEngine for Arc<T>
where
    T: ConnectivityEngine + ?Sized,
{
    async fn create_local_description(
        &self,
        kind: SdpKind,
    ) -> Result<SessionDescription, NegotiationError> {
        (**self).create_local_description(kind).await
    }

    async fn apply_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        (**self).apply_remote_description(description).await
    }

    async fn apply_remote_candidate(
        &self,
        candidate: &ConnectivityCandidate,
    ) -> Result<(), NegotiationError> {
        (**self).apply_remote_candidate(candidate).await
    }
}

/// Local capture source. Failure is reported as [`NegotiationError::Device`].
#[async_trait]
pub trait MediaCapture: Send + Sync {
    type Stream: Send;

    async fn acquire_local_stream(&self) -> Result<Self::Stream, NegotiationError>;
}
