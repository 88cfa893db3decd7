use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, trace, warn};

use crate::connectivity::ConnectivityEngine;
use crate::error::NegotiationError;
use crate::proto::{ConnectivityCandidate, Role, SdpKind, SessionDescription, SignalRequest};
use crate::relay::Relay;
use crate::session::LocalEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    Idle,
    LocalDescriptionSet,
    RemoteDescriptionSet,
    /// Descriptions exchanged and the transport reported a connection.
    ConnectedPending,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NegotiationState::Idle => "idle",
            NegotiationState::LocalDescriptionSet => "local_description_set",
            NegotiationState::RemoteDescriptionSet => "remote_description_set",
            NegotiationState::ConnectedPending => "connected_pending",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub polls: u64,
    pub relay_failures: u64,
    pub descriptions_applied: u64,
    pub descriptions_rejected: u64,
    pub candidates_applied: u64,
    pub candidates_rejected: u64,
    pub candidates_pushed: u64,
    pub candidate_push_failures: u64,
}

/// What a successful poll cycle changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub description_applied: bool,
    pub candidates_applied: usize,
}

/// Per-peer offer/answer state machine.
///
/// The engine is driven by local events and by poll results. It never applies
/// a remote description twice, never applies the same remote candidate twice,
/// and never produces a description of the kind its role must not produce.
pub struct NegotiationEngine<C, R> {
    role: Role,
    connectivity: C,
    relay: R,
    state: NegotiationState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    outbound: Option<SessionDescription>,
    seen_candidates: HashSet<String>,
    deferred_candidates: Vec<ConnectivityCandidate>,
    stats: EngineStats,
}

impl<C, R> NegotiationEngine<C, R>
where
    C: ConnectivityEngine,
    R: Relay,
{
    pub fn new(role: Role, connectivity: C, relay: R) -> Self {
        Self {
            role,
            connectivity,
            relay,
            state: NegotiationState::Idle,
            local_description: None,
            remote_description: None,
            outbound: None,
            seen_candidates: HashSet::new(),
            deferred_candidates: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn connectivity(&self) -> &C {
        &self.connectivity
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub async fn handle_local_event(&mut self, event: LocalEvent) {
        match event {
            LocalEvent::MediaReady => self.on_local_media_ready().await,
            LocalEvent::CandidateDiscovered(candidate) => self.on_local_candidate(candidate).await,
            LocalEvent::ConnectionEstablished => self.connection_established(),
        }
    }

    /// Only the offerer initiates; the answerer waits for the remote offer.
    pub async fn on_local_media_ready(&mut self) {
        match self.role {
            Role::Offerer => {
                if self.state != NegotiationState::Idle {
                    debug!(role = %self.role, state = %self.state, "media ready after negotiation started; ignoring");
                    return;
                }
                let offer = match self
                    .connectivity
                    .create_local_description(SdpKind::Offer)
                    .await
                {
                    Ok(offer) => offer,
                    Err(err) => {
                        warn!(role = %self.role, error = %err, kind = err.kind(), "failed to create local offer");
                        return;
                    }
                };
                info!(role = %self.role, sdp_len = offer.sdp.len(), "local offer created");
                self.local_description = Some(offer.clone());
                self.state = NegotiationState::LocalDescriptionSet;
                self.outbound = Some(offer);
                // On failure the offer stays queued for the next poll cycle.
                if self.flush_outbound().await.is_err() {
                    debug!(role = %self.role, "offer queued for retry");
                }
            }
            Role::Answerer => {
                debug!(role = %self.role, "local media ready; waiting for remote offer");
            }
        }
    }

    /// Fire-and-forget: a failed candidate push is logged and never retried.
    pub async fn on_local_candidate(&mut self, candidate: ConnectivityCandidate) {
        match self
            .relay
            .push(SignalRequest::candidate(self.role, candidate))
            .await
        {
            Ok(()) => {
                self.stats.candidates_pushed += 1;
                trace!(role = %self.role, pushed = self.stats.candidates_pushed, "local candidate pushed");
            }
            Err(err) => {
                self.stats.candidate_push_failures += 1;
                warn!(role = %self.role, error = %err, kind = err.kind(), "local candidate push failed; dropping");
            }
        }
    }

    pub fn connection_established(&mut self) {
        if self.state == NegotiationState::RemoteDescriptionSet {
            self.state = NegotiationState::ConnectedPending;
            info!(role = %self.role, "transport connected");
        } else {
            debug!(role = %self.role, state = %self.state, "connection signal outside remote_description_set; ignoring");
        }
    }

    /// One round trip to the relay. Relay failures are logged here and returned
    /// for the caller's information; the next cycle retries.
    pub async fn poll_once(&mut self) -> Result<PollReport, NegotiationError> {
        self.stats.polls += 1;

        // A description still queued means the relay is down or unset; one
        // failure per cycle.
        if let Err(err) = self.flush_outbound().await {
            if self.outbound.is_some() {
                return Err(err);
            }
        }

        let response = match self.relay.poll(self.role).await {
            Ok(response) => response,
            Err(err) => {
                self.stats.relay_failures += 1;
                warn!(
                    role = %self.role,
                    error = %err,
                    kind = err.kind(),
                    failures = self.stats.relay_failures,
                    "relay poll failed; retrying next cycle"
                );
                return Err(err);
            }
        };

        let (description, candidates) = response.into_parts();
        let mut report = PollReport::default();
        if let Some(description) = description {
            report.description_applied = self.on_remote_description(description).await;
        }
        self.ensure_answer().await;
        report.candidates_applied = self.on_remote_candidates(candidates).await;
        Ok(report)
    }

    /// Returns true only when the description was applied by this call.
    pub async fn on_remote_description(&mut self, description: SessionDescription) -> bool {
        if self.remote_description.is_some() {
            trace!(role = %self.role, kind = %description.kind, "remote description already applied");
            return false;
        }
        if description.kind != self.role.peer().produces() {
            debug!(role = %self.role, kind = %description.kind, "description kind not addressed to this role; ignoring");
            return false;
        }
        if self.role == Role::Offerer && self.local_description.is_none() {
            debug!(
                role = %self.role,
                state = %self.state,
                "answer arrived before local offer; ignoring"
            );
            return false;
        }
        if !description.has_media_section() {
            self.stats.descriptions_rejected += 1;
            warn!(
                role = %self.role,
                kind = %description.kind,
                sdp_len = description.sdp.len(),
                "remote description has no media section; dropping"
            );
            return false;
        }
        if let Err(err) = self.connectivity.apply_remote_description(&description).await {
            self.stats.descriptions_rejected += 1;
            warn!(role = %self.role, kind = %description.kind, error = %err, "remote description rejected by transport");
            return false;
        }

        info!(role = %self.role, kind = %description.kind, "remote description applied");
        self.stats.descriptions_applied += 1;
        self.remote_description = Some(description);
        if self.role == Role::Offerer {
            self.state = NegotiationState::RemoteDescriptionSet;
        }
        self.flush_deferred_candidates().await;
        true
    }

    /// Applies each not-yet-seen candidate; returns how many were applied now.
    pub async fn on_remote_candidates(&mut self, candidates: Vec<ConnectivityCandidate>) -> usize {
        let mut applied = 0;
        for candidate in candidates {
            if !self.seen_candidates.insert(candidate.dedup_key()) {
                continue;
            }
            if self.remote_description.is_none() {
                trace!(role = %self.role, "deferring remote candidate until remote description is applied");
                self.deferred_candidates.push(candidate);
                continue;
            }
            if self.apply_candidate(&candidate).await {
                applied += 1;
            }
        }
        applied
    }

    // The answerer owes an answer once the offer is applied. Retried each
    // cycle if creating it failed.
    async fn ensure_answer(&mut self) {
        if self.role != Role::Answerer
            || self.remote_description.is_none()
            || self.local_description.is_some()
        {
            return;
        }
        let answer = match self
            .connectivity
            .create_local_description(SdpKind::Answer)
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                warn!(role = %self.role, error = %err, kind = err.kind(), "failed to create local answer; retrying next cycle");
                return;
            }
        };
        info!(role = %self.role, sdp_len = answer.sdp.len(), "local answer created");
        self.local_description = Some(answer.clone());
        self.state = NegotiationState::LocalDescriptionSet;
        self.outbound = Some(answer);
        // Both sides of the exchange are now in place for the answerer.
        self.state = NegotiationState::RemoteDescriptionSet;
        // On failure the answer stays queued for the next poll cycle.
        if self.flush_outbound().await.is_err() {
            debug!(role = %self.role, "answer queued for retry");
        }
    }

    async fn flush_outbound(&mut self) -> Result<(), NegotiationError> {
        let Some(description) = self.outbound.clone() else {
            return Ok(());
        };
        let kind = description.kind;
        match self
            .relay
            .push(SignalRequest::description(self.role, description))
            .await
        {
            Ok(()) => {
                self.outbound = None;
                debug!(role = %self.role, %kind, "local description delivered to relay");
                Ok(())
            }
            Err(err) if err.is_retryable() || err == NegotiationError::MisconfiguredEndpoint => {
                self.stats.relay_failures += 1;
                warn!(
                    role = %self.role,
                    %kind,
                    error = %err,
                    error_kind = err.kind(),
                    failures = self.stats.relay_failures,
                    "local description push failed; retrying next cycle"
                );
                Err(err)
            }
            Err(err) => {
                self.outbound = None;
                warn!(role = %self.role, %kind, error = %err, "relay refused local description; giving up on it");
                Err(err)
            }
        }
    }

    async fn flush_deferred_candidates(&mut self) {
        let deferred = std::mem::take(&mut self.deferred_candidates);
        if deferred.is_empty() {
            return;
        }
        debug!(role = %self.role, count = deferred.len(), "applying deferred remote candidates");
        for candidate in deferred {
            self.apply_candidate(&candidate).await;
        }
    }

    async fn apply_candidate(&mut self, candidate: &ConnectivityCandidate) -> bool {
        match self.connectivity.apply_remote_candidate(candidate).await {
            Ok(()) => {
                self.stats.candidates_applied += 1;
                trace!(role = %self.role, applied = self.stats.candidates_applied, "remote candidate applied");
                true
            }
            Err(err) => {
                self.stats.candidates_rejected += 1;
                warn!(role = %self.role, error = %err, kind = err.kind(), "remote candidate rejected; dropping");
                false
            }
        }
    }
}
