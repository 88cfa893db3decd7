#![allow(dead_code)]

use async_trait::async_trait;
use beach_negotiate::{
    ConnectivityCandidate, ConnectivityEngine, NegotiationError, Relay, Role, SdpKind,
    SessionDescription, SignalRequest, SignalResponse,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 2 1 IN IP4 0.0.0.0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=recvonly\r\n";

pub fn candidate(line: &str) -> ConnectivityCandidate {
    ConnectivityCandidate::from_ice(line, Some("0".into()), Some(0), None)
}

/// Connectivity fake that records every call. Candidates without a
/// `candidate` line are rejected as malformed.
#[derive(Default)]
pub struct ScriptedConnectivity {
    pub created: Mutex<Vec<SdpKind>>,
    pub applied_descriptions: Mutex<Vec<SessionDescription>>,
    pub applied_candidates: Mutex<Vec<String>>,
    pub fail_next_create: Mutex<bool>,
}

impl ScriptedConnectivity {
    pub fn candidate_lines(&self) -> Vec<String> {
        self.applied_candidates.lock().clone()
    }

    pub fn description_applies(&self) -> usize {
        self.applied_descriptions.lock().len()
    }
}

#[async_trait]
impl ConnectivityEngine for ScriptedConnectivity {
    async fn create_local_description(
        &self,
        kind: SdpKind,
    ) -> Result<SessionDescription, NegotiationError> {
        if std::mem::take(&mut *self.fail_next_create.lock()) {
            return Err(NegotiationError::Connectivity("scripted failure".into()));
        }
        self.created.lock().push(kind);
        let body = match kind {
            SdpKind::Offer => OFFER_SDP,
            SdpKind::Answer => ANSWER_SDP,
        };
        Ok(SessionDescription::new(kind, body))
    }

    async fn apply_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.applied_descriptions.lock().push(description.clone());
        Ok(())
    }

    async fn apply_remote_candidate(
        &self,
        candidate: &ConnectivityCandidate,
    ) -> Result<(), NegotiationError> {
        match candidate.candidate_line().filter(|line| !line.is_empty()) {
            Some(line) => {
                self.applied_candidates.lock().push(line.to_string());
                Ok(())
            }
            None => Err(NegotiationError::InvalidCandidate(
                "missing candidate line".into(),
            )),
        }
    }
}

/// Wraps a relay and fails the next `outages` round trips as unreachable.
pub struct FlakyRelay<R> {
    inner: R,
    outages: AtomicUsize,
}

impl<R> FlakyRelay<R> {
    pub fn new(inner: R, outages: usize) -> Self {
        Self {
            inner,
            outages: AtomicUsize::new(outages),
        }
    }

    pub fn fail_next(&self, outages: usize) {
        self.outages.store(outages, Ordering::SeqCst);
    }

    fn take_outage(&self) -> bool {
        self.outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<R: Relay> Relay for FlakyRelay<R> {
    async fn push(&self, request: SignalRequest) -> Result<(), NegotiationError> {
        if self.take_outage() {
            return Err(NegotiationError::RelayUnreachable("connection refused".into()));
        }
        self.inner.push(request).await
    }

    async fn poll(&self, role: Role) -> Result<SignalResponse, NegotiationError> {
        if self.take_outage() {
            return Err(NegotiationError::RelayUnreachable("connection refused".into()));
        }
        self.inner.poll(role).await
    }
}
