use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::proto::{
    ConnectivityCandidate, Role, SdpKind, SessionDescription, SignalRequest, SignalResponse,
};

/// How a poll hands out the candidates accumulated for a role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateDelivery {
    /// Every poll returns every candidate pushed for the role.
    #[default]
    Cumulative,
    /// Every poll returns only candidates pushed since the role's previous poll.
    Incremental,
}

impl CandidateDelivery {
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateDelivery::Cumulative => "cumulative",
            CandidateDelivery::Incremental => "incremental",
        }
    }
}

impl fmt::Display for CandidateDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown candidate delivery policy {0:?} (expected \"cumulative\" or \"incremental\")")]
pub struct ParseDeliveryError(String);

impl FromStr for CandidateDelivery {
    type Err = ParseDeliveryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cumulative" => Ok(CandidateDelivery::Cumulative),
            "incremental" => Ok(CandidateDelivery::Incremental),
            other => Err(ParseDeliveryError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailboxError {
    #[error("{sender} may not push an {kind} description")]
    RoleMismatch { sender: Role, kind: SdpKind },
}

/// Where a push landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub sender: Role,
    pub target: Role,
    /// A new offer replaced an earlier one and the previous exchange was discarded.
    pub session_reset: bool,
}

/// Everything pending for one role at poll time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delivery {
    pub description: Option<SessionDescription>,
    pub candidates: Vec<ConnectivityCandidate>,
}

impl From<Delivery> for SignalResponse {
    fn from(delivery: Delivery) -> Self {
        SignalResponse {
            sdp: delivery.description,
            candidate: None,
            candidates: Some(delivery.candidates),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub description: Option<SdpKind>,
    pub candidates: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MailboxSnapshot {
    pub offerer: SlotSnapshot,
    pub answerer: SlotSnapshot,
}

#[derive(Debug, Default)]
struct Slot {
    description: Option<SessionDescription>,
    candidates: Vec<ConnectivityCandidate>,
    delivered: usize,
}

impl Slot {
    fn snapshot(&self) -> SlotSnapshot {
        SlotSnapshot {
            description: self.description.as_ref().map(|d| d.kind),
            candidates: self.candidates.len(),
        }
    }
}

/// Slots are keyed by the role the pending messages are destined *for*.
#[derive(Debug, Default)]
struct Slots {
    offerer: Slot,
    answerer: Slot,
}

impl Slots {
    fn get(&self, role: Role) -> &Slot {
        match role {
            Role::Offerer => &self.offerer,
            Role::Answerer => &self.answerer,
        }
    }

    fn get_mut(&mut self, role: Role) -> &mut Slot {
        match role {
            Role::Offerer => &mut self.offerer,
            Role::Answerer => &mut self.answerer,
        }
    }
}

/// Store-and-forward channel between the two peers.
///
/// One mutex covers both slots, so a push and a poll never interleave and a
/// description is never observed half-written. Descriptions stay pending after
/// a poll; peers are expected to ignore repeats.
#[derive(Debug, Default)]
pub struct Mailbox {
    slots: Mutex<Slots>,
    delivery: CandidateDelivery,
}

impl Mailbox {
    pub fn new(delivery: CandidateDelivery) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            delivery,
        }
    }

    pub fn delivery(&self) -> CandidateDelivery {
        self.delivery
    }

    /// Stores a description and/or candidate for the sender's peer.
    ///
    /// `sender` may be omitted by older clients; the description kind, or for a
    /// bare candidate the presence of a pending answer, decides it instead.
    pub fn push(
        &self,
        sender: Option<Role>,
        description: Option<SessionDescription>,
        candidate: Option<ConnectivityCandidate>,
    ) -> Result<Accepted, MailboxError> {
        let mut slots = self.slots.lock();
        let sender = resolve_sender(&slots, sender, description.as_ref())?;
        let target = sender.peer();
        let mut session_reset = false;

        if let Some(description) = description {
            if description.kind == SdpKind::Offer {
                session_reset = slots
                    .get(Role::Answerer)
                    .description
                    .as_ref()
                    .is_some_and(|previous| previous != &description);
                if session_reset {
                    slots.offerer = Slot::default();
                    slots.answerer.candidates.clear();
                    slots.answerer.delivered = 0;
                    info!(%sender, "new offer replaced pending offer; session state reset");
                }
            }
            debug!(
                %sender,
                %target,
                kind = %description.kind,
                sdp_len = description.sdp.len(),
                "stored description"
            );
            slots.get_mut(target).description = Some(description);
        }

        if let Some(candidate) = candidate {
            let slot = slots.get_mut(target);
            slot.candidates.push(candidate);
            debug!(
                %sender,
                %target,
                total = slot.candidates.len(),
                "appended candidate"
            );
        }

        Ok(Accepted {
            sender,
            target,
            session_reset,
        })
    }

    /// Returns what is pending for `role`.
    pub fn poll(&self, role: Role) -> Delivery {
        self.poll_as(Some(role))
    }

    // A role-less poll is served to the offerer once an answer is waiting for
    // it, and to the answerer before that. Decided under the same lock as the read.
    fn poll_as(&self, role: Option<Role>) -> Delivery {
        let mut slots = self.slots.lock();
        let role = role.unwrap_or_else(|| {
            if slots.offerer.description.is_some() {
                Role::Offerer
            } else {
                Role::Answerer
            }
        });
        let slot = slots.get_mut(role);
        let candidates = match self.delivery {
            CandidateDelivery::Cumulative => slot.candidates.clone(),
            CandidateDelivery::Incremental => {
                let fresh = slot.candidates[slot.delivered..].to_vec();
                slot.delivered = slot.candidates.len();
                fresh
            }
        };
        trace!(
            %role,
            has_description = slot.description.is_some(),
            candidates = candidates.len(),
            "poll served"
        );
        Delivery {
            description: slot.description.clone(),
            candidates,
        }
    }

    /// Applies one wire request: a push if it carries a payload, a poll otherwise.
    pub fn handle(&self, request: SignalRequest) -> Result<SignalResponse, MailboxError> {
        if request.is_push() {
            self.push(request.role, request.sdp, request.candidate)?;
            return Ok(SignalResponse::default());
        }
        Ok(self.poll_as(request.role).into())
    }

    pub fn snapshot(&self) -> MailboxSnapshot {
        let slots = self.slots.lock();
        MailboxSnapshot {
            offerer: slots.offerer.snapshot(),
            answerer: slots.answerer.snapshot(),
        }
    }
}

fn resolve_sender(
    slots: &Slots,
    explicit: Option<Role>,
    description: Option<&SessionDescription>,
) -> Result<Role, MailboxError> {
    match (explicit, description) {
        (Some(sender), Some(description)) if description.kind.producer() != sender => {
            Err(MailboxError::RoleMismatch {
                sender,
                kind: description.kind,
            })
        }
        (Some(sender), _) => Ok(sender),
        (None, Some(description)) => Ok(description.kind.producer()),
        (None, None) => {
            if slots.offerer.description.is_some() {
                Ok(Role::Answerer)
            } else {
                Ok(Role::Offerer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const OFFER_SDP: &str = "v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";
    const ANSWER_SDP: &str = "v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=recvonly\r\n";

    fn candidate(line: &str) -> ConnectivityCandidate {
        ConnectivityCandidate::from_ice(line, Some("0".into()), Some(0), None)
    }

    fn lines(candidates: &[ConnectivityCandidate]) -> Vec<String> {
        candidates
            .iter()
            .filter_map(|c| c.candidate_line().map(str::to_string))
            .collect()
    }

    #[test_timeout::timeout]
    fn description_is_routed_to_the_peer_and_kept_after_poll() {
        let mailbox = Mailbox::default();
        let accepted = mailbox
            .push(Some(Role::Offerer), Some(SessionDescription::offer(OFFER_SDP)), None)
            .unwrap();
        assert_eq!(accepted.target, Role::Answerer);

        assert!(mailbox.poll(Role::Offerer).description.is_none());
        let first = mailbox.poll(Role::Answerer);
        let second = mailbox.poll(Role::Answerer);
        assert_eq!(first.description, Some(SessionDescription::offer(OFFER_SDP)));
        assert_eq!(first.description, second.description);
    }

    #[test_timeout::timeout]
    fn cumulative_delivery_returns_every_candidate_each_poll() {
        let mailbox = Mailbox::new(CandidateDelivery::Cumulative);
        for line in ["c1", "c2", "c3"] {
            mailbox.push(Some(Role::Offerer), None, Some(candidate(line))).unwrap();
        }
        assert_eq!(lines(&mailbox.poll(Role::Answerer).candidates), ["c1", "c2", "c3"]);
        assert_eq!(lines(&mailbox.poll(Role::Answerer).candidates), ["c1", "c2", "c3"]);
        assert!(mailbox.poll(Role::Offerer).candidates.is_empty());
    }

    #[test_timeout::timeout]
    fn incremental_delivery_returns_only_new_candidates() {
        let mailbox = Mailbox::new(CandidateDelivery::Incremental);
        mailbox.push(Some(Role::Answerer), None, Some(candidate("c1"))).unwrap();
        mailbox.push(Some(Role::Answerer), None, Some(candidate("c2"))).unwrap();
        assert_eq!(lines(&mailbox.poll(Role::Offerer).candidates), ["c1", "c2"]);
        assert!(mailbox.poll(Role::Offerer).candidates.is_empty());

        mailbox.push(Some(Role::Answerer), None, Some(candidate("c3"))).unwrap();
        assert_eq!(lines(&mailbox.poll(Role::Offerer).candidates), ["c3"]);
    }

    #[test_timeout::timeout]
    fn explicit_role_must_match_description_kind() {
        let mailbox = Mailbox::default();
        let err = mailbox
            .push(Some(Role::Offerer), Some(SessionDescription::answer(ANSWER_SDP)), None)
            .unwrap_err();
        assert_eq!(
            err,
            MailboxError::RoleMismatch {
                sender: Role::Offerer,
                kind: SdpKind::Answer
            }
        );
        assert_eq!(mailbox.snapshot(), MailboxSnapshot::default());
    }

    #[test_timeout::timeout]
    fn roleless_candidates_follow_the_pending_answer() {
        let mailbox = Mailbox::default();
        mailbox.push(None, Some(SessionDescription::offer(OFFER_SDP)), None).unwrap();
        let before = mailbox.push(None, None, Some(candidate("offerer-c"))).unwrap();
        assert_eq!(before.sender, Role::Offerer);

        mailbox.push(None, Some(SessionDescription::answer(ANSWER_SDP)), None).unwrap();
        let after = mailbox.push(None, None, Some(candidate("answerer-c"))).unwrap();
        assert_eq!(after.sender, Role::Answerer);

        assert_eq!(lines(&mailbox.poll(Role::Answerer).candidates), ["offerer-c"]);
        assert_eq!(lines(&mailbox.poll(Role::Offerer).candidates), ["answerer-c"]);
    }

    #[test_timeout::timeout]
    fn roleless_poll_is_served_by_exchange_progress() {
        let mailbox = Mailbox::default();
        mailbox.push(None, Some(SessionDescription::offer(OFFER_SDP)), None).unwrap();
        let response = mailbox.handle(SignalRequest::default()).unwrap();
        assert_eq!(response.sdp.map(|d| d.kind), Some(SdpKind::Offer));

        mailbox.push(None, Some(SessionDescription::answer(ANSWER_SDP)), None).unwrap();
        let response = mailbox.handle(SignalRequest::default()).unwrap();
        assert_eq!(response.sdp.map(|d| d.kind), Some(SdpKind::Answer));
    }

    #[test_timeout::timeout]
    fn new_offer_discards_previous_exchange() {
        let mailbox = Mailbox::default();
        mailbox
            .push(Some(Role::Offerer), Some(SessionDescription::offer(OFFER_SDP)), None)
            .unwrap();
        mailbox
            .push(Some(Role::Answerer), Some(SessionDescription::answer(ANSWER_SDP)), None)
            .unwrap();
        mailbox.push(Some(Role::Answerer), None, Some(candidate("stale"))).unwrap();
        mailbox.push(Some(Role::Offerer), None, Some(candidate("old-offerer"))).unwrap();

        let repeat = mailbox
            .push(Some(Role::Offerer), Some(SessionDescription::offer(OFFER_SDP)), None)
            .unwrap();
        assert!(!repeat.session_reset);
        assert_eq!(mailbox.snapshot().offerer.candidates, 1);

        let restarted = format!("{OFFER_SDP}a=ice-ufrag:restart\r\n");
        let fresh = mailbox
            .push(Some(Role::Offerer), Some(SessionDescription::offer(restarted.clone())), None)
            .unwrap();
        assert!(fresh.session_reset);
        let offerer = mailbox.poll(Role::Offerer);
        assert!(offerer.description.is_none());
        assert!(offerer.candidates.is_empty());
        let answerer = mailbox.poll(Role::Answerer);
        assert_eq!(answerer.description.map(|d| d.sdp), Some(restarted));
        assert!(answerer.candidates.is_empty());

        mailbox.push(Some(Role::Offerer), None, Some(candidate("new-offerer"))).unwrap();
        assert_eq!(lines(&mailbox.poll(Role::Answerer).candidates), ["new-offerer"]);
    }

    #[test_timeout::timeout]
    fn roleless_poll_after_reset_goes_to_answerer() {
        let mailbox = Mailbox::default();
        mailbox.push(None, Some(SessionDescription::offer(OFFER_SDP)), None).unwrap();
        mailbox.push(None, Some(SessionDescription::answer(ANSWER_SDP)), None).unwrap();
        let restarted = format!("{OFFER_SDP}a=ice-ufrag:restart\r\n");
        mailbox.push(None, Some(SessionDescription::offer(restarted)), None).unwrap();

        let response = mailbox.handle(SignalRequest::default()).unwrap();
        assert_eq!(response.sdp.map(|d| d.kind), Some(SdpKind::Offer));
    }

    #[test_timeout::timeout]
    fn push_response_is_empty() {
        let mailbox = Mailbox::default();
        let response = mailbox
            .handle(SignalRequest::candidate(Role::Offerer, candidate("c1")))
            .unwrap();
        assert_eq!(response, SignalResponse::default());
        assert_eq!(serde_json::to_string(&response).unwrap(), "{}");
    }

    #[test_timeout::timeout]
    fn concurrent_pushes_keep_roles_independent() {
        let mailbox = Arc::new(Mailbox::default());
        mailbox
            .push(
                Some(Role::Offerer),
                Some(SessionDescription::offer("v=0\r\nm=audio offerer\r\n")),
                None,
            )
            .unwrap();
        let mut workers = Vec::new();
        for role in [Role::Offerer, Role::Answerer] {
            let mailbox = Arc::clone(&mailbox);
            workers.push(std::thread::spawn(move || {
                for index in 0..200 {
                    if role == Role::Answerer && index == 100 {
                        mailbox
                            .push(
                                Some(role),
                                Some(SessionDescription::answer("v=0\r\nm=audio answerer\r\n")),
                                None,
                            )
                            .unwrap();
                    }
                    mailbox
                        .push(Some(role), None, Some(candidate(&format!("{role}-{index}"))))
                        .unwrap();
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }

        let for_answerer = mailbox.poll(Role::Answerer);
        let for_offerer = mailbox.poll(Role::Offerer);
        assert_eq!(for_answerer.candidates.len(), 200);
        assert_eq!(for_offerer.candidates.len(), 200);
        assert!(lines(&for_answerer.candidates)
            .iter()
            .all(|line| line.starts_with("offerer-")));
        assert!(lines(&for_offerer.candidates)
            .iter()
            .all(|line| line.starts_with("answerer-")));
        assert_eq!(
            for_answerer.description.map(|d| d.sdp),
            Some("v=0\r\nm=audio offerer\r\n".to_string())
        );
        assert_eq!(
            for_offerer.description.map(|d| d.sdp),
            Some("v=0\r\nm=audio answerer\r\n".to_string())
        );
    }
}
