//! Two-party offer/answer negotiation over a polling relay.
//!
//! A peer owns a [`NegotiationEngine`] that produces and consumes session
//! descriptions and connectivity candidates. Everything the two peers exchange
//! before a direct path exists goes through a [`Mailbox`], either in-process
//! ([`LocalRelay`]) or over HTTP ([`HttpRelay`]).

pub mod connectivity;
pub mod engine;
pub mod error;
pub mod mailbox;
pub mod proto;
pub mod relay;
pub mod session;

pub use connectivity::{ConnectivityEngine, MediaCapture};
pub use engine::{EngineStats, NegotiationEngine, NegotiationState, PollReport};
pub use error::NegotiationError;
pub use mailbox::{CandidateDelivery, Mailbox, MailboxError, MailboxSnapshot};
pub use proto::{
    ConnectivityCandidate, Role, SdpKind, SessionDescription, SignalRequest, SignalResponse,
};
pub use relay::{HttpRelay, LocalRelay, Relay};
pub use session::{LocalEvent, SessionHandle, DEFAULT_POLL_INTERVAL};
