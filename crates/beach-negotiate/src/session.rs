use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::connectivity::ConnectivityEngine;
use crate::engine::NegotiationEngine;
use crate::proto::ConnectivityCandidate;
use crate::relay::Relay;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Events raised by the local side: capture, the transport engine.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    MediaReady,
    CandidateDiscovered(ConnectivityCandidate),
    ConnectionEstablished,
}

/// Sender half for local events. Dropping every handle stops the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: UnboundedSender<LocalEvent>,
}

impl SessionHandle {
    /// Returns false once the session task is gone.
    pub fn send(&self, event: LocalEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn media_ready(&self) -> bool {
        self.send(LocalEvent::MediaReady)
    }

    pub fn candidate_discovered(&self, candidate: ConnectivityCandidate) -> bool {
        self.send(LocalEvent::CandidateDiscovered(candidate))
    }

    pub fn connection_established(&self) -> bool {
        self.send(LocalEvent::ConnectionEstablished)
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

pub fn channel() -> (SessionHandle, UnboundedReceiver<LocalEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionHandle { events: tx }, rx)
}

/// Moves `engine` onto its own task. The task hands the engine back when the
/// last [`SessionHandle`] is dropped.
pub fn spawn<C, R>(
    engine: NegotiationEngine<C, R>,
    interval: Duration,
) -> (SessionHandle, JoinHandle<NegotiationEngine<C, R>>)
where
    C: ConnectivityEngine + 'static,
    R: Relay + 'static,
{
    let (handle, events) = channel();
    let task = tokio::spawn(run(engine, events, interval));
    (handle, task)
}

/// Single owner of the engine: local events are handled as they arrive, the
/// relay is observed on every tick.
pub async fn run<C, R>(
    mut engine: NegotiationEngine<C, R>,
    mut events: UnboundedReceiver<LocalEvent>,
    interval: Duration,
) -> NegotiationEngine<C, R>
where
    C: ConnectivityEngine,
    R: Relay,
{
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        role = %engine.role(),
        interval_ms = interval.as_millis() as u64,
        "negotiation session started"
    );

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        trace!(role = %engine.role(), ?event, "local event");
                        engine.handle_local_event(event).await;
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                // failures are already logged by the engine
                if let Ok(report) = engine.poll_once().await {
                    if report.description_applied || report.candidates_applied > 0 {
                        debug!(
                            role = %engine.role(),
                            state = %engine.state(),
                            description_applied = report.description_applied,
                            candidates_applied = report.candidates_applied,
                            "poll cycle made progress"
                        );
                    }
                }
            }
        }
    }

    let stats = engine.stats();
    info!(
        role = %engine.role(),
        state = %engine.state(),
        polls = stats.polls,
        relay_failures = stats.relay_failures,
        "negotiation session stopped"
    );
    engine
}
