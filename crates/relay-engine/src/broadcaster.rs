//! Fan-out of server events to connected sessions.
//!
//! The transport lives behind [`SessionSink`]; the broadcaster only knows
//! which sink belongs to which session.

use std::collections::HashMap;
use std::sync::Arc;

use relay_core::{RelayError, ServerEvent, SessionId};
use tracing::{debug, warn};

/// Outbound half of one live connection.
pub trait SessionSink: Send + Sync {
    /// Queue a serialized frame for delivery. Must not block.
    /// Returns `false` if the frame could not be queued.
    fn deliver(&self, frame: Arc<String>) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Session(SessionId),
    All,
}

/// An event together with who should receive it.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    pub target: Target,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn to(session_id: &SessionId, event: ServerEvent) -> Self {
        Self {
            target: Target::Session(session_id.clone()),
            event,
        }
    }

    pub fn all(event: ServerEvent) -> Self {
        Self {
            target: Target::All,
            event,
        }
    }
}

#[derive(Default)]
pub struct Broadcaster {
    sinks: HashMap<SessionId, Arc<dyn SessionSink>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, session_id: SessionId, sink: Arc<dyn SessionSink>) {
        self.sinks.insert(session_id, sink);
    }

    pub fn detach(&mut self, session_id: &SessionId) -> bool {
        self.sinks.remove(session_id).is_some()
    }

    /// Release every sink.
    pub fn clear(&mut self) {
        self.sinks.clear();
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn notify_one(&self, session_id: &SessionId, event: &ServerEvent) -> Result<(), RelayError> {
        let frame = encode(event).ok_or_else(|| RelayError::TransportFailure {
            session_id: session_id.clone(),
            reason: "event could not be serialized".into(),
        })?;
        self.send_frame(session_id, frame)
    }

    /// Send to every attached session. Failures are logged and skipped.
    /// Returns how many sessions accepted the frame.
    pub fn notify_all(&self, event: &ServerEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        let recipients: Vec<(SessionId, Arc<dyn SessionSink>)> = self
            .sinks
            .iter()
            .map(|(id, sink)| (id.clone(), Arc::clone(sink)))
            .collect();

        let mut delivered = 0;
        for (session_id, sink) in recipients {
            if sink.deliver(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                warn!(%session_id, event = event.name(), "failed to deliver broadcast");
            }
        }
        debug!(event = event.name(), delivered, "broadcast event to all");
        delivered
    }

    /// Apply a batch produced by a state transition, in order.
    pub fn deliver(&self, outbound: Vec<Outbound>) {
        for Outbound { target, event } in outbound {
            match target {
                Target::All => {
                    self.notify_all(&event);
                }
                Target::Session(session_id) => {
                    if let Err(e) = self.notify_one(&session_id, &event) {
                        warn!(error = %e, kind = e.error_kind(), event = event.name(), "unicast failed");
                    }
                }
            }
        }
    }

    fn send_frame(&self, session_id: &SessionId, frame: Arc<String>) -> Result<(), RelayError> {
        let sink = self
            .sinks
            .get(session_id)
            .ok_or_else(|| RelayError::TransportFailure {
                session_id: session_id.clone(),
                reason: "session not attached".into(),
            })?;
        if sink.deliver(frame) {
            Ok(())
        } else {
            Err(RelayError::TransportFailure {
                session_id: session_id.clone(),
                reason: "send queue full or closed".into(),
            })
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Arc<String>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(event = event.name(), error = %e, "failed to serialize event");
            None
        }
    }
}
