//! Fan-out of server events to live sessions.
//!
//! Every call serializes the event once and pushes the shared frame onto
//! each recipient's unbounded queue. A closed queue is skipped; delivery to
//! the remaining recipients is unaffected.

use std::sync::Arc;

use parley_store::threads::participants;
use parley_types::events::ServerEvent;
use tracing::error;

use crate::registry::{Session, SessionId, SessionRegistry};

/// A serialized event, shared by every recipient of one broadcast.
pub type Frame = Arc<str>;

pub fn encode(event: &ServerEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            None
        }
    }
}

impl SessionRegistry {
    /// Deliver to every authenticated session except `exclude`.
    /// Returns the number of sessions the frame was queued for.
    pub fn to_all(&self, event: &ServerEvent, exclude: Option<SessionId>) -> usize {
        self.deliver(event, |id, s| s.is_authenticated() && Some(id) != exclude)
    }

    /// Deliver to every authenticated session named after either participant
    /// of `thread_key`. All sessions sharing a participant's name receive it.
    pub fn to_thread(&self, thread_key: &str, event: &ServerEvent) -> usize {
        let Some((a, b)) = participants(thread_key) else {
            return 0;
        };
        self.deliver(event, |_, s| s.is_authenticated() && (s.name == a || s.name == b))
    }

    /// Deliver to one session, whatever its state.
    pub fn to_session(&self, id: SessionId, event: &ServerEvent) -> bool {
        self.deliver(event, |sid, _| sid == id) > 0
    }

    /// Announce the current roster to everyone.
    pub fn broadcast_roster(&self) {
        let users = self.roster();
        self.to_all(
            &ServerEvent::Online {
                count: users.len(),
                users,
            },
            None,
        );
    }

    fn deliver<F>(&self, event: &ServerEvent, mut wants: F) -> usize
    where
        F: FnMut(SessionId, &Session) -> bool,
    {
        let Some(frame) = encode(event) else {
            return 0;
        };
        let mut delivered = 0;
        for (&id, session) in self.iter() {
            if wants(id, session) && session.tx.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}
