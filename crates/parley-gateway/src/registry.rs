use std::collections::{BTreeMap, HashSet};
use std::fmt;

use parley_types::limits::{DEFAULT_NAME, display_name};
use tokio::sync::mpsc;

use crate::error::{AdmitError, AuthError};
use crate::router::Frame;

/// Identifies one live connection. Ids grow monotonically, so iterating the
/// registry visits sessions in admission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for `auth`; everything else is ignored.
    Connected,
    /// Authenticated but has not sent `join` yet.
    Authenticated,
    /// Authenticated and named; part of the roster.
    Joined,
}

impl SessionState {
    pub fn is_authenticated(self) -> bool {
        !matches!(self, SessionState::Connected)
    }
}

/// One live connection.
#[derive(Debug)]
pub struct Session {
    pub name: String,
    pub state: SessionState,
    pub(crate) tx: mpsc::UnboundedSender<Frame>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }
}

/// Every live connection, authenticated or not.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    next_id: u64,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_id: 1,
            capacity,
        }
    }

    /// Register a new connection. Unauthenticated sessions count against the
    /// cap too, so a flood of idle sockets cannot bypass it.
    pub fn admit(
        &mut self,
        authenticated: bool,
    ) -> Result<(SessionId, mpsc::UnboundedReceiver<Frame>), AdmitError> {
        if self.sessions.len() >= self.capacity {
            return Err(AdmitError::Full { max: self.capacity });
        }

        let id = SessionId(self.next_id);
        self.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let state = if authenticated {
            SessionState::Authenticated
        } else {
            SessionState::Connected
        };
        self.sessions.insert(
            id,
            Session {
                name: DEFAULT_NAME.to_string(),
                state,
                tx,
            },
        );
        Ok((id, rx))
    }

    /// Check `supplied` against the deployment secret. With no secret
    /// configured every attempt succeeds.
    pub fn authenticate(
        &mut self,
        id: SessionId,
        secret: Option<&str>,
        supplied: &str,
    ) -> Result<(), AuthError> {
        if secret.is_some_and(|s| s != supplied) {
            return Err(AuthError::WrongPassword);
        }
        if let Some(session) = self.sessions.get_mut(&id) {
            if session.state == SessionState::Connected {
                session.state = SessionState::Authenticated;
            }
        }
        Ok(())
    }

    /// Normalize and apply a display name; the session joins the roster.
    /// Returns the applied name.
    pub fn set_name(&mut self, id: SessionId, raw: Option<&str>) -> Option<String> {
        let session = self.sessions.get_mut(&id)?;
        if !session.is_authenticated() {
            return None;
        }
        session.name = display_name(raw);
        session.state = SessionState::Joined;
        Some(session.name.clone())
    }

    /// Deregister a session. Dropping it closes its outbound queue.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&SessionId, &Session)> {
        self.sessions.iter()
    }

    /// Names of joined sessions, in admission order. Duplicates are kept.
    pub fn roster(&self) -> Vec<String> {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Joined)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Names currently held by authenticated sessions.
    pub fn authenticated_names(&self) -> HashSet<String> {
        self.sessions
            .values()
            .filter(|s| s.is_authenticated())
            .map(|s| s.name.clone())
            .collect()
    }

    /// True if some authenticated session currently uses `name`.
    pub fn is_online(&self, name: &str) -> bool {
        self.sessions
            .values()
            .any(|s| s.is_authenticated() && s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::limits::MAX_CLIENTS;

    #[test]
    fn admit_enforces_capacity() {
        let mut reg = SessionRegistry::new(MAX_CLIENTS);
        let mut receivers = Vec::new();
        for _ in 0..MAX_CLIENTS {
            receivers.push(reg.admit(false).unwrap());
        }
        assert_eq!(reg.len(), MAX_CLIENTS);

        let err = reg.admit(true).unwrap_err();
        assert_eq!(err, AdmitError::Full { max: MAX_CLIENTS });
        assert_eq!(reg.len(), MAX_CLIENTS);

        // a slot frees up once someone leaves
        let (first, _) = &receivers[0];
        reg.remove(*first);
        assert!(reg.admit(false).is_ok());
        assert_eq!(reg.len(), MAX_CLIENTS);
    }

    #[test]
    fn authenticate_checks_secret() {
        let mut reg = SessionRegistry::new(2);
        let (id, _rx) = reg.admit(false).unwrap();

        assert_eq!(
            reg.authenticate(id, Some("secret123"), "wrong"),
            Err(AuthError::WrongPassword)
        );
        assert_eq!(reg.get(id).unwrap().state, SessionState::Connected);

        reg.authenticate(id, Some("secret123"), "secret123").unwrap();
        assert_eq!(reg.get(id).unwrap().state, SessionState::Authenticated);
    }

    #[test]
    fn no_secret_always_authenticates() {
        let mut reg = SessionRegistry::new(2);
        let (id, _rx) = reg.admit(false).unwrap();
        reg.authenticate(id, None, "anything").unwrap();
        assert!(reg.get(id).unwrap().is_authenticated());
    }

    #[test]
    fn set_name_requires_auth_and_normalizes() {
        let mut reg = SessionRegistry::new(2);
        let (locked, _a) = reg.admit(false).unwrap();
        let (open, _b) = reg.admit(true).unwrap();

        assert_eq!(reg.set_name(locked, Some("Mallory")), None);
        assert_eq!(reg.set_name(open, Some("   ")), Some(DEFAULT_NAME.to_string()));
        assert_eq!(reg.set_name(open, Some(" Alice ")), Some("Alice".to_string()));
        assert_eq!(reg.get(open).unwrap().state, SessionState::Joined);
    }

    #[test]
    fn roster_lists_joined_sessions_in_order() {
        let mut reg = SessionRegistry::new(5);
        let (a, _ra) = reg.admit(true).unwrap();
        let (_idle, _ri) = reg.admit(true).unwrap();
        let (b, _rb) = reg.admit(true).unwrap();
        let (c, _rc) = reg.admit(true).unwrap();
        reg.set_name(a, Some("Zed"));
        reg.set_name(b, Some("Amy"));
        reg.set_name(c, Some("Amy"));

        assert_eq!(reg.roster(), ["Zed", "Amy", "Amy"]);
        assert!(reg.is_online("Amy"));
        assert!(reg.is_online(DEFAULT_NAME));
        assert!(!reg.is_online("Bob"));
    }
}
