use parley_types::events::{ErrorCode, ServerEvent};
use thiserror::Error;

/// A connection refused at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmitError {
    #[error("Chat is full (max {max}).")]
    Full { max: usize },
}

/// A failed `auth` attempt. There is no retry: the connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Wrong password.")]
    WrongPassword,
}

impl AdmitError {
    pub fn to_event(self) -> ServerEvent {
        match self {
            AdmitError::Full { .. } => ServerEvent::Error {
                code: ErrorCode::Full,
                text: self.to_string(),
            },
        }
    }
}

impl AuthError {
    pub fn to_event(self) -> ServerEvent {
        match self {
            AuthError::WrongPassword => ServerEvent::Error {
                code: ErrorCode::WrongPassword,
                text: self.to_string(),
            },
        }
    }
}
