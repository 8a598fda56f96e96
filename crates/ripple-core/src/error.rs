//! Error types for the session engine.

use ripple_protocol::Jid;
use std::net::IpAddr;
use thiserror::Error;

use crate::hub::HubError;
use crate::tag::TagError;

/// Error returned by an event handler.
///
/// Handler errors never end a session. The dispatcher turns them into a
/// `danger` alert shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The payload could not be parsed into the bound type.
    #[error("invalid {kind} value {input:?}")]
    Value {
        /// Expected type, e.g. `number`.
        kind: &'static str,
        /// The rejected payload.
        input: String,
    },

    /// The target jid has no element in this session.
    #[error("no element {0}")]
    Unregistered(Jid),

    /// Application-defined failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Create an application failure from anything printable.
    pub fn failed(msg: impl ToString) -> Self {
        Self::Failed(msg.to_string())
    }

    pub(crate) fn value(kind: &'static str, input: &str) -> Self {
        Self::Value {
            kind,
            input: input.to_string(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self::Failed(msg)
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}

/// Session and engine errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No pending session has this key.
    #[error("Unknown session key")]
    UnknownKey,

    /// A reconnect came from a different address than the page request.
    #[error("Remote address mismatch: expected {expected:?}, got {actual:?}")]
    AddressMismatch {
        /// Address recorded when the session was created.
        expected: Option<IpAddr>,
        /// Address presented by the connecting transport.
        actual: Option<IpAddr>,
    },

    /// The synchronous hook path is not enabled for this engine.
    #[error("Hooks are disabled")]
    HooksDisabled,

    /// The session has been closed.
    #[error("Session closed")]
    Closed,

    /// `serve` was called more than once.
    #[error("Session is already being served")]
    AlreadyServed,

    /// Too many pending sessions.
    #[error("Maximum sessions reached")]
    MaxSessionsReached,

    /// A handler failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Tag expansion failed.
    #[error(transparent)]
    Tag(#[from] TagError),

    /// The hub refused the subscription.
    #[error(transparent)]
    Hub(#[from] HubError),
}
