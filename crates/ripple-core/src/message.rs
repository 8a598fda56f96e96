//! Internal message types.
//!
//! A [`Message`] is what application code hands to a session or the hub.
//! The event loop resolves its destination against the session's registry
//! and turns it into wire frames.

use ripple_protocol::{Command, Jid};

use crate::session::SessionKey;
use crate::tag::Tag;

/// Where a message is aimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dest {
    /// The session itself (alerts, redirects, reloads, pings).
    Session,
    /// One element.
    Jid(Jid),
    /// Every element registered under any of these tags.
    Tags(Vec<Tag>),
}

/// What a message asks the receiving session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Forward a frame with this command, or for [`Command::Trigger`], run
    /// the target's handler.
    Frame(Command),
    /// Re-render the target elements.
    Dirty,
}

/// An internal message. Immutable once handed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Target.
    pub dest: Dest,
    /// Action.
    pub kind: Kind,
    /// Frame payload; unused for [`Kind::Dirty`].
    pub payload: String,
    /// Session that sent it, used to suppress self-echo.
    pub origin: Option<SessionKey>,
}

impl Message {
    /// Create a frame-carrying message.
    #[must_use]
    pub fn frame(dest: Dest, command: Command, payload: impl Into<String>) -> Self {
        Self {
            dest,
            kind: Kind::Frame(command),
            payload: payload.into(),
            origin: None,
        }
    }

    /// Create a re-render request for `tags`.
    #[must_use]
    pub fn dirty(tags: Vec<Tag>) -> Self {
        Self {
            dest: Dest::Tags(tags),
            kind: Kind::Dirty,
            payload: String::new(),
            origin: None,
        }
    }

    /// A session-scoped message such as an alert.
    #[must_use]
    pub fn session(command: Command, payload: impl Into<String>) -> Self {
        Self::frame(Dest::Session, command, payload)
    }

    /// Set the originating session.
    #[must_use]
    pub fn with_origin(mut self, origin: SessionKey) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Whether `key` sent this message.
    #[must_use]
    pub fn is_from(&self, key: SessionKey) -> bool {
        self.origin == Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_origin() {
        let key = SessionKey(7);
        let msg = Message::frame(Dest::Jid(Jid(1)), Command::Value, "x");
        assert!(!msg.is_from(key));
        let msg = msg.with_origin(key);
        assert!(msg.is_from(key));
        assert!(!msg.is_from(SessionKey(8)));
    }

    #[test]
    fn test_dirty_message() {
        let msg = Message::dirty(vec![Tag::from("x")]);
        assert_eq!(msg.kind, Kind::Dirty);
        assert_eq!(msg.dest, Dest::Tags(vec![Tag::from("x")]));
        assert!(msg.payload.is_empty());
    }
}
