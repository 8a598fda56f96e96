//! Frame type for the Ripple protocol.
//!
//! A frame is one newline-terminated line of text exchanged with the browser.

use crate::command::Command;
use crate::jid::Jid;

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    /// What to do.
    pub command: Command,
    /// Target element, or `Jid::NONE` for session-scoped commands.
    pub jid: Jid,
    /// Command argument, possibly empty.
    pub payload: String,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(command: Command, jid: Jid, payload: impl Into<String>) -> Self {
        Self {
            command,
            jid,
            payload: payload.into(),
        }
    }

    /// Create an Input event frame.
    #[must_use]
    pub fn input(jid: Jid, value: impl Into<String>) -> Self {
        Self::new(Command::Input, jid, value)
    }

    /// Create a Click event frame.
    #[must_use]
    pub fn click(jid: Jid, name: impl Into<String>) -> Self {
        Self::new(Command::Click, jid, name)
    }

    /// Create a Trigger event frame.
    #[must_use]
    pub fn trigger(jid: Jid, value: impl Into<String>) -> Self {
        Self::new(Command::Trigger, jid, value)
    }

    /// Create a Value update frame.
    #[must_use]
    pub fn value(jid: Jid, value: impl Into<String>) -> Self {
        Self::new(Command::Value, jid, value)
    }

    /// Create an Inner HTML update frame.
    #[must_use]
    pub fn inner(jid: Jid, html: impl Into<String>) -> Self {
        Self::new(Command::Inner, jid, html)
    }

    /// Create a SetAttr frame. An empty value sets a value-less attribute.
    #[must_use]
    pub fn set_attr(jid: Jid, attr: &str, value: &str) -> Self {
        Self::new(Command::SetAttr, jid, format!("{attr}\n{value}"))
    }

    /// Create a RemoveAttr frame.
    #[must_use]
    pub fn remove_attr(jid: Jid, attr: impl Into<String>) -> Self {
        Self::new(Command::RemoveAttr, jid, attr)
    }

    /// Create an Alert frame. `level` is a Bootstrap alert level such as
    /// `danger` or `info`; `html` is shown as-is.
    #[must_use]
    pub fn alert(level: &str, html: &str) -> Self {
        Self::new(Command::Alert, Jid::NONE, format!("{level}\n{html}"))
    }

    /// Create a Redirect frame.
    #[must_use]
    pub fn redirect(url: impl Into<String>) -> Self {
        Self::new(Command::Redirect, Jid::NONE, url)
    }

    /// Create a Reload frame.
    #[must_use]
    pub fn reload() -> Self {
        Self::new(Command::Reload, Jid::NONE, String::new())
    }

    /// Create a Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Self::new(Command::Ping, Jid::NONE, String::new())
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}, {}, {:?}}}", self.command, self.jid, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let f = Frame::set_attr(Jid(2), "disabled", "");
        assert_eq!(f.command, Command::SetAttr);
        assert_eq!(f.payload, "disabled\n");

        let f = Frame::alert("danger", "boom");
        assert_eq!(f.jid, Jid::NONE);
        assert_eq!(f.payload, "danger\nboom");

        assert!(Frame::reload().payload.is_empty());
        assert_eq!(Frame::ping().command, Command::Ping);
    }

    #[test]
    fn test_display() {
        let f = Frame::value(Jid(1), "x");
        assert_eq!(f.to_string(), "{Value, Jid.1, \"x\"}");
    }
}
