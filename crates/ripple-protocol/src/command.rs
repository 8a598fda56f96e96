//! Command tokens carried in the first field of every frame.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The fixed set of commands understood on the wire.
///
/// Client-originated events are `Input`, `Click` and `Trigger`. The rest are
/// updates the server pushes to the browser. `Alert`, `Redirect`, `Reload`
/// and `Ping` address the session as a whole and never carry a jid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Input,
    Click,
    Trigger,
    Value,
    Inner,
    SetAttr,
    RemoveAttr,
    Alert,
    Redirect,
    Reload,
    Ping,
}

impl Command {
    /// Every command, in token order.
    pub const ALL: [Command; 11] = [
        Command::Input,
        Command::Click,
        Command::Trigger,
        Command::Value,
        Command::Inner,
        Command::SetAttr,
        Command::RemoveAttr,
        Command::Alert,
        Command::Redirect,
        Command::Reload,
        Command::Ping,
    ];

    /// The token written on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Command::Input => "Input",
            Command::Click => "Click",
            Command::Trigger => "Trigger",
            Command::Value => "Value",
            Command::Inner => "Inner",
            Command::SetAttr => "SetAttr",
            Command::RemoveAttr => "RemoveAttr",
            Command::Alert => "Alert",
            Command::Redirect => "Redirect",
            Command::Reload => "Reload",
            Command::Ping => "Ping",
        }
    }

    /// Whether the command targets the session rather than an element.
    #[must_use]
    pub const fn is_session_scoped(self) -> bool {
        matches!(
            self,
            Command::Alert | Command::Redirect | Command::Reload | Command::Ping
        )
    }

    /// Whether the command is an event a browser sends to the server.
    #[must_use]
    pub const fn is_event(self) -> bool {
        matches!(self, Command::Input | Command::Click | Command::Trigger)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a token is not a known command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}
