//! Handler function types and the event context passed to them.

use ripple_protocol::{Command, Jid};
use std::sync::Arc;

use crate::error::HandlerError;
use crate::session::Session;

/// An event delivered to a handler.
pub struct Event<'a> {
    /// Session the event arrived on.
    pub session: &'a Session,
    /// Target element.
    pub jid: Jid,
    /// `Input`, `Click` or `Trigger`.
    pub command: Command,
    /// Raw payload from the browser.
    pub payload: &'a str,
}

/// An event handler.
pub type EventFn = Arc<dyn Fn(&Event<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// Called once when a session's transport connects.
pub type ConnectFn = Arc<dyn Fn(&Session) -> Result<(), HandlerError> + Send + Sync>;

/// Wrap a closure as an [`EventFn`].
pub fn handler<F>(f: F) -> EventFn
where
    F: Fn(&Event<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}
