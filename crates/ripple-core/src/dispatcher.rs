//! Handler dispatcher.
//!
//! One per session. Runs queued handler calls serially so events from one
//! browser are handled in arrival order. Finishing is signalled by the task
//! completing once the event loop drops the call queue.

use bytes::Bytes;
use ripple_protocol::{codec, Command, Frame};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::HandlerError;
use crate::event::{Event, EventFn};
use crate::html;
use crate::registry::Element;
use crate::session::Session;
use crate::widget::Ui;

/// A queued handler invocation.
pub(crate) struct Call {
    pub element: Arc<Element>,
    pub handler: Option<EventFn>,
    pub command: Command,
    pub payload: String,
}

impl Call {
    /// Run the registered handler, or the widget's own event handling.
    pub(crate) fn invoke(&self, session: &Session) -> Result<(), HandlerError> {
        let event = Event {
            session,
            jid: self.element.jid(),
            command: self.command,
            payload: &self.payload,
        };
        match &self.handler {
            Some(handler) => handler(&event),
            None => self.element.ui().handle_event(&event),
        }
    }
}

/// The alert shown for a handler error.
pub(crate) fn alert_frame(err: &HandlerError) -> Frame {
    Frame::alert("danger", &html::escape(&err.to_string()))
}

/// Consume `calls` until the queue closes. Returns the number of calls run.
pub(crate) async fn run(
    session: Session,
    mut calls: mpsc::Receiver<Call>,
    outbound: mpsc::Sender<Bytes>,
) -> usize {
    let key = session.key();
    let mut count = 0;

    while let Some(call) = calls.recv().await {
        count += 1;
        trace!(session = %key, jid = %call.element.jid(), command = %call.command, "Calling handler");

        let Err(err) = call.invoke(&session) else {
            continue;
        };
        warn!(session = %key, jid = %call.element.jid(), error = %err, "Handler failed");

        match codec::encode(&alert_frame(&err)) {
            Ok(data) => {
                if outbound.try_send(data).is_err() {
                    warn!(session = %key, "Outbound queue full, alert dropped");
                }
            }
            Err(e) => warn!(session = %key, error = %e, "Failed to encode alert"),
        }
    }

    debug!(session = %key, calls = count, "Dispatcher finished");
    count
}
