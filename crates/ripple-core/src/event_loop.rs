//! The per-session event loop.
//!
//! The loop multiplexes the process shutdown signal, the session's
//! cancellation, the direct-send queue, the hub subscription, decoded
//! browser frames and, when enabled, hook calls. Browser events become
//! handler calls; everything else is resolved against the registry and
//! written to the outbound queue. A full queue ends the session.

use bytes::Bytes;
use ripple_protocol::{codec, Command, Frame, Jid};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

use crate::dispatcher::{self, alert_frame, Call};
use crate::error::HandlerError;
use crate::hub::Subscription;
use crate::message::{Dest, Kind, Message};
use crate::registry::Element;
use crate::session::{Session, SessionKey};
use crate::tag::Tag;
use crate::widget::Ui;

/// A bounded per-session queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    /// Encoded frames waiting for the writer.
    Outbound,
    /// Events waiting for the dispatcher.
    Handler,
    /// Hub messages waiting for the event loop.
    Broadcast,
}

impl Queue {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Queue::Outbound => "outbound",
            Queue::Handler => "handler",
            Queue::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the event loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The engine shut down.
    Shutdown,
    /// The session was cancelled.
    Cancelled,
    /// The reader stopped.
    IncomingClosed,
    /// The hub dropped the subscription.
    HubClosed,
    /// The writer stopped.
    WriterClosed,
    /// A queue was full.
    Overload(Queue),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Shutdown => f.write_str("shutdown"),
            ExitReason::Cancelled => f.write_str("cancelled"),
            ExitReason::IncomingClosed => f.write_str("incoming closed"),
            ExitReason::HubClosed => f.write_str("hub closed"),
            ExitReason::WriterClosed => f.write_str("writer closed"),
            ExitReason::Overload(q) => write!(f, "{q} overload"),
        }
    }
}

/// A synchronous handler call made through [`Session::hook`].
pub(crate) struct HookCall {
    pub jid: Jid,
    pub command: Command,
    pub payload: String,
    pub reply: oneshot::Sender<Result<(), HandlerError>>,
}

/// Channels owned by the loop for one run.
pub(crate) struct Channels {
    pub direct: mpsc::Receiver<Arc<Message>>,
    pub subscription: Subscription,
    pub incoming: mpsc::Receiver<Frame>,
    pub hooks: Option<mpsc::Receiver<HookCall>>,
    pub outbound: mpsc::Sender<Bytes>,
}

enum Input {
    Message(Arc<Message>),
    Frame(Frame),
    Hook(HookCall),
}

async fn next_hook(hooks: &mut Option<mpsc::Receiver<HookCall>>) -> Option<HookCall> {
    match hooks {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run the loop until shutdown, cancellation, input end or overload, then
/// drain. Every outbound sender is gone when this returns.
pub(crate) async fn run(session: &Session, channels: Channels) -> ExitReason {
    let Channels {
        mut direct,
        mut subscription,
        mut incoming,
        mut hooks,
        outbound,
    } = channels;
    let key = session.key();
    let cancel = session.cancel_token().clone();
    let shutdown = session.shutdown_token().clone();
    let overflow = subscription.overflow_signal();

    let (calls, call_rx) = mpsc::channel(session.queue_capacity());
    let mut dispatcher = tokio::spawn(dispatcher::run(session.clone(), call_rx, outbound.clone()));
    let processor = Processor {
        session,
        key,
        calls,
        outbound,
    };

    debug!(session = %key, "Event loop running");

    let exit = loop {
        let input = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break ExitReason::Shutdown,
            _ = cancel.cancelled() => break ExitReason::Cancelled,
            _ = overflow.notified() => {
                error!(session = %key, "Broadcast queue full, closing session");
                break ExitReason::Overload(Queue::Broadcast);
            }
            msg = direct.recv() => match msg {
                Some(msg) => Input::Message(msg),
                None => break ExitReason::Cancelled,
            },
            msg = subscription.recv() => match msg {
                Some(msg) => Input::Message(msg),
                None => break ExitReason::HubClosed,
            },
            frame = incoming.recv() => match frame {
                Some(frame) => Input::Frame(frame),
                None => break ExitReason::IncomingClosed,
            },
            Some(call) = next_hook(&mut hooks) => Input::Hook(call),
        };

        let res = match input {
            Input::Message(msg) => processor.on_message(&msg),
            Input::Frame(frame) => processor.on_frame(frame),
            Input::Hook(call) => processor.on_hook(call),
        };
        if let Err(exit) = res {
            break exit;
        }
    };

    // Draining: stop hub delivery, stop accepting handler work, and discard
    // input until the dispatcher has finished its last call.
    debug!(session = %key, exit = %exit, "Event loop draining");
    drop(subscription);
    let Processor {
        calls, outbound, ..
    } = processor;
    drop(calls);

    loop {
        tokio::select! {
            res = &mut dispatcher => {
                if let Err(e) = res {
                    error!(session = %key, error = %e, "Dispatcher failed");
                }
                break;
            }
            Some(_) = direct.recv() => {}
            Some(_) = incoming.recv() => {}
            Some(call) = next_hook(&mut hooks) => {
                let _ = call.reply.send(Err(HandlerError::failed("session closed")));
            }
        }
    }

    // the writer drains what is queued once its last sender is gone
    drop(outbound);
    debug!(session = %key, "Event loop terminated");
    exit
}

struct Processor<'a> {
    session: &'a Session,
    key: SessionKey,
    calls: mpsc::Sender<Call>,
    outbound: mpsc::Sender<Bytes>,
}

impl Processor<'_> {
    fn on_message(&self, msg: &Message) -> Result<(), ExitReason> {
        if msg.is_from(self.key) {
            trace!(session = %self.key, "Skipping own broadcast");
            return Ok(());
        }

        if msg.dest == Dest::Session {
            return match msg.kind {
                Kind::Frame(command) if command.is_session_scoped() => {
                    self.forward(&Frame::new(command, Jid::NONE, msg.payload.as_str()))
                }
                _ => {
                    trace!(session = %self.key, kind = ?msg.kind, "Discarding session message");
                    Ok(())
                }
            };
        }

        let elements = self.resolve(&msg.dest);
        if elements.is_empty() {
            trace!(session = %self.key, dest = ?msg.dest, "Discarding message for unknown target");
            return Ok(());
        }

        match msg.kind {
            Kind::Dirty => {
                for element in &elements {
                    for frame in element.ui().update(element.jid()) {
                        self.forward(&frame)?;
                    }
                }
            }
            Kind::Frame(Command::Trigger) => {
                for element in elements {
                    self.queue(element, Command::Trigger, msg.payload.clone())?;
                }
            }
            Kind::Frame(command) => {
                for element in &elements {
                    self.forward(&Frame::new(command, element.jid(), msg.payload.as_str()))?;
                }
            }
        }
        Ok(())
    }

    fn on_frame(&self, frame: Frame) -> Result<(), ExitReason> {
        if !frame.command.is_event() {
            trace!(session = %self.key, command = %frame.command, "Ignoring non-event frame");
            return Ok(());
        }
        let Some(element) = self.session.element(frame.jid) else {
            trace!(session = %self.key, jid = %frame.jid, "Discarding event for unknown element");
            return Ok(());
        };
        self.queue(element, frame.command, frame.payload)
    }

    fn on_hook(&self, call: HookCall) -> Result<(), ExitReason> {
        let Some(element) = self.session.element(call.jid) else {
            let _ = call.reply.send(Err(HandlerError::Unregistered(call.jid)));
            return Ok(());
        };
        let handler = self.session.registry().read().handler(call.jid);
        let invocation = Call {
            element,
            handler,
            command: call.command,
            payload: call.payload,
        };

        let res = invocation.invoke(self.session);
        let forwarded = match &res {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(session = %self.key, jid = %call.jid, error = %err, "Hook handler failed");
                self.forward(&alert_frame(err))
            }
        };
        let _ = call.reply.send(res);
        forwarded
    }

    fn resolve(&self, dest: &Dest) -> Vec<Arc<Element>> {
        let registry = self.session.registry().read();
        match dest {
            Dest::Session => Vec::new(),
            Dest::Jid(jid) => registry.lookup(*jid).into_iter().collect(),
            Dest::Tags(tags) => match Tag::expand(tags) {
                Ok(flat) => registry.elements_for_tags(&flat),
                Err(e) => {
                    warn!(session = %self.key, error = %e, "Bad tags in message");
                    Vec::new()
                }
            },
        }
    }

    fn queue(&self, element: Arc<Element>, command: Command, payload: String) -> Result<(), ExitReason> {
        let handler = self.session.registry().read().handler(element.jid());
        if handler.is_none() && !element.ui().handles_events() {
            trace!(session = %self.key, jid = %element.jid(), "No handler for event");
            return Ok(());
        }

        let call = Call {
            element,
            handler,
            command,
            payload,
        };
        match self.calls.try_send(call) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                error!(session = %self.key, "Handler queue full, closing session");
                Err(ExitReason::Overload(Queue::Handler))
            }
            Err(TrySendError::Closed(_)) => {
                error!(session = %self.key, "Dispatcher gone, closing session");
                Err(ExitReason::Cancelled)
            }
        }
    }

    fn forward(&self, frame: &Frame) -> Result<(), ExitReason> {
        let data = match codec::encode(frame) {
            Ok(data) => data,
            Err(e) => {
                warn!(session = %self.key, frame = %frame, error = %e, "Dropping unencodable frame");
                return Ok(());
            }
        };
        match self.outbound.try_send(data) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                error!(session = %self.key, "Outbound queue full, closing session");
                Err(ExitReason::Overload(Queue::Outbound))
            }
            Err(TrySendError::Closed(_)) => Err(ExitReason::WriterClosed),
        }
    }
}
