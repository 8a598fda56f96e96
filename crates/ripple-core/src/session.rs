//! Live sessions.
//!
//! A [`Session`] is created when a page is rendered, collects the elements
//! that page registers, and is later bound to a transport with
//! [`Session::serve`]. Cloning is cheap; every clone is the same session.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use ripple_protocol::{codec, jid, Command, Jid};
use ripple_transport::pump::{self, PumpStats};
use ripple_transport::{FrameReader, FrameWriter, TransportError};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::dispatcher::alert_frame;
use crate::engine::EngineConfig;
use crate::error::{HandlerError, SessionError};
use crate::event::{ConnectFn, EventFn};
use crate::event_loop::{self, Channels, ExitReason, HookCall, Queue};
use crate::html;
use crate::hub::Hub;
use crate::message::{Dest, Message};
use crate::registry::{Element, Registry, RegistryPool};
use crate::tag::Tag;
use crate::widget::{Ui, Widget};

/// How long a finished session waits for the writer to drain its queue.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Random non-zero key naming a session, shown in base-32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(pub u64);

impl SessionKey {
    /// Parse the base-32 form. Zero is not a valid key.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        jid::parse_radix(s).filter(|&v| v != 0).map(SessionKey)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&jid::to_radix(self.0))
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The engine shut down.
    Shutdown,
    /// Closed by the application or after the browser left.
    Closed,
    /// The transport failed or the browser disconnected.
    Transport(String),
    /// A queue filled up.
    Overload(Queue),
    /// A reconnect came from another address.
    AddressMismatch,
    /// The connect handler refused the session.
    ConnectRejected(String),
    /// Never connected in time.
    Expired,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Shutdown => f.write_str("shutdown"),
            CloseReason::Closed => f.write_str("closed"),
            CloseReason::Transport(e) => write!(f, "transport: {e}"),
            CloseReason::Overload(q) => write!(f, "{q} queue full"),
            CloseReason::AddressMismatch => f.write_str("address mismatch"),
            CloseReason::ConnectRejected(e) => write!(f, "rejected: {e}"),
            CloseReason::Expired => f.write_str("expired"),
        }
    }
}

/// Outcome of [`Session::serve`].
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// The session.
    pub key: SessionKey,
    /// Why the event loop stopped.
    pub exit: ExitReason,
    /// First recorded close reason.
    pub close_reason: Option<CloseReason>,
    /// Frames read from the browser.
    pub received: PumpStats,
    /// Frames written to the browser.
    pub sent: PumpStats,
}

struct Inner {
    key: SessionKey,
    created: Instant,
    remote_ip: Option<IpAddr>,
    config: Arc<EngineConfig>,
    hub: Arc<Hub>,
    pool: Arc<RegistryPool>,
    shutdown: CancellationToken,
    cancel: CancellationToken,
    close_reason: Mutex<Option<CloseReason>>,
    registry: RwLock<Registry>,
    direct_tx: mpsc::Sender<Arc<Message>>,
    direct_rx: Mutex<Option<mpsc::Receiver<Arc<Message>>>>,
    hook_tx: Option<mpsc::Sender<HookCall>>,
    hook_rx: Mutex<Option<mpsc::Receiver<HookCall>>>,
    on_connect: Mutex<Option<ConnectFn>>,
}

/// A live session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.inner.key)
            .field("remote_ip", &self.inner.remote_ip)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        key: SessionKey,
        remote_ip: Option<IpAddr>,
        config: Arc<EngineConfig>,
        hub: Arc<Hub>,
        pool: Arc<RegistryPool>,
        shutdown: CancellationToken,
    ) -> Self {
        let (direct_tx, direct_rx) = mpsc::channel(config.direct_queue.max(1));
        let (hook_tx, hook_rx) = if config.enable_hooks {
            let (tx, rx) = mpsc::channel(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let registry = pool.take();

        Self {
            inner: Arc::new(Inner {
                key,
                created: Instant::now(),
                remote_ip,
                config,
                hub,
                pool,
                shutdown,
                cancel: CancellationToken::new(),
                close_reason: Mutex::new(None),
                registry: RwLock::new(registry),
                direct_tx,
                direct_rx: Mutex::new(Some(direct_rx)),
                hook_tx,
                hook_rx: Mutex::new(hook_rx),
                on_connect: Mutex::new(None),
            }),
        }
    }

    /// The session key.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.inner.key
    }

    /// When the session was created.
    #[must_use]
    pub fn created(&self) -> Instant {
        self.inner.created
    }

    /// Time since creation.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.inner.created.elapsed()
    }

    /// Address of the browser that requested the page.
    #[must_use]
    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.inner.remote_ip
    }

    /// Whether the session was cancelled or the engine shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled() || self.inner.shutdown.is_cancelled()
    }

    /// The first reason recorded for closing.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.close_reason.lock().clone()
    }

    /// Close the session.
    pub fn close(&self) {
        self.cancel(CloseReason::Closed);
    }

    /// Record `reason` unless one is already set, then cancel.
    pub(crate) fn cancel(&self, reason: CloseReason) {
        self.record_close_reason(reason);
        self.inner.cancel.cancel();
    }

    fn record_close_reason(&self, reason: CloseReason) {
        let mut slot = self.inner.close_reason.lock();
        if slot.is_none() {
            debug!(session = %self.inner.key, reason = %reason, "Closing session");
            *slot = Some(reason);
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub(crate) fn registry(&self) -> &RwLock<Registry> {
        &self.inner.registry
    }

    /// Capacity of the outbound and handler queues: a floor plus a share
    /// per registered element.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        let elements = self.inner.registry.read().len();
        let config = &self.inner.config;
        config
            .min_queue
            .saturating_add(config.queue_per_element.saturating_mul(elements))
            .max(1)
    }

    fn broadcast_capacity(&self) -> usize {
        self.queue_capacity().max(self.inner.config.broadcast_queue)
    }

    /// Return the registry to the pool and drop the connect handler.
    pub(crate) fn recycle(&self) {
        let registry = std::mem::take(&mut *self.inner.registry.write());
        self.inner.pool.put(registry);
        *self.inner.on_connect.lock() = None;
    }

    // Rendering and registration

    /// Render `widget` and register it under its own tags plus `extra`.
    ///
    /// # Errors
    ///
    /// Fails if the tags do not expand.
    pub fn render(&self, widget: Widget, extra: &[Tag]) -> Result<String, SessionError> {
        self.render_with(widget, extra, &[])
    }

    /// Like [`Session::render`], adding raw HTML attributes such as
    /// `class="btn"` to the element.
    ///
    /// # Errors
    ///
    /// Fails if the tags do not expand.
    pub fn render_with(
        &self,
        widget: Widget,
        extra: &[Tag],
        attrs: &[&str],
    ) -> Result<String, SessionError> {
        let own = widget.tags();
        let tags = Tag::expand(own.iter().chain(extra))?;
        let mut out = String::new();

        if tags.is_empty() && !widget.handles_events() {
            widget.render(Jid::NONE, attrs, &mut out);
            return Ok(out);
        }

        let element = {
            let mut registry = self.inner.registry.write();
            if tags.is_empty() {
                registry.insert(tags, widget)
            } else {
                match registry.new_element(tags, widget) {
                    Some(element) => element,
                    None => return Ok(out),
                }
            }
        };
        element.ui().render(element.jid(), attrs, &mut out);
        Ok(out)
    }

    /// Attach `handler` to `jid`. `Jid::NONE` allocates a handler-only
    /// element; a jid this session never allocated gives `None`.
    pub fn register_handler(&self, jid: Jid, handler: Option<EventFn>) -> Option<Jid> {
        self.inner.registry.write().register_handler(jid, handler)
    }

    /// Replace the handler of an existing element. Returns `false` if there
    /// is no such element.
    pub fn set_handler(&self, jid: Jid, handler: EventFn) -> bool {
        jid != Jid::NONE
            && self
                .inner
                .registry
                .write()
                .register_handler(jid, Some(handler))
                .is_some()
    }

    /// The element with this jid.
    #[must_use]
    pub fn element(&self, jid: Jid) -> Option<Arc<Element>> {
        self.inner.registry.read().lookup(jid)
    }

    /// Number of registered elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Run `f` when the transport connects. An error is shown to the user
    /// and the session is closed.
    pub fn on_connect<F>(&self, f: F)
    where
        F: Fn(&Session) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let f: ConnectFn = Arc::new(f);
        *self.inner.on_connect.lock() = Some(f);
    }

    // Sending

    /// Queue `msg` for this session only. Returns `false` if the session is
    /// closed or its queue is full.
    pub fn send(&self, msg: Message) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.inner.direct_tx.try_send(Arc::new(msg)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session = %self.inner.key, "Direct queue full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Publish `msg` to every other session.
    pub fn broadcast(&self, msg: Message) -> usize {
        self.inner.hub.publish(msg.with_origin(self.inner.key))
    }

    /// Re-render elements tagged with `tags` in this session.
    pub fn dirty(&self, tags: Vec<Tag>) -> bool {
        self.send(Message::dirty(tags))
    }

    /// Re-render elements tagged with `tags` in every session, this one
    /// included.
    pub fn dirty_all(&self, tags: Vec<Tag>) -> usize {
        self.inner.hub.publish(Message::dirty(tags))
    }

    /// Re-render elements tagged with `tags` in every other session.
    pub fn dirty_others(&self, tags: Vec<Tag>) -> usize {
        self.broadcast(Message::dirty(tags))
    }

    /// Show an alert. `level` is a Bootstrap alert level; `html` is shown
    /// as-is.
    pub fn alert(&self, level: &str, html: &str) -> bool {
        self.send(Message::session(Command::Alert, format!("{level}\n{html}")))
    }

    /// Show `err` as a danger alert.
    pub fn alert_error(&self, err: &dyn fmt::Display) -> bool {
        self.alert("danger", &html::escape(&err.to_string()))
    }

    /// Navigate this session's page to `url`.
    pub fn redirect(&self, url: &str) -> bool {
        self.send(Message::session(Command::Redirect, url))
    }

    /// Reload this session's page.
    pub fn reload(&self) -> bool {
        self.send(Message::session(Command::Reload, ""))
    }

    /// Set an attribute on `jid` in this session. An empty value adds a
    /// value-less attribute.
    pub fn set_attr(&self, jid: Jid, attr: &str, value: &str) -> bool {
        self.send(Message::frame(
            Dest::Jid(jid),
            Command::SetAttr,
            format!("{attr}\n{value}"),
        ))
    }

    /// Remove an attribute from `jid` in this session.
    pub fn remove_attr(&self, jid: Jid, attr: &str) -> bool {
        self.send(Message::frame(Dest::Jid(jid), Command::RemoveAttr, attr))
    }

    /// Replace the inner HTML of `jid` in every other session that has it.
    pub fn set_inner(&self, jid: Jid, html: &str) -> usize {
        self.broadcast(Message::frame(Dest::Jid(jid), Command::Inner, html))
    }

    /// Set the value of `jid` in every other session that has it.
    pub fn set_value(&self, jid: Jid, value: &str) -> usize {
        self.broadcast(Message::frame(Dest::Jid(jid), Command::Value, value))
    }

    /// Run the handler of `jid` in every other session that has it.
    pub fn trigger(&self, jid: Jid, value: &str) -> usize {
        self.broadcast(Message::frame(Dest::Jid(jid), Command::Trigger, value))
    }

    /// Call the handler of `jid` on the event loop and wait for its result.
    ///
    /// Only available when the engine enables hooks. Waits until the session
    /// is being served.
    ///
    /// # Errors
    ///
    /// [`SessionError::HooksDisabled`] without the capability,
    /// [`SessionError::Closed`] if the session ends first, or the handler's
    /// own error.
    pub async fn hook(
        &self,
        jid: Jid,
        command: Command,
        payload: impl Into<String>,
    ) -> Result<(), SessionError> {
        let tx = self
            .inner
            .hook_tx
            .as_ref()
            .ok_or(SessionError::HooksDisabled)?;
        let (reply, rx) = oneshot::channel();
        let call = HookCall {
            jid,
            command,
            payload: payload.into(),
            reply,
        };

        let cancel = &self.inner.cancel;
        let shutdown = &self.inner.shutdown;
        tokio::select! {
            _ = cancel.cancelled() => return Err(SessionError::Closed),
            _ = shutdown.cancelled() => return Err(SessionError::Closed),
            res = tx.send(call) => res.map_err(|_| SessionError::Closed)?,
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(SessionError::Closed),
            _ = shutdown.cancelled() => Err(SessionError::Closed),
            res = rx => res.map_err(|_| SessionError::Closed)?.map_err(SessionError::from),
        }
    }

    // Serving

    /// Bind the session to a transport and run it until it ends.
    ///
    /// Starts the reader and writer pumps, the event loop and the handler
    /// dispatcher. The transport is closed, the session cancelled and the
    /// registry recycled on every exit path, including when this future is
    /// dropped before it completes.
    ///
    /// # Errors
    ///
    /// Fails if the session is already served or closed, the hub is shut
    /// down, or the connect handler refuses the session.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<SessionReport, SessionError>
    where
        R: FrameReader + 'static,
        W: FrameWriter + 'static,
    {
        let key = self.inner.key;
        let direct = self.inner.direct_rx.lock().take();
        let Some(direct) = direct else {
            error!(session = %key, "Session served twice");
            let _ = writer.close("already connected").await;
            return Err(SessionError::AlreadyServed);
        };
        let hooks = self.inner.hook_rx.lock().take();
        let _teardown = Teardown(self);

        if self.is_closed() {
            let _ = writer.close("closed").await;
            return Err(SessionError::Closed);
        }

        if let Err(err) = self.run_on_connect() {
            warn!(session = %key, error = %err, "Connect handler refused session");
            if let Ok(data) = codec::encode(&alert_frame(&err)) {
                let _ = writer.send(data).await;
            }
            let _ = writer.close(&err.to_string()).await;
            self.cancel(CloseReason::ConnectRejected(err.to_string()));
            return Err(err.into());
        }

        let capacity = self.queue_capacity();
        let subscription = match self.inner.hub.subscribe(key, self.broadcast_capacity()) {
            Ok(subscription) => subscription,
            Err(err) => {
                let _ = writer.close("shutting down").await;
                self.cancel(CloseReason::Shutdown);
                return Err(err.into());
            }
        };

        debug!(
            session = %key,
            remote = ?reader.remote_addr(),
            elements = self.element_count(),
            capacity,
            "Session connected"
        );

        let (incoming_tx, incoming) = mpsc::channel(1);
        let (outbound, outbound_rx) = mpsc::channel::<Bytes>(capacity);

        let on_read_error = self.transport_error_fn();
        let reader_task = tokio::spawn(pump::read_loop(
            reader,
            incoming_tx,
            self.inner.cancel.clone(),
            self.inner.shutdown.clone(),
            Some(on_read_error),
        ));
        let on_write_error = self.transport_error_fn();
        let mut writer_task = tokio::spawn(pump::write_loop(
            writer,
            outbound_rx,
            self.inner.cancel.clone(),
            self.inner.shutdown.clone(),
            Some(on_write_error),
        ));

        let exit = event_loop::run(
            self,
            Channels {
                direct,
                subscription,
                incoming,
                hooks,
                outbound,
            },
        )
        .await;

        // The loop dropped every outbound sender. Unless the writer is the
        // problem, let it drain before cancelling, which also stops the reader.
        self.record_close_reason(exit.close_reason());
        let mut flushed = None;
        if exit.flushes() {
            match time::timeout(FLUSH_TIMEOUT, &mut writer_task).await {
                Ok(res) => flushed = Some(res),
                Err(_) => warn!(session = %key, "Timed out flushing outbound frames"),
            }
        }
        self.inner.cancel.cancel();

        let sent = match flushed {
            Some(res) => res,
            None => writer_task.await,
        }
        .unwrap_or_else(|e| {
            error!(session = %key, error = %e, "Writer task failed");
            PumpStats::default()
        });
        let received = reader_task.await.unwrap_or_else(|e| {
            error!(session = %key, error = %e, "Reader task failed");
            PumpStats::default()
        });

        debug!(
            session = %key,
            exit = %exit,
            received = received.frames,
            sent = sent.frames,
            "Session ended"
        );

        Ok(SessionReport {
            key,
            exit,
            close_reason: self.close_reason(),
            received,
            sent,
        })
    }

    fn run_on_connect(&self) -> Result<(), HandlerError> {
        let f = self.inner.on_connect.lock().clone();
        match f {
            Some(f) => f(self),
            None => Ok(()),
        }
    }

    fn transport_error_fn(&self) -> impl FnOnce(TransportError) + Send + 'static {
        let session = self.clone();
        move |err: TransportError| session.cancel(CloseReason::Transport(err.to_string()))
    }
}

/// Ends the session when [`Session::serve`] returns or is dropped.
struct Teardown<'a>(&'a Session);

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.0.cancel(CloseReason::Closed);
        self.0.recycle();
    }
}

impl ExitReason {
    /// Whether frames still queued for the writer should be sent.
    fn flushes(self) -> bool {
        matches!(
            self,
            ExitReason::IncomingClosed
                | ExitReason::HubClosed
                | ExitReason::Overload(Queue::Handler | Queue::Broadcast)
        )
    }

    fn close_reason(&self) -> CloseReason {
        match self {
            ExitReason::Shutdown | ExitReason::HubClosed => CloseReason::Shutdown,
            ExitReason::Cancelled | ExitReason::IncomingClosed => CloseReason::Closed,
            ExitReason::WriterClosed => CloseReason::Transport("writer closed".into()),
            ExitReason::Overload(queue) => CloseReason::Overload(*queue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::event::handler;
    use crate::widget::{Fixed, Shared};

    #[test]
    fn test_session_key_text() {
        let key = SessionKey(32 * 32 + 1);
        assert_eq!(key.to_string(), "101");
        assert_eq!(SessionKey::parse("101"), Some(key));
        assert_eq!(SessionKey::parse("0"), None);
        assert_eq!(SessionKey::parse("x!"), None);
    }

    #[tokio::test]
    async fn test_render_registers_tagged_widgets() {
        let engine = Engine::new(EngineConfig::default());
        let session = engine.new_session(None).unwrap();

        let name = Shared::new("Ann".to_string());
        let html = session.render(Widget::text(name.clone()), &[]).unwrap();
        assert_eq!(html, "<input id=\"Jid.1\" type=\"text\" value=\"Ann\">");

        let el = session.element(Jid(1)).unwrap();
        assert!(el.has_tag(&name.tag()));

        // static markup is not registered
        let html = session
            .render(Widget::span(Fixed("hi".to_string())), &[])
            .unwrap();
        assert_eq!(html, "<span>hi</span>");
        assert_eq!(session.element_count(), 1);

        // extra tags make it addressable
        let html = session
            .render_with(
                Widget::span(Fixed("hi".to_string())),
                &["x".into()],
                &["class=\"c\""],
            )
            .unwrap();
        assert_eq!(html, "<span id=\"Jid.2\" class=\"c\">hi</span>");

        // a button with a click handler is addressable without tags
        let html = session
            .render(Widget::button("go", Some(handler(|_| Ok(())))), &[])
            .unwrap();
        assert_eq!(html, "<button id=\"Jid.3\" type=\"button\">go</button>");
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let engine = Engine::new(EngineConfig::default());
        let session = engine.new_session(None).unwrap();

        assert!(session.alert("info", "hello"));
        session.close();
        assert!(session.is_closed());
        assert_eq!(session.close_reason(), Some(CloseReason::Closed));
        assert!(!session.reload());
    }

    #[tokio::test]
    async fn test_direct_queue_full() {
        let config = EngineConfig {
            direct_queue: 2,
            ..EngineConfig::default()
        };
        let engine = Engine::new(config);
        let session = engine.new_session(None).unwrap();

        assert!(session.reload());
        assert!(session.reload());
        assert!(!session.reload());
    }

    #[tokio::test]
    async fn test_hook_requires_capability() {
        let engine = Engine::new(EngineConfig::default());
        let session = engine.new_session(None).unwrap();

        assert!(matches!(
            session.hook(Jid(1), Command::Input, "x").await,
            Err(SessionError::HooksDisabled)
        ));
    }

    #[test]
    fn test_queue_capacity_grows_with_elements() {
        let engine = Engine::new(EngineConfig::default());
        let session = engine.new_session(None).unwrap();
        assert_eq!(session.queue_capacity(), 8);

        for i in 0..3 {
            session
                .render(Widget::span(Fixed(String::new())), &[Tag::Int(i)])
                .unwrap();
        }
        assert_eq!(session.queue_capacity(), 8 + 3 * 4);
    }
}
