//! Process-wide engine: the hub, pending sessions and shared limits.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::hub::Hub;
use crate::message::Message;
use crate::registry::RegistryPool;
use crate::session::{CloseReason, Session, SessionKey};
use crate::tag::Tag;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of sessions waiting for their transport. Zero means
    /// no limit.
    pub max_sessions: usize,
    /// Capacity of each session's direct-send queue.
    pub direct_queue: usize,
    /// Minimum capacity of each session's hub subscription.
    pub broadcast_queue: usize,
    /// Outbound and handler queue capacity before any elements exist.
    pub min_queue: usize,
    /// Extra queue capacity per registered element.
    pub queue_per_element: usize,
    /// Allow [`Session::hook`].
    pub enable_hooks: bool,
    /// Number of cleared registries kept for reuse.
    pub pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            direct_queue: 64,
            broadcast_queue: 64,
            min_queue: 8,
            queue_per_element: 4,
            enable_hooks: false,
            pool_size: 64,
        }
    }
}

/// The engine.
pub struct Engine {
    config: Arc<EngineConfig>,
    hub: Arc<Hub>,
    pool: Arc<RegistryPool>,
    shutdown: CancellationToken,
    pending: DashMap<SessionKey, Session>,
}

impl Engine {
    /// Create an engine.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        info!("Creating engine with config: {:?}", config);
        Self {
            pool: Arc::new(RegistryPool::new(config.pool_size)),
            config: Arc::new(config),
            hub: Arc::new(Hub::new()),
            shutdown: CancellationToken::new(),
            pending: DashMap::new(),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The broadcast hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Token cancelled by [`Engine::shutdown`].
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether [`Engine::shutdown`] has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Create a session for a page requested from `remote_ip`.
    ///
    /// The session waits in the pending table until [`Engine::claim`].
    ///
    /// # Errors
    ///
    /// Fails after shutdown or when too many sessions are pending.
    pub fn new_session(&self, remote_ip: Option<IpAddr>) -> Result<Session, SessionError> {
        if self.is_shutdown() {
            return Err(SessionError::Closed);
        }
        if self.config.max_sessions > 0 && self.pending.len() >= self.config.max_sessions {
            warn!(pending = self.pending.len(), "Too many pending sessions");
            return Err(SessionError::MaxSessionsReached);
        }

        let remote_ip = fingerprint(remote_ip);
        loop {
            let key = SessionKey(rand::random());
            if key.0 == 0 {
                continue;
            }
            if let Entry::Vacant(slot) = self.pending.entry(key) {
                let session = Session::new(
                    key,
                    remote_ip,
                    self.config.clone(),
                    self.hub.clone(),
                    self.pool.clone(),
                    self.shutdown.clone(),
                );
                slot.insert(session.clone());
                debug!(session = %key, remote = ?remote_ip, "New session");
                return Ok(session);
            }
        }
    }

    /// Take the pending session `key` for a transport connecting from
    /// `remote_ip`.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownKey`] if no such session is pending, or
    /// [`SessionError::AddressMismatch`] if the address differs from the
    /// page request; the session is then closed.
    pub fn claim(&self, key: SessionKey, remote_ip: Option<IpAddr>) -> Result<Session, SessionError> {
        let (_, session) = self.pending.remove(&key).ok_or(SessionError::UnknownKey)?;

        let actual = fingerprint(remote_ip);
        if session.remote_ip() != actual {
            warn!(
                session = %key,
                expected = ?session.remote_ip(),
                actual = ?actual,
                "Reconnect from different address"
            );
            session.cancel(CloseReason::AddressMismatch);
            session.recycle();
            return Err(SessionError::AddressMismatch {
                expected: session.remote_ip(),
                actual,
            });
        }

        debug!(session = %key, "Session claimed");
        Ok(session)
    }

    /// Drop pending sessions older than `max_age`. Returns how many.
    pub fn prune_stale(&self, max_age: Duration) -> usize {
        let mut stale = Vec::new();
        self.pending.retain(|_, session| {
            if session.age() > max_age {
                stale.push(session.clone());
                false
            } else {
                true
            }
        });

        for session in &stale {
            session.cancel(CloseReason::Expired);
            session.recycle();
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "Pruned stale sessions");
        }
        stale.len()
    }

    /// Number of sessions waiting for a transport.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Re-render elements tagged with `tags` in every session.
    pub fn dirty(&self, tags: Vec<Tag>) -> usize {
        self.hub.publish(Message::dirty(tags))
    }

    /// Publish `msg` to every session.
    pub fn broadcast(&self, msg: Message) -> usize {
        self.hub.publish(msg)
    }

    /// Stop every session and refuse new ones.
    pub fn shutdown(&self) {
        info!("Shutting down engine");
        self.shutdown.cancel();
        self.hub.shutdown();

        let keys: Vec<SessionKey> = self.pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, session)) = self.pending.remove(&key) {
                session.cancel(CloseReason::Shutdown);
                session.recycle();
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Addresses compare by IP only; IPv4-mapped IPv6 equals plain IPv4.
fn fingerprint(ip: Option<IpAddr>) -> Option<IpAddr> {
    ip.map(|ip| ip.to_canonical())
}
