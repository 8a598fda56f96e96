//! In-process transport.
//!
//! Used by tests and benchmarks to drive a session without a socket. The
//! [`Peer`] plays the browser.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::sync::mpsc;

use crate::traits::{FrameReader, FrameWriter, TransportError};

/// Create a connected transport pair.
///
/// Returns the server-side reader and writer plus the browser-side peer.
#[must_use]
pub fn pipe(capacity: usize) -> (MemoryReader, MemoryWriter, Peer) {
    let (to_server, from_peer) = mpsc::channel(capacity);
    let (to_peer, from_server) = mpsc::channel(capacity);
    (
        MemoryReader {
            rx: from_peer,
            remote_addr: None,
        },
        MemoryWriter {
            tx: Some(to_peer),
            close_reason: None,
        },
        Peer {
            tx: Some(to_server),
            rx: from_server,
        },
    )
}

/// Server-side receiving half.
pub struct MemoryReader {
    rx: mpsc::Receiver<Bytes>,
    remote_addr: Option<SocketAddr>,
}

impl MemoryReader {
    /// Report `addr` as the remote address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.rx.recv().await)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Server-side sending half.
pub struct MemoryWriter {
    tx: Option<mpsc::Sender<Bytes>>,
    close_reason: Option<String>,
}

impl MemoryWriter {
    /// The reason given to `close`, if it was called.
    #[must_use]
    pub fn close_reason(&self) -> Option<&str> {
        self.close_reason.as_deref()
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(data)
            .await
            .map_err(|_| TransportError::SendFailed("peer dropped".into()))
    }

    async fn close(&mut self, reason: &str) -> Result<(), TransportError> {
        if self.tx.take().is_some() {
            self.close_reason = Some(reason.to_string());
        }
        Ok(())
    }
}

/// The browser side of a [`pipe`].
pub struct Peer {
    tx: Option<mpsc::Sender<Bytes>>,
    rx: mpsc::Receiver<Bytes>,
}

impl Peer {
    /// Send a raw text line to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server reader is gone or the peer hung up.
    pub async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(Bytes::copy_from_slice(text.as_bytes()))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Receive the next line the server wrote. `None` once the server closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx
            .recv()
            .await
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    /// Receive a line if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx
            .try_recv()
            .ok()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    /// Hang up, as a browser closing its tab would.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }
}
