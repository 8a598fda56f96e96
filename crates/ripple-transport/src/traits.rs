//! Transport abstraction traits for Ripple.
//!
//! A transport is a duplex, message-oriented, text-capable channel. It is
//! split into a reading half and a writing half so the two pumps can run
//! as independent tasks.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// The receiving half of a transport.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next text message.
    ///
    /// Returns `None` if the peer closed the connection cleanly. Non-text
    /// messages are skipped by implementations.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// The sending half of a transport.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one encoded frame as a text message.
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError>;

    /// Close the connection, telling the peer why.
    ///
    /// Closing an already closed writer is not an error.
    async fn close(&mut self, reason: &str) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: FrameReader + ?Sized> FrameReader for Box<T> {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        (**self).recv().await
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        (**self).remote_addr()
    }
}

#[async_trait]
impl<T: FrameWriter + ?Sized> FrameWriter for Box<T> {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        (**self).send(data).await
    }

    async fn close(&mut self, reason: &str) -> Result<(), TransportError> {
        (**self).close(reason).await
    }
}
