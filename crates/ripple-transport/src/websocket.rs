//! WebSocket transport implementation.
//!
//! Adapts an upgraded axum [`WebSocket`] into a [`FrameReader`] and a
//! [`FrameWriter`] that can be pumped from separate tasks.

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::net::SocketAddr;
use tracing::{debug, trace};

use crate::traits::{FrameReader, FrameWriter, TransportError};

/// Split an upgraded socket into its two halves.
#[must_use]
pub fn split(socket: WebSocket, remote_addr: Option<SocketAddr>) -> (WsReader, WsWriter) {
    let (sink, stream) = socket.split();
    (
        WsReader {
            stream,
            remote_addr,
        },
        WsWriter {
            sink,
            closed: false,
        },
    )
}

/// Receiving half of a WebSocket.
pub struct WsReader {
    stream: SplitStream<WebSocket>,
    remote_addr: Option<SocketAddr>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text))),
                Some(Ok(Message::Binary(data))) => {
                    trace!(len = data.len(), "Ignoring binary message");
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // control frames are answered by the websocket layer
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Sending half of a WebSocket.
pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self, reason: &str) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Owned(reason.to_string()),
        };
        // the peer may already be gone; closing the sink still releases it
        let _ = self.sink.send(Message::Close(Some(frame))).await;
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }
}
