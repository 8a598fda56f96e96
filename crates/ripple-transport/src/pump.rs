//! Reader and writer loops moving frames between a transport and channels.
//!
//! Both loops watch the session's cancellation token and the process
//! shutdown token, so neither can outlive a cancellation request. A
//! transport error is handed to `on_error` (the session's cancel function)
//! so the event loop learns about failures it did not initiate. A clean
//! close from the browser only ends the reader, which closes `incoming`.

use bytes::Bytes;
use ripple_protocol::{codec, Frame};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::traits::{FrameReader, FrameWriter, TransportError};

/// Counters reported by a pump when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Frames moved.
    pub frames: u64,
    /// Bytes moved.
    pub bytes: u64,
}

/// Read frames from `reader` and hand them to `incoming`.
///
/// Malformed frames are dropped. The loop ends on read error, clean close,
/// cancellation or shutdown. `incoming` is dropped on exit, which closes the
/// channel and tells the event loop there is no more input. Only a read
/// error reaches `on_error`.
pub async fn read_loop<R, F>(
    mut reader: R,
    incoming: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    on_error: Option<F>,
) -> PumpStats
where
    R: FrameReader,
    F: FnOnce(TransportError),
{
    let mut stats = PumpStats::default();

    let err = loop {
        let data = tokio::select! {
            _ = cancel.cancelled() => return stats,
            _ = shutdown.cancelled() => return stats,
            res = reader.recv() => match res {
                Ok(Some(data)) => data,
                Ok(None) => {
                    debug!("Reader reached end of stream");
                    return stats;
                }
                Err(e) => break e,
            },
        };

        stats.bytes += data.len() as u64;
        let frame = match codec::try_decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(error = %e, "Dropping malformed frame");
                continue;
            }
        };
        stats.frames += 1;

        tokio::select! {
            _ = cancel.cancelled() => return stats,
            _ = shutdown.cancelled() => return stats,
            res = incoming.send(frame) => {
                if res.is_err() {
                    return stats;
                }
            }
        }
    };

    debug!(error = %err, "Reader stopped");
    if let Some(on_error) = on_error {
        on_error(err);
    }
    stats
}

/// Write encoded frames from `outbound` to `writer`.
///
/// The loop ends when `outbound` closes, on write error, cancellation or
/// shutdown. The transport is closed on every exit path.
pub async fn write_loop<W, F>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    on_error: Option<F>,
) -> PumpStats
where
    W: FrameWriter,
    F: FnOnce(TransportError),
{
    let mut stats = PumpStats::default();
    let mut failure = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shutdown.cancelled() => break,
            data = outbound.recv() => {
                let Some(data) = data else { break };
                let len = data.len() as u64;
                let res = tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    res = writer.send(data) => res,
                };
                if let Err(e) = res {
                    failure = Some(e);
                    break;
                }
                stats.frames += 1;
                stats.bytes += len;
            }
        }
    }

    if let Err(e) = writer.close("").await {
        debug!(error = %e, "Closing transport failed");
    }

    if let Some(err) = failure {
        debug!(error = %err, "Writer stopped");
        if let Some(on_error) = on_error {
            on_error(err);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::pipe;
    use ripple_protocol::{Command, Jid};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Option<String>>>;

    fn recorder() -> (Seen, impl FnOnce(TransportError)) {
        let seen: Seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        (seen, move |e: TransportError| {
            *s.lock().unwrap() = Some(e.to_string());
        })
    }

    #[tokio::test]
    async fn test_reader_decodes_and_skips_malformed() {
        let (reader, _writer, mut peer) = pipe(8);
        let (tx, mut rx) = mpsc::channel(8);
        let (seen, on_error) = recorder();

        let task = tokio::spawn(read_loop(
            reader,
            tx,
            CancellationToken::new(),
            CancellationToken::new(),
            Some(on_error),
        ));

        peer.send_text("garbage").await.unwrap();
        peer.send_text("Input\t1\tbar\n").await.unwrap();
        peer.hang_up();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.command, Command::Input);
        assert_eq!(frame.jid, Jid(1));
        assert_eq!(frame.payload, "bar");

        // channel closes when the reader exits
        assert!(rx.recv().await.is_none());
        let stats = task.await.unwrap();
        assert_eq!(stats.frames, 1);
        // hanging up is not a transport error
        assert!(seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_stops_on_cancel() {
        let (reader, _writer, _peer) = pipe(8);
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let (seen, on_error) = recorder();

        let task = tokio::spawn(read_loop(
            reader,
            tx,
            cancel.clone(),
            CancellationToken::new(),
            Some(on_error),
        ));
        cancel.cancel();

        task.await.unwrap();
        assert!(rx.recv().await.is_none());
        // cancellation is not a transport error
        assert!(seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_handoff_is_cancellable() {
        let (reader, _writer, peer) = pipe(8);
        // nobody drains this channel
        let (tx, _rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(read_loop(
            reader,
            tx,
            CancellationToken::new(),
            shutdown.clone(),
            None::<fn(TransportError)>,
        ));

        peer.send_text("Click\t1\t\n").await.unwrap();
        peer.send_text("Click\t2\t\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        shutdown.cancel();

        let stats = task.await.unwrap();
        assert_eq!(stats.frames, 2);
    }

    #[tokio::test]
    async fn test_writer_flushes_then_closes() {
        let (_reader, writer, mut peer) = pipe(8);
        let (tx, rx) = mpsc::channel(8);

        tx.send(codec::encode(&Frame::ping()).unwrap()).await.unwrap();
        tx.send(codec::encode(&Frame::reload()).unwrap()).await.unwrap();
        drop(tx);

        let stats = write_loop(
            writer,
            rx,
            CancellationToken::new(),
            CancellationToken::new(),
            None::<fn(TransportError)>,
        )
        .await;

        assert_eq!(stats.frames, 2);
        assert_eq!(peer.recv().await.as_deref(), Some("Ping\t\t\n"));
        assert_eq!(peer.recv().await.as_deref(), Some("Reload\t\t\n"));
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_writer_closes_on_cancel() {
        let (_reader, writer, mut peer) = pipe(8);
        let (_tx, rx) = mpsc::channel::<Bytes>(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        write_loop(
            writer,
            rx,
            cancel,
            CancellationToken::new(),
            None::<fn(TransportError)>,
        )
        .await;

        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_writer_reports_send_failure() {
        let (_reader, writer, peer) = pipe(8);
        drop(peer);
        let (tx, rx) = mpsc::channel(8);
        tx.send(Bytes::from_static(b"Ping\t\t\n")).await.unwrap();
        let (seen, on_error) = recorder();

        write_loop(
            writer,
            rx,
            CancellationToken::new(),
            CancellationToken::new(),
            Some(on_error),
        )
        .await;

        assert!(seen.lock().unwrap().is_some());
    }
}
