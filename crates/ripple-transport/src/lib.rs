//! # ripple-transport
//!
//! Transport boundary for the Ripple live-session engine.
//!
//! This crate provides a uniform interface over duplex text transports and
//! the two pumps that move frames across it:
//!
//! - **WebSocket** - An upgraded axum socket
//! - **Memory** - An in-process pipe for tests and benchmarks
//!
//! ## Transport Abstraction
//!
//! A transport is split into a [`FrameReader`] and a [`FrameWriter`]. The
//! [`pump::read_loop`] decodes incoming text into frames; the
//! [`pump::write_loop`] writes pre-encoded frames and always closes the
//! transport on exit.
//!
//! ```rust,ignore
//! use ripple_transport::{memory, pump};
//!
//! let (reader, writer, peer) = memory::pipe(16);
//! tokio::spawn(pump::read_loop(reader, incoming_tx, cancel, shutdown, None::<fn(_)>));
//! ```

pub mod memory;
pub mod pump;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use pump::PumpStats;
pub use traits::{FrameReader, FrameWriter, TransportError};
