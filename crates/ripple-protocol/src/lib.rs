//! # ripple-protocol
//!
//! Wire protocol definitions for the Ripple live-session engine.
//!
//! This crate defines the line-oriented text protocol spoken between a
//! server-rendered page and its Ripple session: commands, element ids
//! (jids) and the frame codec.
//!
//! ## Commands
//!
//! - `Input` / `Click` / `Trigger` - Browser events
//! - `Value` / `Inner` / `SetAttr` / `RemoveAttr` - Element updates
//! - `Alert` / `Redirect` / `Reload` / `Ping` - Session-scoped
//!
//! ## Example
//!
//! ```rust
//! use ripple_protocol::{codec, Frame, Jid};
//!
//! let frame = Frame::value(Jid(1), "hello");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! assert_eq!(&encoded[..], b"Value\t1\t\"hello\"\n");
//! assert_eq!(codec::decode(&encoded), Some(frame));
//! ```

pub mod codec;
pub mod command;
pub mod frames;
pub mod jid;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use command::Command;
pub use frames::Frame;
pub use jid::Jid;
pub use version::{Version, PROTOCOL_VERSION};
