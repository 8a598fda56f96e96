//! # ripple-core
//!
//! Live-session engine for Ripple.
//!
//! A page is rendered through a [`Session`], which registers every widget it
//! renders as an element with a jid and a set of tags. When the page's
//! script connects, [`Session::serve`] runs four tasks for it:
//!
//! - **Reader** - decodes browser frames
//! - **Event loop** - routes messages to elements, queues handler calls
//! - **Dispatcher** - runs handlers serially
//! - **Writer** - writes encoded frames
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Reader    │────▶│ Event loop  │────▶│   Writer    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        ▲       │              ▲
//!                        │       ▼              │
//!                 ┌──────────┐ ┌────────────┐   │
//!                 │   Hub    │ │ Dispatcher │───┘
//!                 └──────────┘ └────────────┘
//! ```
//!
//! Application code changes shared state and marks its tag dirty; every
//! session re-renders the elements registered under that tag.

mod dispatcher;
pub mod engine;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod html;
pub mod hub;
pub mod message;
pub mod registry;
pub mod session;
pub mod tag;
pub mod widget;

pub use engine::{Engine, EngineConfig};
pub use error::{HandlerError, SessionError};
pub use event::{handler, ConnectFn, Event, EventFn};
pub use event_loop::{ExitReason, Queue};
pub use hub::{Hub, HubError, Subscription};
pub use message::{Dest, Kind, Message};
pub use registry::{Element, Registry, RegistryPool};
pub use session::{CloseReason, Session, SessionKey, SessionReport};
pub use tag::{Tag, TagError};
pub use widget::{Binding, Fixed, NamedBool, NamedBoolArray, RadioButton, Shared, Ui, Widget};
