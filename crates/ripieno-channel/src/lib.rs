//! Bidirectional request/response channel between an audio plugin and its
//! out-of-process GUI.
//!
//! The two peers (the plugin side, embedded in the host, and the GUI side,
//! a child process the plugin spawns) talk over one duplex byte stream: a
//! socketpair end on Unix, a named-pipe pair on Windows. This crate provides
//! everything above that stream and below the peers' application logic:
//!
//! - length-prefixed typed frames tolerating short reads and writes
//! - cookie-routed request/response matching with synchronous and
//!   asynchronous call styles
//! - the [`EventControl`] seam through which the channel asks its owner for
//!   readiness notifications
//! - the message catalogue both peers speak
//!
//! Channels are single-threaded and lock-free: the owning event loop drives
//! [`RemoteChannel::try_receive`]/[`RemoteChannel::try_send`] on readiness,
//! and the only suspending call, [`RemoteChannel::send_request_sync`], pumps
//! that same readiness cooperatively. Audio threads never touch a channel.

pub mod error;
pub use error::{ChannelError, Result};

mod frame;
pub use frame::{HEADER_LEN, MAGIC, MAX_FRAME_SIZE};

pub mod messages;
pub use messages::{Kind, Message, Payload, Request};

mod event;
pub use event::{EventControl, FdFlags};

mod endpoint;
pub use endpoint::{Endpoint, Readiness};

mod channel;
pub use channel::{MessageHandler, RemoteChannel, Reply, Side};
