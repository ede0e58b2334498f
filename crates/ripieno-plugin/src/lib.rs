//! Plugin-side controller for the out-of-process GUI.
//!
//! The plugin core talks to its interface through the [`Gui`] trait; this
//! crate's [`RemoteGui`] implements it by spawning the GUI executable,
//! handing it one end of a duplex transport, and speaking the message
//! catalogue over a [`ripieno_channel::RemoteChannel`]. The embedding host
//! supplies timers and descriptor readiness through [`HostServices`] and
//! drives [`RemoteGui::on_fd`]/[`RemoteGui::on_timer`].
//!
//! ```ignore
//! let mut gui = RemoteGui::new(host, listener);
//! if gui.spawn(&SpawnOptions::new(gui_exe, skin_dir)) {
//!     if let Some((width, height)) = gui.size() {
//!         // resize the host window, then:
//!         gui.attach_x11(display_name, window_id);
//!         gui.show();
//!     }
//! }
//! ```

pub mod error;
pub use error::{Result, SpawnError};

mod gui;
pub use gui::{Gui, GuiListener};

mod host;
pub use host::{HostServices, TimerId};

mod spawn;
pub use spawn::{GuiLink, SpawnOptions, DEFAULT_TIMER_PERIOD_MS};

mod remote;
pub use remote::RemoteGui;
