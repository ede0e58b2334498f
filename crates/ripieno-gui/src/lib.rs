//! GUI side of the plugin↔GUI bridge.
//!
//! The binary in this crate is the child process the plugin spawns. The
//! library half holds its moving parts: [`app::GuiApp`], the poll-driven
//! owner of the GUI end of the channel, and the [`model`] types a skin layer
//! binds to. Rendering deliberately lives elsewhere; everything here works
//! headless, which is also how the tests run it.

pub mod app;
pub mod model;
