//! GUI capability trait, abstracting over remote and in-process interfaces.

use ripieno_channel::messages::{ParamInfo, TransportEvent};

/// What a plugin can ask of its GUI.
///
/// The shipped implementation is [`RemoteGui`](crate::RemoteGui), which
/// forwards every call over the IPC channel to the spawned GUI process. An
/// in-process GUI could expose the same surface without any channel behind
/// it, which keeps the plugin core indifferent to where its interface lives.
///
/// Parameter and transport pushes are fire-and-forget; the window-lifecycle
/// calls report what the GUI answered. None of these are audio-thread safe;
/// they run on the host's main thread.
pub trait Gui {
    /// Register a parameter in the GUI's model.
    fn define_parameter(&self, info: &ParamInfo);

    /// Push the current value and modulation amount of a parameter.
    fn update_parameter(&self, param_id: u32, value: f64, modulation: f64);

    /// Push new musical-timeline state.
    fn update_transport(&self, transport: &TransportEvent);

    /// Tell the GUI the host currently provides no timeline.
    fn clear_transport(&self);

    /// Query the preferred window size.
    fn size(&self) -> Option<(u32, u32)>;

    /// Request DPI scaling. Returns whether the GUI applied it.
    fn set_scale(&self, scale: f64) -> bool;

    /// Embed the GUI window into a host X11 window.
    fn attach_x11(&self, display_name: &str, window: u64) -> bool;

    /// Embed the GUI window into a host Win32 window.
    fn attach_win32(&self, hwnd: u64) -> bool;

    /// Embed the GUI window into a host NSView.
    fn attach_cocoa(&self, ns_view: u64) -> bool;

    /// Make the window visible.
    fn show(&self) -> bool;

    /// Hide the window.
    fn hide(&self) -> bool;

    /// Shut the GUI down and release every resource it held.
    fn destroy(&mut self);
}

/// Callbacks the plugin core receives from its GUI.
pub trait GuiListener {
    /// The user moved a control; `flags` carries the gesture begin/end bits
    /// from the message catalogue.
    fn adjust(&self, param_id: u32, value: f64, flags: u32);
}
