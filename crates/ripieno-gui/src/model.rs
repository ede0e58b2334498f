//! View models the skin layer binds to.
//!
//! The data half of the GUI: parameter state pushed by the plugin, the
//! transport mirror, and the native-window bookkeeping. Rendering sits on
//! top of these and is free to be swapped out; nothing here knows how
//! anything is painted.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ripieno_channel::messages::{ParamInfo, TransportEvent};
use tracing::warn;

/// Preferred size reported while the skin has no root item to measure.
pub const FALLBACK_WIDTH: u32 = 500;
pub const FALLBACK_HEIGHT: u32 = 300;

/// One parameter as the GUI sees it.
#[derive(Debug, Clone)]
pub struct ParamState {
    pub info: ParamInfo,
    pub value: f64,
    pub modulation: f64,
}

/// All parameters the plugin has defined, keyed by id.
#[derive(Debug, Default)]
pub struct ParamModel {
    params: BTreeMap<u32, ParamState>,
}

impl ParamModel {
    /// Register or re-register a parameter. A redefinition keeps the current
    /// value; a new parameter starts at its default.
    pub fn define(&mut self, info: ParamInfo) {
        match self.params.get_mut(&info.id) {
            Some(state) => state.info = info,
            None => {
                let value = info.default_value;
                self.params.insert(
                    info.id,
                    ParamState {
                        info,
                        value,
                        modulation: 0.0,
                    },
                );
            }
        }
    }

    pub fn set_value_from_plugin(&mut self, param_id: u32, value: f64) -> bool {
        match self.params.get_mut(&param_id) {
            Some(state) => {
                state.value = value;
                true
            }
            None => {
                warn!(param_id, "value for unknown parameter");
                false
            }
        }
    }

    pub fn set_modulation_from_plugin(&mut self, param_id: u32, modulation: f64) -> bool {
        match self.params.get_mut(&param_id) {
            Some(state) => {
                state.modulation = modulation;
                true
            }
            None => false,
        }
    }

    /// Local echo of a user gesture, ahead of the plugin confirming it.
    pub fn set_value_from_user(&mut self, param_id: u32, value: f64) {
        if let Some(state) = self.params.get_mut(&param_id) {
            state.value = value;
        }
    }

    pub fn param(&self, param_id: u32) -> Option<&ParamState> {
        self.params.get(&param_id)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Mirror of the host's musical timeline.
#[derive(Debug, Default)]
pub struct TransportModel {
    has_transport: bool,
    last: TransportEvent,
    pub subscribed: bool,
}

impl TransportModel {
    pub fn update(&mut self, has_transport: bool, transport: TransportEvent) {
        self.has_transport = has_transport;
        if has_transport {
            self.last = transport;
        }
    }

    pub fn current(&self) -> Option<&TransportEvent> {
        self.has_transport.then_some(&self.last)
    }
}

/// Native window handle supplied by the host for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeHandle {
    X11 { display: String, window: u64 },
    Win32 { hwnd: u64 },
    Cocoa { ns_view: u64 },
}

/// Top-level window state.
#[derive(Debug)]
pub struct ViewState {
    host_window: Option<NativeHandle>,
    visible: bool,
    scale: f64,
    preferred_size: Option<(u32, u32)>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            host_window: None,
            visible: false,
            scale: 1.0,
            preferred_size: None,
        }
    }
}

impl ViewState {
    pub fn preferred_size(&self) -> (u32, u32) {
        self.preferred_size
            .unwrap_or((FALLBACK_WIDTH, FALLBACK_HEIGHT))
    }

    pub fn set_preferred_size(&mut self, width: u32, height: u32) {
        self.preferred_size = Some((width, height));
    }

    /// Reparent under the host's native window. Succeeds only for the handle
    /// family of the platform we are actually running on.
    pub fn attach(&mut self, handle: NativeHandle) -> bool {
        let supported = match &handle {
            NativeHandle::X11 { .. } => cfg!(target_os = "linux"),
            NativeHandle::Win32 { .. } => cfg!(windows),
            NativeHandle::Cocoa { .. } => cfg!(target_os = "macos"),
        };
        if !supported {
            warn!(?handle, "attach for a foreign window system refused");
            return false;
        }
        self.host_window = Some(handle);
        self.visible = true;
        true
    }

    pub fn host_window(&self) -> Option<&NativeHandle> {
        self.host_window.as_ref()
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_scale(&mut self, scale: f64) -> bool {
        if !(scale.is_finite() && scale > 0.0) {
            return false;
        }
        self.scale = scale;
        true
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

/// Everything the GUI process knows, bundled for the dispatch handler.
#[derive(Debug)]
pub struct GuiModel {
    pub params: ParamModel,
    pub transport: TransportModel,
    pub view: ViewState,
    skin_dir: PathBuf,
    qml_import_paths: Vec<PathBuf>,
}

impl GuiModel {
    pub fn new(skin_dir: PathBuf, qml_import_paths: Vec<PathBuf>) -> Self {
        Self {
            params: ParamModel::default(),
            transport: TransportModel::default(),
            view: ViewState::default(),
            skin_dir,
            qml_import_paths,
        }
    }

    pub fn skin_dir(&self) -> &PathBuf {
        &self.skin_dir
    }

    pub fn qml_import_paths(&self) -> &[PathBuf] {
        &self.qml_import_paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u32, name: &str) -> ParamInfo {
        ParamInfo {
            default_value: 0.25,
            ..ParamInfo::new(id, name)
        }
    }

    #[test]
    fn test_define_starts_at_default() {
        let mut model = ParamModel::default();
        model.define(info(1, "gain"));

        let state = model.param(1).unwrap();
        assert_eq!(state.info.name, "gain");
        assert_eq!(state.value, 0.25);
        assert_eq!(state.modulation, 0.0);
    }

    #[test]
    fn test_redefine_keeps_value() {
        let mut model = ParamModel::default();
        model.define(info(1, "gain"));
        assert!(model.set_value_from_plugin(1, 0.9));

        model.define(info(1, "output gain"));
        let state = model.param(1).unwrap();
        assert_eq!(state.info.name, "output gain");
        assert_eq!(state.value, 0.9);
    }

    #[test]
    fn test_value_for_unknown_parameter_is_rejected() {
        let mut model = ParamModel::default();
        assert!(!model.set_value_from_plugin(5, 0.5));
        assert!(!model.set_modulation_from_plugin(5, 0.5));
        assert!(model.is_empty());
    }

    #[test]
    fn test_transport_update_and_clear() {
        let mut transport = TransportModel::default();
        assert!(transport.current().is_none());

        let event = TransportEvent {
            playing: true,
            tempo: 141.0,
            ..TransportEvent::default()
        };
        transport.update(true, event);
        assert_eq!(transport.current().unwrap().tempo, 141.0);

        transport.update(false, TransportEvent::default());
        assert!(transport.current().is_none());
    }

    #[test]
    fn test_preferred_size_fallback() {
        let mut view = ViewState::default();
        assert_eq!(view.preferred_size(), (FALLBACK_WIDTH, FALLBACK_HEIGHT));

        view.set_preferred_size(900, 600);
        assert_eq!(view.preferred_size(), (900, 600));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_attach_matches_platform() {
        let mut view = ViewState::default();
        assert!(view.attach(NativeHandle::X11 {
            display: ":0".into(),
            window: 0x1234,
        }));
        assert!(view.is_visible());
        assert!(view.host_window().is_some());

        let mut other = ViewState::default();
        assert!(!other.attach(NativeHandle::Cocoa { ns_view: 1 }));
        assert!(other.host_window().is_none());
    }

    #[test]
    fn test_scale_rejects_nonsense() {
        let mut view = ViewState::default();
        assert!(view.set_scale(1.5));
        assert_eq!(view.scale(), 1.5);
        assert!(!view.set_scale(0.0));
        assert!(!view.set_scale(f64::NAN));
        assert_eq!(view.scale(), 1.5);
    }
}
