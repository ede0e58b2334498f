//! The GUI-side application shell.
//!
//! Owns the GUI end of the channel and pumps it from a poll loop, standing
//! in for the toolkit's socket notifiers: read interest is always on, write
//! interest follows the channel's output buffer, and channel teardown ends
//! the loop.

use std::cell::{Cell, Ref, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use ripieno_channel::messages::{
    AdjustRequest, AttachCocoaRequest, AttachResponse, AttachWin32Request, AttachX11Request,
    DefineParameterRequest, DestroyResponse, HideResponse, ParameterValueRequest,
    SetScaleRequest, SetScaleResponse, ShowResponse, SizeResponse, SubscribeToTransportRequest,
    UpdateTransportRequest, ADJUST_GESTURE_BEGIN, ADJUST_GESTURE_END,
};
use ripieno_channel::{
    Endpoint, EventControl, FdFlags, Kind, Message, MessageHandler, RemoteChannel, Side,
};
use tracing::{debug, warn};

use crate::model::{GuiModel, NativeHandle};

/// Why the application loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Clean shutdown via a destroy request.
    Destroyed,
    /// The channel collapsed underneath us.
    ChannelLost,
}

/// Shared between the app, its notifier adapter and the message handler.
struct AppState {
    interest: Cell<FdFlags>,
    quit: Cell<Option<ExitReason>>,
}

impl AppState {
    fn request_quit(&self, reason: ExitReason) {
        if self.quit.get().is_none() {
            self.quit.set(Some(reason));
        }
    }
}

/// Stand-in for the toolkit's socket notifiers: interest changes just land
/// in a cell the poll loop reads back.
struct Notifiers {
    state: Rc<AppState>,
}

impl EventControl for Notifiers {
    fn modify_fd(&self, flags: FdFlags) {
        self.state.interest.set(flags);
    }

    fn remove_fd(&self) {
        self.state.interest.set(FdFlags::empty());
        self.state.request_quit(ExitReason::ChannelLost);
    }
}

pub struct GuiApp {
    channel: RemoteChannel,
    state: Rc<AppState>,
    model: Rc<RefCell<GuiModel>>,
}

impl GuiApp {
    pub fn new(endpoint: Endpoint, skin_dir: PathBuf, qml_import_paths: Vec<PathBuf>) -> Self {
        debug!(skin = %skin_dir.display(), "GUI starting");

        let state = Rc::new(AppState {
            interest: Cell::new(FdFlags::READ | FdFlags::ERROR),
            quit: Cell::new(None),
        });
        let model = Rc::new(RefCell::new(GuiModel::new(skin_dir, qml_import_paths)));

        let handler = Self::dispatch_handler(Rc::clone(&model), Rc::clone(&state));
        let channel = RemoteChannel::new(
            handler,
            Side::Gui,
            Box::new(Notifiers {
                state: Rc::clone(&state),
            }),
            endpoint,
        );

        Self {
            channel,
            state,
            model,
        }
    }

    fn dispatch_handler(model: Rc<RefCell<GuiModel>>, state: Rc<AppState>) -> MessageHandler {
        Rc::new(move |channel, msg| match Kind::from_raw(msg.kind) {
            Some(Kind::DestroyRequest) => {
                channel.send_response_async(&DestroyResponse, msg.cookie);
                state.request_quit(ExitReason::Destroyed);
            }

            Some(Kind::UpdateTransportRequest) => {
                if let Ok(rq) = decode_or_warn::<UpdateTransportRequest>(msg) {
                    model.borrow_mut().transport.update(rq.has_transport, rq.transport);
                }
            }

            Some(Kind::DefineParameterRequest) => {
                if let Ok(rq) = decode_or_warn::<DefineParameterRequest>(msg) {
                    model.borrow_mut().params.define(rq.info);
                }
            }

            Some(Kind::ParameterValueRequest) => {
                if let Ok(rq) = decode_or_warn::<ParameterValueRequest>(msg) {
                    let mut model = model.borrow_mut();
                    model.params.set_value_from_plugin(rq.param_id, rq.value);
                    model
                        .params
                        .set_modulation_from_plugin(rq.param_id, rq.modulation);
                }
            }

            Some(Kind::SizeRequest) => {
                let (width, height) = model.borrow().view.preferred_size();
                channel.send_response_async(&SizeResponse { width, height }, msg.cookie);
            }

            Some(Kind::SetScaleRequest) => {
                let succeed = decode_or_warn::<SetScaleRequest>(msg)
                    .map(|rq| model.borrow_mut().view.set_scale(rq.scale))
                    .unwrap_or(false);
                channel.send_response_async(&SetScaleResponse { succeed }, msg.cookie);
            }

            Some(Kind::AttachX11Request) => {
                let succeed = decode_or_warn::<AttachX11Request>(msg)
                    .map(|rq| {
                        model.borrow_mut().view.attach(NativeHandle::X11 {
                            display: rq.display,
                            window: rq.window,
                        })
                    })
                    .unwrap_or(false);
                channel.send_response_async(&AttachResponse { succeed }, msg.cookie);
            }

            Some(Kind::AttachWin32Request) => {
                let succeed = decode_or_warn::<AttachWin32Request>(msg)
                    .map(|rq| {
                        model
                            .borrow_mut()
                            .view
                            .attach(NativeHandle::Win32 { hwnd: rq.hwnd })
                    })
                    .unwrap_or(false);
                channel.send_response_async(&AttachResponse { succeed }, msg.cookie);
            }

            Some(Kind::AttachCocoaRequest) => {
                let succeed = decode_or_warn::<AttachCocoaRequest>(msg)
                    .map(|rq| {
                        model
                            .borrow_mut()
                            .view
                            .attach(NativeHandle::Cocoa { ns_view: rq.ns_view })
                    })
                    .unwrap_or(false);
                channel.send_response_async(&AttachResponse { succeed }, msg.cookie);
            }

            Some(Kind::ShowRequest) => {
                model.borrow_mut().view.show();
                channel.send_response_async(&ShowResponse, msg.cookie);
            }

            Some(Kind::HideRequest) => {
                model.borrow_mut().view.hide();
                channel.send_response_async(&HideResponse, msg.cookie);
            }

            _ => warn!(kind = msg.kind, "unexpected message on GUI side"),
        })
    }

    /// One poll round. Returns false once the loop should end.
    pub fn pump(&self, timeout_ms: Option<u16>) -> bool {
        if self.state.quit.get().is_some() {
            return false;
        }

        let interest = self.state.interest.get();
        let want_write = interest.contains(FdFlags::WRITE);
        let readiness = match self.channel.wait_readiness(want_write, timeout_ms) {
            Ok(readiness) => readiness,
            Err(e) => {
                warn!(error = %e, "poll on channel endpoint failed");
                self.channel.on_error();
                return false;
            }
        };

        if readiness.error {
            self.channel.on_error();
        } else {
            if readiness.writable && want_write {
                self.channel.try_send();
            }
            if readiness.readable || readiness.hangup {
                self.channel.try_receive();
            }
        }

        self.state.quit.get().is_none()
    }

    /// Run until destroyed or the channel dies, then flush any final
    /// response still queued (typically the destroy acknowledgement).
    pub fn run(&self) -> ExitReason {
        while self.pump(None) {}
        self.channel.try_send();

        let reason = self.state.quit.get().unwrap_or(ExitReason::ChannelLost);
        debug!(?reason, "GUI loop finished");
        reason
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.state.quit.get()
    }

    pub fn model(&self) -> Ref<'_, GuiModel> {
        self.model.borrow()
    }

    // -----------------------------------------------------------------------
    // User gestures, forwarded by the skin layer
    // -----------------------------------------------------------------------

    pub fn begin_adjust(&self, param_id: u32, value: f64) {
        self.send_adjust(param_id, value, ADJUST_GESTURE_BEGIN);
    }

    pub fn adjust(&self, param_id: u32, value: f64) {
        self.send_adjust(param_id, value, 0);
    }

    pub fn end_adjust(&self, param_id: u32, value: f64) {
        self.send_adjust(param_id, value, ADJUST_GESTURE_END);
    }

    fn send_adjust(&self, param_id: u32, value: f64, flags: u32) {
        self.model
            .borrow_mut()
            .params
            .set_value_from_user(param_id, value);
        self.channel.send_request_async(&AdjustRequest {
            param_id,
            value,
            flags,
        });
    }

    /// Ask the plugin to start or stop streaming transport updates.
    pub fn set_transport_subscribed(&self, subscribed: bool) {
        self.model.borrow_mut().transport.subscribed = subscribed;
        self.channel
            .send_request_async(&SubscribeToTransportRequest {
                is_subscribed: subscribed,
            });
    }
}

fn decode_or_warn<P: ripieno_channel::Payload>(msg: &Message) -> Result<P, ()> {
    msg.decode().map_err(|e| {
        warn!(kind = msg.kind, error = %e, "malformed payload");
    })
}
