//! Out-of-process GUI behind the IPC channel.

use std::cell::Cell;
use std::rc::Rc;

use ripieno_channel::messages::{
    AdjustRequest, AttachCocoaRequest, AttachWin32Request, AttachX11Request,
    DefineParameterRequest, DestroyRequest, HideRequest, ParamInfo, ParameterValueRequest,
    SetScaleRequest, ShowRequest, SizeRequest, SubscribeToTransportRequest, TransportEvent,
    UpdateTransportRequest,
};
use ripieno_channel::{
    EventControl, FdFlags, Kind, MessageHandler, RemoteChannel, Side,
};
use tracing::{error, warn};

use crate::error::{Result, SpawnError};
use crate::gui::{Gui, GuiListener};
use crate::host::{HostServices, TimerId};
use crate::spawn::{GuiLink, SpawnOptions};

/// Adapter the channel calls back into: interest changes go to the host's
/// descriptor registration, teardown releases the descriptor and the timer.
struct HostFdControl {
    host: Rc<dyn HostServices>,
    #[cfg(unix)]
    fd: std::os::unix::io::RawFd,
    timer_id: Rc<Cell<Option<TimerId>>>,
}

impl EventControl for HostFdControl {
    fn modify_fd(&self, flags: FdFlags) {
        #[cfg(unix)]
        self.host.modify_fd(self.fd, flags);
        #[cfg(not(unix))]
        let _ = flags;
    }

    fn remove_fd(&self) {
        #[cfg(unix)]
        self.host.unregister_fd(self.fd);
        if let Some(timer_id) = self.timer_id.take() {
            self.host.unregister_timer(timer_id);
        }
    }
}

/// Plugin-side GUI controller.
///
/// Spawns the GUI executable, wires its transport endpoint into the host's
/// event loop and timer service, speaks the [`Gui`] surface over the channel,
/// and reaps the child on destroy. One instance per plugin; all calls on the
/// host's main thread.
pub struct RemoteGui {
    host: Rc<dyn HostServices>,
    listener: Rc<dyn GuiListener>,
    channel: Option<RemoteChannel>,
    link: Option<GuiLink>,
    timer_id: Rc<Cell<Option<TimerId>>>,
    transport_subscribed: Rc<Cell<bool>>,
}

impl RemoteGui {
    pub fn new(host: Rc<dyn HostServices>, listener: Rc<dyn GuiListener>) -> Self {
        Self {
            host,
            listener,
            channel: None,
            link: None,
            timer_id: Rc::new(Cell::new(None)),
            transport_subscribed: Rc::new(Cell::new(false)),
        }
    }

    /// Bring up the GUI process. Returns false when any step fails; partial
    /// bring-up is unwound in reverse order, leaving no child, descriptor or
    /// timer behind.
    pub fn spawn(&mut self, options: &SpawnOptions) -> bool {
        match self.spawn_inner(options) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "GUI spawn failed");
                false
            }
        }
    }

    fn spawn_inner(&mut self, options: &SpawnOptions) -> Result<()> {
        if self.channel.is_some() {
            return Err(SpawnError::AlreadyRunning);
        }
        if !self.host.can_use_timer() {
            return Err(SpawnError::MissingHostSupport("timer"));
        }
        if !self.host.can_use_fd() {
            return Err(SpawnError::MissingHostSupport("descriptor readiness"));
        }

        let (mut link, endpoint) = GuiLink::bring_up(options)?;

        #[cfg(unix)]
        let fd = endpoint.raw_fd();

        #[cfg(unix)]
        if !self.host.register_fd(fd, FdFlags::READ | FdFlags::ERROR) {
            link.shutdown_forced();
            return Err(SpawnError::FdRegistration);
        }

        let timer_id = match self.host.register_timer(options.timer_period_ms) {
            Some(timer_id) => timer_id,
            None => {
                #[cfg(unix)]
                self.host.unregister_fd(fd);
                link.shutdown_forced();
                return Err(SpawnError::TimerRegistration);
            }
        };
        self.timer_id.set(Some(timer_id));

        let control = HostFdControl {
            host: Rc::clone(&self.host),
            #[cfg(unix)]
            fd,
            timer_id: Rc::clone(&self.timer_id),
        };
        let handler = Self::dispatch_handler(
            Rc::clone(&self.listener),
            Rc::clone(&self.transport_subscribed),
        );
        self.channel = Some(RemoteChannel::new(
            handler,
            Side::Plugin,
            Box::new(control),
            endpoint,
        ));
        self.link = Some(link);
        Ok(())
    }

    /// Unsolicited traffic from the GUI: user gestures and the transport
    /// subscription switch.
    fn dispatch_handler(
        listener: Rc<dyn GuiListener>,
        transport_subscribed: Rc<Cell<bool>>,
    ) -> MessageHandler {
        Rc::new(move |_channel, msg| match Kind::from_raw(msg.kind) {
            Some(Kind::AdjustRequest) => match msg.decode::<AdjustRequest>() {
                Ok(rq) => listener.adjust(rq.param_id, rq.value, rq.flags),
                Err(e) => warn!(error = %e, "malformed adjust request"),
            },
            Some(Kind::SubscribeToTransportRequest) => {
                match msg.decode::<SubscribeToTransportRequest>() {
                    Ok(rq) => transport_subscribed.set(rq.is_subscribed),
                    Err(e) => warn!(error = %e, "malformed transport subscription"),
                }
            }
            _ => warn!(kind = msg.kind, "unexpected message on plugin side"),
        })
    }

    /// Readiness callback the host delivers for our descriptor.
    pub fn on_fd(&self, flags: FdFlags) {
        let Some(channel) = &self.channel else {
            return;
        };
        if flags.contains(FdFlags::READ) {
            channel.try_receive();
        }
        if flags.contains(FdFlags::WRITE) {
            channel.try_send();
        }
        if flags.contains(FdFlags::ERROR) {
            channel.on_error();
        }
    }

    /// Periodic tick from the host's timer: flush anything still queued.
    /// Named pipes have no readiness service, so the tick also polls inbound
    /// there.
    pub fn on_timer(&self) {
        if let Some(channel) = &self.channel {
            channel.try_send();
            #[cfg(windows)]
            channel.try_receive();
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel.as_ref().is_some_and(RemoteChannel::is_open)
    }

    #[cfg(unix)]
    pub fn fd(&self) -> Option<std::os::unix::io::RawFd> {
        self.channel.as_ref().map(RemoteChannel::fd)
    }

    pub fn timer_id(&self) -> Option<TimerId> {
        self.timer_id.get()
    }

    /// Whether the GUI asked for transport updates.
    pub fn is_transport_subscribed(&self) -> bool {
        self.transport_subscribed.get()
    }
}

impl Gui for RemoteGui {
    fn define_parameter(&self, info: &ParamInfo) {
        if let Some(channel) = &self.channel {
            channel.send_request_async(&DefineParameterRequest { info: info.clone() });
        }
    }

    fn update_parameter(&self, param_id: u32, value: f64, modulation: f64) {
        if let Some(channel) = &self.channel {
            channel.send_request_async(&ParameterValueRequest {
                param_id,
                value,
                modulation,
            });
        }
    }

    fn update_transport(&self, transport: &TransportEvent) {
        if let Some(channel) = &self.channel {
            channel.send_request_async(&UpdateTransportRequest {
                has_transport: true,
                transport: *transport,
            });
        }
    }

    fn clear_transport(&self) {
        if let Some(channel) = &self.channel {
            channel.send_request_async(&UpdateTransportRequest {
                has_transport: false,
                transport: TransportEvent::default(),
            });
        }
    }

    fn size(&self) -> Option<(u32, u32)> {
        let channel = self.channel.as_ref()?;
        let response = channel.send_request_sync(&SizeRequest)?;
        Some((response.width, response.height))
    }

    fn set_scale(&self, scale: f64) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        channel
            .send_request_sync(&SetScaleRequest { scale })
            .is_some_and(|response| response.succeed)
    }

    fn attach_x11(&self, display_name: &str, window: u64) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        channel
            .send_request_sync(&AttachX11Request {
                display: display_name.to_string(),
                window,
            })
            .is_some_and(|response| response.succeed)
    }

    fn attach_win32(&self, hwnd: u64) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        channel
            .send_request_sync(&AttachWin32Request { hwnd })
            .is_some_and(|response| response.succeed)
    }

    fn attach_cocoa(&self, ns_view: u64) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        channel
            .send_request_sync(&AttachCocoaRequest { ns_view })
            .is_some_and(|response| response.succeed)
    }

    fn show(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| channel.send_request_async(&ShowRequest))
    }

    fn hide(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| channel.send_request_async(&HideRequest))
    }

    /// Ask the GUI to shut down, close the channel and reap the child.
    ///
    /// The destroy request is fire-and-forget: the close right after it
    /// cancels any pending waiter, and the child wait below provides the
    /// actual completion. Blocks; never call from the audio thread.
    fn destroy(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        channel.send_request_async(&DestroyRequest);
        channel.close();
        drop(channel);

        self.transport_subscribed.set(false);
        if let Some(mut link) = self.link.take() {
            link.wait();
        }
    }
}

impl Drop for RemoteGui {
    fn drop(&mut self) {
        if self.channel.is_some() {
            self.destroy();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::os::unix::io::RawFd;
    use std::os::unix::net::UnixStream;

    use ripieno_channel::Endpoint;

    #[derive(Default)]
    struct NullListener;

    impl GuiListener for NullListener {
        fn adjust(&self, _param_id: u32, _value: f64, _flags: u32) {}
    }

    struct RecordingListener {
        adjustments: RefCell<Vec<(u32, f64, u32)>>,
    }

    impl GuiListener for RecordingListener {
        fn adjust(&self, param_id: u32, value: f64, flags: u32) {
            self.adjustments.borrow_mut().push((param_id, value, flags));
        }
    }

    /// Host that records every registration call.
    struct RecordingHost {
        timer_support: bool,
        fd_support: bool,
        accept_fd: bool,
        accept_timer: bool,
        log: RefCell<Vec<String>>,
    }

    impl RecordingHost {
        fn permissive() -> Self {
            Self {
                timer_support: true,
                fd_support: true,
                accept_fd: true,
                accept_timer: true,
                log: RefCell::new(Vec::new()),
            }
        }
    }

    impl HostServices for RecordingHost {
        fn can_use_timer(&self) -> bool {
            self.timer_support
        }

        fn can_use_fd(&self) -> bool {
            self.fd_support
        }

        fn register_timer(&self, period_ms: u32) -> Option<TimerId> {
            if !self.accept_timer {
                return None;
            }
            self.log.borrow_mut().push(format!("timer+{period_ms}"));
            Some(42)
        }

        fn unregister_timer(&self, timer_id: TimerId) {
            self.log.borrow_mut().push(format!("timer-{timer_id}"));
        }

        fn register_fd(&self, _fd: RawFd, _flags: FdFlags) -> bool {
            if !self.accept_fd {
                return false;
            }
            self.log.borrow_mut().push("fd+".to_string());
            true
        }

        fn modify_fd(&self, _fd: RawFd, flags: FdFlags) {
            self.log.borrow_mut().push(format!("fdmod:{flags:?}"));
        }

        fn unregister_fd(&self, _fd: RawFd) {
            self.log.borrow_mut().push("fd-".to_string());
        }
    }

    fn stub_options() -> SpawnOptions {
        SpawnOptions::new("/bin/true", "/tmp/skin")
    }

    #[test]
    fn test_spawn_requires_timer_support() {
        let host = Rc::new(RecordingHost {
            timer_support: false,
            ..RecordingHost::permissive()
        });
        let mut gui = RemoteGui::new(host.clone(), Rc::new(NullListener));

        assert!(!gui.spawn(&stub_options()));
        assert!(!gui.is_open());
        assert!(host.log.borrow().is_empty());
    }

    #[test]
    fn test_spawn_requires_fd_support() {
        let host = Rc::new(RecordingHost {
            fd_support: false,
            ..RecordingHost::permissive()
        });
        let mut gui = RemoteGui::new(host.clone(), Rc::new(NullListener));

        assert!(!gui.spawn(&stub_options()));
        assert!(host.log.borrow().is_empty());
    }

    #[test]
    fn test_spawn_unwinds_when_fd_registration_refused() {
        let host = Rc::new(RecordingHost {
            accept_fd: false,
            ..RecordingHost::permissive()
        });
        let mut gui = RemoteGui::new(host.clone(), Rc::new(NullListener));

        assert!(!gui.spawn(&stub_options()));
        assert!(!gui.is_open());
        assert!(gui.timer_id().is_none());
        assert!(host.log.borrow().is_empty());
    }

    #[test]
    fn test_spawn_unwinds_when_timer_refused() {
        let host = Rc::new(RecordingHost {
            accept_timer: false,
            ..RecordingHost::permissive()
        });
        let mut gui = RemoteGui::new(host.clone(), Rc::new(NullListener));

        assert!(!gui.spawn(&stub_options()));
        assert!(gui.timer_id().is_none());
        // The descriptor registration from the earlier step was rolled back.
        assert_eq!(*host.log.borrow(), vec!["fd+", "fd-"]);
    }

    #[test]
    fn test_spawn_then_destroy_releases_everything() {
        let host = Rc::new(RecordingHost::permissive());
        let mut gui = RemoteGui::new(host.clone(), Rc::new(NullListener));

        assert!(gui.spawn(&stub_options()));
        assert!(gui.is_open());
        assert_eq!(gui.timer_id(), Some(42));
        assert!(gui.fd().is_some());

        gui.destroy();
        assert!(!gui.is_open());
        assert!(gui.timer_id().is_none());
        assert!(gui.fd().is_none());

        let log = host.log.borrow();
        assert!(log.contains(&"fd+".to_string()));
        assert!(log.contains(&"fd-".to_string()));
        assert!(log.contains(&"timer-42".to_string()));
    }

    #[test]
    fn test_double_spawn_is_refused() {
        let host = Rc::new(RecordingHost::permissive());
        let mut gui = RemoteGui::new(host, Rc::new(NullListener));

        assert!(gui.spawn(&stub_options()));
        assert!(!gui.spawn(&stub_options()));
        gui.destroy();
    }

    #[test]
    fn test_destroy_without_spawn_is_a_noop() {
        let host = Rc::new(RecordingHost::permissive());
        let mut gui = RemoteGui::new(host.clone(), Rc::new(NullListener));

        gui.destroy();
        assert!(host.log.borrow().is_empty());
    }

    #[test]
    fn test_dispatch_routes_adjust_and_subscription() {
        // Exercise the handler through a real channel pair without any child
        // process: the far end plays the GUI.
        struct NoControl;
        impl EventControl for NoControl {
            fn modify_fd(&self, _flags: FdFlags) {}
            fn remove_fd(&self) {}
        }

        let listener = Rc::new(RecordingListener {
            adjustments: RefCell::new(Vec::new()),
        });
        let subscribed = Rc::new(Cell::new(false));
        let handler =
            RemoteGui::dispatch_handler(listener.clone(), Rc::clone(&subscribed));

        let (sa, sb) = UnixStream::pair().unwrap();
        let plugin = RemoteChannel::new(
            handler,
            Side::Plugin,
            Box::new(NoControl),
            Endpoint::from_stream(sa).unwrap(),
        );
        let gui = RemoteChannel::new(
            Rc::new(|_, _| {}),
            Side::Gui,
            Box::new(NoControl),
            Endpoint::from_stream(sb).unwrap(),
        );

        assert!(gui.send_request_async(&AdjustRequest {
            param_id: 3,
            value: -6.0,
            flags: ripieno_channel::messages::ADJUST_GESTURE_BEGIN,
        }));
        assert!(gui.send_request_async(&SubscribeToTransportRequest { is_subscribed: true }));
        gui.try_send();
        plugin.try_receive();

        assert_eq!(
            *listener.adjustments.borrow(),
            vec![(3, -6.0, ripieno_channel::messages::ADJUST_GESTURE_BEGIN)]
        );
        assert!(subscribed.get());
    }
}
