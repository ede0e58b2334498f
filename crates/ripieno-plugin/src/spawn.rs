//! Platform-specific GUI process bring-up.
//!
//! The two OS families differ in how a child inherits its transport: Unix
//! passes one end of a connected socketpair as a numeric descriptor, Windows
//! passes the names of two freshly created unidirectional pipes on the
//! command line. Both hide behind [`GuiLink`] so the controller above never
//! branches on platform.

use std::path::PathBuf;
use std::process::ExitStatus;

use ripieno_channel::Endpoint;
use tracing::{debug, warn};

use crate::error::{Result, SpawnError};

/// Default repaint/heartbeat cadence.
pub const DEFAULT_TIMER_PERIOD_MS: u32 = 1000 / 60;

/// Everything needed to launch the GUI executable.
///
/// Path discovery is the embedder's problem; this struct only carries the
/// answers.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub executable: PathBuf,
    pub skin_dir: PathBuf,
    pub qml_import_paths: Vec<PathBuf>,
    pub timer_period_ms: u32,
}

impl SpawnOptions {
    pub fn new(executable: impl Into<PathBuf>, skin_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            skin_dir: skin_dir.into(),
            qml_import_paths: Vec::new(),
            timer_period_ms: DEFAULT_TIMER_PERIOD_MS,
        }
    }

    pub fn qml_import(mut self, path: impl Into<PathBuf>) -> Self {
        self.qml_import_paths.push(path.into());
        self
    }
}

/// A live GUI child process and the platform resources tying it to us.
pub enum GuiLink {
    #[cfg(unix)]
    SocketPair { child: std::process::Child },
    #[cfg(windows)]
    NamedPipePair { child: std::process::Child },
}

impl GuiLink {
    /// Wait for the child to exit, retrying on signal interruption.
    ///
    /// Blocks; never call this from the audio thread.
    pub fn wait(&mut self) -> Option<ExitStatus> {
        let child = match self {
            #[cfg(unix)]
            GuiLink::SocketPair { child } => child,
            #[cfg(windows)]
            GuiLink::NamedPipePair { child } => child,
        };
        loop {
            match child.wait() {
                Ok(status) => {
                    debug!(%status, "GUI child exited");
                    return Some(status);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "waiting for GUI child failed");
                    return None;
                }
            }
        }
    }

    /// Terminate the child without the destroy handshake. Used to unwind a
    /// partially failed bring-up; the graceful path goes through the channel.
    pub fn shutdown_forced(&mut self) {
        let child = match self {
            #[cfg(unix)]
            GuiLink::SocketPair { child } => child,
            #[cfg(windows)]
            GuiLink::NamedPipePair { child } => child,
        };
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(unix)]
mod imp {
    use std::os::fd::{AsRawFd, OwnedFd};
    use std::os::unix::net::UnixStream;
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    use nix::libc;
    use tracing::debug;

    use super::*;

    /// Descriptor number the child finds its socket on. The inherited end is
    /// `dup2`ed onto this slot before exec so the command line can name it
    /// without knowing what the parent allocated.
    const GUI_SOCKET_FD: i32 = 3;

    pub fn bring_up(options: &SpawnOptions) -> Result<(GuiLink, Endpoint)> {
        let (local, remote) = UnixStream::pair().map_err(SpawnError::Transport)?;
        let endpoint = Endpoint::from_stream(local).map_err(SpawnError::Transport)?;

        let remote_fd: OwnedFd = remote.into();
        let raw = remote_fd.as_raw_fd();

        let mut command = Command::new(&options.executable);
        command.arg("--skin").arg(&options.skin_dir);
        for path in &options.qml_import_paths {
            command.arg("--qml-import").arg(path);
        }
        command.arg("--socket").arg(GUI_SOCKET_FD.to_string());

        // Runs between fork and exec: async-signal-safe raw syscalls only.
        // dup2 clears CLOEXEC on the duplicate; when the descriptor already
        // sits on the target slot there is nothing to duplicate and the flag
        // is cleared in place.
        unsafe {
            command.pre_exec(move || {
                if raw == GUI_SOCKET_FD {
                    let flags = libc::fcntl(raw, libc::F_GETFD);
                    if flags < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    if libc::fcntl(raw, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                } else if libc::dup2(raw, GUI_SOCKET_FD) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn().map_err(|source| SpawnError::Launch {
            executable: options.executable.clone(),
            source,
        })?;
        debug!(pid = child.id(), "GUI child launched");

        // The child owns its copy now; ours would only hold the stream open.
        drop(remote_fd);

        Ok((GuiLink::SocketPair { child }, endpoint))
    }
}

#[cfg(windows)]
mod imp {
    use std::fs::File;
    use std::os::windows::io::FromRawHandle;
    use std::process::Command;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tracing::debug;
    use windows::core::HSTRING;
    use windows::Win32::Foundation::INVALID_HANDLE_VALUE;
    use windows::Win32::Storage::FileSystem::{PIPE_ACCESS_INBOUND, PIPE_ACCESS_OUTBOUND};
    use windows::Win32::System::Pipes::{
        ConnectNamedPipe, CreateNamedPipeW, SetNamedPipeHandleState, PIPE_NOWAIT, PIPE_TYPE_BYTE,
        PIPE_WAIT,
    };

    use super::*;

    const PIPE_BUFSZ: u32 = 128 * 1024;

    static PIPE_COUNTER: AtomicU32 = AtomicU32::new(0);

    pub fn bring_up(options: &SpawnOptions) -> Result<(GuiLink, Endpoint)> {
        let counter = PIPE_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        let pid = std::process::id();
        let to_gui_name = format!(r"\\.\pipe\ripieno-ptg.{pid:08x}.{counter:08x}");
        let to_plugin_name = format!(r"\\.\pipe\ripieno-gtp.{pid:08x}.{counter:08x}");

        let to_gui = create_pipe(&to_gui_name, true)?;
        let to_plugin = create_pipe(&to_plugin_name, false)?;

        let mut command = Command::new(&options.executable);
        command.arg("--skin").arg(&options.skin_dir);
        for path in &options.qml_import_paths {
            command.arg("--qml-import").arg(path);
        }
        command
            .arg("--pipe-in")
            .arg(&to_gui_name)
            .arg("--pipe-out")
            .arg(&to_plugin_name);

        let mut child = command.spawn().map_err(|source| SpawnError::Launch {
            executable: options.executable.clone(),
            source,
        })?;
        debug!(pid = child.id(), "GUI child launched");

        // Blocks until the child opens both names, then flip the server ends
        // to non-blocking byte semantics. The child is already running, so
        // any failure past this point must kill and reap it before
        // unwinding.
        for pipe in [&to_plugin, &to_gui] {
            let flipped = unsafe {
                use std::os::windows::io::AsRawHandle;
                let handle = windows::Win32::Foundation::HANDLE(pipe.as_raw_handle() as _);
                let _ = ConnectNamedPipe(handle, None);
                SetNamedPipeHandleState(handle, Some(&PIPE_NOWAIT), None, None)
            };
            if let Err(e) = flipped {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SpawnError::Transport(std::io::Error::other(e)));
            }
        }

        let endpoint = match Endpoint::from_pipes(to_plugin, to_gui) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SpawnError::Transport(e));
            }
        };
        Ok((GuiLink::NamedPipePair { child }, endpoint))
    }

    fn create_pipe(name: &str, outbound: bool) -> Result<File> {
        let access = if outbound {
            PIPE_ACCESS_OUTBOUND
        } else {
            PIPE_ACCESS_INBOUND
        };
        let handle = unsafe {
            CreateNamedPipeW(
                &HSTRING::from(name),
                access,
                PIPE_TYPE_BYTE | PIPE_WAIT,
                1,
                PIPE_BUFSZ,
                PIPE_BUFSZ,
                0,
                None,
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(SpawnError::Transport(std::io::Error::last_os_error()));
        }
        Ok(unsafe { File::from_raw_handle(handle.0 as _) })
    }
}

impl GuiLink {
    /// Create the duplex transport, launch the GUI executable, and hand back
    /// the link plus the local endpoint. On failure every resource acquired
    /// by an earlier step has been released.
    pub fn bring_up(options: &SpawnOptions) -> Result<(GuiLink, Endpoint)> {
        imp::bring_up(options)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_bring_up_missing_executable_fails_clean() {
        let options = SpawnOptions::new("/nonexistent/ripieno-gui", "/tmp/skin");
        match GuiLink::bring_up(&options) {
            Err(SpawnError::Launch { executable, .. }) => {
                assert_eq!(executable, PathBuf::from("/nonexistent/ripieno-gui"));
            }
            Ok(_) => panic!("spawn of a missing executable must fail"),
            Err(other) => panic!("expected Launch error, got {other}"),
        }
    }

    #[test]
    fn test_bring_up_and_reap_stub_child() {
        // `true` ignores its arguments and exits immediately; good enough to
        // prove the endpoint plumbing and the EINTR-retried wait.
        let options = SpawnOptions::new("/bin/true", "/tmp/skin").qml_import("/tmp/qml");
        let (mut link, endpoint) = GuiLink::bring_up(&options).expect("bring up");
        assert!(endpoint.raw_fd() >= 0);

        let status = link.wait().expect("child reaped");
        assert!(status.success());
    }

    #[test]
    fn test_spawn_options_defaults() {
        let options = SpawnOptions::new("/opt/gui", "/opt/skin");
        assert_eq!(options.timer_period_ms, DEFAULT_TIMER_PERIOD_MS);
        assert!(options.qml_import_paths.is_empty());

        let options = options.qml_import("/a").qml_import("/b");
        assert_eq!(options.qml_import_paths.len(), 2);
    }
}
