//! OS duplex endpoint underneath a channel.
//!
//! One reliable, ordered, bidirectional byte stream per peer pair: a
//! socketpair end on Unix, an outbound/inbound named-pipe pair on Windows.
//! The channel above is platform-free; everything OS-specific lives here.
//!
//! Endpoints are non-blocking. `try_read`/`try_write` surface `WouldBlock`
//! and the caller decides when to retry, normally from a readiness
//! notification.

/// Readiness observed on the endpoint by [`Endpoint::wait`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub hangup: bool,
    pub error: bool,
}

#[cfg(unix)]
mod imp {
    use std::io::{self, Read};
    use std::os::fd::AsFd;
    use std::os::unix::io::{AsRawFd, RawFd};
    use std::os::unix::net::UnixStream;

    use nix::errno::Errno;
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    use nix::sys::socket::{send, MsgFlags};

    use super::Readiness;

    /// One end of a connected stream socketpair.
    pub struct Endpoint {
        stream: UnixStream,
    }

    impl Endpoint {
        pub fn from_stream(stream: UnixStream) -> io::Result<Self> {
            stream.set_nonblocking(true)?;
            Ok(Self { stream })
        }

        pub fn raw_fd(&self) -> RawFd {
            self.stream.as_raw_fd()
        }

        pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
            (&self.stream).read(buf)
        }

        /// `MSG_NOSIGNAL` write: a vanished peer must surface as `EPIPE`, not
        /// kill the host process with `SIGPIPE`.
        pub fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
            send(self.stream.as_raw_fd(), buf, MsgFlags::MSG_NOSIGNAL).map_err(io::Error::from)
        }

        /// Stop both directions so the peer observes EOF even while this
        /// endpoint object is still alive.
        pub fn shutdown(&self) {
            let _ = self.stream.shutdown(std::net::Shutdown::Both);
        }

        /// Block until the endpoint is ready, the peer hangs up, or the
        /// timeout elapses. `EINTR` and timeouts report as no readiness.
        pub fn wait(&self, want_write: bool, timeout_ms: Option<u16>) -> io::Result<Readiness> {
            let mut events = PollFlags::POLLIN;
            if want_write {
                events |= PollFlags::POLLOUT;
            }

            let mut fds = [PollFd::new(self.stream.as_fd(), events)];
            let timeout = match timeout_ms {
                Some(ms) => PollTimeout::from(ms),
                None => PollTimeout::NONE,
            };

            match poll(&mut fds, timeout) {
                Ok(_) => {
                    let revents = fds[0].revents().unwrap_or(PollFlags::empty());
                    Ok(Readiness {
                        readable: revents.contains(PollFlags::POLLIN),
                        writable: revents.contains(PollFlags::POLLOUT),
                        hangup: revents.contains(PollFlags::POLLHUP),
                        error: revents.contains(PollFlags::POLLERR),
                    })
                }
                Err(Errno::EINTR) => Ok(Readiness::default()),
                Err(e) => Err(io::Error::from(e)),
            }
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::windows::io::AsRawHandle;
    use std::time::Duration;

    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Pipes::PeekNamedPipe;

    use super::Readiness;

    const ERROR_NO_DATA: i32 = 232;
    const ERROR_BROKEN_PIPE: i32 = 109;

    /// Outbound/inbound named-pipe handle pair, both in byte mode with
    /// `PIPE_NOWAIT` semantics set by whoever created or opened them.
    pub struct Endpoint {
        input: File,
        output: File,
    }

    impl Endpoint {
        pub fn from_pipes(input: File, output: File) -> io::Result<Self> {
            Ok(Self { input, output })
        }

        pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
            match (&self.input).read(buf) {
                Err(e) if e.raw_os_error() == Some(ERROR_NO_DATA) => {
                    Err(io::Error::from(io::ErrorKind::WouldBlock))
                }
                Err(e) if e.raw_os_error() == Some(ERROR_BROKEN_PIPE) => Ok(0),
                other => other,
            }
        }

        pub fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
            match (&self.output).write(buf) {
                Err(e) if e.raw_os_error() == Some(ERROR_NO_DATA) => {
                    Err(io::Error::from(io::ErrorKind::WouldBlock))
                }
                other => other,
            }
        }

        /// Named pipes break when their handles close; dropping the endpoint
        /// right after teardown is what actually severs the stream.
        pub fn shutdown(&self) {}

        /// Poll the inbound pipe for buffered bytes. Named byte pipes have no
        /// waitable readiness object, so this peeks and naps.
        pub fn wait(&self, want_write: bool, timeout_ms: Option<u16>) -> io::Result<Readiness> {
            let mut waited: u64 = 0;
            let limit = timeout_ms.map(u64::from);

            loop {
                let mut available: u32 = 0;
                let peek = unsafe {
                    PeekNamedPipe(
                        HANDLE(self.input.as_raw_handle() as _),
                        None,
                        0,
                        None,
                        Some(&mut available),
                        None,
                    )
                };

                if peek.is_err() {
                    return Ok(Readiness {
                        hangup: true,
                        ..Readiness::default()
                    });
                }

                if available > 0 || want_write {
                    return Ok(Readiness {
                        readable: available > 0,
                        writable: want_write,
                        ..Readiness::default()
                    });
                }

                if let Some(limit) = limit {
                    if waited >= limit {
                        return Ok(Readiness::default());
                    }
                }

                std::thread::sleep(Duration::from_millis(1));
                waited += 1;
            }
        }
    }
}

pub use imp::Endpoint;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io;
    use std::os::unix::net::UnixStream;

    fn pair() -> (Endpoint, Endpoint) {
        let (a, b) = UnixStream::pair().unwrap();
        (
            Endpoint::from_stream(a).unwrap(),
            Endpoint::from_stream(b).unwrap(),
        )
    }

    #[test]
    fn test_read_would_block_when_empty() {
        let (a, _b) = pair();
        let mut buf = [0u8; 16];
        let err = a.try_read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_write_then_read() {
        let (a, b) = pair();
        assert_eq!(a.try_write(b"ping").unwrap(), 4);

        let ready = b.wait(false, Some(1000)).unwrap();
        assert!(ready.readable);

        let mut buf = [0u8; 16];
        assert_eq!(b.try_read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");
    }

    #[test]
    fn test_peer_drop_reads_as_eof() {
        let (a, b) = pair();
        drop(b);

        let ready = a.wait(false, Some(1000)).unwrap();
        assert!(ready.readable || ready.hangup);

        let mut buf = [0u8; 16];
        assert_eq!(a.try_read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_wait_times_out_quietly() {
        let (a, _b) = pair();
        let ready = a.wait(false, Some(10)).unwrap();
        assert!(!ready.readable);
        assert!(!ready.hangup);
    }
}
