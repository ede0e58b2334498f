//! Host services the GUI controller depends on.

#[cfg(unix)]
use std::os::unix::io::RawFd;

#[cfg(unix)]
use ripieno_channel::FdFlags;

/// Identifier of a periodic timer registered with the host.
pub type TimerId = u32;

/// Timer and descriptor-readiness services of the embedding host.
///
/// Both capabilities are preconditions for spawning a GUI: without readiness
/// callbacks the channel never pumps, and without a timer there is no
/// heartbeat to flush deferred output. Descriptor registration is a
/// Unix-only surface; on Windows the pipes are pumped from the timer.
pub trait HostServices {
    fn can_use_timer(&self) -> bool;

    fn can_use_fd(&self) -> bool;

    /// Register a periodic timer; the host later drives
    /// [`RemoteGui::on_timer`](crate::RemoteGui::on_timer) with it.
    fn register_timer(&self, period_ms: u32) -> Option<TimerId>;

    fn unregister_timer(&self, timer_id: TimerId);

    /// Register `fd` for readiness; the host later drives
    /// [`RemoteGui::on_fd`](crate::RemoteGui::on_fd) with the observed flags.
    #[cfg(unix)]
    fn register_fd(&self, fd: RawFd, flags: FdFlags) -> bool;

    #[cfg(unix)]
    fn modify_fd(&self, fd: RawFd, flags: FdFlags);

    #[cfg(unix)]
    fn unregister_fd(&self, fd: RawFd);
}
