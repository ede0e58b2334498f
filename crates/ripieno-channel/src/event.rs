//! Event-control seam between a channel and whoever owns its event loop.

use bitflags::bitflags;

bitflags! {
    /// Readiness interests on the channel endpoint.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FdFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const ERROR = 1 << 2;
    }
}

/// Implemented by the channel's owner.
///
/// The channel never registers its descriptor anywhere itself; it only asks
/// the owner to adjust the registration it made. `WRITE` interest is requested
/// exactly while the output buffer is non-empty, so an idle channel never
/// busy-wakes the loop.
pub trait EventControl {
    /// Update the readiness interest set for the channel's descriptor.
    fn modify_fd(&self, flags: FdFlags);

    /// The channel is done with its descriptor: unregister it and begin
    /// graceful shutdown of this side.
    fn remove_fd(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_compose() {
        let flags = FdFlags::READ | FdFlags::ERROR;
        assert!(flags.contains(FdFlags::READ));
        assert!(!flags.contains(FdFlags::WRITE));
        assert_eq!(flags | FdFlags::WRITE, FdFlags::all());
    }
}
