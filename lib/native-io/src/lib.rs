//! Readiness bookkeeping for native I/O resources.
//!
//! A reactor that polls the host OS needs to remember, per resource, whether
//! the resource is currently expected to satisfy a read or a write without
//! blocking. [`Readiness`] pairs exclusive ownership of a native resource
//! with that flag set, so the I/O layer that performs the syscalls and the
//! reactor that consumes readiness agree on a single source of truth.
//!
//! The flags are advisory. The I/O layer clears `READABLE` when a read comes
//! up short; the reactor sets it again when the OS reports new data. Nothing
//! here blocks or talks to the OS.

use bitflags::bitflags;

bitflags! {
    /// Readiness interests tracked for a native resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interest: u8 {
        /// A read is expected to make progress without blocking.
        const READABLE = 1 << 0;
        /// A write is expected to make progress without blocking.
        const WRITABLE = 1 << 1;
    }
}

/// Exclusive owner of a native resource together with its readiness flags.
///
/// The wrapped resource can only be taken back out with [`into_handle`],
/// which consumes the bookkeeping. Dropping the `Readiness` drops the
/// resource.
///
/// [`into_handle`]: Readiness::into_handle
#[derive(Debug)]
pub struct Readiness<H> {
    handle: H,
    ready: Interest,
}

impl<H> Readiness<H> {
    /// Wraps `handle` with no readiness recorded yet.
    pub fn new(handle: H) -> Self {
        Self {
            handle,
            ready: Interest::empty(),
        }
    }

    /// Borrows the owned resource.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Releases the owned resource, discarding the readiness flags.
    pub fn into_handle(self) -> H {
        self.handle
    }

    /// Marks `interest` as currently ready.
    pub fn set(&mut self, interest: Interest) {
        tracing::trace!(interest = ?interest, "readiness set");
        self.ready |= interest;
    }

    /// Marks `interest` as no longer ready.
    pub fn clear(&mut self, interest: Interest) {
        tracing::trace!(interest = ?interest, "readiness cleared");
        self.ready -= interest;
    }

    /// Whether every flag in `interest` is currently marked ready.
    pub fn contains(&self, interest: Interest) -> bool {
        self.ready.contains(interest)
    }

    /// The full set of flags currently marked ready.
    pub fn ready(&self) -> Interest {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn starts_with_nothing_ready() {
        let state = Readiness::new(42u32);
        assert_eq!(state.ready(), Interest::empty());
        assert!(!state.contains(Interest::READABLE));
        assert!(!state.contains(Interest::WRITABLE));
    }

    #[test]
    fn set_and_clear_are_independent_per_flag() {
        let mut state = Readiness::new(());
        state.set(Interest::READABLE | Interest::WRITABLE);
        assert!(state.contains(Interest::READABLE));
        assert!(state.contains(Interest::WRITABLE));

        state.clear(Interest::READABLE);
        assert!(!state.contains(Interest::READABLE));
        assert!(state.contains(Interest::WRITABLE));
    }

    #[test]
    fn clearing_an_unset_flag_is_a_no_op() {
        let mut state = Readiness::new(());
        state.set(Interest::WRITABLE);
        state.clear(Interest::READABLE);
        assert_eq!(state.ready(), Interest::WRITABLE);
    }

    #[test]
    fn a_cleared_flag_can_be_set_again() {
        let mut state = Readiness::new(());
        state.set(Interest::READABLE);
        state.clear(Interest::READABLE);
        state.set(Interest::READABLE);
        assert!(state.contains(Interest::READABLE));
    }

    #[test]
    fn into_handle_returns_the_resource() {
        let state = Readiness::new(String::from("resource"));
        assert_eq!(state.into_handle(), "resource");
    }
}
