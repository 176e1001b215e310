use std::path::Path;
use std::time::Duration;

use native_io::{Interest, Readiness};

use crate::sys::{NativeFile, SysFile};
use crate::{FsError, LockMode, Metadata, OpenFlags, Result};

/// Delay between lock attempts.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A synchronous handle to one open file, portable across POSIX descriptors
/// and Windows handles.
///
/// A handle owns a [`Readiness`] state which in turn owns the native
/// resource; both are released on [`close`] or drop. Every operation is a
/// direct native call with no buffering in between. A handle is not safe for
/// unsynchronized concurrent use; callers serialize access or open distinct
/// handles.
///
/// Invoking any I/O operation on an empty handle (never opened, closed, or
/// drained by [`into_native`]) is a contract violation and panics.
///
/// [`close`]: FileHandle::close
/// [`into_native`]: FileHandle::into_native
#[derive(Debug)]
pub struct FileHandle {
    inner: Option<Readiness<NativeFile>>,
}

impl FileHandle {
    /// Opens `path` according to `flags`.
    ///
    /// `mode` supplies the permission bits for newly created files on POSIX
    /// and is ignored on Windows. The flags are validated before any
    /// filesystem access. A fresh handle starts out marked `WRITABLE`;
    /// `READABLE` stays unset until I/O proves there is data to read.
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags, mode: u32) -> Result<FileHandle> {
        let path = path.as_ref();
        flags.validate().map_err(|err| match err {
            FsError::InvalidFlags(reason) => {
                FsError::InvalidFlags(format!("file {path:?} {reason}"))
            }
            other => other,
        })?;
        let native = NativeFile::open(path, flags, mode)?;
        Ok(Self::adopt_native(native))
    }

    /// Wraps an already-owned native file, marking it `WRITABLE`.
    pub fn adopt_native(native: NativeFile) -> FileHandle {
        let mut state = Readiness::new(native);
        state.set(Interest::WRITABLE);
        FileHandle { inner: Some(state) }
    }

    /// Whether this handle currently owns a native resource.
    pub fn empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Releases the native resource. Closing an already-empty handle is a
    /// no-op.
    pub fn close(&mut self) {
        self.inner = None;
    }

    /// The readiness state consulted by an external reactor.
    pub fn readiness(&self) -> &Readiness<NativeFile> {
        self.state()
    }

    /// Mutable access to the readiness state, for the reactor that observes
    /// new OS events for this handle.
    pub fn readiness_mut(&mut self) -> &mut Readiness<NativeFile> {
        self.state_mut()
    }

    /// Borrows the owned native file.
    pub fn native(&self) -> &NativeFile {
        self.state().handle()
    }

    /// Releases ownership of the native file, leaving the handle empty.
    pub fn into_native(mut self) -> NativeFile {
        self.inner
            .take()
            .expect("used an empty file handle")
            .into_handle()
    }

    /// Reads at the sequential cursor, returning the number of bytes
    /// transferred. A short or zero count is not an error, but it clears
    /// `READABLE` to signal that no more data is ready right now.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let wanted = buf.len();
        let res = self.state().handle().read(buf);
        self.finish_read("read", wanted, res)
    }

    /// Writes at the sequential cursor, returning the number of bytes
    /// transferred; may be less than the buffer length.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let res = self.state().handle().write(buf);
        res.map_err(|err| log_unexpected("write", err))
    }

    /// Reads at an explicit offset without touching the sequential cursor.
    pub fn pread(&mut self, buf: &mut [u8], offset: i64) -> Result<usize> {
        if offset < 0 {
            return Err(FsError::NegativeOffset(offset));
        }
        let wanted = buf.len();
        let res = self.state().handle().pread(buf, offset);
        self.finish_read("pread", wanted, res)
    }

    /// Writes at an explicit offset without touching the sequential cursor.
    pub fn pwrite(&mut self, buf: &[u8], offset: i64) -> Result<usize> {
        if offset < 0 {
            return Err(FsError::NegativeOffset(offset));
        }
        let res = self.state().handle().pwrite(buf, offset);
        res.map_err(|err| log_unexpected("pwrite", err))
    }

    /// Acquires, converts or releases the advisory whole-file lock.
    ///
    /// Up to `max_tries` non-blocking attempts are made, sleeping 100 ms
    /// between them while another holder is in the way. Exhausting the
    /// attempts yields [`FsError::LockContention`]; any other native failure
    /// aborts the loop immediately.
    pub fn lock(&self, mode: LockMode, max_tries: u32) -> Result<()> {
        self.lock_with_sleep(mode, max_tries, std::thread::sleep)
    }

    pub(crate) fn lock_with_sleep(
        &self,
        mode: LockMode,
        max_tries: u32,
        mut sleep: impl FnMut(Duration),
    ) -> Result<()> {
        if max_tries == 0 {
            return Err(FsError::InvalidLockRetries);
        }
        let mut remaining = max_tries;
        loop {
            match self.state().handle().try_lock(mode) {
                Ok(()) => return Ok(()),
                Err(FsError::LockContention) => {
                    remaining -= 1;
                    if remaining == 0 {
                        return Err(FsError::LockContention);
                    }
                    sleep(LOCK_RETRY_DELAY);
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Takes a fresh metadata snapshot; nothing is cached between calls.
    pub fn stat(&self) -> Result<Metadata> {
        self.state().handle().stat()
    }

    /// The current size of the file in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.stat()?.size)
    }

    /// Flushes all buffered writes to stable storage. Failures are never
    /// classified transient and never retried.
    pub fn sync(&self) -> Result<()> {
        self.state().handle().sync()
    }

    /// Moves the sequential cursor to `position` bytes from the start.
    /// Positioned I/O is unaffected.
    pub fn seek(&mut self, position: i64) -> Result<()> {
        if position < 0 {
            return Err(FsError::NegativeOffset(position));
        }
        self.state().handle().seek(position)
    }

    /// Sets end-of-file to `length` bytes.
    ///
    /// The sequential cursor must already be positioned at `length`: POSIX
    /// truncates to the explicit length while Windows cuts at the live
    /// cursor, and the precondition makes those the same point.
    pub fn truncate_to_current_position(&mut self, length: i64) -> Result<()> {
        if length < 0 {
            return Err(FsError::NegativeOffset(length));
        }
        self.state().handle().truncate(length)
    }

    fn state(&self) -> &Readiness<NativeFile> {
        self.inner.as_ref().expect("used an empty file handle")
    }

    fn state_mut(&mut self) -> &mut Readiness<NativeFile> {
        self.inner.as_mut().expect("used an empty file handle")
    }

    fn finish_read(&mut self, op: &str, wanted: usize, res: Result<usize>) -> Result<usize> {
        match res {
            Ok(n) => {
                if n < wanted {
                    self.state_mut().clear(Interest::READABLE);
                }
                Ok(n)
            }
            Err(err) => Err(log_unexpected(op, err)),
        }
    }
}

/// Transient errors are expected under polling usage and stay quiet;
/// unexpected native failures are logged here, before the caller gets (and
/// possibly discards) the error.
fn log_unexpected(op: &str, err: FsError) -> FsError {
    if matches!(err, FsError::Os { .. }) {
        tracing::error!(op, error = %err, "file I/O failed");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn open_rw(dir: &TempDir, name: &str) -> FileHandle {
        FileHandle::open(
            dir.path().join(name),
            OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE,
            0o644,
        )
        .unwrap()
    }

    #[test]
    fn lock_contention_sleeps_between_attempts() {
        let dir = TempDir::new().unwrap();
        let first = open_rw(&dir, "contended");
        let second = open_rw(&dir, "contended");
        first.lock(LockMode::Exclusive, 1).unwrap();

        let mut slept = Vec::new();
        let err = second
            .lock_with_sleep(LockMode::Exclusive, 3, |delay| slept.push(delay))
            .unwrap_err();
        assert_eq!(err, FsError::LockContention);
        assert_eq!(slept, vec![LOCK_RETRY_DELAY, LOCK_RETRY_DELAY]);
    }

    #[test]
    fn single_attempt_fails_without_sleeping() {
        let dir = TempDir::new().unwrap();
        let first = open_rw(&dir, "contended");
        let second = open_rw(&dir, "contended");
        first.lock(LockMode::Exclusive, 1).unwrap();

        let mut sleeps = 0;
        let err = second
            .lock_with_sleep(LockMode::Exclusive, 1, |_| sleeps += 1)
            .unwrap_err();
        assert_eq!(err, FsError::LockContention);
        assert_eq!(sleeps, 0);
    }

    #[test]
    fn lock_retry_stops_as_soon_as_the_holder_lets_go() {
        let dir = TempDir::new().unwrap();
        let first = open_rw(&dir, "contended");
        let second = open_rw(&dir, "contended");
        first.lock(LockMode::Exclusive, 1).unwrap();

        // Release the lock from inside the injected sleep; the next attempt
        // must then succeed instead of using up the remaining tries.
        let mut sleeps = 0;
        second
            .lock_with_sleep(LockMode::Exclusive, 5, |_| {
                sleeps += 1;
                first.lock(LockMode::Unlock, 1).unwrap();
            })
            .unwrap();
        assert_eq!(sleeps, 1);
    }

    #[test]
    fn zero_max_tries_is_rejected_before_any_attempt() {
        let dir = TempDir::new().unwrap();
        let handle = open_rw(&dir, "f");
        assert_eq!(
            handle.lock(LockMode::Exclusive, 0).unwrap_err(),
            FsError::InvalidLockRetries
        );
    }

    #[test]
    fn open_marks_the_handle_writable_but_not_readable() {
        let dir = TempDir::new().unwrap();
        let handle = open_rw(&dir, "f");
        assert!(handle.readiness().contains(Interest::WRITABLE));
        assert!(!handle.readiness().contains(Interest::READABLE));
    }

    #[test]
    fn short_read_clears_readable_and_the_reactor_can_set_it_back() {
        let dir = TempDir::new().unwrap();
        let mut handle = open_rw(&dir, "f");
        handle.write(b"abc").unwrap();
        handle.seek(0).unwrap();
        handle.readiness_mut().set(Interest::READABLE);

        // Asking for more than the file holds comes up short.
        let mut buf = [0u8; 8];
        let n = handle.read(&mut buf).unwrap();
        assert_eq!(n, 3);
        assert!(!handle.readiness().contains(Interest::READABLE));

        // The flag is advisory, not sticky-false: a full read after the
        // reactor re-arms it leaves it set.
        handle.readiness_mut().set(Interest::READABLE);
        handle.seek(0).unwrap();
        let mut exact = [0u8; 3];
        assert_eq!(handle.read(&mut exact).unwrap(), 3);
        assert!(handle.readiness().contains(Interest::READABLE));
    }

    #[test]
    fn short_positioned_read_clears_readable_too() {
        let dir = TempDir::new().unwrap();
        let mut handle = open_rw(&dir, "f");
        handle.pwrite(b"xy", 0).unwrap();
        handle.readiness_mut().set(Interest::READABLE);

        let mut buf = [0u8; 16];
        assert_eq!(handle.pread(&mut buf, 0).unwrap(), 2);
        assert!(!handle.readiness().contains(Interest::READABLE));
    }

    #[test]
    fn close_is_idempotent_and_empties_the_handle() {
        let dir = TempDir::new().unwrap();
        let mut handle = open_rw(&dir, "f");
        assert!(!handle.empty());
        handle.close();
        assert!(handle.empty());
        handle.close();
        assert!(handle.empty());
    }

    #[test]
    #[should_panic(expected = "used an empty file handle")]
    fn reading_a_closed_handle_panics() {
        let dir = TempDir::new().unwrap();
        let mut handle = open_rw(&dir, "f");
        handle.close();
        let mut buf = [0u8; 1];
        let _ = handle.read(&mut buf);
    }

    #[test]
    fn adopt_and_release_round_trip_the_native_resource() {
        let dir = TempDir::new().unwrap();
        let mut handle = open_rw(&dir, "f");
        handle.write(b"keep").unwrap();

        let native = handle.into_native();
        let mut adopted = FileHandle::adopt_native(native);
        assert!(adopted.readiness().contains(Interest::WRITABLE));
        adopted.seek(0).unwrap();
        let mut buf = [0u8; 4];
        adopted.read(&mut buf).unwrap();
        assert_eq!(&buf, b"keep");
    }

    #[test]
    fn negative_offsets_are_rejected_before_any_syscall() {
        let dir = TempDir::new().unwrap();
        let mut handle = open_rw(&dir, "f");
        let mut buf = [0u8; 4];
        assert_eq!(
            handle.pread(&mut buf, -1).unwrap_err(),
            FsError::NegativeOffset(-1)
        );
        assert_eq!(
            handle.pwrite(b"x", -7).unwrap_err(),
            FsError::NegativeOffset(-7)
        );
        assert_eq!(handle.seek(-1).unwrap_err(), FsError::NegativeOffset(-1));
        assert_eq!(
            handle.truncate_to_current_position(-1).unwrap_err(),
            FsError::NegativeOffset(-1)
        );
    }
}
