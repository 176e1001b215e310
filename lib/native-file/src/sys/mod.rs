//! Platform syscall layer.
//!
//! Each platform module defines a `NativeFile` owning exactly one OS
//! descriptor or handle and implements [`SysFile`] for it with the
//! platform's own call sequences. Everything above this module is
//! platform-agnostic and only calls through the trait.

use std::path::Path;

use crate::{LockMode, Metadata, OpenFlags, Result};

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::NativeFile;
#[cfg(windows)]
pub use windows::NativeFile;

/// The operations a platform must provide for an open file.
///
/// `pread`/`pwrite` must use the platform's positioned-I/O primitive, never
/// seek-then-read, so they cannot race with the sequential cursor.
/// `try_lock` makes a single non-blocking attempt; the bounded retry loop
/// lives above the trait.
pub(crate) trait SysFile: Sized {
    fn open(path: &Path, flags: OpenFlags, mode: u32) -> Result<Self>;
    fn read(&self, buf: &mut [u8]) -> Result<usize>;
    fn write(&self, buf: &[u8]) -> Result<usize>;
    fn pread(&self, buf: &mut [u8], offset: i64) -> Result<usize>;
    fn pwrite(&self, buf: &[u8], offset: i64) -> Result<usize>;
    fn try_lock(&self, mode: LockMode) -> Result<()>;
    fn stat(&self) -> Result<Metadata>;
    fn sync(&self) -> Result<()>;
    fn seek(&self, position: i64) -> Result<()>;
    fn truncate(&self, length: i64) -> Result<()>;
}
