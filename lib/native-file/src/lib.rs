//! Portable synchronous file handles.
//!
//! [`FileHandle`] unifies file open/close, sequential and positioned
//! read/write, advisory locking, metadata queries, durability flush and
//! truncation across POSIX file descriptors and Windows handles behind one
//! synchronous API. Higher-level I/O and reactor code can treat "a file"
//! uniformly regardless of host OS, while OS-specific error codes are
//! surfaced faithfully through [`FsError::Os`].
//!
//! Every operation is a direct per-call syscall wrapper; there is no
//! buffering, caching or completion notification in this crate. The one
//! asynchronous touchpoint is bookkeeping: each handle carries a
//! [`Readiness`] state an external reactor can consult, and sequential or
//! positioned reads that come up short clear its `READABLE` flag.
//!
//! ```no_run
//! use native_file::{FileHandle, OpenFlags};
//!
//! # fn main() -> native_file::Result<()> {
//! let mut file = FileHandle::open(
//!     "queue.dat",
//!     OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE,
//!     0o644,
//! )?;
//! file.write(b"hello")?;
//! file.sync()?;
//! assert_eq!(file.stat()?.size, 5);
//! # Ok(())
//! # }
//! ```

mod error;
mod flags;
mod handle;
mod metadata;
mod sys;

pub use error::{FsError, Result};
pub use flags::{FlagsDescription, LockMode, OpenFlags};
pub use handle::FileHandle;
pub use metadata::Metadata;
pub use sys::NativeFile;

pub use native_io::{Interest, Readiness};
