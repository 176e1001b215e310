use std::ffi::CString;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::sys::SysFile;
use crate::{FsError, LockMode, Metadata, OpenFlags, Result};

/// Owns one POSIX file descriptor; closed exactly once on drop.
#[derive(Debug)]
pub struct NativeFile {
    fd: OwnedFd,
}

impl NativeFile {
    fn raw(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl From<OwnedFd> for NativeFile {
    fn from(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

impl From<NativeFile> for OwnedFd {
    fn from(file: NativeFile) -> Self {
        file.fd
    }
}

impl AsFd for NativeFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for NativeFile {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// errno captured immediately after a failed native call, before anything
/// else can clobber the thread-local value.
fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Runs a native call, retrying transparently while it reports `EINTR`.
/// On failure returns the errno captured right after the failing call.
fn cvt_retry(mut call: impl FnMut() -> i64) -> std::result::Result<i64, i32> {
    loop {
        let res = call();
        if res >= 0 {
            return Ok(res);
        }
        let code = errno();
        if code != libc::EINTR {
            return Err(code);
        }
    }
}

/// EAGAIN and EWOULDBLOCK mean the caller can retry later; everything else
/// is a hard OS failure.
fn io_error(code: i32, message: impl FnOnce() -> String) -> FsError {
    if code == libc::EAGAIN || code == libc::EWOULDBLOCK {
        FsError::WouldBlock
    } else {
        FsError::Os {
            code,
            message: message(),
        }
    }
}

fn to_off_t(offset: i64) -> Result<libc::off_t> {
    libc::off_t::try_from(offset).map_err(|_| FsError::OffsetOutOfRange(offset))
}

impl SysFile for NativeFile {
    fn open(path: &Path, flags: OpenFlags, mode: u32) -> Result<Self> {
        let path_c = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            FsError::InvalidPath(format!("file {path:?} contains an interior NUL byte"))
        })?;

        let mut native_flags = if flags.contains(OpenFlags::READ | OpenFlags::WRITE) {
            libc::O_RDWR
        } else if flags.contains(OpenFlags::WRITE) {
            libc::O_WRONLY
        } else {
            libc::O_RDONLY
        };
        native_flags |= libc::O_CLOEXEC;
        if flags.contains(OpenFlags::TRUNCATE) {
            native_flags |= libc::O_TRUNC;
        }
        if flags.contains(OpenFlags::CREATE) {
            native_flags |= libc::O_CREAT;
        } else if flags.contains(OpenFlags::CREATE_NEW) {
            native_flags |= libc::O_CREAT | libc::O_EXCL;
        }
        if flags.contains(OpenFlags::APPEND) {
            native_flags |= libc::O_APPEND;
        }

        let fd = cvt_retry(|| {
            i64::from(unsafe { libc::open(path_c.as_ptr(), native_flags, mode as libc::c_uint) })
        })
        .map_err(|code| FsError::Os {
            code,
            message: format!("file {path:?} can't be {}", flags.describe()),
        })?;

        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd as RawFd) },
        })
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.raw();
        let n = cvt_retry(|| unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) } as i64)
            .map_err(|code| io_error(code, || format!("read from fd {fd} has failed")))?;
        Ok(n as usize)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let fd = self.raw();
        let n = cvt_retry(|| unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) } as i64)
            .map_err(|code| io_error(code, || format!("write to fd {fd} has failed")))?;
        Ok(n as usize)
    }

    fn pread(&self, buf: &mut [u8], offset: i64) -> Result<usize> {
        let fd = self.raw();
        let off = to_off_t(offset)?;
        let n = cvt_retry(|| {
            (unsafe { libc::pread(fd, buf.as_mut_ptr().cast(), buf.len(), off) }) as i64
        })
        .map_err(|code| {
            io_error(code, || {
                format!("pread from fd {fd} at offset {offset} has failed")
            })
        })?;
        Ok(n as usize)
    }

    fn pwrite(&self, buf: &[u8], offset: i64) -> Result<usize> {
        let fd = self.raw();
        let off = to_off_t(offset)?;
        let n =
            cvt_retry(|| unsafe { libc::pwrite(fd, buf.as_ptr().cast(), buf.len(), off) } as i64)
                .map_err(|code| {
                    io_error(code, || {
                        format!("pwrite to fd {fd} at offset {offset} has failed")
                    })
                })?;
        Ok(n as usize)
    }

    fn try_lock(&self, mode: LockMode) -> Result<()> {
        let fd = self.raw();
        // Locks are tied to the open file description, so two handles on the
        // same file contend even within one process.
        let op = match mode {
            LockMode::Shared => libc::LOCK_SH | libc::LOCK_NB,
            LockMode::Exclusive => libc::LOCK_EX | libc::LOCK_NB,
            LockMode::Unlock => libc::LOCK_UN,
        };
        cvt_retry(|| i64::from(unsafe { libc::flock(fd, op) })).map_err(|code| {
            if code == libc::EAGAIN || code == libc::EWOULDBLOCK || code == libc::EACCES {
                FsError::LockContention
            } else {
                FsError::Os {
                    code,
                    message: format!("can't lock fd {fd}"),
                }
            }
        })?;
        Ok(())
    }

    fn stat(&self) -> Result<Metadata> {
        let fd = self.raw();
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        let res = unsafe { libc::fstat(fd, &mut stat) };
        if res == -1 {
            let code = errno();
            return Err(FsError::Os {
                code,
                message: format!("stat of fd {fd} has failed"),
            });
        }

        let mode = stat.st_mode as u32;
        Ok(Metadata {
            size: stat.st_size as u64,
            atime_ns: (stat.st_atime as i64 * 1_000_000_000 + stat.st_atime_nsec as i64) as u64,
            mtime_ns: (stat.st_mtime as i64 * 1_000_000_000 + stat.st_mtime_nsec as i64) as u64,
            is_dir: mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32,
            is_reg: mode & libc::S_IFMT as u32 == libc::S_IFREG as u32,
        })
    }

    fn sync(&self) -> Result<()> {
        let fd = self.raw();
        let res = unsafe { libc::fsync(fd) };
        if res == -1 {
            let code = errno();
            return Err(FsError::Os {
                code,
                message: format!("sync of fd {fd} has failed"),
            });
        }
        Ok(())
    }

    fn seek(&self, position: i64) -> Result<()> {
        let fd = self.raw();
        let pos = to_off_t(position)?;
        cvt_retry(|| unsafe { libc::lseek(fd, pos, libc::SEEK_SET) } as i64).map_err(|code| {
            FsError::Os {
                code,
                message: format!("seek on fd {fd} has failed"),
            }
        })?;
        Ok(())
    }

    fn truncate(&self, length: i64) -> Result<()> {
        let fd = self.raw();
        let len = to_off_t(length)?;
        cvt_retry(|| i64::from(unsafe { libc::ftruncate(fd, len) })).map_err(|code| {
            FsError::Os {
                code,
                message: format!("truncate of fd {fd} has failed"),
            }
        })?;
        Ok(())
    }
}
