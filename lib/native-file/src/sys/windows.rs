use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{
    AsHandle, AsRawHandle, BorrowedHandle, FromRawHandle, OwnedHandle, RawHandle,
};
use std::path::Path;
use std::ptr;

use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_IO_PENDING, ERROR_LOCK_VIOLATION, GENERIC_READ, GENERIC_WRITE, HANDLE,
    INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FileBasicInfo, FileStandardInfo, FlushFileBuffers, GetFileInformationByHandleEx,
    LockFileEx, ReadFile, SetEndOfFile, SetFilePointerEx, UnlockFileEx, WriteFile, CREATE_ALWAYS,
    CREATE_NEW, FILE_ATTRIBUTE_DIRECTORY, FILE_BASIC_INFO, FILE_BEGIN, FILE_END,
    FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, FILE_STANDARD_INFO,
    LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, OPEN_ALWAYS, OPEN_EXISTING,
    TRUNCATE_EXISTING,
};
use windows_sys::Win32::System::IO::OVERLAPPED;

use crate::sys::SysFile;
use crate::{FsError, LockMode, Metadata, OpenFlags, Result};

/// Owns one Windows file handle; closed exactly once on drop.
#[derive(Debug)]
pub struct NativeFile {
    handle: OwnedHandle,
}

impl NativeFile {
    fn raw(&self) -> HANDLE {
        self.handle.as_raw_handle()
    }

    /// Moves the sequential cursor to end-of-file. There is no native append
    /// mode, so every append open repositions explicitly.
    fn seek_end(&self) -> std::result::Result<(), i32> {
        let res = unsafe { SetFilePointerEx(self.raw(), 0, ptr::null_mut(), FILE_END) };
        if res == 0 {
            return Err(last_error());
        }
        Ok(())
    }
}

impl From<OwnedHandle> for NativeFile {
    fn from(handle: OwnedHandle) -> Self {
        Self { handle }
    }
}

impl From<NativeFile> for OwnedHandle {
    fn from(file: NativeFile) -> Self {
        file.handle
    }
}

impl AsHandle for NativeFile {
    fn as_handle(&self) -> BorrowedHandle<'_> {
        self.handle.as_handle()
    }
}

impl AsRawHandle for NativeFile {
    fn as_raw_handle(&self) -> RawHandle {
        self.handle.as_raw_handle()
    }
}

/// `GetLastError` captured immediately after a failed native call, before
/// anything else can clobber the thread-local value.
fn last_error() -> i32 {
    unsafe { GetLastError() as i32 }
}

/// `ERROR_IO_PENDING` means the caller can retry later; everything else is a
/// hard OS failure.
fn io_error(code: i32, message: impl FnOnce() -> String) -> FsError {
    if code == ERROR_IO_PENDING as i32 {
        FsError::WouldBlock
    } else {
        FsError::Os {
            code,
            message: message(),
        }
    }
}

fn to_wide(path: &Path) -> std::result::Result<Vec<u16>, FsError> {
    let wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    if wide.contains(&0) {
        return Err(FsError::InvalidPath(format!(
            "file {path:?} contains an interior NUL unit"
        )));
    }
    Ok(wide.into_iter().chain(Some(0)).collect())
}

fn io_len(buf_len: usize) -> u32 {
    u32::try_from(buf_len).unwrap_or(u32::MAX)
}

const FILETIME_UNIX_DIFF: i64 = 116_444_736_000_000_000;

/// FILETIME counts 100 ns units since 1601; normalize to Unix-epoch ns.
fn filetime_to_unix_ns(filetime: i64) -> u64 {
    ((filetime - FILETIME_UNIX_DIFF) * 100) as u64
}

impl SysFile for NativeFile {
    fn open(path: &Path, flags: OpenFlags, _mode: u32) -> Result<Self> {
        let wide = to_wide(path)?;

        let mut desired_access = 0;
        if flags.contains(OpenFlags::READ) {
            desired_access |= GENERIC_READ;
        }
        if flags.contains(OpenFlags::WRITE) {
            desired_access |= GENERIC_WRITE;
        }

        let share_mode = FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE;

        let creation_disposition = if flags.contains(OpenFlags::CREATE) {
            if flags.contains(OpenFlags::TRUNCATE) {
                CREATE_ALWAYS
            } else {
                OPEN_ALWAYS
            }
        } else if flags.contains(OpenFlags::CREATE_NEW) {
            CREATE_NEW
        } else if flags.contains(OpenFlags::TRUNCATE) {
            TRUNCATE_EXISTING
        } else {
            OPEN_EXISTING
        };

        let raw = unsafe {
            CreateFileW(
                wide.as_ptr(),
                desired_access,
                share_mode,
                ptr::null(),
                creation_disposition,
                0,
                ptr::null_mut(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            let code = last_error();
            return Err(FsError::Os {
                code,
                message: format!("file {path:?} can't be {}", flags.describe()),
            });
        }

        let file = Self {
            handle: unsafe { OwnedHandle::from_raw_handle(raw) },
        };

        if flags.contains(OpenFlags::APPEND) {
            file.seek_end().map_err(|code| FsError::Os {
                code,
                message: format!("failed to seek to the end of file {path:?}"),
            })?;
        }
        Ok(file)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut bytes_read = 0u32;
        let res = unsafe {
            ReadFile(
                self.raw(),
                buf.as_mut_ptr().cast(),
                io_len(buf.len()),
                &mut bytes_read,
                ptr::null_mut(),
            )
        };
        if res == 0 {
            let code = last_error();
            return Err(io_error(code, || "read has failed".to_string()));
        }
        Ok(bytes_read as usize)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut bytes_written = 0u32;
        let res = unsafe {
            WriteFile(
                self.raw(),
                buf.as_ptr().cast(),
                io_len(buf.len()),
                &mut bytes_written,
                ptr::null_mut(),
            )
        };
        if res == 0 {
            let code = last_error();
            return Err(io_error(code, || "write has failed".to_string()));
        }
        Ok(bytes_written as usize)
    }

    fn pread(&self, buf: &mut [u8], offset: i64) -> Result<usize> {
        let mut bytes_read = 0u32;
        let res = unsafe {
            let mut overlapped: OVERLAPPED = std::mem::zeroed();
            overlapped.Anonymous.Anonymous.Offset = offset as u32;
            overlapped.Anonymous.Anonymous.OffsetHigh = (offset >> 32) as u32;
            ReadFile(
                self.raw(),
                buf.as_mut_ptr().cast(),
                io_len(buf.len()),
                &mut bytes_read,
                &mut overlapped,
            )
        };
        if res == 0 {
            let code = last_error();
            return Err(io_error(code, || {
                format!("pread at offset {offset} has failed")
            }));
        }
        Ok(bytes_read as usize)
    }

    fn pwrite(&self, buf: &[u8], offset: i64) -> Result<usize> {
        let mut bytes_written = 0u32;
        let res = unsafe {
            let mut overlapped: OVERLAPPED = std::mem::zeroed();
            overlapped.Anonymous.Anonymous.Offset = offset as u32;
            overlapped.Anonymous.Anonymous.OffsetHigh = (offset >> 32) as u32;
            WriteFile(
                self.raw(),
                buf.as_ptr().cast(),
                io_len(buf.len()),
                &mut bytes_written,
                &mut overlapped,
            )
        };
        if res == 0 {
            let code = last_error();
            return Err(io_error(code, || {
                format!("pwrite at offset {offset} has failed")
            }));
        }
        Ok(bytes_written as usize)
    }

    fn try_lock(&self, mode: LockMode) -> Result<()> {
        let res = unsafe {
            let mut overlapped: OVERLAPPED = std::mem::zeroed();
            match mode {
                LockMode::Unlock => {
                    UnlockFileEx(self.raw(), 0, u32::MAX, u32::MAX, &mut overlapped)
                }
                LockMode::Shared | LockMode::Exclusive => {
                    let mut lock_flags = LOCKFILE_FAIL_IMMEDIATELY;
                    if mode == LockMode::Exclusive {
                        lock_flags |= LOCKFILE_EXCLUSIVE_LOCK;
                    }
                    LockFileEx(self.raw(), lock_flags, 0, u32::MAX, u32::MAX, &mut overlapped)
                }
            }
        };
        if res == 0 {
            let code = last_error();
            if code == ERROR_LOCK_VIOLATION as i32 {
                return Err(FsError::LockContention);
            }
            return Err(FsError::Os {
                code,
                message: "can't lock file".to_string(),
            });
        }
        Ok(())
    }

    fn stat(&self) -> Result<Metadata> {
        let mut basic: FILE_BASIC_INFO = unsafe { std::mem::zeroed() };
        let res = unsafe {
            GetFileInformationByHandleEx(
                self.raw(),
                FileBasicInfo,
                (&mut basic as *mut FILE_BASIC_INFO).cast(),
                std::mem::size_of::<FILE_BASIC_INFO>() as u32,
            )
        };
        if res == 0 {
            let code = last_error();
            return Err(FsError::Os {
                code,
                message: "stat has failed".to_string(),
            });
        }

        let mut standard: FILE_STANDARD_INFO = unsafe { std::mem::zeroed() };
        let res = unsafe {
            GetFileInformationByHandleEx(
                self.raw(),
                FileStandardInfo,
                (&mut standard as *mut FILE_STANDARD_INFO).cast(),
                std::mem::size_of::<FILE_STANDARD_INFO>() as u32,
            )
        };
        if res == 0 {
            let code = last_error();
            return Err(FsError::Os {
                code,
                message: "stat has failed".to_string(),
            });
        }

        let is_dir = basic.FileAttributes & FILE_ATTRIBUTE_DIRECTORY != 0;
        Ok(Metadata {
            size: standard.EndOfFile as u64,
            atime_ns: filetime_to_unix_ns(basic.LastAccessTime),
            mtime_ns: filetime_to_unix_ns(basic.LastWriteTime),
            is_dir,
            is_reg: !is_dir,
        })
    }

    fn sync(&self) -> Result<()> {
        let res = unsafe { FlushFileBuffers(self.raw()) };
        if res == 0 {
            let code = last_error();
            return Err(FsError::Os {
                code,
                message: "sync has failed".to_string(),
            });
        }
        Ok(())
    }

    fn seek(&self, position: i64) -> Result<()> {
        let res = unsafe { SetFilePointerEx(self.raw(), position, ptr::null_mut(), FILE_BEGIN) };
        if res == 0 {
            let code = last_error();
            return Err(FsError::Os {
                code,
                message: "seek has failed".to_string(),
            });
        }
        Ok(())
    }

    fn truncate(&self, _length: i64) -> Result<()> {
        // End-of-file is cut at the live cursor; the caller positions the
        // cursor at the requested length before calling.
        let res = unsafe { SetEndOfFile(self.raw()) };
        if res == 0 {
            let code = last_error();
            return Err(FsError::Os {
                code,
                message: "truncate has failed".to_string(),
            });
        }
        Ok(())
    }
}
