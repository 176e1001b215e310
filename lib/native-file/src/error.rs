use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// Error type for every fallible file operation.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum FsError {
    /// The open flags were rejected before any filesystem access: they
    /// contain bits outside the enumerated set, or select neither reading
    /// nor writing.
    #[error("{0}")]
    InvalidFlags(String),
    /// The path cannot be handed to the native open call, e.g. it contains
    /// an interior NUL byte. Rejected before any filesystem access.
    #[error("{0}")]
    InvalidPath(String),
    /// Positioned I/O and truncation take byte offsets counted from the
    /// start of the file; a negative offset is rejected before any syscall.
    #[error("offset {0} is negative")]
    NegativeOffset(i64),
    /// Locking needs at least one attempt.
    #[error("can't lock file: max_tries must be positive")]
    InvalidLockRetries,
    /// The offset is non-negative but does not fit the platform's native
    /// offset type, so the call was never issued.
    #[error("offset {0} does not fit the native offset type")]
    OffsetOutOfRange(i64),
    /// A native call failed. `code` is the errno / `GetLastError` value
    /// captured immediately after the failing call.
    #[error("{message} (os error {code})")]
    Os { code: i32, message: String },
    /// The operation cannot complete right now but may succeed if retried.
    /// Expected under non-blocking or partial-I/O usage, so never logged.
    #[error("operation can't complete right now, try again")]
    WouldBlock,
    /// Every lock attempt found the file locked by another holder.
    #[error("can't lock file because it is already in use; check for another program instance running")]
    LockContention,
}

impl FsError {
    /// Whether retrying later may succeed without any other change.
    pub fn is_transient(&self) -> bool {
        matches!(self, FsError::WouldBlock)
    }

    /// The native error code, when the failure came from the OS.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            FsError::Os { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_would_block_is_transient() {
        assert!(FsError::WouldBlock.is_transient());
        assert!(!FsError::LockContention.is_transient());
        assert!(!FsError::InvalidLockRetries.is_transient());
        assert!(!FsError::OffsetOutOfRange(i64::MAX).is_transient());
        assert!(!FsError::Os {
            code: 5,
            message: "read from fd 3 has failed".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn os_code_is_exposed() {
        let err = FsError::Os {
            code: 28,
            message: "write to fd 4 has failed".to_string(),
        };
        assert_eq!(err.os_code(), Some(28));
        assert_eq!(FsError::WouldBlock.os_code(), None);
    }

    #[test]
    fn os_error_message_includes_the_code() {
        let err = FsError::Os {
            code: 2,
            message: "stat of fd 7 has failed".to_string(),
        };
        assert_eq!(err.to_string(), "stat of fd 7 has failed (os error 2)");
    }
}
