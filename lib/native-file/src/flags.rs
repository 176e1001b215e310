use std::fmt;

use bitflags::bitflags;

use crate::{FsError, Result};

bitflags! {
    /// How a file should be opened.
    ///
    /// At least one of `READ` and `WRITE` must be set. `CREATE_NEW` means
    /// exclusive creation: the open fails if the target already exists.
    /// The bit values are a protocol between the caller and `open`; they are
    /// never persisted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const TRUNCATE = 1 << 2;
        const CREATE = 1 << 3;
        const APPEND = 1 << 4;
        const CREATE_NEW = 1 << 5;
    }
}

impl OpenFlags {
    /// Checks the flag invariants, returning a typed error whose message
    /// embeds the rendered description of the offending value.
    pub fn validate(self) -> Result<()> {
        if self.has_unknown_bits() || !self.intersects(Self::READ | Self::WRITE) {
            return Err(FsError::InvalidFlags(format!("can't be {}", self.describe())));
        }
        Ok(())
    }

    /// Renders the flags as a human-readable clause, e.g.
    /// `opened/created for reading and writing with truncation`.
    ///
    /// Only used to enrich error messages, never for control flow.
    pub fn describe(self) -> FlagsDescription {
        FlagsDescription(self)
    }

    pub(crate) fn has_unknown_bits(self) -> bool {
        self.bits() & !Self::all().bits() != 0
    }
}

/// Lazily rendered description of an [`OpenFlags`] value.
pub struct FlagsDescription(OpenFlags);

impl fmt::Display for FlagsDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = self.0;
        if flags.has_unknown_bits() {
            return write!(f, "opened with invalid flags {:#x}", flags.bits());
        }

        if flags.contains(OpenFlags::CREATE) {
            f.write_str("opened/created ")?;
        } else if flags.contains(OpenFlags::CREATE_NEW) {
            f.write_str("created ")?;
        } else {
            f.write_str("opened ")?;
        }

        let read = flags.contains(OpenFlags::READ);
        let write = flags.contains(OpenFlags::WRITE);
        let append = flags.contains(OpenFlags::APPEND);
        if read && write {
            if append {
                f.write_str("for reading and appending")?;
            } else {
                f.write_str("for reading and writing")?;
            }
        } else if write {
            if append {
                f.write_str("for appending")?;
            } else {
                f.write_str("for writing")?;
            }
        } else if read {
            f.write_str("for reading")?;
        } else {
            f.write_str("for nothing")?;
        }

        if flags.contains(OpenFlags::TRUNCATE) {
            f.write_str(" with truncation")?;
        }
        Ok(())
    }
}

/// Advisory whole-file lock request.
///
/// The modes are mutually exclusive; there is no combination. Advisory means
/// the lock constrains other lock-aware holders, not arbitrary I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
    Unlock,
}
