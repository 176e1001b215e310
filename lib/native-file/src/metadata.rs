/// Point-in-time snapshot of a file's metadata.
///
/// Produced fresh on every `stat` call, never cached. Timestamps are
/// normalized to nanoseconds since the Unix epoch on every platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Size of the file in bytes.
    pub size: u64,
    /// Last access time, Unix-epoch nanoseconds.
    pub atime_ns: u64,
    /// Last modification time, Unix-epoch nanoseconds.
    pub mtime_ns: u64,
    /// The handle refers to a directory.
    pub is_dir: bool,
    /// The handle refers to a regular file.
    pub is_reg: bool,
}
