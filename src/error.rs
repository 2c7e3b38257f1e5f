use thiserror::Error;

/// Errors surfaced by the FAT entry engine to its callers.
///
/// Mirrors the flat, one-variant-per-failure-category shape of
/// `moses_core::MosesError`: every variant carries enough context to log
/// without a second lookup, and lower-level I/O failures fold into
/// [`FatEngineError::IoError`] via `#[from]`.
#[derive(Debug, Error)]
pub enum FatEngineError {
    /// Entry index out of `[2, max_cluster)`, or a volume parameter that
    /// failed validation at construction time. The caller is at fault;
    /// the volume is flagged via the error reporter before this is returned.
    #[error("invalid FAT access: {0}")]
    Invalid(String),

    /// A block load, sync, or mirror write failed.
    #[error("FAT I/O error: {0}")]
    IoError(String),

    /// The allocator scanned the whole table without finding enough
    /// free entries. The free-cluster counter is reset to 0 and marked
    /// valid as a side effect.
    #[error("no space left on FAT volume")]
    NoSpace,

    /// A mirror buffer could not be allocated.
    #[error("out of memory allocating FAT mirror buffer")]
    OutOfMemory,

    /// The table is structurally corrupt (e.g. a `FREE` entry found
    /// mid-chain during `free_chain`). No local recovery is attempted.
    #[error("FAT table corruption detected: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for FatEngineError {
    fn from(e: std::io::Error) -> Self {
        FatEngineError::IoError(e.to_string())
    }
}

pub type FatResult<T> = Result<T, FatEngineError>;
