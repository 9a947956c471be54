use jshare_storage::StorageError;
use thiserror::Error;

use crate::budget::MetaspaceObjType;

/// Why an archive build did not publish a file.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A region ran out of room. The build stops at the first such failure.
    #[error(
        "metaspace exhausted: {kind} object of {size} bytes does not fit \
         ({used}/{capacity} bytes used)"
    )]
    MetaspaceExhausted {
        kind: MetaspaceObjType,
        size: u64,
        capacity: u64,
        used: u64,
    },
    #[error("metaspace budget must be non-zero")]
    InvalidBudget,
    #[error("region shares must sum to 100, got {total}")]
    InvalidRegionShares { total: u32 },
    #[error("failed to read class bytes for {class} from {origin}")]
    ClassBytes {
        class: String,
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BuildError {
    /// Whether this is the clean budget abort rather than a defect.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, BuildError::MetaspaceExhausted { .. })
    }
}

/// Failure to map an archive at all. Per-entry problems are reported as
/// [`crate::ArchiveLoadMismatch`] instead.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("corrupt archive: {0}")]
    Corrupt(String),
}
