use jshare_core::Endian;
use thiserror::Error;

use crate::header::{ArtifactKind, HeaderSummary};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("incompatible artifact kind: expected {expected:?}, found {found:?}")]
    WrongArtifact {
        expected: ArtifactKind,
        found: ArtifactKind,
    },
    #[error("incompatible schema version: expected {expected}, found {found}")]
    WrongSchema { expected: u32, found: u32 },
    #[error("incompatible engine version: expected {expected}, found {found}")]
    WrongEngineVersion { expected: String, found: String },
    #[error("incompatible target endian: expected {expected:?}, found {found:?}")]
    WrongEndian { expected: Endian, found: Endian },
    #[error("incompatible pointer width: expected {expected}, found {found}")]
    WrongPointerWidth { expected: u8, found: u8 },
    #[error("truncated file: expected at least {expected} bytes, found {found}")]
    Truncated { expected: u64, found: u64 },
    #[error("payload is not aligned to {required} bytes")]
    Misaligned { required: usize },
    #[error("unsupported compression tag {0}")]
    UnsupportedCompression(u8),
    #[error("payload size {payload_len} exceeds the supported maximum")]
    OversizedPayload { payload_len: u64 },
    #[error("payload hash mismatch: expected {expected:016x}, found {found:016x}")]
    HashMismatch { expected: u64, found: u64 },
    #[error("zstd: {0}")]
    Zstd(#[source] std::io::Error),
    #[error("failed to serialize payload: {0}")]
    Serialize(String),
    #[error("payload failed validation: {0}")]
    Validation(String),
    /// The header describes a different payload than the one it carries.
    #[error("header summary {header:?} does not describe the payload ({payload:?})")]
    SummaryMismatch {
        header: HeaderSummary,
        payload: HeaderSummary,
    },
}
