//! Memory-mapped, zero-copy storage backend for jshare archives.
//!
//! ## Format
//! Each persisted artifact is stored as:
//! - a fixed-size header (96 bytes, little-endian)
//! - a payload containing an `rkyv` archived root object
//!
//! The header embeds:
//! - artifact kind and schema version
//! - engine version
//! - endianness and pointer-width compatibility checks
//! - compression flag (currently whole-payload zstd or none)
//! - a truncated blake3 hash of the uncompressed payload
//! - a [`HeaderSummary`] (budget and entry count) readable without touching
//!   the payload, and checked against it on open
//!
//! ## Compatibility limitations
//! `rkyv` archives are not portable across endianness or pointer width
//! because container lengths are archived as `usize`. Such mismatches are
//! reported as incompatible artifacts.

mod error;
mod header;
mod persisted;
mod write;

pub use error::StorageError;
pub use header::{
    ArtifactKind, Compression, HeaderSummary, StorageHeader, Summarize, HEADER_LEN,
    MAX_PAYLOAD_LEN_BYTES,
};
pub use persisted::{read_header, CheckableArchived, PersistedArchive};
pub use write::{write_archive_atomic, WriteArchiveOptions};

/// First eight bytes of the payload's blake3 hash.
pub(crate) fn content_hash(payload: &[u8]) -> u64 {
    let hash = blake3::hash(payload);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;

    #[derive(Debug, PartialEq, Eq, rkyv::Archive, rkyv::Serialize)]
    #[archive(check_bytes)]
    struct Catalog {
        budget: u64,
        names: Vec<String>,
    }

    impl Summarize for Catalog {
        fn summary(&self) -> HeaderSummary {
            HeaderSummary {
                budget_bytes: self.budget,
                entry_count: self.names.len() as u64,
            }
        }
    }

    impl Summarize for ArchivedCatalog {
        fn summary(&self) -> HeaderSummary {
            HeaderSummary {
                budget_bytes: self.budget,
                entry_count: self.names.len() as u64,
            }
        }
    }

    const SCHEMA: u32 = 1;
    const KIND: ArtifactKind = ArtifactKind::SharedClassArchive;
    /// Offset of `entry_count` inside the encoded header.
    const ENTRY_COUNT_OFFSET: usize = 72;

    fn catalog() -> Catalog {
        Catalog {
            budget: 1024,
            names: ["java.lang.Object", "java.lang.String", "Main", "Helper"]
                .map(str::to_owned)
                .to_vec(),
        }
    }

    fn write(dir: &Path, options: WriteArchiveOptions) -> PathBuf {
        let path = dir.join("catalog.jsa");
        write_archive_atomic(&path, KIND, SCHEMA, &catalog(), options).unwrap();
        path
    }

    fn open(path: &Path) -> Result<PersistedArchive<Catalog>, StorageError> {
        PersistedArchive::<Catalog>::open(path, KIND, SCHEMA)
    }

    #[test]
    fn uncompressed_archive_is_served_from_the_mapping() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(dir.path(), WriteArchiveOptions::default());

        let loaded = open(&path).unwrap();
        assert!(loaded.is_mapped());
        assert_eq!(loaded.header().summary, catalog().summary());
        let names: Vec<&str> = loaded.archived().names.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, ["java.lang.Object", "java.lang.String", "Main", "Helper"]);
    }

    #[test]
    fn zstd_archive_is_inflated() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            dir.path(),
            WriteArchiveOptions {
                compression: Compression::Zstd,
                zstd_level: 0,
            },
        );

        let loaded = open(&path).unwrap();
        assert!(!loaded.is_mapped());
        assert_eq!(loaded.header().compression, Compression::Zstd);
        assert_eq!(loaded.archived().budget, 1024);
    }

    #[test]
    fn publishing_replaces_the_previous_file_without_leftovers() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("catalog.jsa"), b"stale").unwrap();
        let path = write(dir.path(), WriteArchiveOptions::default());
        write(dir.path(), WriteArchiveOptions::default());

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("catalog.jsa")]);
        open(&path).unwrap();
    }

    #[test]
    fn other_schema_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(dir.path(), WriteArchiveOptions::default());

        let err = PersistedArchive::<Catalog>::open(&path, KIND, SCHEMA + 1).unwrap_err();
        assert!(matches!(err, StorageError::WrongSchema { expected: 2, found: 1 }));
    }

    #[test]
    fn short_file_is_truncated() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(dir.path(), WriteArchiveOptions::default());

        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 1).unwrap();

        let err = open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Truncated { .. }), "{err:?}");
    }

    #[test]
    fn flipped_payload_byte_fails_the_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(dir.path(), WriteArchiveOptions::default());

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        let err = open(&path).unwrap_err();
        assert!(matches!(err, StorageError::HashMismatch { .. }), "{err:?}");
    }

    #[test]
    fn header_summary_must_describe_the_payload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(dir.path(), WriteArchiveOptions::default());

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 8].copy_from_slice(&99u64.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        // The header alone still reads; opening checks it against the payload.
        assert_eq!(read_header(&path, KIND).unwrap().summary.entry_count, 99);
        match open(&path).unwrap_err() {
            StorageError::SummaryMismatch { header, payload } => {
                assert_eq!(header.entry_count, 99);
                assert_eq!(payload, catalog().summary());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn read_header_stops_at_the_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(dir.path(), WriteArchiveOptions::default());

        let header = read_header(&path, KIND).unwrap();
        assert_eq!(header.summary.entry_count, 4);
        assert_eq!(header.summary.budget_bytes, 1024);

        std::fs::write(&path, &std::fs::read(&path).unwrap()[..HEADER_LEN - 1]).unwrap();
        assert!(matches!(
            read_header(&path, KIND),
            Err(StorageError::Truncated { .. })
        ));
    }
}
