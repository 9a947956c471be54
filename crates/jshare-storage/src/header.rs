use std::io::Cursor;
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use jshare_core::Endian;

use crate::error::StorageError;

/// Size of the fixed header preceding every payload.
///
/// A multiple of 16 so that an mmap'd payload keeps `rkyv`'s root alignment.
pub const HEADER_LEN: usize = 96;

/// Upper bound on a payload we are willing to map or decompress.
pub const MAX_PAYLOAD_LEN_BYTES: u64 = 4 * 1024 * 1024 * 1024;

const MAGIC: [u8; 4] = *b"JSHA";
const HEADER_VERSION: u16 = 1;
const VERSION_FIELD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArtifactKind {
    /// Prebuilt class metadata produced by the archive builder.
    SharedClassArchive = 1,
}

impl ArtifactKind {
    fn from_u8(value: u8) -> Result<Self, StorageError> {
        match value {
            1 => Ok(ArtifactKind::SharedClassArchive),
            _ => Err(StorageError::InvalidHeader("unknown artifact kind")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Compression {
    #[default]
    None = 0,
    Zstd = 1,
}

impl Compression {
    fn from_u8(value: u8) -> Result<Self, StorageError> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zstd),
            other => Err(StorageError::UnsupportedCompression(other)),
        }
    }
}

/// Counters copied into the header so tools can describe an archive without
/// validating its payload.
///
/// The writer takes them from the value being stored and the reader checks
/// them against the validated payload, so a header can never describe a
/// payload other than its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderSummary {
    /// Metaspace budget the archive was built against.
    pub budget_bytes: u64,
    /// Number of class entries in the payload.
    pub entry_count: u64,
}

/// Implemented by stored roots (both the owned value and its archived form).
pub trait Summarize {
    fn summary(&self) -> HeaderSummary;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHeader {
    pub kind: ArtifactKind,
    pub schema_version: u32,
    pub engine_version: String,
    pub endian: Endian,
    pub pointer_width: u8,
    pub compression: Compression,
    pub payload_offset: u64,
    pub payload_len: u64,
    pub uncompressed_len: u64,
    pub content_hash: u64,
    pub summary: HeaderSummary,
}

impl StorageHeader {
    pub fn new(
        kind: ArtifactKind,
        schema_version: u32,
        compression: Compression,
        payload_len: u64,
        uncompressed_len: u64,
        content_hash: u64,
        summary: HeaderSummary,
    ) -> Self {
        Self {
            kind,
            schema_version,
            engine_version: jshare_core::JSHARE_VERSION.to_owned(),
            endian: jshare_core::target_endian(),
            pointer_width: jshare_core::target_pointer_width(),
            compression,
            payload_offset: HEADER_LEN as u64,
            payload_len,
            uncompressed_len,
            content_hash,
            summary,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC);

        let mut cursor = Cursor::new(&mut out[4..]);
        // Writes into a fixed, correctly sized buffer cannot fail.
        let _ = cursor.write_u16::<LittleEndian>(HEADER_VERSION);
        let _ = cursor.write_u8(self.kind as u8);
        let _ = cursor.write_u8(self.compression as u8);
        let _ = cursor.write_u32::<LittleEndian>(self.schema_version);
        let _ = cursor.write_u8(self.endian.to_u8());
        let _ = cursor.write_u8(self.pointer_width);

        let version = self.engine_version.as_bytes();
        let len = version.len().min(VERSION_FIELD_LEN);
        out[16..16 + len].copy_from_slice(&version[..len]);

        let mut cursor = Cursor::new(&mut out[32..]);
        for value in [
            self.payload_offset,
            self.payload_len,
            self.uncompressed_len,
            self.content_hash,
            self.summary.budget_bytes,
            self.summary.entry_count,
        ] {
            let _ = cursor.write_u64::<LittleEndian>(value);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < HEADER_LEN {
            return Err(StorageError::Truncated {
                expected: HEADER_LEN as u64,
                found: bytes.len() as u64,
            });
        }
        if bytes[0..4] != MAGIC {
            return Err(StorageError::InvalidHeader("bad magic"));
        }

        let mut cursor = Cursor::new(&bytes[4..16]);
        let header_version = cursor.read_u16::<LittleEndian>()?;
        if header_version != HEADER_VERSION {
            return Err(StorageError::InvalidHeader("unsupported header version"));
        }
        let kind = ArtifactKind::from_u8(cursor.read_u8()?)?;
        let compression = Compression::from_u8(cursor.read_u8()?)?;
        let schema_version = cursor.read_u32::<LittleEndian>()?;
        let endian = Endian::from_u8(cursor.read_u8()?)
            .ok_or(StorageError::InvalidHeader("unknown endian tag"))?;
        let pointer_width = cursor.read_u8()?;

        let version_field = &bytes[16..16 + VERSION_FIELD_LEN];
        let version_len = version_field
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(VERSION_FIELD_LEN);
        let engine_version = std::str::from_utf8(&version_field[..version_len])
            .map_err(|_| StorageError::InvalidHeader("engine version is not utf-8"))?
            .to_owned();

        let mut cursor = Cursor::new(&bytes[32..HEADER_LEN]);
        let payload_offset = cursor.read_u64::<LittleEndian>()?;
        let payload_len = cursor.read_u64::<LittleEndian>()?;
        let uncompressed_len = cursor.read_u64::<LittleEndian>()?;
        let content_hash = cursor.read_u64::<LittleEndian>()?;
        let budget_bytes = cursor.read_u64::<LittleEndian>()?;
        let entry_count = cursor.read_u64::<LittleEndian>()?;

        if payload_len > MAX_PAYLOAD_LEN_BYTES || uncompressed_len > MAX_PAYLOAD_LEN_BYTES {
            return Err(StorageError::OversizedPayload {
                payload_len: payload_len.max(uncompressed_len),
            });
        }

        Ok(Self {
            kind,
            schema_version,
            engine_version,
            endian,
            pointer_width,
            compression,
            payload_offset,
            payload_len,
            uncompressed_len,
            content_hash,
            summary: HeaderSummary {
                budget_bytes,
                entry_count,
            },
        })
    }

    pub fn check_kind(&self, expected: ArtifactKind) -> Result<(), StorageError> {
        if self.kind != expected {
            return Err(StorageError::WrongArtifact {
                expected,
                found: self.kind,
            });
        }
        Ok(())
    }

    /// Whether a payload described by this header can be read by this build
    /// on this target.
    pub fn check_compatible(&self, kind: ArtifactKind, schema: u32) -> Result<(), StorageError> {
        self.check_kind(kind)?;
        if self.schema_version != schema {
            return Err(StorageError::WrongSchema {
                expected: schema,
                found: self.schema_version,
            });
        }
        if self.engine_version != jshare_core::JSHARE_VERSION {
            return Err(StorageError::WrongEngineVersion {
                expected: jshare_core::JSHARE_VERSION.to_owned(),
                found: self.engine_version.clone(),
            });
        }
        let endian = jshare_core::target_endian();
        if self.endian != endian {
            return Err(StorageError::WrongEndian {
                expected: endian,
                found: self.endian,
            });
        }
        let pointer_width = jshare_core::target_pointer_width();
        if self.pointer_width != pointer_width {
            return Err(StorageError::WrongPointerWidth {
                expected: pointer_width,
                found: self.pointer_width,
            });
        }
        Ok(())
    }

    /// Byte range of the stored payload inside a file of `file_len` bytes.
    pub(crate) fn payload_range(&self, file_len: usize) -> Result<Range<usize>, StorageError> {
        if self.payload_offset != HEADER_LEN as u64 {
            return Err(StorageError::InvalidHeader("unexpected payload offset"));
        }
        let end = self.payload_offset + self.payload_len;
        if (file_len as u64) < end {
            return Err(StorageError::Truncated {
                expected: end,
                found: file_len as u64,
            });
        }
        Ok(HEADER_LEN..end as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_survives_encode_decode() {
        let header = StorageHeader::new(
            ArtifactKind::SharedClassArchive,
            3,
            Compression::Zstd,
            100,
            200,
            0xdead_beef,
            HeaderSummary {
                budget_bytes: 12 * 1024 * 1024,
                entry_count: 4,
            },
        );
        let decoded = StorageHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = StorageHeader::new(
            ArtifactKind::SharedClassArchive,
            1,
            Compression::None,
            0,
            0,
            0,
            HeaderSummary::default(),
        )
        .encode();
        bytes[0] = b'X';
        assert!(matches!(
            StorageHeader::decode(&bytes),
            Err(StorageError::InvalidHeader("bad magic"))
        ));
    }

    #[test]
    fn payload_must_fit_the_file() {
        let header = StorageHeader::new(
            ArtifactKind::SharedClassArchive,
            1,
            Compression::None,
            64,
            64,
            0,
            HeaderSummary::default(),
        );
        assert_eq!(header.payload_range(HEADER_LEN + 64).unwrap(), HEADER_LEN..HEADER_LEN + 64);
        assert!(matches!(
            header.payload_range(HEADER_LEN + 63),
            Err(StorageError::Truncated { expected: 160, found: 159 })
        ));
    }

    #[test]
    fn foreign_schema_is_incompatible() {
        let header = StorageHeader::new(
            ArtifactKind::SharedClassArchive,
            1,
            Compression::None,
            0,
            0,
            0,
            HeaderSummary::default(),
        );
        header.check_compatible(ArtifactKind::SharedClassArchive, 1).unwrap();
        assert!(matches!(
            header.check_compatible(ArtifactKind::SharedClassArchive, 2),
            Err(StorageError::WrongSchema { expected: 2, found: 1 })
        ));
    }
}
