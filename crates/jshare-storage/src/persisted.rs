use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::ops::Range;
use std::path::Path;
use std::ptr::NonNull;

use memmap2::Mmap;
use rkyv::util::AlignedVec;
use rkyv::Archived;

use crate::error::StorageError;
use crate::header::{ArtifactKind, Compression, StorageHeader, Summarize, HEADER_LEN};

/// Archived roots that `rkyv` can validate.
pub trait CheckableArchived:
    for<'a> rkyv::bytecheck::CheckBytes<rkyv::validation::validators::DefaultValidator<'a>>
{
}

impl<T> CheckableArchived for T where
    T: for<'a> rkyv::bytecheck::CheckBytes<rkyv::validation::validators::DefaultValidator<'a>>
{
}

/// The file as read from disk.
enum Source {
    Map(Mmap),
    Read(Vec<u8>),
}

impl Source {
    fn bytes(&self) -> &[u8] {
        match self {
            Source::Map(map) => &map[..],
            Source::Read(bytes) => bytes.as_slice(),
        }
    }
}

/// Where the uncompressed payload lives.
enum Payload {
    Mapped { map: Mmap, range: Range<usize> },
    Inflated(AlignedVec),
}

impl Payload {
    fn bytes(&self) -> &[u8] {
        match self {
            Payload::Mapped { map, range } => &map[range.clone()],
            Payload::Inflated(bytes) => bytes.as_slice(),
        }
    }
}

/// A validated `rkyv` root read from a persisted artifact.
///
/// Uncompressed artifacts are served straight from the file mapping;
/// compressed ones (or any file that cannot be mapped) from an owned buffer.
pub struct PersistedArchive<T: rkyv::Archive> {
    header: StorageHeader,
    payload: Payload,
    root: NonNull<Archived<T>>,
    _marker: PhantomData<T>,
}

impl<T: rkyv::Archive> std::fmt::Debug for PersistedArchive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedArchive")
            .field("header", &self.header)
            .field("mapped", &matches!(self.payload, Payload::Mapped { .. }))
            .finish_non_exhaustive()
    }
}

impl<T> PersistedArchive<T>
where
    T: rkyv::Archive,
    Archived<T>: CheckableArchived + Summarize,
{
    /// Opens the artifact at `path` and validates it before handing out the
    /// root: header compatibility, payload length and hash, `rkyv` structure,
    /// and finally the header summary against the payload itself.
    pub fn open(path: &Path, kind: ArtifactKind, schema: u32) -> Result<Self, StorageError> {
        let file = File::open(path)?;
        // Safety: artifacts are only ever replaced by rename, never written in
        // place, so the mapped file does not change underneath us.
        let source = match unsafe { Mmap::map(&file) } {
            Ok(map) => Source::Map(map),
            Err(err) => {
                tracing::debug!(
                    target = "jshare.storage",
                    path = %path.display(),
                    error = %err,
                    "mmap failed; reading artifact into memory"
                );
                Source::Read(std::fs::read(path)?)
            }
        };

        let header = StorageHeader::decode(source.bytes())?;
        header.check_compatible(kind, schema)?;
        let range = header.payload_range(source.bytes().len())?;

        let payload = match (header.compression, source) {
            (Compression::None, Source::Map(map)) => Payload::Mapped { map, range },
            (Compression::None, Source::Read(bytes)) => Payload::Inflated(aligned(&bytes[range])),
            (Compression::Zstd, source) => {
                let inflated = inflate(&source.bytes()[range], header.uncompressed_len)?;
                Payload::Inflated(aligned(&inflated))
            }
        };

        Self::validate(header, payload)
    }

    fn validate(header: StorageHeader, payload: Payload) -> Result<Self, StorageError> {
        let bytes = payload.bytes();

        let required = std::mem::align_of::<Archived<T>>();
        if !(bytes.as_ptr() as usize).is_multiple_of(required) {
            return Err(StorageError::Misaligned { required });
        }
        if bytes.len() as u64 != header.uncompressed_len {
            return Err(StorageError::InvalidHeader("uncompressed length mismatch"));
        }
        let found = crate::content_hash(bytes);
        if found != header.content_hash {
            return Err(StorageError::HashMismatch {
                expected: header.content_hash,
                found,
            });
        }

        let root = rkyv::check_archived_root::<T>(bytes)
            .map_err(|e| StorageError::Validation(e.to_string()))?;
        let summary = root.summary();
        if summary != header.summary {
            return Err(StorageError::SummaryMismatch {
                header: header.summary,
                payload: summary,
            });
        }
        let root = NonNull::from(root);

        Ok(Self {
            header,
            payload,
            root,
            _marker: PhantomData,
        })
    }

    pub fn header(&self) -> &StorageHeader {
        &self.header
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.payload, Payload::Mapped { .. })
    }

    pub fn archived(&self) -> &Archived<T> {
        // Safety: `root` was validated by `check_archived_root` and points into
        // `payload`, whose bytes never move and live as long as `self`.
        unsafe { self.root.as_ref() }
    }
}

// Safety: the archived root is immutable and only reachable through `&self`;
// the pointer always targets `payload`, which moves with the value.
unsafe impl<T> Send for PersistedArchive<T>
where
    T: rkyv::Archive,
    Archived<T>: Sync,
{
}

unsafe impl<T> Sync for PersistedArchive<T>
where
    T: rkyv::Archive,
    Archived<T>: Sync,
{
}

/// Reads only the fixed header of the artifact at `path`.
///
/// The payload is neither read nor validated, so the summary is whatever the
/// writer recorded.
pub fn read_header(path: &Path, kind: ArtifactKind) -> Result<StorageHeader, StorageError> {
    let mut bytes = Vec::with_capacity(HEADER_LEN);
    File::open(path)?
        .take(HEADER_LEN as u64)
        .read_to_end(&mut bytes)?;
    let header = StorageHeader::decode(&bytes)?;
    header.check_kind(kind)?;
    Ok(header)
}

fn inflate(payload: &[u8], uncompressed_len: u64) -> Result<Vec<u8>, StorageError> {
    let capacity = usize::try_from(uncompressed_len).map_err(|_| {
        StorageError::OversizedPayload {
            payload_len: uncompressed_len,
        }
    })?;
    zstd::bulk::decompress(payload, capacity).map_err(StorageError::Zstd)
}

fn aligned(bytes: &[u8]) -> AlignedVec {
    let mut out = AlignedVec::with_capacity(bytes.len());
    out.extend_from_slice(bytes);
    out
}
