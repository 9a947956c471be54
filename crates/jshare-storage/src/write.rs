use std::borrow::Cow;
use std::io::Write;
use std::path::Path;

use rkyv::ser::serializers::AllocSerializer;

use crate::error::StorageError;
use crate::header::{ArtifactKind, Compression, StorageHeader, Summarize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteArchiveOptions {
    pub compression: Compression,
    /// zstd level for [`Compression::Zstd`]; 0 picks zstd's default.
    pub zstd_level: i32,
}

/// Serializes `value` and publishes it at `path` in one step.
///
/// The artifact is written and synced under a temporary name in the
/// destination directory, then renamed over `path`. Readers observe either
/// the previous file or the complete new one, never a partial write. The
/// header summary is taken from `value`.
pub fn write_archive_atomic<T>(
    path: &Path,
    kind: ArtifactKind,
    schema_version: u32,
    value: &T,
    options: WriteArchiveOptions,
) -> Result<StorageHeader, StorageError>
where
    T: rkyv::Archive + rkyv::Serialize<AllocSerializer<256>> + Summarize,
{
    let archived =
        rkyv::to_bytes::<_, 256>(value).map_err(|e| StorageError::Serialize(e.to_string()))?;
    let payload: Cow<'_, [u8]> = match options.compression {
        Compression::None => Cow::Borrowed(&archived[..]),
        Compression::Zstd => Cow::Owned(
            zstd::bulk::compress(&archived, options.zstd_level).map_err(StorageError::Zstd)?,
        ),
    };

    let header = StorageHeader::new(
        kind,
        schema_version,
        options.compression,
        payload.len() as u64,
        archived.len() as u64,
        crate::content_hash(&archived),
        value.summary(),
    );

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut prefix = path.file_name().unwrap_or_default().to_os_string();
    prefix.push(".");
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(&header.encode())?;
    tmp.write_all(&payload)?;
    tmp.as_file().sync_all()?;
    // A failed persist drops the temporary file, which removes it.
    tmp.persist(path).map_err(|err| StorageError::Io(err.error))?;

    tracing::debug!(
        target = "jshare.storage",
        path = %path.display(),
        compression = ?options.compression,
        payload_len = header.payload_len,
        uncompressed_len = header.uncompressed_len,
        "published artifact"
    );
    Ok(header)
}
