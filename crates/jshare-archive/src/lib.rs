//! Building and mapping shared class archives.
//!
//! [`ArchiveBuilder`] lays a converted classlist out in typed metaspace
//! regions under a fixed [`MetaspaceBudget`] and publishes the result
//! atomically through `jshare-storage`. [`ArchiveLoader`] maps an archive
//! into a later process and binds each entry to its recorded loader,
//! falling back entry by entry when the loader is gone or has changed.

mod budget;
mod builder;
mod error;
mod layout;
mod loader;
mod source;

pub use budget::{
    MetaspaceArena, MetaspaceBudget, MetaspaceObjType, Placement, Region, RegionShares,
};
pub use builder::{
    ArchiveBuilder, BuildReport, SkippedClass, CP_HEADER_BYTES, INSTANCE_KLASS_BYTES,
};
pub use error::{BuildError, LoadError};
pub use layout::{Allocation, RegionInfo, SharedArchive, SharedClass, SCHEMA_VERSION};
pub use loader::{
    ArchiveLoadMismatch, ArchiveLoader, Binding, EntryBinding, FallbackEntry, LoadReport,
    LoadedArchive, APP_LOADER, BOOTSTRAP_LOADER, PLATFORM_LOADER,
};
pub use source::{ClassBytesSource, NoClassBytes, OriginClassSource};

/// Reads only the header of the archive at `path`.
pub fn read_archive_header(
    path: &std::path::Path,
) -> Result<jshare_storage::StorageHeader, jshare_storage::StorageError> {
    jshare_storage::read_header(path, jshare_storage::ArtifactKind::SharedClassArchive)
}
