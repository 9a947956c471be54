use std::collections::HashSet;
use std::path::{Path, PathBuf};

use jshare_classlist::{ClassList, ClassRecord};
use jshare_registry::ClassLoaderRegistry;
use jshare_storage::{ArtifactKind, Compression, WriteArchiveOptions};
use serde::Serialize;

use crate::budget::{
    MetaspaceArena, MetaspaceBudget, MetaspaceObjType, Placement, Region, RegionShares,
};
use crate::error::BuildError;
use crate::layout::{
    loader_kind_tag, Allocation, RegionInfo, SharedArchive, SharedClass, SCHEMA_VERSION,
};
use crate::source::{ClassBytesSource, OriginClassSource};

/// Fixed part of an instance class, before its supertype table.
pub const INSTANCE_KLASS_BYTES: u64 = 464;
/// Fixed part of a constant pool, before its slots.
pub const CP_HEADER_BYTES: u64 = 80;
const SYMBOL_HEADER_BYTES: u64 = 8;
const ARRAY_HEADER_BYTES: u64 = 16;
const CLASS_FILE_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub archive: PathBuf,
    pub budget_bytes: u64,
    pub classes: usize,
    pub skipped: Vec<SkippedClass>,
    pub regions: Vec<Region>,
}

/// A classlist record left out of the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedClass {
    pub name: String,
    pub loader_identifier: Option<String>,
    pub reason: &'static str,
}

/// Lays a classlist out in a bounded metaspace and publishes the result.
///
/// Records are placed one at a time in list order. Each record allocates its
/// symbols, its class, its constant pool and finally its class bytes, each in
/// the region reserved for that object type. The first allocation that does
/// not fit aborts the whole build: nothing is written and any archive left at
/// the target path by an earlier run is removed, so callers can retry with a
/// larger budget without ever picking up a stale or partial file.
pub struct ArchiveBuilder<'r, S = OriginClassSource> {
    registry: &'r ClassLoaderRegistry,
    budget: MetaspaceBudget,
    shares: RegionShares,
    source: S,
    write_options: WriteArchiveOptions,
}

impl<'r> ArchiveBuilder<'r, OriginClassSource> {
    pub fn new(registry: &'r ClassLoaderRegistry, budget: MetaspaceBudget) -> Self {
        Self {
            registry,
            budget,
            shares: RegionShares::default(),
            source: OriginClassSource,
            write_options: WriteArchiveOptions::default(),
        }
    }
}

impl<'r, S: ClassBytesSource> ArchiveBuilder<'r, S> {
    pub fn with_region_shares(mut self, shares: RegionShares) -> Self {
        self.shares = shares;
        self
    }

    pub fn with_source<T: ClassBytesSource>(self, source: T) -> ArchiveBuilder<'r, T> {
        ArchiveBuilder {
            registry: self.registry,
            budget: self.budget,
            shares: self.shares,
            source,
            write_options: self.write_options,
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.write_options.compression = compression;
        self
    }

    pub fn build(&self, list: &ClassList, path: &Path) -> Result<BuildReport, BuildError> {
        match self.build_inner(list, path) {
            Ok(report) => Ok(report),
            Err(err) => {
                if let BuildError::MetaspaceExhausted { kind, size, .. } = &err {
                    tracing::error!(
                        target = "jshare.archive",
                        "Failed allocating metaspace object type {kind} of size {size}. \
                         CDS dump aborted."
                    );
                }
                discard_stale(path);
                Err(err)
            }
        }
    }

    fn build_inner(&self, list: &ClassList, path: &Path) -> Result<BuildReport, BuildError> {
        if self.budget.bytes() == 0 {
            return Err(BuildError::InvalidBudget);
        }
        let mut arena = MetaspaceArena::new(self.budget, self.shares)?;

        tracing::info!(
            target = "jshare.archive",
            classes = list.len(),
            budget = self.budget.bytes(),
            "Loading classes to share ..."
        );

        let mut interned = HashSet::new();
        let mut class_bytes = Vec::new();
        let mut entries = Vec::with_capacity(list.len());
        let mut skipped = Vec::new();

        for record in list {
            let loader_signature = match record.loader_identifier() {
                None => None,
                Some(identifier) => match self.registry.signature_of(identifier) {
                    Some(signature) => Some(signature.as_str().to_owned()),
                    None => {
                        tracing::warn!(
                            target = "jshare.archive",
                            class = record.name(),
                            identifier,
                            "skipping class: loader identifier is not registered"
                        );
                        skipped.push(SkippedClass {
                            name: record.name().to_owned(),
                            loader_identifier: Some(identifier.to_owned()),
                            reason: "unregistered loader",
                        });
                        continue;
                    }
                },
            };

            let bytes = self.read_class_bytes(record)?;
            let allocations = place(&mut arena, &mut interned, record, bytes.as_deref())?;

            let bytes_offset = class_bytes.len() as u64;
            let bytes_len = bytes.as_ref().map_or(0, |b| b.len() as u64);
            if let Some(bytes) = bytes {
                class_bytes.extend_from_slice(&bytes);
            }

            entries.push(SharedClass {
                name: record.name().to_owned(),
                origin: record.origin().to_owned(),
                loader_kind: loader_kind_tag(record.loader().kind()),
                loader_identifier: record.loader_identifier().map(str::to_owned),
                loader_signature,
                supertypes: record.supertypes().to_vec(),
                allocations,
                bytes_offset,
                bytes_len,
            });
        }

        let regions = arena.regions().to_vec();
        let archive = SharedArchive {
            budget_bytes: self.budget.bytes(),
            regions: regions
                .iter()
                .map(|r| RegionInfo {
                    kind: r.kind.tag(),
                    capacity: r.capacity,
                    used: r.used,
                })
                .collect(),
            class_bytes,
            entries,
        };
        jshare_storage::write_archive_atomic(
            path,
            ArtifactKind::SharedClassArchive,
            SCHEMA_VERSION,
            &archive,
            self.write_options,
        )?;

        tracing::info!(
            target = "jshare.archive",
            classes = archive.entries.len(),
            skipped = skipped.len(),
            path = %path.display(),
            "Loading classes to share: done."
        );

        Ok(BuildReport {
            archive: path.to_path_buf(),
            budget_bytes: archive.budget_bytes,
            classes: archive.entries.len(),
            skipped,
            regions,
        })
    }

    fn read_class_bytes(&self, record: &ClassRecord) -> Result<Option<Vec<u8>>, BuildError> {
        if record.is_bootstrap() {
            return Ok(None);
        }
        self.source
            .class_bytes(record.name(), record.origin())
            .map_err(|source| BuildError::ClassBytes {
                class: record.name().to_owned(),
                origin: record.origin().to_owned(),
                source,
            })
    }
}

/// Allocates every metaspace object for one record, in category order.
fn place(
    arena: &mut MetaspaceArena,
    interned: &mut HashSet<String>,
    record: &ClassRecord,
    bytes: Option<&[u8]>,
) -> Result<Vec<Allocation>, BuildError> {
    let mut placements: Vec<Placement> = Vec::new();

    let mut symbols = 0u64;
    let supertypes = record.supertypes().iter().map(String::as_str);
    for symbol in std::iter::once(record.name()).chain(supertypes) {
        symbols += 1;
        if interned.contains(symbol) {
            continue;
        }
        let size = symbol.len() as u64 + SYMBOL_HEADER_BYTES;
        placements.push(arena.allocate(MetaspaceObjType::Symbol, size)?);
        interned.insert(symbol.to_owned());
    }

    let klass = INSTANCE_KLASS_BYTES + 8 * record.supertypes().len() as u64;
    placements.push(arena.allocate(MetaspaceObjType::Class, klass)?);

    // Without class bytes assume one Utf8 and one Class slot per symbol.
    let cp_count = bytes
        .and_then(constant_pool_count)
        .unwrap_or(1 + 2 * symbols);
    let constant_pool = CP_HEADER_BYTES + 8 * cp_count;
    placements.push(arena.allocate(MetaspaceObjType::ConstantPool, constant_pool)?);

    if let Some(bytes) = bytes {
        let array = bytes.len() as u64 + ARRAY_HEADER_BYTES;
        placements.push(arena.allocate(MetaspaceObjType::TypeArrayU1, array)?);
    }

    Ok(placements
        .into_iter()
        .map(|p| Allocation {
            kind: p.kind.tag(),
            offset: p.offset,
            size: p.size,
        })
        .collect())
}

/// `constant_pool_count` from a class file header, if the bytes look like one.
fn constant_pool_count(bytes: &[u8]) -> Option<u64> {
    if bytes.len() < 10 || bytes[..4] != CLASS_FILE_MAGIC {
        return None;
    }
    Some(u64::from(u16::from_be_bytes([bytes[8], bytes[9]])))
}

fn discard_stale(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(
            target = "jshare.archive",
            path = %path.display(),
            "removed stale archive"
        ),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(
            target = "jshare.archive",
            path = %path.display(),
            error = %err,
            "failed to remove stale archive"
        ),
    }
}
