use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jshare_core::Fingerprint;
use jshare_registry::{ClassLoader, ClassLoaderRegistry, LoaderKind};
use jshare_storage::{ArtifactKind, PersistedArchive, StorageHeader};
use serde::Serialize;

use crate::budget::MetaspaceObjType;
use crate::error::LoadError;
use crate::layout::{
    loader_kind_from_tag, ArchivedSharedArchive, ArchivedSharedClass, SharedArchive,
    SCHEMA_VERSION,
};

/// Loader types reported for entries defined by the builtin loaders.
pub const BOOTSTRAP_LOADER: &str = "bootstrap";
pub const PLATFORM_LOADER: &str = "platform";
pub const APP_LOADER: &str = "app";

/// Why one archived class cannot be shared in this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ArchiveLoadMismatch {
    /// No live loader is registered under the recorded identifier.
    UnresolvedLoader { identifier: String },
    /// The loader's classpath no longer matches what was archived.
    SignatureMismatch {
        identifier: String,
        expected: String,
        found: String,
    },
}

impl fmt::Display for ArchiveLoadMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveLoadMismatch::UnresolvedLoader { identifier } => {
                write!(f, "no class loader registered with identifier {identifier}")
            }
            ArchiveLoadMismatch::SignatureMismatch {
                identifier,
                expected,
                found,
            } => write!(
                f,
                "class loader {identifier} has signature {found}, archive expects {expected}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    Shared { loader_type: String },
    Fallback(ArchiveLoadMismatch),
}

/// How one archive entry was bound in this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryBinding {
    pub name: String,
    pub loader_kind: LoaderKind,
    pub loader_identifier: Option<String>,
    pub binding: Binding,
}

impl EntryBinding {
    pub fn is_shared(&self) -> bool {
        matches!(self.binding, Binding::Shared { .. })
    }
}

/// Maps archives built by [`crate::ArchiveBuilder`] and binds their entries.
///
/// Only reads the registry; bindings made here never register anything.
pub struct ArchiveLoader<'r> {
    registry: &'r ClassLoaderRegistry,
}

impl<'r> ArchiveLoader<'r> {
    pub fn new(registry: &'r ClassLoaderRegistry) -> Self {
        Self { registry }
    }

    pub fn load(&self, path: &Path) -> Result<LoadedArchive, LoadError> {
        let archive = PersistedArchive::<SharedArchive>::open(
            path,
            ArtifactKind::SharedClassArchive,
            SCHEMA_VERSION,
        )?;
        let kinds = validate(archive.archived())?;

        let mut loaders = LoaderCache::new(self.registry);
        let bindings = archive
            .archived()
            .entries
            .iter()
            .zip(kinds)
            .map(|(entry, kind)| bind(entry, kind, &mut loaders))
            .collect();

        Ok(LoadedArchive {
            path: path.to_path_buf(),
            archive,
            bindings,
        })
    }
}

/// A mapped archive together with the per-entry outcome.
pub struct LoadedArchive {
    path: PathBuf,
    archive: PersistedArchive<SharedArchive>,
    bindings: Vec<EntryBinding>,
}

impl fmt::Debug for LoadedArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedArchive")
            .field("path", &self.path)
            .field("entries", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

impl LoadedArchive {
    pub fn header(&self) -> &StorageHeader {
        self.archive.header()
    }

    pub fn is_mapped(&self) -> bool {
        self.archive.is_mapped()
    }

    pub fn entries(&self) -> &[EntryBinding] {
        &self.bindings
    }

    pub fn shared(&self) -> impl Iterator<Item = &EntryBinding> {
        self.bindings.iter().filter(|b| b.is_shared())
    }

    pub fn fallbacks(&self) -> impl Iterator<Item = (&EntryBinding, &ArchiveLoadMismatch)> {
        self.bindings.iter().filter_map(|b| match &b.binding {
            Binding::Fallback(mismatch) => Some((b, mismatch)),
            Binding::Shared { .. } => None,
        })
    }

    /// Finds the entry for `name` (either name form) defined by `identifier`.
    pub fn lookup(&self, name: &str, identifier: Option<&str>) -> Option<&EntryBinding> {
        let name = jshare_core::binary_name(name);
        self.bindings
            .iter()
            .find(|b| b.name == name && b.loader_identifier.as_deref() == identifier)
    }

    /// Archived class file bytes for `name`, served from the mapping.
    pub fn class_bytes(&self, name: &str, identifier: Option<&str>) -> Option<&[u8]> {
        let index = self.position(name, identifier)?;
        let archived = self.archive.archived();
        let entry = &archived.entries[index];
        if entry.bytes_len == 0 {
            return None;
        }
        let start = entry.bytes_offset as usize;
        archived
            .class_bytes
            .as_slice()
            .get(start..start + entry.bytes_len as usize)
    }

    pub fn report(&self) -> LoadReport {
        LoadReport {
            archive: self.path.clone(),
            budget_bytes: self.header().summary.budget_bytes,
            entries: self.bindings.len(),
            shared: self.shared().count(),
            fallbacks: self
                .fallbacks()
                .map(|(entry, mismatch)| FallbackEntry {
                    name: entry.name.clone(),
                    mismatch: mismatch.clone(),
                })
                .collect(),
        }
    }

    fn position(&self, name: &str, identifier: Option<&str>) -> Option<usize> {
        let name = jshare_core::binary_name(name);
        self.bindings
            .iter()
            .position(|b| b.name == name && b.loader_identifier.as_deref() == identifier)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub archive: PathBuf,
    pub budget_bytes: u64,
    pub entries: usize,
    pub shared: usize,
    pub fallbacks: Vec<FallbackEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FallbackEntry {
    pub name: String,
    #[serde(flatten)]
    pub mismatch: ArchiveLoadMismatch,
}

/// Resolved loaders and their current signatures, computed once per identifier.
struct LoaderCache<'r> {
    registry: &'r ClassLoaderRegistry,
    resolved: HashMap<String, Option<(Arc<ClassLoader>, Fingerprint)>>,
}

impl<'r> LoaderCache<'r> {
    fn new(registry: &'r ClassLoaderRegistry) -> Self {
        Self {
            registry,
            resolved: HashMap::new(),
        }
    }

    fn get(&mut self, identifier: &str) -> Option<&(Arc<ClassLoader>, Fingerprint)> {
        let registry = self.registry;
        self.resolved
            .entry(identifier.to_owned())
            .or_insert_with(|| {
                registry.resolve(identifier).map(|loader| {
                    let signature = loader.signature();
                    (loader, signature)
                })
            })
            .as_ref()
    }
}

fn shared(loader_type: &str) -> Binding {
    Binding::Shared {
        loader_type: loader_type.to_owned(),
    }
}

/// `kind` has been checked against `entry.loader_identifier` by [`validate`].
fn bind(
    entry: &ArchivedSharedClass,
    kind: LoaderKind,
    loaders: &mut LoaderCache<'_>,
) -> EntryBinding {
    let name = entry.name.as_str().to_owned();
    let identifier = entry.loader_identifier.as_ref().map(|id| id.as_str().to_owned());

    let binding = match kind {
        LoaderKind::Boot => shared(BOOTSTRAP_LOADER),
        LoaderKind::Platform => shared(PLATFORM_LOADER),
        LoaderKind::App => shared(APP_LOADER),
        LoaderKind::Custom => {
            let identifier = identifier.as_deref().unwrap_or_default();
            bind_custom(entry, identifier, loaders)
        }
    };

    match &binding {
        Binding::Shared { loader_type } => tracing::debug!(
            target = "jshare.archive",
            "[CDS load class] Successful loading of class {name} with class loader {loader_type}"
        ),
        Binding::Fallback(mismatch) => tracing::info!(
            target = "jshare.archive",
            "[CDS load class Failed] class {name}: {mismatch}"
        ),
    }

    EntryBinding {
        name,
        loader_kind: kind,
        loader_identifier: identifier,
        binding,
    }
}

fn bind_custom(
    entry: &ArchivedSharedClass,
    identifier: &str,
    loaders: &mut LoaderCache<'_>,
) -> Binding {
    let Some((loader, current)) = loaders.get(identifier) else {
        return Binding::Fallback(ArchiveLoadMismatch::UnresolvedLoader {
            identifier: identifier.to_owned(),
        });
    };
    let expected = entry
        .loader_signature
        .as_ref()
        .map(|s| s.as_str())
        .unwrap_or_default();
    if current.as_str() == expected {
        shared(loader.type_name())
    } else {
        Binding::Fallback(ArchiveLoadMismatch::SignatureMismatch {
            identifier: identifier.to_owned(),
            expected: expected.to_owned(),
            found: current.as_str().to_owned(),
        })
    }
}

/// Checks the archived layout against itself before any entry is trusted.
///
/// Returns the defining loader kind of every entry, in entry order.
fn validate(archive: &ArchivedSharedArchive) -> Result<Vec<LoaderKind>, LoadError> {
    let corrupt = |msg: String| -> Result<Vec<LoaderKind>, LoadError> {
        Err(LoadError::Corrupt(msg))
    };

    let mut used: [Option<u64>; 4] = [None; 4];
    let mut total_capacity = 0u64;
    for region in archive.regions.iter() {
        let Some(kind) = MetaspaceObjType::from_tag(region.kind) else {
            return corrupt(format!("unknown region kind {}", region.kind));
        };
        let slot = &mut used[kind.tag() as usize - 1];
        if slot.is_some() {
            return corrupt(format!("duplicate {kind} region"));
        }
        if region.used > region.capacity {
            return corrupt(format!("{kind} region overflows its capacity"));
        }
        *slot = Some(region.used);
        total_capacity = total_capacity.saturating_add(region.capacity);
    }
    if total_capacity > archive.budget_bytes {
        return corrupt("regions exceed the metaspace budget".to_owned());
    }

    let class_bytes_len = archive.class_bytes.len() as u64;
    let mut kinds = Vec::with_capacity(archive.entries.len());
    for entry in archive.entries.iter() {
        let name = entry.name.as_str();
        let Some(loader_kind) = loader_kind_from_tag(entry.loader_kind) else {
            return corrupt(format!("unknown loader kind {} for {name}", entry.loader_kind));
        };
        if (loader_kind == LoaderKind::Custom) != entry.loader_identifier.is_some() {
            return corrupt(format!("loader identifier of {name} does not match its loader kind"));
        }
        kinds.push(loader_kind);

        for alloc in entry.allocations.iter() {
            let Some(kind) = MetaspaceObjType::from_tag(alloc.kind) else {
                return corrupt(format!("unknown allocation kind {}", alloc.kind));
            };
            let Some(region_used) = used[kind.tag() as usize - 1] else {
                return corrupt(format!("missing {kind} region"));
            };
            let in_bounds = alloc
                .offset
                .checked_add(alloc.size)
                .is_some_and(|end| end <= region_used);
            if !in_bounds || alloc.offset % 8 != 0 {
                return corrupt(format!(
                    "{kind} allocation of {} for {name} is out of bounds",
                    alloc.size
                ));
            }
        }
        let bytes_in_bounds = entry
            .bytes_offset
            .checked_add(entry.bytes_len)
            .is_some_and(|end| end <= class_bytes_len);
        if !bytes_in_bounds {
            return corrupt(format!("class bytes for {name} are out of bounds"));
        }
    }
    Ok(kinds)
}
