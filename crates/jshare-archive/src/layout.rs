//! The archived payload. Everything here is `rkyv`-validated on load.

use jshare_registry::LoaderKind;
use jshare_storage::{HeaderSummary, Summarize};

/// Bumped whenever the layout below changes.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[archive(check_bytes)]
pub struct SharedArchive {
    pub budget_bytes: u64,
    pub regions: Vec<RegionInfo>,
    /// Concatenated class file bytes; entries point into it.
    pub class_bytes: Vec<u8>,
    pub entries: Vec<SharedClass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[archive(check_bytes)]
pub struct RegionInfo {
    /// [`crate::MetaspaceObjType::tag`].
    pub kind: u8,
    pub capacity: u64,
    pub used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[archive(check_bytes)]
pub struct SharedClass {
    pub name: String,
    pub origin: String,
    /// [`loader_kind_tag`] of the defining loader.
    pub loader_kind: u8,
    /// Set exactly when `loader_kind` is the custom tag.
    pub loader_identifier: Option<String>,
    /// Hex signature captured from the registry at build time.
    pub loader_signature: Option<String>,
    pub supertypes: Vec<String>,
    pub allocations: Vec<Allocation>,
    pub bytes_offset: u64,
    pub bytes_len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[archive(check_bytes)]
pub struct Allocation {
    pub kind: u8,
    pub offset: u64,
    pub size: u64,
}

impl Summarize for SharedArchive {
    fn summary(&self) -> HeaderSummary {
        HeaderSummary {
            budget_bytes: self.budget_bytes,
            entry_count: self.entries.len() as u64,
        }
    }
}

impl Summarize for ArchivedSharedArchive {
    fn summary(&self) -> HeaderSummary {
        HeaderSummary {
            budget_bytes: self.budget_bytes,
            entry_count: self.entries.len() as u64,
        }
    }
}

pub fn loader_kind_tag(kind: LoaderKind) -> u8 {
    match kind {
        LoaderKind::Boot => 0,
        LoaderKind::Platform => 1,
        LoaderKind::App => 2,
        LoaderKind::Custom => 3,
    }
}

pub fn loader_kind_from_tag(tag: u8) -> Option<LoaderKind> {
    match tag {
        0 => Some(LoaderKind::Boot),
        1 => Some(LoaderKind::Platform),
        2 => Some(LoaderKind::App),
        3 => Some(LoaderKind::Custom),
        _ => None,
    }
}
