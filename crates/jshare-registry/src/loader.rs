use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use jshare_core::Fingerprint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classpath::{ClasspathEntry, LocatedClass};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    Boot,
    Platform,
    App,
    Custom,
}

/// A class loader instance as seen by the sharing engine.
///
/// The engine never defines classes itself; it only needs to know what kind
/// of loader this is, what runtime type it has (for log lines) and which
/// classpath it resolves from (for its signature).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassLoader {
    kind: LoaderKind,
    type_name: String,
    name: Option<String>,
    classpath: Vec<ClasspathEntry>,
}

impl ClassLoader {
    pub const BOOT_TYPE: &'static str = "bootstrap";
    pub const PLATFORM_TYPE: &'static str = "jdk/internal/loader/ClassLoaders$PlatformClassLoader";
    pub const APP_TYPE: &'static str = "jdk/internal/loader/ClassLoaders$AppClassLoader";

    pub fn boot() -> Self {
        Self::builtin(LoaderKind::Boot, Self::BOOT_TYPE, Vec::new())
    }

    pub fn platform() -> Self {
        Self::builtin(LoaderKind::Platform, Self::PLATFORM_TYPE, Vec::new())
    }

    pub fn app(classpath: Vec<ClasspathEntry>) -> Self {
        Self::builtin(LoaderKind::App, Self::APP_TYPE, classpath)
    }

    /// A user-defined loader of runtime type `type_name`
    /// (e.g. `java/net/URLClassLoader`).
    pub fn custom(type_name: impl Into<String>, classpath: Vec<ClasspathEntry>) -> Self {
        Self {
            kind: LoaderKind::Custom,
            type_name: jshare_core::internal_name(&type_name.into()),
            name: None,
            classpath,
        }
    }

    fn builtin(kind: LoaderKind, type_name: &str, classpath: Vec<ClasspathEntry>) -> Self {
        Self {
            kind,
            type_name: type_name.to_owned(),
            name: None,
            classpath,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(&self) -> LoaderKind {
        self.kind
    }

    /// Runtime type name in internal form, as printed in load log lines.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn classpath(&self) -> &[ClasspathEntry] {
        &self.classpath
    }

    /// Boot, platform and app loaders are known to every process and never
    /// need an identifier.
    pub fn is_builtin(&self) -> bool {
        self.kind != LoaderKind::Custom
    }

    /// Resolves `binary_name` against this loader's own classpath, in order.
    pub fn find_class(&self, binary_name: &str) -> io::Result<Option<LocatedClass>> {
        for entry in &self.classpath {
            if let Some(bytes) = entry.read_class(binary_name)? {
                return Ok(Some(LocatedClass {
                    bytes,
                    origin: entry.origin(),
                }));
            }
        }
        Ok(None)
    }

    /// Content digest of everything this loader can resolve.
    ///
    /// Directories contribute the sorted relative path and bytes of each
    /// `.class` file, jars their raw bytes. Locations are deliberately not
    /// hashed so a relocated but identical classpath keeps its signature.
    /// Unreadable entries contribute a marker with their path instead of
    /// failing.
    pub fn signature(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.type_name.as_bytes());
        hasher.update([0u8]);
        for entry in &self.classpath {
            let hashed = match entry {
                ClasspathEntry::ClassDir(dir) => hash_class_dir(&mut hasher, dir),
                ClasspathEntry::Jar(path) => hash_file(&mut hasher, path),
            };
            if let Err(err) = hashed {
                tracing::debug!(
                    target = "jshare.registry",
                    path = %entry.path().display(),
                    error = %err,
                    "classpath entry is unreadable; hashing its location instead"
                );
                hasher.update(b"missing:");
                hasher.update(entry.path().to_string_lossy().as_bytes());
            }
            hasher.update([0u8]);
        }
        Fingerprint::from_hasher(hasher)
    }
}

fn hash_file(hasher: &mut Sha256, path: &Path) -> io::Result<()> {
    let bytes = std::fs::read(path)?;
    hasher.update(b"jar:");
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(&bytes);
    Ok(())
}

fn hash_class_dir(hasher: &mut Sha256, dir: &Path) -> io::Result<()> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "class directory does not exist",
        ));
    }

    let mut class_files: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension() != Some(OsStr::new("class")) {
            continue;
        }
        class_files.push(entry.into_path());
    }
    class_files.sort();

    hasher.update(b"dir:");
    for file in class_files {
        let rel = file.strip_prefix(dir).unwrap_or(&file);
        let bytes = std::fs::read(&file)?;
        hasher.update(rel.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_dir(contents: &[u8]) -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("p")).unwrap();
        std::fs::write(dir.path().join("p/ThrowException.class"), contents).unwrap();
        dir
    }

    #[test]
    fn identical_contents_share_a_signature_across_locations() {
        let a = class_dir(b"same");
        let b = class_dir(b"same");
        let la = ClassLoader::custom(
            "java.net.URLClassLoader",
            vec![ClasspathEntry::from_path(a.path())],
        );
        let lb = ClassLoader::custom(
            "java/net/URLClassLoader",
            vec![ClasspathEntry::from_path(b.path())],
        );
        assert_eq!(la.signature(), lb.signature());
        assert_eq!(la.type_name(), "java/net/URLClassLoader");
    }

    #[test]
    fn different_contents_change_the_signature() {
        let a = class_dir(b"one");
        let b = class_dir(b"two");
        let la = ClassLoader::custom("L", vec![ClasspathEntry::from_path(a.path())]);
        let lb = ClassLoader::custom("L", vec![ClasspathEntry::from_path(b.path())]);
        assert_ne!(la.signature(), lb.signature());
    }

    #[test]
    fn missing_classpath_entries_still_produce_a_signature() {
        let loader = ClassLoader::custom(
            "L",
            vec![ClasspathEntry::Jar(PathBuf::from("/no/such/dir/app.jar"))],
        );
        assert_eq!(loader.signature(), loader.signature());
    }

    #[test]
    fn find_class_reports_origin_of_first_match() {
        let a = class_dir(b"first");
        let b = class_dir(b"second");
        let loader = ClassLoader::custom(
            "L",
            vec![
                ClasspathEntry::from_path(a.path()),
                ClasspathEntry::from_path(b.path()),
            ],
        );
        let found = loader.find_class("p.ThrowException").unwrap().unwrap();
        assert_eq!(found.bytes, b"first");
        assert_eq!(found.origin, jshare_core::file_origin(a.path()));
        assert!(loader.find_class("p.Nope").unwrap().is_none());
    }

    #[test]
    fn builtin_loaders_are_not_custom() {
        assert!(ClassLoader::boot().is_builtin());
        assert!(ClassLoader::app(Vec::new()).is_builtin());
        assert!(!ClassLoader::custom("L", Vec::new()).is_builtin());
    }
}
