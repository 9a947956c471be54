use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One element of a loader's classpath.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClasspathEntry {
    ClassDir(PathBuf),
    Jar(PathBuf),
}

/// Class bytes found on a classpath, plus the locator they were found at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocatedClass {
    pub bytes: Vec<u8>,
    pub origin: String,
}

impl ClasspathEntry {
    /// Classifies `path`: existing directories are class directories,
    /// everything else is treated as a jar.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            ClasspathEntry::ClassDir(path)
        } else {
            ClasspathEntry::Jar(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ClasspathEntry::ClassDir(p) | ClasspathEntry::Jar(p) => p,
        }
    }

    /// The `file:` origin recorded for classes defined from this entry.
    pub fn origin(&self) -> String {
        jshare_core::file_origin(self.path())
    }

    /// Reads the bytes of `binary_name` from this entry.
    ///
    /// Returns `Ok(None)` when the class is not present.
    pub fn read_class(&self, binary_name: &str) -> io::Result<Option<Vec<u8>>> {
        let relative = format!("{}.class", jshare_core::internal_name(binary_name));
        match self {
            ClasspathEntry::ClassDir(dir) => match std::fs::read(dir.join(&relative)) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err),
            },
            ClasspathEntry::Jar(path) => read_jar_entry(path, &relative),
        }
    }
}

fn read_jar_entry(path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut zip = zip::ZipArchive::new(file).map_err(zip_to_io)?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(zip_to_io(err)),
    };
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

fn zip_to_io(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_from_class_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("p")).unwrap();
        std::fs::write(dir.path().join("p/ThrowException.class"), b"bytes").unwrap();

        let entry = ClasspathEntry::from_path(dir.path());
        assert!(matches!(entry, ClasspathEntry::ClassDir(_)));
        assert_eq!(
            entry.read_class("p.ThrowException").unwrap(),
            Some(b"bytes".to_vec())
        );
        assert_eq!(entry.read_class("p.Missing").unwrap(), None);
    }

    #[test]
    fn reads_from_jar() {
        let dir = tempfile::TempDir::new().unwrap();
        let jar = dir.path().join("test.jar");
        {
            let file = File::create(&jar).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file(
                "TestSimple.class",
                zip::write::SimpleFileOptions::default()
                    .compression_method(zip::CompressionMethod::Stored),
            )
            .unwrap();
            zip.write_all(b"simple").unwrap();
            zip.finish().unwrap();
        }

        let entry = ClasspathEntry::from_path(&jar);
        assert_eq!(
            entry.read_class("TestSimple").unwrap(),
            Some(b"simple".to_vec())
        );
        assert_eq!(entry.read_class("Other").unwrap(), None);
        assert!(entry.origin().starts_with("file:"));
    }

    #[test]
    fn missing_jar_reads_as_absent() {
        let entry = ClasspathEntry::Jar(PathBuf::from("/definitely/not/here.jar"));
        assert_eq!(entry.read_class("A").unwrap(), None);
    }

    #[test]
    fn corrupt_jar_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let jar = dir.path().join("broken.jar");
        std::fs::write(&jar, b"not a zip").unwrap();

        let err = ClasspathEntry::Jar(jar).read_class("A").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
