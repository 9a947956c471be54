use std::io;

use jshare_registry::ClasspathEntry;

/// Where the builder gets class file bytes from.
pub trait ClassBytesSource {
    /// Returns `Ok(None)` when the class has no bytes at `origin` (for
    /// example runtime-image classes).
    fn class_bytes(&self, name: &str, origin: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Reads classes from the directory or jar a `file:` origin points at.
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginClassSource;

impl ClassBytesSource for OriginClassSource {
    fn class_bytes(&self, name: &str, origin: &str) -> io::Result<Option<Vec<u8>>> {
        let Some(path) = jshare_core::origin_path(origin) else {
            return Ok(None);
        };
        ClasspathEntry::from_path(path).read_class(name)
    }
}

/// Never finds any bytes. Only symbol and class metadata get placed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClassBytes;

impl ClassBytesSource for NoClassBytes {
    fn class_bytes(&self, _name: &str, _origin: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

impl<S: ClassBytesSource + ?Sized> ClassBytesSource for &S {
    fn class_bytes(&self, name: &str, origin: &str) -> io::Result<Option<Vec<u8>>> {
        (**self).class_bytes(name, origin)
    }
}
