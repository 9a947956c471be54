use std::path::{Path, PathBuf};

use url::Url;

/// Origin recorded for classes defined by the boot loader.
pub const BOOTSTRAP_ORIGIN: &str = "bootstrap";

/// Builds a `file:` origin locator for a jar or class directory.
///
/// Directories get a trailing `/`, matching how URL class loaders spell
/// directory classpath entries.
pub fn file_origin(path: &Path) -> String {
    let url = if path.is_dir() {
        Url::from_directory_path(path)
    } else {
        Url::from_file_path(path)
    };
    match url {
        Ok(url) => url.to_string(),
        // Relative paths cannot be expressed as URLs; keep them verbatim.
        Err(()) => format!("file:{}", path.display()),
    }
}

/// Resolves a `file:` origin back to a filesystem path.
pub fn origin_path(origin: &str) -> Option<PathBuf> {
    if !origin.starts_with("file:") {
        return None;
    }
    match Url::parse(origin) {
        Ok(url) => url.to_file_path().ok(),
        Err(_) => origin.strip_prefix("file:").map(PathBuf::from),
    }
}

/// Only classes from the boot loader, the runtime image and plain files can
/// be re-located in a later process.
pub fn is_shareable_origin(origin: &str) -> bool {
    origin == BOOTSTRAP_ORIGIN || origin.starts_with("jrt:") || origin.starts_with("file:")
}
