use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ClassListError {
    #[error("malformed classlist entry at line {line}: {reason}")]
    MalformedClassListEntry { line: usize, reason: String },

    #[error("failed to access classlist {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
