//! The slice of client state a transport needs beyond its own call
//! template — currently just the directory relative file paths resolve
//! against.

use std::path::{Path, PathBuf};

/// Read-only context passed into every [`crate::CommunicationProtocol`]
/// method, owned by the client core and shared across all transports.
#[derive(Debug, Clone)]
pub struct TransportContext {
    root_dir: PathBuf,
}

impl Default for TransportContext {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl TransportContext {
    /// Build a context rooted at `root_dir`.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// The configured root directory.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Resolve `path` against `root_dir` when relative; returns `path`
    /// unchanged when already absolute.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root_dir.join(p)
        }
    }
}
