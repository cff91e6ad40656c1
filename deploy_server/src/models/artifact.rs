//! deploy.artifact: A build output file destined for object storage.

use std::path::{Component, Path, PathBuf};

/// Fallback content type for extensions with no known mapping.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    /// Absolute path on the host.
    pub source_path: PathBuf,
    /// Path relative to the artifact root, `/`-separated.
    pub relative_path: String,
    pub content_type: String,
}

impl ArtifactFile {
    /// Describe `path`, which must live under `root`.
    pub fn new(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        let relative_path = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        if relative_path.is_empty() {
            return None;
        }

        Some(Self {
            source_path: path.to_path_buf(),
            content_type: content_type_for(path),
            relative_path,
        })
    }

    /// Object key under the job's storage prefix.
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{prefix}/{}", self.relative_path)
    }
}

/// Infer a content type from the file extension.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}
