//! Asset upload collaborator for profile images and logos.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Empty upload")]
    Empty,

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Upload failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Profile,
    Logo,
}

impl AssetKind {
    pub fn dir(self) -> &'static str {
        match self {
            AssetKind::Profile => "profile",
            AssetKind::Logo => "logo",
        }
    }
}

/// `cards/<profile|logo>/<file name>`; directories in `file_name` are dropped.
pub fn storage_path(kind: AssetKind, file_name: &str) -> Result<String, AssetError> {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AssetError::InvalidPath(file_name.to_string()))?;
    Ok(format!("cards/{}/{}", kind.dir(), base))
}

pub trait AssetUploader {
    /// Store `bytes` at `path`, overwriting, and return the public URL.
    fn upload(&self, bytes: &[u8], path: &str) -> Result<String, AssetError>;
}

/// Stores uploads under a local directory served at `base_url`.
pub struct LocalUploader {
    root: PathBuf,
    base_url: String,
}

impl LocalUploader {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self { root: root.into(), base_url: base_url.trim_end_matches('/').to_string() }
    }
}

impl AssetUploader for LocalUploader {
    fn upload(&self, bytes: &[u8], path: &str) -> Result<String, AssetError> {
        if bytes.is_empty() {
            return Err(AssetError::Empty);
        }
        let relative = Path::new(path);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(AssetError::InvalidPath(path.to_string()));
        }

        let target = self.root.join(relative);
        let dir = target.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(&target).map_err(|e| AssetError::Io(e.error))?;

        tracing::info!(path, bytes = bytes.len(), "uploaded asset");
        Ok(format!("{}/{}", self.base_url, path))
    }
}
