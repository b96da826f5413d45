//! File lookup for the static handler.
//!
//! [`Dir`] maps slash separated virtual paths onto a directory on disk.
//! [`Fallback`] wraps any [`FileSystem`] and substitutes a fallback asset for
//! missing paths, which lets single page applications own their routing.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::FsError;

/// Kind of entry a lookup resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    File,
    Directory,
}

/// A resolved entry in the served tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Location on disk
    pub path: PathBuf,
    pub kind: AssetKind,
}

impl Asset {
    pub fn is_dir(&self) -> bool {
        self.kind == AssetKind::Directory
    }
}

/// Resolves virtual paths (`/a/b/file.txt`) to assets.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn open(&self, name: &str) -> Result<Asset, FsError>;
}

/// A directory on disk serving as the root of the virtual tree.
#[derive(Debug, Clone)]
pub struct Dir {
    root: PathBuf,
}

impl Dir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the on-disk path for `name` component by component, refusing
    /// anything that could step outside the root.
    fn resolve(&self, name: &str) -> Result<PathBuf, FsError> {
        let relative = name.trim_start_matches('/');
        let mut result = self.root.clone();

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => {
                    if part.to_string_lossy().contains('\0') {
                        warn!("Path component contains null byte: {:?}", part);
                        return Err(FsError::InvalidPath);
                    }
                    result.push(part);
                }
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    warn!("Rejected path outside served root: {}", name);
                    return Err(FsError::InvalidPath);
                }
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl FileSystem for Dir {
    async fn open(&self, name: &str) -> Result<Asset, FsError> {
        let path = self.resolve(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(Asset {
                kind: if meta.is_dir() {
                    AssetKind::Directory
                } else {
                    AssetKind::File
                },
                path,
            }),
            Err(err) if is_missing(&err) => Err(FsError::NotFound(name.to_string())),
            Err(err) => Err(FsError::Io(err)),
        }
    }
}

fn is_missing(err: &std::io::Error) -> bool {
    // A file used as a directory ("/index.html/x") reports NotADirectory.
    matches!(
        err.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
    )
}

/// How the fallback asset is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackMode {
    /// Always serve this exact virtual path (`/index.html`).
    Absolute(String),
    /// Serve the nearest file with this name, looking in the directory of the
    /// request and then in each parent up to the root (`index.html`).
    Relative(String),
}

impl FallbackMode {
    /// Interpret a configured fallback value. Empty means no fallback.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else if value.starts_with('/') {
            Some(FallbackMode::Absolute(value.to_string()))
        } else {
            Some(FallbackMode::Relative(value.to_string()))
        }
    }
}

/// Serves a fallback asset when the wrapped file system has no entry.
#[derive(Debug, Clone)]
pub struct Fallback<F> {
    inner: F,
    mode: FallbackMode,
}

impl<F: FileSystem> Fallback<F> {
    pub fn new(inner: F, mode: FallbackMode) -> Self {
        Self { inner, mode }
    }

    async fn walk_up(&self, name: &str, file: &str) -> Result<Asset, FsError> {
        let mut dir = parent_dir(name);
        loop {
            let candidate = join(dir, file);
            // The direct lookup already tried this one.
            if candidate != name {
                match self.inner.open(&candidate).await {
                    Ok(asset) => {
                        debug!("Resolved {} to fallback {}", name, candidate);
                        return Ok(asset);
                    }
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }
            if dir == "/" {
                return Err(FsError::NotFound(name.to_string()));
            }
            dir = parent_dir(dir);
        }
    }
}

#[async_trait]
impl<F: FileSystem> FileSystem for Fallback<F> {
    async fn open(&self, name: &str) -> Result<Asset, FsError> {
        match self.inner.open(name).await {
            Err(err) if err.is_not_found() => match &self.mode {
                FallbackMode::Absolute(path) => self.inner.open(path).await,
                FallbackMode::Relative(file) => self.walk_up(name, file).await,
            },
            other => other,
        }
    }
}

/// Directory containing `name`, always rooted and without a trailing slash
/// (except for the root itself).
fn parent_dir(name: &str) -> &str {
    let trimmed = name.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &trimmed[..idx],
    }
}

fn join(dir: &str, file: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, file)
    } else {
        format!("{}/{}", dir, file)
    }
}
