//! File identity and content access.
//!
//! Every cache key in this crate is built from a [`FileIdentity`]: the file's
//! path plus a fingerprint of its content. The fingerprint is the SHA-256 of
//! the bytes, so it changes exactly when the content changes.
//!
//! Content is served through two small traits:
//! - [`FileHandle`]: one immutable version of one file
//! - [`FileSource`]: looks up the current [`FileHandle`] for a [`Uri`]
//!
//! [`DiskFileSource`] reads straight from the filesystem; [`OverlayFileSource`]
//! layers in-memory content (unsaved editor buffers) over it.

use crate::core::ModError;
use crate::span::Uri;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// What kind of file a path names, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Go source (`.go`)
    Go,
    /// Module manifest (`.mod`)
    Mod,
    /// Checksum file (`.sum`)
    Sum,
    /// Anything else
    Unknown,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("go") => Self::Go,
            Some("mod") => Self::Mod,
            Some("sum") => Self::Sum,
            _ => Self::Unknown,
        }
    }
}

/// A file's path plus a fingerprint of its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    pub uri: Uri,
    pub hash: String,
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uri, &self.hash[..self.hash.len().min(12)])
    }
}

/// Lowercase hex SHA-256 of `content`.
pub fn hash_contents(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// One immutable version of a file.
pub trait FileHandle: Send + Sync + fmt::Debug {
    fn uri(&self) -> &Uri;

    fn identity(&self) -> &FileIdentity;

    /// The file's content; an error if the file could not be read when the
    /// handle was created.
    fn read(&self) -> Result<Arc<[u8]>, ModError>;

    fn kind(&self) -> FileKind {
        FileKind::from_path(self.uri().path())
    }
}

/// Looks up file handles by URI.
pub trait FileSource: Send + Sync {
    fn get_file<'a>(&'a self, uri: &'a Uri) -> BoxFuture<'a, Result<Arc<dyn FileHandle>, ModError>>;
}

/// A file read from disk.
///
/// A missing or unreadable file still produces a handle; the read error is
/// kept and returned from [`FileHandle::read`].
#[derive(Debug)]
pub struct DiskFile {
    identity: FileIdentity,
    content: Result<Arc<[u8]>, ModError>,
}

impl DiskFile {
    pub async fn load(uri: Uri) -> Self {
        let content = tokio::fs::read(uri.path())
            .await
            .map(Arc::<[u8]>::from)
            .map_err(|e| ModError::read(uri.path(), e));
        let hash = match &content {
            Ok(bytes) => hash_contents(bytes),
            Err(ModError::Read {
                source,
                ..
            }) => format!("unreadable:{:?}", source.kind()),
            Err(_) => "unreadable".to_string(),
        };
        Self {
            identity: FileIdentity {
                uri,
                hash,
            },
            content,
        }
    }
}

impl FileHandle for DiskFile {
    fn uri(&self) -> &Uri {
        &self.identity.uri
    }

    fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    fn read(&self) -> Result<Arc<[u8]>, ModError> {
        self.content.clone()
    }
}

/// In-memory file content.
#[derive(Debug)]
pub struct MemoryFile {
    identity: FileIdentity,
    content: Arc<[u8]>,
}

impl MemoryFile {
    pub fn new(uri: Uri, content: impl Into<Arc<[u8]>>) -> Self {
        let content = content.into();
        Self {
            identity: FileIdentity {
                uri,
                hash: hash_contents(&content),
            },
            content,
        }
    }
}

impl FileHandle for MemoryFile {
    fn uri(&self) -> &Uri {
        &self.identity.uri
    }

    fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    fn read(&self) -> Result<Arc<[u8]>, ModError> {
        Ok(self.content.clone())
    }
}

/// Serves every request by reading the file from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFileSource;

impl FileSource for DiskFileSource {
    fn get_file<'a>(&'a self, uri: &'a Uri) -> BoxFuture<'a, Result<Arc<dyn FileHandle>, ModError>> {
        async move {
            let file: Arc<dyn FileHandle> = Arc::new(DiskFile::load(uri.clone()).await);
            Ok(file)
        }
        .boxed()
    }
}

/// In-memory overlays layered over the disk.
#[derive(Debug, Default)]
pub struct OverlayFileSource {
    overlays: DashMap<Uri, Arc<MemoryFile>>,
    disk: DiskFileSource,
}

impl OverlayFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the content served for `uri`, returning the new handle.
    pub fn set_overlay(&self, uri: Uri, content: impl Into<Arc<[u8]>>) -> Arc<MemoryFile> {
        let file = Arc::new(MemoryFile::new(uri.clone(), content));
        tracing::trace!(target: "source", "overlay {} -> {}", uri, file.identity().hash);
        self.overlays.insert(uri, file.clone());
        file
    }

    /// Drops the overlay for `uri`; later lookups fall through to disk.
    pub fn remove_overlay(&self, uri: &Uri) -> bool {
        self.overlays.remove(uri).is_some()
    }
}

impl FileSource for OverlayFileSource {
    fn get_file<'a>(&'a self, uri: &'a Uri) -> BoxFuture<'a, Result<Arc<dyn FileHandle>, ModError>> {
        if let Some(overlay) = self.overlays.get(uri) {
            let file: Arc<dyn FileHandle> = overlay.value().clone();
            return async move { Ok(file) }.boxed();
        }
        self.disk.get_file(uri)
    }
}
