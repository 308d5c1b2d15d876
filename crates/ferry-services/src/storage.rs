//! Storage — the directory of files a daemon serves.
//!
//! Files are addressed by bare name. Every name is checked before any
//! filesystem call so a peer can never reach outside the root. Writes land
//! in a temp file beside the target and are renamed into place, so readers
//! see either the old file or the complete new one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use ferry_core::message::FileEntry;

/// Prefix of in-progress writes. Such names are hidden from List and may not
/// be uploaded, downloaded or deleted.
pub const TEMP_PREFIX: &str = ".ferry-tmp-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),

    #[error("no such file: {0}")]
    NotFound(String),

    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let storage = Self::new(root);
        fs::create_dir_all(&storage.root).await?;
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a name to a path under the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Open a stored file for reading. Returns the handle and its size.
    pub async fn open(&self, name: &str) -> Result<(fs::File, u64), StorageError> {
        let path = self.resolve(name)?;
        let file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok((file, meta.len()))
    }

    /// Regular files under the root, sorted by name.
    pub async fn list(&self) -> Result<Vec<FileEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::debug!(path = %entry.path().display(), "skipping non-utf-8 file name");
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let size = entry.metadata().await?.len();
            entries.push(FileEntry { name, size });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        match fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(StorageError::NotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        fs::remove_file(&path).await?;
        Ok(())
    }
}

/// Reject names that are empty, relative-path components, contain a path
/// separator or NUL, or collide with temp files.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.starts_with(TEMP_PREFIX);
    if bad {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Write `chunks` in order to `path` via a temp file in the same directory.
pub async fn write_atomic(path: &Path, chunks: &[Bytes]) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = dir.join(format!(
        "{TEMP_PREFIX}{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = async {
        let mut file = fs::File::create(&temp).await?;
        for chunk in chunks {
            file.write_all(chunk).await?;
        }
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}
