//! Key-value surfaces the cache snapshot can be persisted to.
//!
//! - [`SessionStorage`]: in-process storage that lives as long as the value.
//! - [`LocalStorage`]: one file per name under a directory, surviving restarts.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("storage rejected `{name}`: {reason}")]
    Rejected { name: String, reason: String },
}

impl PersistenceError {
    pub fn rejected(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// A string key-value store the cache writes its snapshot into.
pub trait StorageBackend: Send + Sync {
    /// Short identifier used in logs.
    fn kind(&self) -> &'static str;

    fn get(&self, name: &str) -> Result<Option<String>, PersistenceError>;

    fn set(&self, name: &str, value: &str) -> Result<(), PersistenceError>;
}

/// In-memory storage scoped to the running process.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    items: Arc<DashMap<String, String>>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for SessionStorage {
    fn kind(&self) -> &'static str {
        "session"
    }

    fn get(&self, name: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.items.get(name).map(|value| value.clone()))
    }

    fn set(&self, name: &str, value: &str) -> Result<(), PersistenceError> {
        self.items.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    directory: PathBuf,
}

impl LocalStorage {
    /// The directory is created lazily on first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !name.starts_with('.');
        if !valid {
            return Err(PersistenceError::rejected(
                name,
                "names must be non-empty ascii alphanumerics, '-', '_' or '.'",
            ));
        }
        Ok(self.directory.join(format!("{name}.json")))
    }
}

impl StorageBackend for LocalStorage {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn get(&self, name: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, name: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.directory)?;

        // Rename within the same directory so readers never see a partial file.
        let mut staged = NamedTempFile::new_in(&self.directory)?;
        staged.write_all(value.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|err| err.error)?;
        Ok(())
    }
}
