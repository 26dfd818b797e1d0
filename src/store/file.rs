use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{validate_id, LocalStorage, StorageError};

/// One file per id inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data dir>/modeltree/models`.
    pub fn open_default() -> Result<Self, StorageError> {
        let dirs = directories::ProjectDirs::from("", "", "modeltree").ok_or(StorageError::NoDataDir)?;
        Ok(Self::new(dirs.data_dir().join("models")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, id: &str) -> Result<PathBuf, StorageError> {
        validate_id(id)?;
        Ok(self.dir.join(id))
    }
}

impl LocalStorage for FileStore {
    fn exists(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.file(id)?.is_file())
    }

    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(self.file(id)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, id: &str, payload: &[u8]) -> Result<(), StorageError> {
        let file = self.file(id)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(file, payload)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StorageError> {
        match std::fs::remove_file(self.file(id)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
