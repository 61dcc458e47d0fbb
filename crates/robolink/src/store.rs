//! File-backed key-value store: one `<dir>/<key>.json` file per key.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use robolink_core::{CoreError, KeyValueStore};

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, CoreError> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(storage_err(key, "keys are [A-Za-z0-9_-]+"));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn storage_err(key: &str, message: impl ToString) -> CoreError {
    CoreError::Storage {
        key: key.to_owned(),
        message: message.to_string(),
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, CoreError> {
        match fs::read(self.path(key)?) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(key, e)),
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    fn set(&self, key: &str, value: Bytes) -> Result<(), CoreError> {
        let path = self.path(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &value).map_err(|e| storage_err(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| storage_err(key, e))
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        match fs::remove_file(self.path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(key, e)),
        }
    }
}
