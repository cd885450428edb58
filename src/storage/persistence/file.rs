//! Plain-file backend: one file per key under the data directory

use super::{PersistenceBackend, PersistenceConfig, PersistenceError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

const EXTENSION: &str = "snap";

pub struct FileBackend {
    config: PersistenceConfig,
}

impl FileBackend {
    pub fn new(config: PersistenceConfig) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.config.data_dir.join(format!("{}.{}", key, EXTENSION))
    }
}

impl PersistenceBackend for FileBackend {
    /// Writes to a temporary file and renames it over the key, so readers
    /// never observe a half-written file.
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let path = self.key_path(key);
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }

    fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.key_path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, PersistenceError> {
        let mut keys = Vec::new();

        for entry in std::fs::read_dir(&self.config.data_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(name.to_string());
                }
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend(dir: &TempDir) -> FileBackend {
        FileBackend::new(PersistenceConfig::new(dir.path())).unwrap()
    }

    #[test]
    fn test_write_read() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);

        backend.write("spans", b"payload").unwrap();
        assert_eq!(backend.read("spans").unwrap().unwrap(), b"payload".to_vec());
        assert!(backend.read("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_keys_skips_temp_files() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);

        backend.write("key1", b"a").unwrap();
        backend.write("key2", b"b").unwrap();
        std::fs::write(dir.path().join("key3.snap.tmp"), b"partial").unwrap();

        let mut keys = backend.list_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["key1".to_string(), "key2".to_string()]);
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);

        backend.write("gone", b"x").unwrap();
        backend.delete("gone").unwrap();
        assert!(backend.read("gone").unwrap().is_none());
        backend.delete("gone").unwrap();
    }
}
