/*!
Storage adapters for archived graphs.

The archive talks to storage through [`StorageAdapter`] only, so where the
bytes end up is a deployment decision.
*/

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{GraphSnapError, Result};

/// Storage abstraction for saving and loading archive bytes
pub trait StorageAdapter {
    /// Save data to the given location, replacing what was there
    fn save(&self, data: &[u8], path: &str) -> Result<()>;

    /// Load the data stored at a location
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    fn exists(&self, path: &str) -> bool;

    /// Delete the data at a location; deleting a missing entry succeeds
    fn delete(&self, path: &str) -> Result<()>;
}

/// Local filesystem storage adapter
///
/// Parent directories are created on save.
#[derive(Debug, Clone, Default)]
pub struct LocalFileStorage {
    base_dir: Option<PathBuf>,
}

impl LocalFileStorage {
    /// Paths are used as given
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Paths are resolved against `base_dir`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        }
    }

    fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    GraphSnapError::storage(format!(
                        "Failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl StorageAdapter for LocalFileStorage {
    fn save(&self, data: &[u8], path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        self.ensure_parent_dir(&full_path)?;

        fs::write(&full_path, data).map_err(|e| {
            GraphSnapError::storage(format!(
                "Failed to write archive to {}: {e}",
                full_path.display()
            ))
        })
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);
        fs::read(&full_path).map_err(|e| {
            GraphSnapError::storage(format!(
                "Failed to read archive from {}: {e}",
                full_path.display()
            ))
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path(path).exists()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        if full_path.exists() {
            fs::remove_file(&full_path).map_err(|e| {
                GraphSnapError::storage(format!(
                    "Failed to delete archive {}: {e}",
                    full_path.display()
                ))
            })?;
        }
        Ok(())
    }
}

/// In-memory storage adapter.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.data.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl StorageAdapter for MemoryStorage {
    fn save(&self, data: &[u8], path: &str) -> Result<()> {
        self.data.lock().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        self.data
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| GraphSnapError::storage(format!("Archive not found: {path}")))
    }

    fn exists(&self, path: &str) -> bool {
        self.data.lock().contains_key(path)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.data.lock().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_storage_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());
        let path = "graph.json.gz";

        storage.save(b"archive bytes", path).unwrap();
        assert!(storage.exists(path));
        assert_eq!(storage.load(path).unwrap(), b"archive bytes");

        storage.delete(path).unwrap();
        assert!(!storage.exists(path));
        assert!(storage.delete(path).is_ok());
    }

    #[test]
    fn test_local_file_storage_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());
        let path = "agents/planner/2024/graph.json.gz";

        storage.save(b"nested", path).unwrap();
        assert!(temp_dir.path().join(path).exists());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());
        assert!(matches!(
            storage.load("missing.json.gz"),
            Err(GraphSnapError::Storage(_))
        ));
    }

    #[test]
    fn test_memory_storage_clones_share_data() {
        let storage = MemoryStorage::new();
        let view = storage.clone();

        storage.save(b"one", "b").unwrap();
        storage.save(b"two", "a").unwrap();
        assert_eq!(view.load("b").unwrap(), b"one");
        assert_eq!(view.paths(), vec!["a".to_string(), "b".to_string()]);

        view.delete("a").unwrap();
        assert!(!storage.exists("a"));
    }
}
