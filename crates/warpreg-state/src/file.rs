//! FileStore — flat-file worker persistence.
//!
//! The whole worker set lives in one JSON object (`{id: record}`). Every
//! mutation reads the document, applies the change and rewrites it via a
//! temporary file plus rename, so a crash never leaves a torn document.
//! A process-local mutex serializes writers.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::WorkerRecord;
use crate::{WorkerStore, epoch_secs};

type Document = BTreeMap<String, WorkerRecord>;

/// Worker store backed by a single JSON file.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open a file store. The file is created lazily on first write.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StateError::Open(e.to_string()))?;
        }
        let store = Self {
            path: path.to_path_buf(),
            lock: Arc::new(Mutex::new(())),
        };
        // Fail early on a corrupt document rather than on first use.
        store.read_document()?;
        debug!(?path, "file store opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> StateResult<Document> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Document::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StateError::Deserialize(e.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(StateError::Read(e.to_string())),
        }
    }

    fn write_document(&self, doc: &Document) -> StateResult<()> {
        let data = serde_json::to_vec_pretty(doc).map_err(|e| StateError::Serialize(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data).map_err(|e| StateError::Write(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StateError::Write(e.to_string()))?;
        Ok(())
    }

    /// Run a mutation against the document under the writer lock.
    fn mutate<T, F>(&self, apply: F) -> StateResult<T>
    where
        F: FnOnce(&mut Document) -> StateResult<T>,
    {
        let _guard = self.lock.lock().expect("file store lock");
        let mut doc = self.read_document()?;
        let out = apply(&mut doc)?;
        self.write_document(&doc)?;
        Ok(out)
    }
}

impl WorkerStore for FileStore {
    fn ensure_unique_index(&self) -> StateResult<()> {
        // Keys of a JSON object are unique; nothing to set up.
        Ok(())
    }

    fn insert_worker(&self, record: &WorkerRecord) -> StateResult<()> {
        self.mutate(|doc| {
            if doc.contains_key(&record.id) {
                return Err(StateError::DuplicateKey(record.id.clone()));
            }
            doc.insert(record.id.clone(), record.clone());
            Ok(())
        })?;
        debug!(id = %record.id, "worker inserted");
        Ok(())
    }

    fn update_worker_health(&self, id: &str, is_healthy: bool) -> StateResult<()> {
        let now = epoch_secs();
        self.mutate(|doc| {
            let record = doc
                .get_mut(id)
                .ok_or_else(|| StateError::NotFound(id.to_string()))?;
            record.is_healthy = is_healthy;
            record.last_health_check = now;
            Ok(())
        })
    }

    fn update_worker(&self, record: &WorkerRecord) -> StateResult<()> {
        self.mutate(|doc| {
            let stored = doc
                .get_mut(&record.id)
                .ok_or_else(|| StateError::NotFound(record.id.clone()))?;
            *stored = record.clone();
            Ok(())
        })
    }

    fn delete_worker(&self, id: &str) -> StateResult<bool> {
        self.mutate(|doc| Ok(doc.remove(id).is_some()))
    }

    fn get_worker(&self, id: &str) -> StateResult<Option<WorkerRecord>> {
        let _guard = self.lock.lock().expect("file store lock");
        Ok(self.read_document()?.remove(id))
    }

    fn list_workers(&self) -> StateResult<Vec<WorkerRecord>> {
        let _guard = self.lock.lock().expect("file store lock");
        Ok(self.read_document()?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_worker(id: &str, port: u16) -> WorkerRecord {
        WorkerRecord::new(id, "10.0.0.1", port, None, 1000)
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("workers.json")).unwrap();
        assert!(store.list_workers().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn insert_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workers.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.insert_worker(&test_worker("w1", 8080)).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get_worker("w1").unwrap().map(|w| w.http_port), Some(8080));
    }

    #[test]
    fn duplicate_insert_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("workers.json")).unwrap();
        store.insert_worker(&test_worker("w1", 8080)).unwrap();

        let err = store.insert_worker(&test_worker("w1", 9000)).unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.list_workers().unwrap().len(), 1);
    }

    #[test]
    fn update_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("workers.json")).unwrap();
        store.insert_worker(&test_worker("w1", 8080)).unwrap();

        store.update_worker_health("w1", false).unwrap();
        assert!(!store.get_worker("w1").unwrap().unwrap().is_healthy);

        store.update_worker(&test_worker("w1", 8081)).unwrap();
        assert_eq!(store.get_worker("w1").unwrap().unwrap().http_port, 8081);

        assert!(store.delete_worker("w1").unwrap());
        assert!(!store.delete_worker("w1").unwrap());
    }

    #[test]
    fn updates_on_missing_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("workers.json")).unwrap();
        assert!(store.update_worker_health("ghost", true).unwrap_err().is_not_found());
        assert!(store.update_worker(&test_worker("ghost", 1)).unwrap_err().is_not_found());
    }

    #[test]
    fn corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workers.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(StateError::Deserialize(_))
        ));
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/workers.json");
        let store = FileStore::open(&path).unwrap();
        store.insert_worker(&test_worker("w1", 8080)).unwrap();
        assert!(path.exists());
    }
}
