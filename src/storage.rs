//! Key-value persistence for workflow documents.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};

use crate::document::PersistedFullWorkflow;

pub trait DocumentStore {
    fn get(&self, id: &str) -> Result<Option<PersistedFullWorkflow>>;
    fn put(&mut self, doc: &PersistedFullWorkflow) -> Result<()>;
    fn delete(&mut self, id: &str) -> Result<()>;
    /// All documents, most recently edited first.
    fn list(&self) -> Result<Vec<PersistedFullWorkflow>>;
}

/// A store shared between several writers, e.g. two open editor windows.
impl<S: DocumentStore> DocumentStore for Arc<Mutex<S>> {
    fn get(&self, id: &str) -> Result<Option<PersistedFullWorkflow>> {
        lock(self)?.get(id)
    }

    fn put(&mut self, doc: &PersistedFullWorkflow) -> Result<()> {
        lock(self)?.put(doc)
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        lock(self)?.delete(id)
    }

    fn list(&self) -> Result<Vec<PersistedFullWorkflow>> {
        lock(self)?.list()
    }
}

fn lock<S>(store: &Arc<Mutex<S>>) -> Result<MutexGuard<'_, S>> {
    store
        .lock()
        .map_err(|_| anyhow::anyhow!("Document store lock poisoned"))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: BTreeMap<String, PersistedFullWorkflow>,
}

impl DocumentStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<PersistedFullWorkflow>> {
        Ok(self.docs.get(id).cloned())
    }

    fn put(&mut self, doc: &PersistedFullWorkflow) -> Result<()> {
        self.docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        self.docs.remove(id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<PersistedFullWorkflow>> {
        let mut docs: Vec<_> = self.docs.values().cloned().collect();
        docs.sort_by(|a, b| b.last_edit_time.cmp(&a.last_edit_time));
        Ok(docs)
    }
}

/// One `<id>.json` file per document.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create document directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            anyhow::bail!("Invalid document id: {:?}", id);
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

impl DocumentStore for JsonDirStore {
    fn get(&self, id: &str) -> Result<Option<PersistedFullWorkflow>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let doc = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(doc))
    }

    fn put(&mut self, doc: &PersistedFullWorkflow) -> Result<()> {
        let path = self.path_for(&doc.id)?;
        let json = serde_json::to_string_pretty(doc)?;
        // Write-then-rename so readers never see a half-written file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("Failed to delete {}", path.display()))?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<PersistedFullWorkflow>> {
        let mut docs = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|json| Ok(serde_json::from_str::<PersistedFullWorkflow>(&json)?))
            {
                Ok(doc) => docs.push(doc),
                Err(e) => log::warn!("Skipping unreadable document {}: {}", path.display(), e),
            }
        }
        docs.sort_by(|a, b| b.last_edit_time.cmp(&a.last_edit_time));
        Ok(docs)
    }
}
