//! # Live Document
//!
//! Keeps one watched workflow document in sync between the store and the
//! canvas. Local commits are written through to the store; changes made by
//! other writers are picked up by [`LiveDocument::refresh`]. Every change is
//! broadcast to subscribers over `crossbeam-channel`.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info};

use crate::document::{PersistedFullWorkflow, from_document, to_document};
use crate::graph::WorkflowGraph;
use crate::storage::DocumentStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocEvent {
    Loaded { id: String },
    Updated { id: String, last_edit_time: i64 },
    Deleted { id: String },
}

pub struct LiveDocument {
    store: Box<dyn DocumentStore>,
    current: Option<PersistedFullWorkflow>,
    subscribers: Vec<Sender<DocEvent>>,
}

impl LiveDocument {
    pub fn new(store: Box<dyn DocumentStore>) -> Self {
        Self {
            store,
            current: None,
            subscribers: Vec::new(),
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn subscribe(&mut self) -> Receiver<DocEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, event: DocEvent) {
        // Drop subscribers whose receiver is gone.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn current(&self) -> Option<&PersistedFullWorkflow> {
        self.current.as_ref()
    }

    pub fn id(&self) -> Option<&str> {
        self.current.as_ref().map(|d| d.id.as_str())
    }

    pub fn is_deleted(&self) -> bool {
        self.current.as_ref().is_some_and(|d| d.deleted)
    }

    /// The watched document as a graph, unless it is missing or deleted.
    pub fn graph(&self) -> Option<WorkflowGraph> {
        self.current
            .as_ref()
            .filter(|d| !d.deleted)
            .map(|d| from_document(&d.snapshot))
    }

    /// Store a new document built from `graph` and start watching it.
    pub fn create(&mut self, title: &str, graph: &WorkflowGraph) -> Result<String> {
        let mut doc = PersistedFullWorkflow::new(title, Default::default());
        doc.snapshot = to_document(&doc.id, &doc.title, graph);
        self.store.put(&doc).context("Failed to create document")?;
        let id = doc.id.clone();
        info!("Created document {} ({})", doc.title, id);
        self.current = Some(doc);
        self.notify(DocEvent::Loaded { id: id.clone() });
        Ok(id)
    }

    /// Start watching `id`.
    ///
    /// Returns `false` when the store has no such document or it was deleted.
    /// The watched document is left as it was in that case.
    pub fn watch(&mut self, id: &str) -> Result<bool> {
        let doc = self
            .store
            .get(id)
            .with_context(|| format!("Failed to load document {}", id))?;
        match doc {
            Some(doc) if !doc.deleted => {
                info!("Watching document {} ({})", doc.title, doc.id);
                self.current = Some(doc);
                self.notify(DocEvent::Loaded { id: id.to_string() });
                Ok(true)
            }
            Some(_) => {
                debug!("Document {} is deleted, not watching it", id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Write `graph` as the new snapshot of the watched document.
    pub fn commit(&mut self, graph: &WorkflowGraph) -> Result<()> {
        let Some(doc) = self.current.as_mut() else {
            anyhow::bail!("No document is being watched");
        };
        if doc.deleted {
            anyhow::bail!("Document {} is deleted", doc.id);
        }
        doc.touch(graph);
        self.store
            .put(doc)
            .with_context(|| format!("Failed to save document {}", doc.id))?;
        let event = DocEvent::Updated {
            id: doc.id.clone(),
            last_edit_time: doc.last_edit_time,
        };
        debug!("Committed {:?}", event);
        self.notify(event);
        Ok(())
    }

    pub fn rename(&mut self, title: &str, graph: &WorkflowGraph) -> Result<()> {
        if let Some(doc) = self.current.as_mut() {
            doc.title = title.to_string();
        }
        self.commit(graph)
    }

    /// Soft-delete the watched document.
    pub fn delete(&mut self) -> Result<()> {
        let Some(doc) = self.current.as_mut() else {
            return Ok(());
        };
        doc.deleted = true;
        self.store
            .put(doc)
            .with_context(|| format!("Failed to delete document {}", doc.id))?;
        let id = doc.id.clone();
        info!("Deleted document {}", id);
        self.notify(DocEvent::Deleted { id });
        Ok(())
    }

    /// Re-read the watched document and broadcast anything another writer changed.
    ///
    /// Returns `true` if the local copy was replaced.
    pub fn refresh(&mut self) -> Result<bool> {
        let Some(id) = self.id().map(str::to_string) else {
            return Ok(false);
        };
        let stored = self
            .store
            .get(&id)
            .with_context(|| format!("Failed to refresh document {}", id))?;
        let Some(current) = self.current.as_ref() else {
            return Ok(false);
        };
        match stored {
            None if current.deleted => Ok(false),
            None => {
                if let Some(doc) = self.current.as_mut() {
                    doc.deleted = true;
                }
                self.notify(DocEvent::Deleted { id });
                Ok(true)
            }
            Some(stored) => {
                if stored.deleted && !current.deleted {
                    self.current = Some(stored);
                    self.notify(DocEvent::Deleted { id });
                    return Ok(true);
                }
                if stored.last_edit_time == current.last_edit_time
                    && stored.deleted == current.deleted
                {
                    return Ok(false);
                }
                let last_edit_time = stored.last_edit_time;
                self.current = Some(stored);
                self.notify(DocEvent::Updated { id, last_edit_time });
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::storage::MemoryStore;
    use egui::Pos2;
    use std::sync::{Arc, Mutex};

    fn live() -> LiveDocument {
        LiveDocument::new(Box::new(MemoryStore::default()))
    }

    #[test]
    fn commit_notifies_subscribers() {
        let mut doc = live();
        let rx = doc.subscribe();
        let id = doc.create("Untitled", &WorkflowGraph::default()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), DocEvent::Loaded { id: id.clone() });

        let mut graph = WorkflowGraph::default();
        graph.add_node(Node::regular("1", "KSampler", Pos2::ZERO));
        doc.commit(&graph).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), DocEvent::Updated { .. }));
        assert_eq!(doc.graph().unwrap().nodes.len(), 1);
        assert_eq!(doc.store().get(&id).unwrap().unwrap().snapshot.nodes.len(), 1);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut doc = live();
        drop(doc.subscribe());
        doc.create("x", &WorkflowGraph::default()).unwrap();
        assert!(doc.subscribers.is_empty());
    }

    #[test]
    fn deleted_document_has_no_graph_and_rejects_commits() {
        let mut doc = live();
        let rx = doc.subscribe();
        let id = doc.create("x", &WorkflowGraph::default()).unwrap();
        doc.delete().unwrap();
        assert!(doc.is_deleted());
        assert!(doc.graph().is_none());
        assert!(doc.commit(&WorkflowGraph::default()).is_err());
        let events: Vec<DocEvent> = rx.try_iter().collect();
        assert_eq!(events.last(), Some(&DocEvent::Deleted { id }));
    }

    #[test]
    fn refresh_picks_up_external_writes() {
        let shared = Arc::new(Mutex::new(MemoryStore::default()));
        let mut ours = LiveDocument::new(Box::new(shared.clone()));
        let mut theirs = LiveDocument::new(Box::new(shared));
        let id = ours.create("x", &WorkflowGraph::default()).unwrap();
        let rx = ours.subscribe();
        assert!(!ours.refresh().unwrap());

        assert!(theirs.watch(&id).unwrap());
        let mut graph = WorkflowGraph::default();
        graph.add_node(Node::regular("1", "SaveImage", Pos2::ZERO));
        theirs.commit(&graph).unwrap();

        assert!(ours.refresh().unwrap());
        assert!(matches!(rx.try_recv().unwrap(), DocEvent::Updated { .. }));
        assert_eq!(ours.graph().unwrap().nodes.len(), 1);

        theirs.delete().unwrap();
        assert!(ours.refresh().unwrap());
        assert_eq!(rx.try_recv().unwrap(), DocEvent::Deleted { id });
        assert!(ours.is_deleted());
    }

    #[test]
    fn watch_unknown_document() {
        let mut doc = live();
        assert!(!doc.watch("missing").unwrap());
        assert!(doc.current().is_none());
    }

    #[test]
    fn failed_watch_keeps_the_current_document() {
        let shared = Arc::new(Mutex::new(MemoryStore::default()));
        let mut ours = LiveDocument::new(Box::new(shared.clone()));
        let mut theirs = LiveDocument::new(Box::new(shared));
        let mine = ours.create("mine", &WorkflowGraph::default()).unwrap();
        let gone = theirs.create("gone", &WorkflowGraph::default()).unwrap();
        theirs.delete().unwrap();

        assert!(!ours.watch(&gone).unwrap());
        assert!(!ours.watch("missing").unwrap());
        assert_eq!(ours.id(), Some(mine.as_str()));
        assert!(!ours.is_deleted());
        ours.commit(&WorkflowGraph::default()).unwrap();
    }
}
