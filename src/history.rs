//! Undo/redo over whole-graph snapshots.

use crate::graph::WorkflowGraph;

pub const DEFAULT_MAX_RECORDS: usize = 1000;

#[derive(Clone, Debug)]
pub struct UndoStack {
    history: Vec<WorkflowGraph>,
    current_index: usize,
    pub max_records: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            current_index: 0,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

impl UndoStack {
    pub fn with_max_records(max_records: usize) -> Self {
        Self {
            max_records: max_records.max(1),
            ..Self::default()
        }
    }

    /// Forget everything and start from `graph`.
    pub fn reset(&mut self, graph: &WorkflowGraph) {
        self.history.clear();
        self.history.push(graph.clone());
        self.current_index = 0;
    }

    /// Record `graph` as the newest state, discarding any redo branch.
    ///
    /// A snapshot equal to the current one is not recorded twice.
    pub fn push(&mut self, graph: &WorkflowGraph) {
        if self.history.get(self.current_index) == Some(graph) {
            return;
        }
        if self.current_index + 1 < self.history.len() {
            self.history.truncate(self.current_index + 1);
        }

        self.history.push(graph.clone());
        self.current_index = self.history.len() - 1;

        if self.history.len() > self.max_records {
            self.history.remove(0);
            self.current_index = self.current_index.saturating_sub(1);
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current_index + 1 < self.history.len()
    }

    pub fn undo(&mut self) -> Option<WorkflowGraph> {
        if self.can_undo() {
            self.current_index -= 1;
            self.history.get(self.current_index).cloned()
        } else {
            None
        }
    }

    pub fn redo(&mut self) -> Option<WorkflowGraph> {
        if self.can_redo() {
            self.current_index += 1;
            self.history.get(self.current_index).cloned()
        } else {
            None
        }
    }
}
