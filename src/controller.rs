//! # App Controller
//!
//! Single owner of the editor state. The canvas translates pointer input into
//! calls on [`AppController`]; every mutation of the graph goes through one of
//! its handlers, is recorded in the undo stack and written to the live
//! document.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::Receiver;
use egui::{Pos2, Vec2};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::clipboard::ClipboardData;
use crate::connection::{
    WidgetSuggestionContext, connect, connection_to_new_node, suggest_widgets, update_connection,
};
use crate::document::{PersistedFullWorkflow, default_workflow};
use crate::geometry::{CanvasTransform, bbox};
use crate::gesture::{ConnectingParams, ConnectionAttempt, HandleKind};
use crate::graph::{
    Connection, DEFAULT_GROUP_SIZE, NODE_GROUP, Node, NodeId, NodeVisibleState, WorkflowGraph,
};
use crate::group_view::GroupRenderState;
use crate::grouping::{Evaluation, GroupDragTracker, GroupingOutcome, SelectedNode};
use crate::history::UndoStack;
use crate::live_doc::{DocEvent, LiveDocument};
use crate::storage::DocumentStore;
use crate::widgets::{WidgetCatalog, missing_widgets, replace_node_widget};

/// Space left around the selection when wrapping it in a new group.
pub const GROUP_PADDING: f32 = 30.0;

/// How long a notification stays on screen.
pub const NOTIFICATION_TTL_SECS: i64 = 5;

/// Minimum time between two reads of the watched document from the store.
pub const REFRESH_INTERVAL_SECS: i64 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Transient interaction state. Nothing here is persisted.
#[derive(Debug, Default)]
pub struct UiState {
    pub grouping: GroupDragTracker,
    pub transform: CanvasTransform,
    /// Widget picker shown after a connection was dropped on empty canvas.
    pub suggestion: Option<WidgetSuggestionContext>,
}

pub struct AppController {
    graph: WorkflowGraph,
    pub ui: UiState,
    attempt: ConnectionAttempt,
    history: UndoStack,
    document: LiveDocument,
    doc_events: Receiver<DocEvent>,
    catalog: WidgetCatalog,
    clipboard: Option<ClipboardData>,
    notifications: Vec<Notification>,
    last_refresh: Option<DateTime<Utc>>,
}

impl AppController {
    pub fn new(
        store: Box<dyn DocumentStore>,
        catalog: WidgetCatalog,
        history_max_records: usize,
    ) -> Self {
        let mut document = LiveDocument::new(store);
        let doc_events = document.subscribe();
        let graph = WorkflowGraph::default();
        let mut history = UndoStack::with_max_records(history_max_records);
        history.reset(&graph);
        Self {
            graph,
            ui: UiState::default(),
            attempt: ConnectionAttempt::default(),
            history,
            document,
            doc_events,
            catalog,
            clipboard: None,
            notifications: Vec::new(),
            last_refresh: None,
        }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn catalog(&self) -> &WidgetCatalog {
        &self.catalog
    }

    pub fn document(&self) -> &LiveDocument {
        &self.document
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Drop notifications older than [`NOTIFICATION_TTL_SECS`].
    pub fn expire_notifications(&mut self, now: DateTime<Utc>) {
        let ttl = Duration::seconds(NOTIFICATION_TTL_SECS);
        self.notifications.retain(|n| now - n.created_at < ttl);
    }

    pub fn dismiss_notification(&mut self, index: usize) {
        if index < self.notifications.len() {
            self.notifications.remove(index);
        }
    }

    fn notify(&mut self, level: NotificationLevel, message: String) {
        match level {
            NotificationLevel::Info => info!("{}", message),
            NotificationLevel::Error => error!("{}", message),
        }
        self.notifications.push(Notification {
            level,
            message,
            created_at: Utc::now(),
        });
    }

    fn report(&mut self, err: anyhow::Error) {
        self.notify(NotificationLevel::Error, format!("{:#}", err));
    }

    /// Record the current graph in history and write it to the document.
    fn commit(&mut self) {
        self.history.push(&self.graph);
        self.persist();
    }

    fn persist(&mut self) {
        if self.document.id().is_none() || self.document.is_deleted() {
            return;
        }
        if let Err(e) = self.document.commit(&self.graph) {
            self.report(e);
        }
    }

    fn replace_graph(&mut self, graph: WorkflowGraph) {
        self.graph = graph;
        self.ui.grouping = GroupDragTracker::default();
        self.ui.suggestion = None;
        self.attempt.cancel();
        self.history.reset(&self.graph);
        self.warn_missing_widgets();
    }

    fn warn_missing_widgets(&mut self) {
        let missing = self.missing_widgets();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.keys().map(String::as_str).collect();
            let message = format!("Workflow uses unknown widgets: {}", names.join(", "));
            self.notify(NotificationLevel::Error, message);
        }
    }

    // Documents

    /// Open `last_id` if it still exists, otherwise start a new document.
    pub fn open_or_create(&mut self, last_id: Option<&str>) -> Result<String> {
        if let Some(id) = last_id {
            if self.load_document(id)? {
                return Ok(id.to_string());
            }
            warn!("Last document {} is gone, creating a new one", id);
        }
        self.new_document("Untitled")
    }

    /// Create a document seeded with the default workflow and switch to it.
    pub fn new_document(&mut self, title: &str) -> Result<String> {
        let graph = default_workflow(&self.catalog);
        let id = self.document.create(title, &graph)?;
        self.replace_graph(graph);
        Ok(id)
    }

    /// Switch to document `id`. Returns `false` if it is missing or deleted.
    pub fn load_document(&mut self, id: &str) -> Result<bool> {
        if !self.document.watch(id)? {
            self.notify(
                NotificationLevel::Error,
                format!("Workflow {} no longer exists", id),
            );
            return Ok(false);
        }
        let Some(graph) = self.document.graph() else {
            return Ok(false);
        };
        info!("Loaded document {} with {} nodes", id, graph.nodes.len());
        self.replace_graph(graph);
        Ok(true)
    }

    /// Stored documents that are not deleted, most recently edited first.
    pub fn list_documents(&self) -> Result<Vec<PersistedFullWorkflow>> {
        let docs = self.document.store().list()?;
        Ok(docs.into_iter().filter(|d| !d.deleted).collect())
    }

    /// Soft-delete the open document and start a fresh one.
    pub fn delete_document(&mut self) -> Result<String> {
        self.document.delete()?;
        self.new_document("Untitled")
    }

    pub fn save(&mut self) -> Result<()> {
        self.document.commit(&self.graph)
    }

    pub fn rename_document(&mut self, title: &str) {
        if let Err(e) = self.document.rename(title, &self.graph) {
            self.report(e);
        }
    }

    /// Pick up changes made by other writers and drain document events.
    ///
    /// The store is read at most every [`REFRESH_INTERVAL_SECS`], and never
    /// while a pointer gesture is in progress.
    pub fn poll_document_events(&mut self, now: DateTime<Utc>) -> Vec<DocEvent> {
        let due = self
            .last_refresh
            .is_none_or(|last| now - last >= Duration::seconds(REFRESH_INTERVAL_SECS));
        if due && !self.ui.grouping.gesture().is_pressed() {
            self.last_refresh = Some(now);
            self.refresh_document();
        }
        self.doc_events.try_iter().collect()
    }

    fn refresh_document(&mut self) {
        match self.document.refresh() {
            Ok(true) => match self.document.graph() {
                Some(graph) => {
                    debug!("Document changed externally, reloading");
                    self.graph = graph;
                    self.ui.grouping = GroupDragTracker::default();
                    self.history.push(&self.graph);
                }
                None => {
                    self.notify(NotificationLevel::Info, "This workflow was deleted".to_string());
                }
            },
            Ok(false) => {}
            Err(e) => self.report(e),
        }
    }

    // Drag gesture

    pub fn on_mouse_down(&mut self) {
        self.attempt.cancel();
        self.ui.grouping.on_mouse_down();
    }

    /// Plain selection change outside of a drag (click or box select).
    pub fn select_nodes(&mut self, ids: &[NodeId]) {
        self.graph.set_selection(ids);
        for conn in &mut self.graph.connections {
            conn.selected = false;
        }
    }

    /// Origin of the connection being dragged, if any.
    pub fn connecting_params(&self) -> Option<&ConnectingParams> {
        self.attempt.params()
    }

    /// Selection reported by the canvas while dragging, with realtime positions.
    pub fn on_selection_change(&mut self, selection: &[SelectedNode]) -> Evaluation {
        let ids: Vec<NodeId> = selection.iter().map(|s| s.id.clone()).collect();
        self.graph.set_selection(&ids);
        self.ui.grouping.on_selection_change(selection, &self.graph)
    }

    /// Translate nodes while dragging. Committed on drag stop.
    pub fn on_nodes_moved(&mut self, ids: &[NodeId], delta: Vec2) {
        for id in ids {
            // A child moves with its group; moving it as well would double the offset.
            let moved_with_parent = self
                .graph
                .node(id)
                .and_then(|n| n.parent.as_ref())
                .is_some_and(|p| ids.contains(p));
            if !moved_with_parent {
                self.graph.move_node(id, delta);
            }
        }
    }

    /// Record the size a node was drawn at.
    pub fn on_node_measured(&mut self, id: &str, size: Vec2) {
        if let Some(node) = self.graph.node_mut(id) {
            if !node.is_group() && node.size != Some(size) {
                node.size = Some(size);
            }
        }
    }

    pub fn on_mouse_up(&mut self) -> GroupingOutcome {
        let outcome = self.ui.grouping.on_mouse_up(&mut self.graph);
        if !outcome.is_empty() {
            self.commit();
        }
        outcome
    }

    /// End of a node drag: finalize grouping and commit the new positions.
    pub fn on_node_drag_stop(&mut self) -> GroupingOutcome {
        let outcome = self.ui.grouping.on_mouse_up(&mut self.graph);
        self.commit();
        outcome
    }

    /// Click on empty canvas. Ignored while the release of a connection drag
    /// is still being handled.
    pub fn on_pane_click(&mut self) {
        if self.attempt.is_live() {
            return;
        }
        self.ui.suggestion = None;
        self.graph.set_selection(&[]);
        for conn in &mut self.graph.connections {
            conn.selected = false;
        }
    }

    pub fn on_transform_end(&mut self, transform: CanvasTransform) {
        self.ui.transform = transform;
    }

    pub fn group_render_state(&self, group: &Node) -> GroupRenderState {
        GroupRenderState::resolve(group, &self.graph, self.ui.transform.zoom)
    }

    // Nodes and edges

    fn build_node(&self, widget: &str, position: Pos2) -> Option<Node> {
        let id = Uuid::new_v4().to_string();
        if widget == NODE_GROUP {
            return Some(Node::group(id, NODE_GROUP, position, DEFAULT_GROUP_SIZE));
        }
        let w = self.catalog.get(widget)?;
        let mut node = Node::regular(id, &w.name, position)
            .with_ports(w.inputs.clone(), w.outputs.clone());
        node.title = w.display_name.clone();
        Some(node)
    }

    /// Create a node from a catalog widget, or an empty group for [`NODE_GROUP`].
    pub fn on_add_node(&mut self, widget: &str, position: Pos2) -> Option<NodeId> {
        let Some(node) = self.build_node(widget, position) else {
            self.notify(NotificationLevel::Error, format!("Unknown widget {}", widget));
            return None;
        };
        let id = node.id.clone();
        self.graph.add_node(node);
        self.commit();
        Some(id)
    }

    pub fn on_delete_nodes(&mut self, ids: &[NodeId]) {
        let removed = self.graph.remove_nodes(ids);
        if !removed.is_empty() {
            debug!("Deleted {} nodes", removed.len());
            self.commit();
        }
    }

    pub fn on_delete_edges(&mut self, ids: &[String]) {
        if self.graph.remove_connections(ids) > 0 {
            self.commit();
        }
    }

    /// Delete the selected nodes and connections.
    pub fn delete_selection(&mut self) {
        let edges: Vec<String> = self
            .graph
            .connections
            .iter()
            .filter(|c| c.selected)
            .map(|c| c.id.clone())
            .collect();
        let nodes = self.graph.selected_ids();
        let removed_edges = self.graph.remove_connections(&edges);
        let removed_nodes = self.graph.remove_nodes(&nodes);
        if removed_edges > 0 || !removed_nodes.is_empty() {
            self.commit();
        }
    }

    pub fn select_connection(&mut self, id: &str) {
        self.graph.set_selection(&[]);
        for conn in &mut self.graph.connections {
            conn.selected = conn.id == id;
        }
    }

    // Connections

    pub fn on_connect_start(&mut self, params: ConnectingParams) {
        self.ui.suggestion = None;
        self.attempt.begin_connect(params);
    }

    pub fn on_connect(&mut self, conn: Connection) -> bool {
        match connect(&mut self.graph, conn) {
            Ok(id) => {
                debug!("Connected {}", id);
                self.attempt.mark_connected();
                self.commit();
                true
            }
            Err(rejection) => {
                warn!("Connection rejected: {}", rejection);
                false
            }
        }
    }

    /// Release of a connection drag. A failed attempt opens the widget picker at `drop`.
    pub fn on_connect_end(&mut self, drop: Pos2) {
        if let Some(params) = self.attempt.end_connect() {
            self.ui.suggestion = Some(suggest_widgets(&self.catalog, params, drop));
        }
    }

    /// Begin dragging the `dragged` end of edge `edge_id`.
    pub fn on_edge_update_start(&mut self, edge_id: &str, dragged: HandleKind) {
        let Some(anchor) = self.edge_anchor(edge_id, dragged) else {
            return;
        };
        self.ui.suggestion = None;
        self.attempt.begin_edge_update(edge_id, anchor);
    }

    /// The end of an edge that stays attached while the other end is dragged.
    fn edge_anchor(&self, edge_id: &str, dragged: HandleKind) -> Option<ConnectingParams> {
        let conn = self.graph.connections.iter().find(|c| c.id == edge_id)?;
        let params = match dragged {
            HandleKind::Target => {
                let port = self.graph.node(&conn.source)?.output(&conn.source_handle)?;
                ConnectingParams {
                    node_id: conn.source.clone(),
                    handle: conn.source_handle.clone(),
                    handle_kind: HandleKind::Source,
                    slot_type: port.slot_type.clone(),
                }
            }
            HandleKind::Source => {
                let port = self.graph.node(&conn.target)?.input(&conn.target_handle)?;
                ConnectingParams {
                    node_id: conn.target.clone(),
                    handle: conn.target_handle.clone(),
                    handle_kind: HandleKind::Target,
                    slot_type: port.slot_type.clone(),
                }
            }
        };
        Some(params)
    }

    pub fn on_edge_update(&mut self, new_conn: Connection) -> bool {
        let Some(edge_id) = self.attempt.updating_edge().map(str::to_string) else {
            return false;
        };
        match update_connection(&mut self.graph, &edge_id, new_conn) {
            Ok(_) => {
                self.attempt.mark_edge_updated();
                self.commit();
                true
            }
            Err(rejection) => {
                warn!("Edge update rejected: {}", rejection);
                false
            }
        }
    }

    /// A dragged edge end dropped anywhere but a valid slot deletes the edge
    /// and offers to create a node wired to the remaining end.
    pub fn on_edge_update_end(&mut self, drop: Pos2) {
        let anchor = self.attempt.params().cloned();
        let Some(edge_id) = self.attempt.end_edge_update() else {
            return;
        };
        if self.graph.remove_connections(&[edge_id]) > 0 {
            self.commit();
        }
        if let Some(params) = anchor {
            self.ui.suggestion = Some(suggest_widgets(&self.catalog, params, drop));
        }
    }

    /// Create the picked widget at the suggestion position and wire it up.
    pub fn accept_suggestion(&mut self, widget: &str) -> Option<NodeId> {
        let ctx = self.ui.suggestion.take()?;
        let Some(node) = self.build_node(widget, ctx.position) else {
            self.notify(NotificationLevel::Error, format!("Unknown widget {}", widget));
            return None;
        };
        let id = node.id.clone();
        self.graph.add_node(node);
        let conn = self
            .catalog
            .get(widget)
            .and_then(|w| connection_to_new_node(&ctx.params, &id, w));
        if let Some(conn) = conn {
            if let Err(rejection) = connect(&mut self.graph, conn) {
                warn!("Could not wire new node: {}", rejection);
            }
        }
        self.commit();
        Some(id)
    }

    pub fn dismiss_suggestion(&mut self) {
        self.ui.suggestion = None;
    }

    // Groups

    /// Wrap the selected regular nodes in a new group.
    pub fn create_group(&mut self, title: &str) -> Option<NodeId> {
        let members: Vec<NodeId> = self
            .graph
            .nodes
            .iter()
            .filter(|n| n.selected && !n.is_group())
            .map(|n| n.id.clone())
            .collect();
        let area = bbox(members.iter().filter_map(|id| self.graph.node(id)).map(|n| n.rect()))?;
        let area = area.expand(GROUP_PADDING);

        let group = Node::group(Uuid::new_v4().to_string(), title, area.min, area.size());
        let group_id = group.id.clone();
        self.graph.add_node(group);
        for id in &members {
            self.graph.add_node_to_group(id, &group_id);
        }
        self.graph.set_selection(&[group_id.clone()]);
        self.commit();
        Some(group_id)
    }

    pub fn toggle_group_collapsed(&mut self, group_id: &str) -> bool {
        let Some(group) = self.graph.node_mut(group_id).filter(|n| n.is_group()) else {
            return false;
        };
        group.visible_state = match group.visible_state {
            NodeVisibleState::Expanded => NodeVisibleState::Collapsed,
            NodeVisibleState::Collapsed => NodeVisibleState::Expanded,
        };
        self.commit();
        true
    }

    // History and clipboard

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(graph) => {
                self.graph = graph;
                self.persist();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(graph) => {
                self.graph = graph;
                self.persist();
                true
            }
            None => false,
        }
    }

    /// Copy the selection. Returns the JSON to put on the system clipboard.
    pub fn copy(&mut self) -> Option<String> {
        let ids = self.graph.selected_ids();
        if ids.is_empty() {
            return None;
        }
        let data = ClipboardData::copy(&self.graph, &ids);
        let json = match data.to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("Failed to serialize clipboard: {}", e);
                None
            }
        };
        self.clipboard = Some(data);
        json
    }

    /// Paste from `text` if it holds copied nodes, otherwise from the last copy.
    pub fn paste(&mut self, anchor: Option<Pos2>, text: Option<&str>) -> Vec<NodeId> {
        let data = text
            .and_then(ClipboardData::from_json)
            .or_else(|| self.clipboard.clone());
        let Some(data) = data.filter(|d| !d.is_empty()) else {
            return Vec::new();
        };
        let pasted = data.paste(&mut self.graph, anchor);
        self.commit();
        pasted
    }

    // Widgets

    pub fn missing_widgets(&self) -> BTreeMap<String, Vec<NodeId>> {
        missing_widgets(&self.graph, &self.catalog)
    }

    /// Swap every node using `missing` over to `replacement`.
    ///
    /// Returns how many nodes were changed.
    pub fn replace_missing_widget(&mut self, missing: &str, replacement: &str) -> usize {
        let Some(widget) = self.catalog.get(replacement).cloned() else {
            return 0;
        };
        let ids = self.missing_widgets().remove(missing).unwrap_or_default();
        let mut dropped = 0;
        for id in &ids {
            dropped += replace_node_widget(&mut self.graph, id, &widget).unwrap_or(0);
        }
        if !ids.is_empty() {
            info!(
                "Replaced {} with {} on {} nodes, dropped {} connections",
                missing,
                replacement,
                ids.len(),
                dropped
            );
            self.commit();
        }
        ids.len()
    }
}
