//! Persisted workflow documents.
//!
//! The document is the storage shape of a workflow: nodes keyed by id with
//! their widget value, parent-relative positions and dimensions, plus the
//! connection list. [`to_document`] and [`from_document`] convert between it
//! and the in-memory [`WorkflowGraph`].

use std::collections::BTreeMap;

use chrono::Utc;
use egui::{Pos2, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::{
    Connection, NODE_GROUP, Node, NodeId, NodeKind, NodeVisibleState, Port, WorkflowGraph,
};
use crate::widgets::WidgetCatalog;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub width: f32,
    pub height: f32,
}

/// Widget value of a node as stored in the document.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeValue {
    pub widget: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 4]>,
    #[serde(default)]
    pub visible_state: NodeVisibleState,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PersistedWorkflowNode {
    pub id: NodeId,
    pub value: NodeValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    pub position: Pos2,
}

pub type PersistedWorkflowConnection = Connection;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistedWorkflowDocument {
    pub id: String,
    pub title: String,
    pub nodes: BTreeMap<NodeId, PersistedWorkflowNode>,
    #[serde(default)]
    pub connections: Vec<PersistedWorkflowConnection>,
}

/// A stored workflow: metadata plus the document snapshot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PersistedFullWorkflow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub create_at: i64,
    pub last_edit_time: i64,
    #[serde(default)]
    pub deleted: bool,
    pub snapshot: PersistedWorkflowDocument,
}

impl PersistedFullWorkflow {
    pub fn new(title: impl Into<String>, snapshot: PersistedWorkflowDocument) -> Self {
        let now = Utc::now().timestamp_millis();
        let id = if snapshot.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            snapshot.id.clone()
        };
        let title = title.into();
        Self {
            snapshot: PersistedWorkflowDocument {
                id: id.clone(),
                title: title.clone(),
                ..snapshot
            },
            id,
            title,
            thumbnail: None,
            create_at: now,
            last_edit_time: now,
            deleted: false,
        }
    }

    /// Replace the snapshot and bump the edit time.
    ///
    /// The edit time is strictly increasing so watchers can detect changes
    /// even when two commits land in the same millisecond.
    pub fn touch(&mut self, graph: &WorkflowGraph) {
        self.snapshot = to_document(&self.id, &self.title, graph);
        self.last_edit_time = Utc::now().timestamp_millis().max(self.last_edit_time + 1);
    }
}

pub fn to_document(id: &str, title: &str, graph: &WorkflowGraph) -> PersistedWorkflowDocument {
    let nodes = graph
        .nodes
        .iter()
        .map(|node| {
            let (widget, inputs, outputs, children) = match &node.kind {
                NodeKind::Regular {
                    widget,
                    inputs,
                    outputs,
                } => (widget.clone(), inputs.clone(), outputs.clone(), None),
                NodeKind::Group { children } => {
                    (NODE_GROUP.to_string(), Vec::new(), Vec::new(), Some(children.clone()))
                }
            };
            let persisted = PersistedWorkflowNode {
                id: node.id.clone(),
                value: NodeValue {
                    widget,
                    title: node.title.clone(),
                    inputs,
                    outputs,
                    parent: node.parent.clone(),
                    children,
                    color: node.color,
                    visible_state: node.visible_state,
                },
                dimensions: node.size.map(|s| Dimensions {
                    width: s.x,
                    height: s.y,
                }),
                position: node.position,
            };
            (node.id.clone(), persisted)
        })
        .collect();
    PersistedWorkflowDocument {
        id: id.to_string(),
        title: title.to_string(),
        nodes,
        connections: graph.connections.clone(),
    }
}

/// Rebuild a graph from a document.
///
/// Groups come first so their children draw above them. Absolute positions
/// are derived from parent positions, and group children are recomputed
/// from the nodes' `parent` fields.
pub fn from_document(doc: &PersistedWorkflowDocument) -> WorkflowGraph {
    let mut graph = WorkflowGraph::default();
    let (groups, regular): (Vec<_>, Vec<_>) = doc
        .nodes
        .values()
        .partition(|n| n.value.widget == NODE_GROUP);

    for persisted in groups.into_iter().chain(regular) {
        let value = &persisted.value;
        let kind = if value.widget == NODE_GROUP {
            NodeKind::Group {
                children: Vec::new(),
            }
        } else {
            NodeKind::Regular {
                widget: value.widget.clone(),
                inputs: value.inputs.clone(),
                outputs: value.outputs.clone(),
            }
        };
        let title = if value.title.is_empty() {
            value.widget.clone()
        } else {
            value.title.clone()
        };
        graph.add_node(Node {
            id: persisted.id.clone(),
            kind,
            title,
            position: persisted.position,
            position_absolute: None,
            size: persisted
                .dimensions
                .as_ref()
                .map(|d| Vec2::new(d.width, d.height)),
            parent: value.parent.clone(),
            visible_state: value.visible_state,
            selected: false,
            color: value.color,
        });
    }
    graph.rebuild_group_children();

    let origins: BTreeMap<NodeId, Pos2> = graph
        .groups()
        .map(|g| (g.id.clone(), g.position))
        .collect();
    for node in &mut graph.nodes {
        let origin = node
            .parent
            .as_ref()
            .and_then(|p| origins.get(p))
            .copied()
            .unwrap_or(Pos2::ZERO);
        node.position_absolute = Some(origin + node.position.to_vec2());
    }

    let node_ids: Vec<NodeId> = graph.nodes.iter().map(|n| n.id.clone()).collect();
    graph.connections = doc
        .connections
        .iter()
        .filter(|c| node_ids.contains(&c.source) && node_ids.contains(&c.target))
        .cloned()
        .collect();
    graph
}

/// The starter text-to-image workflow every new document begins with.
pub fn default_workflow(catalog: &WidgetCatalog) -> WorkflowGraph {
    let layout: [(&str, &str, (f32, f32)); 7] = [
        ("4", "CheckpointLoaderSimple", (26.0, 474.0)),
        ("6", "CLIPTextEncode", (415.0, 186.0)),
        ("7", "CLIPTextEncode", (413.0, 389.0)),
        ("5", "EmptyLatentImage", (473.0, 609.0)),
        ("3", "KSampler", (863.0, 186.0)),
        ("8", "VAEDecode", (1209.0, 188.0)),
        ("9", "SaveImage", (1451.0, 189.0)),
    ];
    let mut graph = WorkflowGraph::default();
    for (id, widget, (x, y)) in layout {
        let mut node = Node::regular(id, widget, Pos2::new(x, y));
        if let Some(w) = catalog.get(widget) {
            node = node.with_ports(w.inputs.clone(), w.outputs.clone());
        }
        graph.add_node(node);
    }
    let links = [
        ("4", "MODEL", "3", "model"),
        ("6", "CONDITIONING", "3", "positive"),
        ("7", "CONDITIONING", "3", "negative"),
        ("5", "LATENT", "3", "latent_image"),
        ("4", "CLIP", "6", "clip"),
        ("4", "CLIP", "7", "clip"),
        ("3", "LATENT", "8", "samples"),
        ("4", "VAE", "8", "vae"),
        ("8", "IMAGE", "9", "images"),
    ];
    for (index, (source, source_handle, target, target_handle)) in links.into_iter().enumerate() {
        let mut conn = Connection::new(source, source_handle, target, target_handle);
        conn.id = (index + 1).to_string();
        graph.connections.push(conn);
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_round_trip_keeps_membership() {
        let mut graph = WorkflowGraph::default();
        graph.add_node(Node::group("g", "Prompt", Pos2::new(100.0, 100.0), Vec2::splat(300.0)));
        graph.add_node(Node::regular("a", "CLIPTextEncode", Pos2::new(150.0, 120.0)));
        graph.add_node(Node::regular("b", "KSampler", Pos2::new(900.0, 100.0)));
        graph.add_node_to_group("a", "g");

        let doc = to_document("doc", "Doc", &graph);
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: PersistedWorkflowDocument = serde_json::from_str(&json).unwrap();
        let restored = from_document(&parsed);

        assert!(restored.membership_is_consistent());
        assert_eq!(restored.node("g").unwrap().children(), ["a".to_string()]);
        let a = restored.node("a").unwrap();
        assert_eq!(a.position, Pos2::new(50.0, 20.0));
        assert_eq!(a.absolute_position(), Pos2::new(150.0, 120.0));
    }

    #[test]
    fn stale_children_lists_are_ignored() {
        let mut graph = WorkflowGraph::default();
        graph.add_node(Node::group("g", "G", Pos2::ZERO, Vec2::splat(10.0)));
        graph.add_node(Node::regular("a", "KSampler", Pos2::ZERO));
        let mut doc = to_document("d", "D", &graph);
        doc.nodes.get_mut("g").unwrap().value.children = Some(vec!["a".into(), "ghost".into()]);

        let restored = from_document(&doc);
        assert!(restored.node("g").unwrap().children().is_empty());
        assert!(restored.membership_is_consistent());
    }

    #[test]
    fn default_workflow_is_fully_connected() {
        let catalog = WidgetCatalog::builtin();
        let graph = default_workflow(&catalog);
        assert_eq!(graph.nodes.len(), 7);
        for conn in &graph.connections {
            assert!(
                crate::connection::validate_connection(&graph, conn).is_ok(),
                "invalid default link {:?}",
                conn
            );
        }
    }

    #[test]
    fn touch_advances_edit_time() {
        let mut full = PersistedFullWorkflow::new("t", PersistedWorkflowDocument::default());
        let before = full.last_edit_time;
        full.touch(&WorkflowGraph::default());
        assert!(full.last_edit_time > before);
        assert_eq!(full.snapshot.id, full.id);
    }
}
