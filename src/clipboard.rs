//! Copy/paste of node selections.

use std::collections::HashMap;

use egui::{Pos2, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::{Connection, Node, NodeId, NodeKind, WorkflowGraph};

/// Offset applied when pasting without a pointer position.
pub const PASTE_OFFSET: Vec2 = Vec2::new(20.0, 20.0);

/// Clipboard data for copy/paste operations.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ClipboardData {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl ClipboardData {
    /// Copy `ids` and the connections running between them.
    pub fn copy(graph: &WorkflowGraph, ids: &[NodeId]) -> Self {
        let nodes = graph
            .nodes
            .iter()
            .filter(|n| ids.contains(&n.id))
            .cloned()
            .collect();
        let connections = graph
            .connections
            .iter()
            .filter(|c| ids.contains(&c.source) && ids.contains(&c.target))
            .cloned()
            .collect();
        Self { nodes, connections }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse clipboard text. Text that is not ours yields `None`.
    pub fn from_json(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Insert a copy of the clipboard into `graph` with fresh ids.
    ///
    /// With an `anchor`, the top-left of the pasted nodes lands there;
    /// otherwise they are offset by [`PASTE_OFFSET`]. Parents outside the
    /// pasted set are dropped. The pasted nodes become the selection.
    pub fn paste(&self, graph: &mut WorkflowGraph, anchor: Option<Pos2>) -> Vec<NodeId> {
        if self.nodes.is_empty() {
            return Vec::new();
        }
        let min = self.nodes.iter().map(|n| n.absolute_position()).fold(
            Pos2::new(f32::INFINITY, f32::INFINITY),
            |acc, p| acc.min(p),
        );
        let offset = anchor.map(|a| a - min).unwrap_or(PASTE_OFFSET);

        let id_map: HashMap<&str, NodeId> = self
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), Uuid::new_v4().to_string()))
            .collect();

        let mut pasted = Vec::new();
        for node in &self.nodes {
            let mut copy = node.clone();
            copy.id = id_map[node.id.as_str()].clone();
            let absolute = node.absolute_position() + offset;
            copy.position_absolute = Some(absolute);
            copy.parent = node
                .parent
                .as_deref()
                .and_then(|p| id_map.get(p))
                .cloned();
            if copy.parent.is_none() {
                copy.position = absolute;
            }
            if let NodeKind::Group { children } = &mut copy.kind {
                children.clear();
            }
            pasted.push(copy.id.clone());
            graph.add_node(copy);
        }
        graph.rebuild_group_children();

        for conn in &self.connections {
            let (Some(source), Some(target)) =
                (id_map.get(conn.source.as_str()), id_map.get(conn.target.as_str()))
            else {
                continue;
            };
            graph.connections.push(Connection {
                id: Uuid::new_v4().to_string(),
                source: source.clone(),
                target: target.clone(),
                selected: false,
                ..conn.clone()
            });
        }
        graph.set_selection(&pasted);
        pasted
    }
}
