//! # Workflow Graph
//!
//! Nodes, connections and group membership for a workflow canvas.
//!
//! Nodes are kept in an ordered `Vec`: list order is the order groups are
//! scanned when resolving drag targets, and the order the canvas draws in.
//! Group membership is stored on both sides (`Node::parent` and the group's
//! `children`); only [`WorkflowGraph::add_node_to_group`] and
//! [`WorkflowGraph::remove_node_from_group`] touch either side.

use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

pub type NodeId = String;

/// Widget name persisted for group nodes.
pub const NODE_GROUP: &str = "Group";

/// Slot type that connects to anything.
pub const ANY_SLOT_TYPE: &str = "*";

/// Size used for group nodes created without an explicit size.
pub const DEFAULT_GROUP_SIZE: Vec2 = Vec2::new(400.0, 300.0);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub slot_type: String,
}

impl Port {
    pub fn new(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
        }
    }

    /// Whether a value of `other` slot type may flow through this port.
    pub fn accepts(&self, other: &str) -> bool {
        self.slot_type == ANY_SLOT_TYPE || other == ANY_SLOT_TYPE || self.slot_type == other
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeVisibleState {
    #[default]
    Expanded,
    Collapsed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum NodeKind {
    Regular {
        widget: String,
        inputs: Vec<Port>,
        outputs: Vec<Port>,
    },
    /// Children are an ordered set: insertion order, no duplicates.
    Group { children: Vec<NodeId> },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub title: String,
    /// Canvas position, relative to the parent group when `parent` is set.
    pub position: Pos2,
    /// Absolute canvas position, known once the node has been laid out.
    #[serde(default)]
    pub position_absolute: Option<Pos2>,
    /// Rendered size, known once the node has been measured.
    #[serde(default)]
    pub size: Option<Vec2>,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub visible_state: NodeVisibleState,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub color: Option<[u8; 4]>,
}

impl Node {
    pub fn regular(id: impl Into<NodeId>, widget: impl Into<String>, position: Pos2) -> Self {
        let widget = widget.into();
        Self {
            id: id.into(),
            title: widget.clone(),
            kind: NodeKind::Regular {
                widget,
                inputs: Vec::new(),
                outputs: Vec::new(),
            },
            position,
            position_absolute: Some(position),
            size: None,
            parent: None,
            visible_state: NodeVisibleState::Expanded,
            selected: false,
            color: None,
        }
    }

    pub fn group(
        id: impl Into<NodeId>,
        title: impl Into<String>,
        position: Pos2,
        size: Vec2,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: NodeKind::Group {
                children: Vec::new(),
            },
            position,
            position_absolute: Some(position),
            size: Some(size),
            parent: None,
            visible_state: NodeVisibleState::Expanded,
            selected: false,
            color: None,
        }
    }

    pub fn with_ports(mut self, new_inputs: Vec<Port>, new_outputs: Vec<Port>) -> Self {
        if let NodeKind::Regular { inputs, outputs, .. } = &mut self.kind {
            *inputs = new_inputs;
            *outputs = new_outputs;
        }
        self
    }

    pub fn with_size(mut self, size: Vec2) -> Self {
        self.size = Some(size);
        self
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }

    pub fn widget(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Regular { widget, .. } => Some(widget),
            NodeKind::Group { .. } => None,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Group { children } => children,
            NodeKind::Regular { .. } => &[],
        }
    }

    pub fn inputs(&self) -> &[Port] {
        match &self.kind {
            NodeKind::Regular { inputs, .. } => inputs,
            NodeKind::Group { .. } => &[],
        }
    }

    pub fn outputs(&self) -> &[Port] {
        match &self.kind {
            NodeKind::Regular { outputs, .. } => outputs,
            NodeKind::Group { .. } => &[],
        }
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs().iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs().iter().find(|p| p.name == name)
    }

    pub fn absolute_position(&self) -> Pos2 {
        self.position_absolute.unwrap_or(self.position)
    }

    /// Bounding box in absolute canvas space. Unmeasured nodes have zero size.
    pub fn rect(&self) -> Rect {
        Rect::from_min_size(self.absolute_position(), self.size.unwrap_or(Vec2::ZERO))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Connection {
    pub id: String,
    pub source: NodeId,
    pub source_handle: String,
    pub target: NodeId,
    pub target_handle: String,
    #[serde(default)]
    pub selected: bool,
}

impl Connection {
    pub fn new(
        source: impl Into<NodeId>,
        source_handle: impl Into<String>,
        target: impl Into<NodeId>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            source: source.into(),
            source_handle: source_handle.into(),
            target: target.into(),
            target_handle: target_handle.into(),
            selected: false,
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowGraph {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl WorkflowGraph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_group())
    }

    pub fn selected_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.selected)
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Remove nodes, their connections and any membership they take part in.
    ///
    /// Deleting a group releases its children back to the top level.
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> Vec<Node> {
        for id in ids {
            let Some(node) = self.node(id) else { continue };
            if node.is_group() {
                for child in node.children().to_vec() {
                    self.remove_node_from_group(&child);
                }
            } else {
                self.remove_node_from_group(id);
            }
        }
        let mut removed = Vec::new();
        self.nodes.retain(|n| {
            if ids.contains(&n.id) {
                removed.push(n.clone());
                false
            } else {
                true
            }
        });
        self.connections
            .retain(|c| !ids.iter().any(|id| c.touches(id)));
        removed
    }

    pub fn remove_connections(&mut self, ids: &[String]) -> usize {
        let before = self.connections.len();
        self.connections.retain(|c| !ids.contains(&c.id));
        before - self.connections.len()
    }

    /// Replace selection flags with exactly `ids`.
    pub fn set_selection(&mut self, ids: &[NodeId]) {
        for node in &mut self.nodes {
            node.selected = ids.contains(&node.id);
        }
    }

    /// Translate a node. Moving a group carries its children along.
    pub fn move_node(&mut self, id: &str, delta: Vec2) {
        let children = match self.node_mut(id) {
            Some(node) => {
                node.position += delta;
                node.position_absolute = Some(node.absolute_position() + delta);
                node.children().to_vec()
            }
            None => return,
        };
        // Child `position` is parent-relative and stays put.
        for child in children {
            if let Some(child) = self.node_mut(&child) {
                child.position_absolute = Some(child.absolute_position() + delta);
            }
        }
    }

    /// Make `node_id` a child of `group_id`, updating both sides together.
    ///
    /// Returns `false` without mutating when the node is already a child of
    /// the group, when either id is unknown, or when the target is not a group.
    /// A node parented elsewhere is detached from its old group first.
    pub fn add_node_to_group(&mut self, node_id: &str, group_id: &str) -> bool {
        if node_id == group_id {
            return false;
        }
        let (Some(node_idx), Some(group_idx)) = (self.index_of(node_id), self.index_of(group_id))
        else {
            return false;
        };
        if !self.nodes[group_idx].is_group() || self.nodes[node_idx].is_group() {
            return false;
        }
        if self.nodes[node_idx].parent.as_deref() == Some(group_id) {
            return false;
        }
        if self.nodes[node_idx].parent.is_some() {
            self.remove_node_from_group(node_id);
        }

        let group_origin = self.nodes[group_idx].absolute_position();
        if let NodeKind::Group { children } = &mut self.nodes[group_idx].kind {
            if !children.iter().any(|c| c == node_id) {
                children.push(node_id.to_string());
            }
        }
        let node = &mut self.nodes[node_idx];
        let absolute = node.absolute_position();
        node.parent = Some(group_id.to_string());
        node.position = (absolute - group_origin).to_pos2();
        node.position_absolute = Some(absolute);
        true
    }

    /// Detach `node_id` from its group. Returns `false` if it had no parent.
    pub fn remove_node_from_group(&mut self, node_id: &str) -> bool {
        let Some(node_idx) = self.index_of(node_id) else {
            return false;
        };
        let Some(parent_id) = self.nodes[node_idx].parent.take() else {
            return false;
        };
        if let Some(group) = self.node_mut(&parent_id) {
            if let NodeKind::Group { children } = &mut group.kind {
                children.retain(|c| c != node_id);
            }
        }
        let node = &mut self.nodes[node_idx];
        let absolute = node.absolute_position();
        node.position = absolute;
        node.position_absolute = Some(absolute);
        true
    }

    /// Recompute every group's `children` from the nodes' `parent` fields.
    ///
    /// Parents that do not name an existing group are cleared.
    pub fn rebuild_group_children(&mut self) {
        let group_ids: Vec<NodeId> = self.groups().map(|g| g.id.clone()).collect();
        for node in &mut self.nodes {
            if let Some(parent) = &node.parent {
                if !group_ids.contains(parent) || node.is_group() {
                    log::warn!("Dropping dangling parent {} on node {}", parent, node.id);
                    node.parent = None;
                }
            }
        }
        let memberships: Vec<(NodeId, NodeId)> = self
            .nodes
            .iter()
            .filter_map(|n| n.parent.clone().map(|p| (p, n.id.clone())))
            .collect();
        for node in &mut self.nodes {
            if let NodeKind::Group { children } = &mut node.kind {
                *children = memberships
                    .iter()
                    .filter(|(parent, _)| *parent == node.id)
                    .map(|(_, child)| child.clone())
                    .collect();
            }
        }
    }

    /// Check the two-sided membership invariant.
    pub fn membership_is_consistent(&self) -> bool {
        let parents_ok = self.nodes.iter().all(|n| match &n.parent {
            Some(p) => self
                .node(p)
                .is_some_and(|g| g.is_group() && g.children().contains(&n.id)),
            None => true,
        });
        let children_ok = self.groups().all(|g| {
            g.children()
                .iter()
                .all(|c| self.node(c).is_some_and(|n| n.parent.as_deref() == Some(g.id.as_str())))
        });
        parents_ok && children_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_group() -> WorkflowGraph {
        let mut graph = WorkflowGraph::default();
        graph.add_node(Node::group("g", "Group", Pos2::new(100.0, 100.0), Vec2::splat(200.0)));
        let a = Node::regular("a", "KSampler", Pos2::new(150.0, 150.0))
            .with_size(Vec2::splat(10.0));
        graph.add_node(a);
        graph
    }

    #[test]
    fn add_then_remove_is_symmetric() {
        let mut graph = graph_with_group();
        assert!(graph.add_node_to_group("a", "g"));
        assert_eq!(graph.node("a").unwrap().parent.as_deref(), Some("g"));
        assert_eq!(graph.node("g").unwrap().children(), ["a".to_string()]);
        assert!(graph.membership_is_consistent());

        assert!(graph.remove_node_from_group("a"));
        assert_eq!(graph.node("a").unwrap().parent, None);
        assert!(graph.node("g").unwrap().children().is_empty());
        assert!(graph.membership_is_consistent());
    }

    #[test]
    fn membership_ops_are_idempotent() {
        let mut graph = graph_with_group();
        assert!(graph.add_node_to_group("a", "g"));
        let snapshot = graph.clone();
        assert!(!graph.add_node_to_group("a", "g"));
        assert_eq!(graph, snapshot);

        assert!(graph.remove_node_from_group("a"));
        assert!(!graph.remove_node_from_group("a"));
    }

    #[test]
    fn child_position_becomes_relative_and_is_restored() {
        let mut graph = graph_with_group();
        graph.add_node_to_group("a", "g");
        let a = graph.node("a").unwrap();
        assert_eq!(a.position, Pos2::new(50.0, 50.0));
        assert_eq!(a.absolute_position(), Pos2::new(150.0, 150.0));

        graph.move_node("g", Vec2::new(10.0, 0.0));
        let a = graph.node("a").unwrap();
        assert_eq!(a.position, Pos2::new(50.0, 50.0));
        assert_eq!(a.absolute_position(), Pos2::new(160.0, 150.0));

        graph.remove_node_from_group("a");
        assert_eq!(graph.node("a").unwrap().position, Pos2::new(160.0, 150.0));
    }

    #[test]
    fn groups_cannot_join_groups() {
        let mut graph = graph_with_group();
        graph.add_node(Node::group("g2", "Inner", Pos2::ZERO, Vec2::splat(10.0)));
        assert!(!graph.add_node_to_group("g2", "g"));
        assert!(!graph.add_node_to_group("a", "missing"));
        assert!(!graph.add_node_to_group("a", "a"));
    }

    #[test]
    fn deleting_group_releases_children() {
        let mut graph = graph_with_group();
        graph.add_node_to_group("a", "g");
        graph.remove_nodes(&["g".to_string()]);
        assert_eq!(graph.node("a").unwrap().parent, None);
        assert!(graph.membership_is_consistent());
    }

    #[test]
    fn deleting_child_updates_group_and_connections() {
        let mut graph = graph_with_group();
        graph.add_node(Node::regular("b", "VAEDecode", Pos2::ZERO));
        graph.connections.push(Connection::new("a", "LATENT", "b", "samples"));
        graph.add_node_to_group("a", "g");
        graph.remove_nodes(&["a".to_string()]);
        assert!(graph.node("g").unwrap().children().is_empty());
        assert!(graph.connections.is_empty());
    }

    #[test]
    fn rebuild_recomputes_children_and_drops_dangling_parents() {
        let mut graph = graph_with_group();
        graph.node_mut("a").unwrap().parent = Some("g".into());
        let mut orphan = Node::regular("b", "VAEDecode", Pos2::ZERO);
        orphan.parent = Some("gone".into());
        graph.add_node(orphan);

        graph.rebuild_group_children();
        assert_eq!(graph.node("g").unwrap().children(), ["a".to_string()]);
        assert_eq!(graph.node("b").unwrap().parent, None);
        assert!(graph.membership_is_consistent());
    }
}
