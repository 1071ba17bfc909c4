//! # Drag-to-group membership
//!
//! While nodes are dragged, [`GroupDragTracker`] tracks which group (if any)
//! fully contains the dragged selection. Nothing is mutated until the
//! pointer is released; then each dragged node is adopted into, or released
//! from, a group according to where the drag ended.
//!
//! ## Release rules
//! For every dragged node, in selection order:
//! 1. already a child of the hovered group: nothing
//! 2. in a group, released over no group: removed from its group
//! 3. in no group, released over a group: added to that group
//! 4. in group A, released over group B: nothing (no direct transfer)

use egui::{Pos2, Rect};
use log::debug;

use crate::geometry::{bbox, contains};
use crate::gesture::DragGestureState;
use crate::graph::{NodeId, WorkflowGraph};

/// A node as reported by a selection-change event.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectedNode {
    pub id: NodeId,
    pub position_absolute: Option<Pos2>,
}

impl SelectedNode {
    pub fn new(id: impl Into<NodeId>, position_absolute: Option<Pos2>) -> Self {
        Self {
            id: id.into(),
            position_absolute,
        }
    }
}

/// What a selection-change evaluation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// No gesture in progress, or nothing selected.
    NotDragging,
    /// The selection contains a group node.
    GroupInSelection,
    /// A selected id is missing from the graph; no state was touched.
    Aborted,
    /// Drag target updated.
    Hovering(Option<NodeId>),
}

/// Membership changes applied on release.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupingOutcome {
    pub added: Vec<(NodeId, NodeId)>,
    pub removed: Vec<(NodeId, NodeId)>,
}

impl GroupingOutcome {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct GroupDragTracker {
    gesture: DragGestureState,
    dragging_over_group_id: Option<NodeId>,
    drag_selection: Vec<NodeId>,
}

impl GroupDragTracker {
    pub fn gesture(&self) -> DragGestureState {
        self.gesture
    }

    /// Group currently highlighted as the drop target.
    pub fn dragging_over_group_id(&self) -> Option<&str> {
        self.dragging_over_group_id.as_deref()
    }

    pub fn on_mouse_down(&mut self) {
        self.gesture = self.gesture.mouse_down();
        self.drag_selection.clear();
    }

    pub fn on_selection_change(
        &mut self,
        selection: &[SelectedNode],
        graph: &WorkflowGraph,
    ) -> Evaluation {
        if !self.gesture.is_pressed() || selection.is_empty() {
            return Evaluation::NotDragging;
        }
        if selection
            .iter()
            .any(|s| graph.node(&s.id).is_some_and(|n| n.is_group()))
        {
            return Evaluation::GroupInSelection;
        }

        let Some(rects) = realtime_rects(selection, graph) else {
            debug!("Selection references unknown nodes, skipping group hit test");
            return Evaluation::Aborted;
        };

        self.gesture = self.gesture.drag();
        self.drag_selection = selection.iter().map(|s| s.id.clone()).collect();

        let hovered = bbox(rects).and_then(|area| candidate_group(graph, area));
        if hovered != self.dragging_over_group_id {
            debug!("Dragging over group: {:?}", hovered);
        }
        self.dragging_over_group_id = hovered.clone();
        Evaluation::Hovering(hovered)
    }

    /// Pointer released: clear the drop target and apply membership changes.
    pub fn on_mouse_up(&mut self, graph: &mut WorkflowGraph) -> GroupingOutcome {
        let hovered = self.dragging_over_group_id.take();
        let was_dragging = self.gesture.is_dragging();
        self.gesture = self.gesture.mouse_up();
        let selection = std::mem::take(&mut self.drag_selection);

        let mut outcome = GroupingOutcome::default();
        if !was_dragging {
            return outcome;
        }
        let hovered_group = hovered.filter(|id| graph.node(id).is_some_and(|n| n.is_group()));

        for node_id in selection {
            let Some(parent) = graph.node(&node_id).map(|n| n.parent.clone()) else {
                continue;
            };
            match (parent, &hovered_group) {
                (Some(parent), Some(group)) if parent == *group => {}
                (Some(parent), None) => {
                    if graph.remove_node_from_group(&node_id) {
                        outcome.removed.push((node_id, parent));
                    }
                }
                (None, Some(group)) => {
                    if graph.add_node_to_group(&node_id, group) {
                        outcome.added.push((node_id, group.clone()));
                    }
                }
                // Moving straight from one group to another is not a transfer.
                (Some(_), Some(_)) | (None, None) => {}
            }
        }
        if !outcome.is_empty() {
            debug!("Group membership changed: {:?}", outcome);
        }
        outcome
    }
}

/// Rects of the selected nodes as they are right now.
///
/// Prefers the graph's absolute position, then the event's, then the graph's
/// relative position. `None` when any id is missing from the graph.
fn realtime_rects(selection: &[SelectedNode], graph: &WorkflowGraph) -> Option<Vec<Rect>> {
    selection
        .iter()
        .map(|s| {
            let node = graph.node(&s.id)?;
            let min = node
                .position_absolute
                .or(s.position_absolute)
                .unwrap_or(node.position);
            Some(Rect::from_min_size(min, node.rect().size()))
        })
        .collect()
}

/// First group, in list order, whose box fully contains `area`.
pub fn candidate_group(graph: &WorkflowGraph, area: Rect) -> Option<NodeId> {
    graph
        .groups()
        .find(|g| contains(g.rect(), area))
        .map(|g| g.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use egui::Vec2;

    fn graph() -> WorkflowGraph {
        let mut graph = WorkflowGraph::default();
        graph.add_node(Node::group("g1", "One", Pos2::new(0.0, 0.0), Vec2::splat(100.0)));
        graph.add_node(Node::group("g2", "Two", Pos2::new(-50.0, -50.0), Vec2::splat(300.0)));
        let a = Node::regular("a", "KSampler", Pos2::new(10.0, 10.0)).with_size(Vec2::splat(10.0));
        graph.add_node(a);
        graph
    }

    fn sel(id: &str) -> Vec<SelectedNode> {
        vec![SelectedNode::new(id, None)]
    }

    #[test]
    fn first_containing_group_wins() {
        let g = graph();
        let mut tracker = GroupDragTracker::default();
        tracker.on_mouse_down();
        assert_eq!(
            tracker.on_selection_change(&sel("a"), &g),
            Evaluation::Hovering(Some("g1".into()))
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let g = graph();
        let mut first = GroupDragTracker::default();
        let mut second = GroupDragTracker::default();
        first.on_mouse_down();
        second.on_mouse_down();
        assert_eq!(
            first.on_selection_change(&sel("a"), &g),
            second.on_selection_change(&sel("a"), &g)
        );
        assert_eq!(first.dragging_over_group_id(), second.dragging_over_group_id());
    }

    #[test]
    fn selection_without_press_is_ignored() {
        let g = graph();
        let mut tracker = GroupDragTracker::default();
        assert_eq!(tracker.on_selection_change(&sel("a"), &g), Evaluation::NotDragging);
        assert_eq!(tracker.dragging_over_group_id(), None);
    }

    #[test]
    fn group_in_selection_leaves_target_untouched() {
        let g = graph();
        let mut tracker = GroupDragTracker::default();
        tracker.on_mouse_down();
        tracker.on_selection_change(&sel("a"), &g);
        let mixed = vec![SelectedNode::new("a", None), SelectedNode::new("g2", None)];
        assert_eq!(tracker.on_selection_change(&mixed, &g), Evaluation::GroupInSelection);
        assert_eq!(tracker.dragging_over_group_id(), Some("g1"));
    }

    #[test]
    fn unknown_node_aborts_without_state_change() {
        let g = graph();
        let mut tracker = GroupDragTracker::default();
        tracker.on_mouse_down();
        tracker.on_selection_change(&sel("a"), &g);
        let stale = vec![SelectedNode::new("a", None), SelectedNode::new("deleted", None)];
        assert_eq!(tracker.on_selection_change(&stale, &g), Evaluation::Aborted);
        assert_eq!(tracker.dragging_over_group_id(), Some("g1"));
    }

    #[test]
    fn event_position_is_used_when_graph_has_none() {
        let mut g = graph();
        g.node_mut("a").unwrap().position_absolute = None;
        g.node_mut("a").unwrap().position = Pos2::new(1000.0, 1000.0);
        let mut tracker = GroupDragTracker::default();
        tracker.on_mouse_down();
        let moved = vec![SelectedNode::new("a", Some(Pos2::new(20.0, 20.0)))];
        assert_eq!(
            tracker.on_selection_change(&moved, &g),
            Evaluation::Hovering(Some("g1".into()))
        );
    }

    #[test]
    fn mouse_up_without_drag_only_clears() {
        let mut g = graph();
        let before = g.clone();
        let mut tracker = GroupDragTracker::default();
        tracker.on_mouse_down();
        let outcome = tracker.on_mouse_up(&mut g);
        assert!(outcome.is_empty());
        assert_eq!(g, before);
        assert_eq!(tracker.gesture(), DragGestureState::Idle);
    }

    #[test]
    fn release_over_group_adopts_node() {
        let mut g = graph();
        let mut tracker = GroupDragTracker::default();
        tracker.on_mouse_down();
        tracker.on_selection_change(&sel("a"), &g);
        let outcome = tracker.on_mouse_up(&mut g);
        assert_eq!(outcome.added, vec![("a".to_string(), "g1".to_string())]);
        assert_eq!(tracker.dragging_over_group_id(), None);
        assert!(g.membership_is_consistent());
    }
}
