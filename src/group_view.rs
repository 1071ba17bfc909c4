//! Render states of a group node.
//!
//! Zoomed out below [`INVISIBLE_TRANSFORM_THRESHOLD`] a group only shows its
//! title and child count. Otherwise a collapsed group shows the slots of all
//! its children merged together, and an expanded group is an empty frame
//! with its children drawn as ordinary nodes.

use crate::graph::{Node, NodeVisibleState, Port, WorkflowGraph};

/// Zoom level under which nodes drop their slots and widgets.
pub const INVISIBLE_TRANSFORM_THRESHOLD: f32 = 0.3;

#[derive(Clone, Debug, PartialEq)]
pub enum GroupRenderState {
    SmallTransform {
        title: String,
        child_count: usize,
    },
    /// Ports of every child, concatenated in child order without dedup.
    Collapsed {
        title: String,
        child_count: usize,
        inputs: Vec<Port>,
        outputs: Vec<Port>,
    },
    Expanded {
        title: String,
    },
}

impl GroupRenderState {
    pub fn resolve(group: &Node, graph: &WorkflowGraph, zoom: f32) -> Self {
        let title = group.title.clone();
        let child_count = group.children().len();
        if zoom < INVISIBLE_TRANSFORM_THRESHOLD {
            return GroupRenderState::SmallTransform { title, child_count };
        }
        match group.visible_state {
            NodeVisibleState::Collapsed => {
                let children: Vec<&Node> = group
                    .children()
                    .iter()
                    .filter_map(|id| graph.node(id))
                    .collect();
                GroupRenderState::Collapsed {
                    title,
                    child_count,
                    inputs: children.iter().flat_map(|c| c.inputs().iter().cloned()).collect(),
                    outputs: children.iter().flat_map(|c| c.outputs().iter().cloned()).collect(),
                }
            }
            NodeVisibleState::Expanded => GroupRenderState::Expanded { title },
        }
    }

    /// Header text.
    pub fn label(&self) -> String {
        match self {
            GroupRenderState::SmallTransform { title, child_count }
            | GroupRenderState::Collapsed {
                title, child_count, ..
            } => format!("{}({} children)", title, child_count),
            GroupRenderState::Expanded { title } => title.clone(),
        }
    }

    /// Children are drawn as standalone nodes only when expanded.
    pub fn shows_children(&self) -> bool {
        matches!(self, GroupRenderState::Expanded { .. })
    }
}

/// Whether the group is drawn with the selection highlight.
pub fn is_highlighted(group: &Node, dragging_over_group_id: Option<&str>) -> bool {
    group.selected || dragging_over_group_id == Some(group.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{Pos2, Vec2};

    fn graph() -> WorkflowGraph {
        let mut graph = WorkflowGraph::default();
        graph.add_node(Node::group("g", "Prompt", Pos2::ZERO, Vec2::splat(500.0)));
        for id in ["a", "b"] {
            graph.add_node(
                Node::regular(id, "CLIPTextEncode", Pos2::new(10.0, 10.0)).with_ports(
                    vec![Port::new("clip", "CLIP")],
                    vec![Port::new("CONDITIONING", "CONDITIONING")],
                ),
            );
            graph.add_node_to_group(id, "g");
        }
        graph
    }

    #[test]
    fn small_transform_wins_over_collapsed() {
        let mut g = graph();
        g.node_mut("g").unwrap().visible_state = NodeVisibleState::Collapsed;
        let state = GroupRenderState::resolve(g.node("g").unwrap(), &g, 0.2);
        assert_eq!(
            state,
            GroupRenderState::SmallTransform {
                title: "Prompt".into(),
                child_count: 2
            }
        );
        assert_eq!(state.label(), "Prompt(2 children)");
    }

    #[test]
    fn collapsed_sums_child_slots_without_dedup() {
        let mut g = graph();
        g.node_mut("g").unwrap().visible_state = NodeVisibleState::Collapsed;
        match GroupRenderState::resolve(g.node("g").unwrap(), &g, 1.0) {
            GroupRenderState::Collapsed { inputs, outputs, .. } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(outputs.len(), 2);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn default_state_is_expanded() {
        let g = graph();
        let state = GroupRenderState::resolve(g.node("g").unwrap(), &g, 1.0);
        assert!(state.shows_children());
        assert_eq!(state.label(), "Prompt");
    }

    #[test]
    fn hovered_group_is_highlighted() {
        let g = graph();
        let group = g.node("g").unwrap();
        assert!(!is_highlighted(group, None));
        assert!(is_highlighted(group, Some("g")));
    }
}
