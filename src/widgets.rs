//! Widget catalog: the node types the backend knows how to run.
//!
//! A node whose widget is not in the catalog is "missing" (typically a
//! workflow built with an extension that is not installed). Missing nodes
//! can be repaired by swapping them for a similarly named widget.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gesture::HandleKind;
use crate::graph::{NodeId, NodeKind, Port, WorkflowGraph};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Widget {
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Widget {
    pub fn new(
        name: &str,
        category: &str,
        inputs: &[(&str, &str)],
        outputs: &[(&str, &str)],
    ) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            category: category.to_string(),
            inputs: ports(inputs),
            outputs: ports(outputs),
        }
    }

    /// First port on the side opposite `kind` that accepts `slot_type`.
    ///
    /// Dragging from a source handle needs a widget input; dragging from a
    /// target handle needs a widget output.
    pub fn compatible_port(&self, kind: HandleKind, slot_type: &str) -> Option<&Port> {
        let ports = match kind {
            HandleKind::Source => &self.inputs,
            HandleKind::Target => &self.outputs,
        };
        ports.iter().find(|p| p.accepts(slot_type))
    }
}

fn ports(list: &[(&str, &str)]) -> Vec<Port> {
    list.iter().map(|(name, ty)| Port::new(*name, *ty)).collect()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WidgetCatalog {
    widgets: BTreeMap<String, Widget>,
}

impl WidgetCatalog {
    pub fn new(widgets: impl IntoIterator<Item = Widget>) -> Self {
        Self {
            widgets: widgets.into_iter().map(|w| (w.name.clone(), w)).collect(),
        }
    }

    /// Built-in catalog covering the default text-to-image workflow.
    pub fn builtin() -> Self {
        Self::new([
            Widget::new(
                "CheckpointLoaderSimple",
                "loaders",
                &[],
                &[("MODEL", "MODEL"), ("CLIP", "CLIP"), ("VAE", "VAE")],
            ),
            Widget::new(
                "LoraLoader",
                "loaders",
                &[("model", "MODEL"), ("clip", "CLIP")],
                &[("MODEL", "MODEL"), ("CLIP", "CLIP")],
            ),
            Widget::new(
                "CLIPTextEncode",
                "conditioning",
                &[("clip", "CLIP")],
                &[("CONDITIONING", "CONDITIONING")],
            ),
            Widget::new(
                "KSampler",
                "sampling",
                &[
                    ("model", "MODEL"),
                    ("positive", "CONDITIONING"),
                    ("negative", "CONDITIONING"),
                    ("latent_image", "LATENT"),
                ],
                &[("LATENT", "LATENT")],
            ),
            Widget::new("EmptyLatentImage", "latent", &[], &[("LATENT", "LATENT")]),
            Widget::new(
                "VAEDecode",
                "latent",
                &[("samples", "LATENT"), ("vae", "VAE")],
                &[("IMAGE", "IMAGE")],
            ),
            Widget::new(
                "VAEEncode",
                "latent",
                &[("pixels", "IMAGE"), ("vae", "VAE")],
                &[("LATENT", "LATENT")],
            ),
            Widget::new("LoadImage", "image", &[], &[("IMAGE", "IMAGE"), ("MASK", "MASK")]),
            Widget::new("SaveImage", "image", &[("images", "IMAGE")], &[]),
            Widget::new("PreviewImage", "image", &[("images", "IMAGE")], &[]),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&Widget> {
        self.widgets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.widgets.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Widget> {
        self.widgets.values()
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Widgets that can be connected to a dangling handle of `slot_type`.
    pub fn compatible_with(&self, kind: HandleKind, slot_type: &str) -> Vec<&Widget> {
        self.iter()
            .filter(|w| w.compatible_port(kind, slot_type).is_some())
            .collect()
    }
}

/// Nodes whose widget is not in the catalog, keyed by widget name.
pub fn missing_widgets(
    graph: &WorkflowGraph,
    catalog: &WidgetCatalog,
) -> BTreeMap<String, Vec<NodeId>> {
    let mut missing: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for node in &graph.nodes {
        if let Some(widget) = node.widget() {
            if !catalog.contains(widget) {
                missing.entry(widget.to_string()).or_default().push(node.id.clone());
            }
        }
    }
    missing
}

/// Catalog widgets that look like replacements for `missing`.
///
/// Exact case-insensitive matches come first, then prefix matches either
/// way, then substring matches. Ties keep catalog order.
pub fn replacement_suggestions<'a>(missing: &str, catalog: &'a WidgetCatalog) -> Vec<&'a Widget> {
    let needle = missing.to_lowercase();
    let mut ranked: Vec<(u8, &Widget)> = catalog
        .iter()
        .filter_map(|w| {
            let name = w.name.to_lowercase();
            let rank = if name == needle {
                0
            } else if name.starts_with(&needle) || needle.starts_with(&name) {
                1
            } else if name.contains(&needle) || needle.contains(&name) {
                2
            } else {
                return None;
            };
            Some((rank, w))
        })
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);
    ranked.into_iter().map(|(_, w)| w).collect()
}

/// Swap a node's widget, keeping only connections whose handles still exist.
///
/// Returns the number of connections dropped, or `None` if the node is
/// unknown or a group.
pub fn replace_node_widget(
    graph: &mut WorkflowGraph,
    node_id: &str,
    widget: &Widget,
) -> Option<usize> {
    let node = graph.node_mut(node_id)?;
    if node.is_group() {
        return None;
    }
    node.kind = NodeKind::Regular {
        widget: widget.name.clone(),
        inputs: widget.inputs.clone(),
        outputs: widget.outputs.clone(),
    };
    node.title = widget.display_name.clone();

    let before = graph.connections.len();
    let inputs: Vec<String> = widget.inputs.iter().map(|p| p.name.clone()).collect();
    let outputs: Vec<String> = widget.outputs.iter().map(|p| p.name.clone()).collect();
    graph.connections.retain(|c| {
        (c.target != node_id || inputs.contains(&c.target_handle))
            && (c.source != node_id || outputs.contains(&c.source_handle))
    });
    Some(before - graph.connections.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Connection, Node};
    use egui::Pos2;

    #[test]
    fn detects_missing_widgets() {
        let mut graph = WorkflowGraph::default();
        graph.add_node(Node::regular("1", "KSampler", Pos2::ZERO));
        graph.add_node(Node::regular("2", "KSamplerAdvancedPlus", Pos2::ZERO));
        graph.add_node(Node::regular("3", "KSamplerAdvancedPlus", Pos2::ZERO));
        let missing = missing_widgets(&graph, &WidgetCatalog::builtin());
        assert_eq!(missing.len(), 1);
        assert_eq!(missing["KSamplerAdvancedPlus"], vec!["2".to_string(), "3".to_string()]);
    }

    #[test]
    fn suggestions_rank_prefix_before_substring() {
        let catalog = WidgetCatalog::builtin();
        let names: Vec<&str> = replacement_suggestions("KSamplerAdvanced", &catalog)
            .iter()
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(names, vec!["KSampler"]);

        let names: Vec<&str> = replacement_suggestions("image", &catalog)
            .iter()
            .map(|w| w.name.as_str())
            .collect();
        assert!(names.contains(&"LoadImage"));
        assert!(names.contains(&"EmptyLatentImage"));
    }

    #[test]
    fn replacing_widget_drops_stale_connections() {
        let catalog = WidgetCatalog::builtin();
        let mut graph = WorkflowGraph::default();
        graph.add_node(Node::regular("1", "CheckpointLoaderSimple", Pos2::ZERO));
        graph.add_node(Node::regular("2", "MissingSampler", Pos2::ZERO));
        graph.connections.push(Connection::new("1", "MODEL", "2", "model"));
        graph.connections.push(Connection::new("1", "VAE", "2", "vae_in"));

        let dropped = replace_node_widget(&mut graph, "2", catalog.get("KSampler").unwrap());
        assert_eq!(dropped, Some(1));
        assert_eq!(graph.node("2").unwrap().widget(), Some("KSampler"));
        assert_eq!(graph.connections.len(), 1);
    }

    #[test]
    fn compatible_widgets_for_dangling_output() {
        let catalog = WidgetCatalog::builtin();
        let names: Vec<&str> = catalog
            .compatible_with(HandleKind::Source, "LATENT")
            .iter()
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(names, vec!["KSampler", "VAEDecode"]);
    }
}
