//! Connection validity and the repair flow for dropped connections.
//!
//! An input accepts at most one connection; connecting into an occupied
//! input replaces the old edge. When a connection drag is released over
//! empty canvas, [`suggest_widgets`] builds the list of widgets that could
//! be created there and wired to the dangling handle.

use std::fmt;

use egui::Pos2;
use uuid::Uuid;

use crate::gesture::{ConnectingParams, HandleKind};
use crate::graph::{Connection, Node, NodeId, WorkflowGraph};
use crate::widgets::{Widget, WidgetCatalog};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionRejection {
    SelfLoop,
    MissingNode(NodeId),
    GroupEndpoint(NodeId),
    MissingPort { node: NodeId, port: String },
    TypeMismatch { source_type: String, target_type: String },
}

impl fmt::Display for ConnectionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRejection::SelfLoop => write!(f, "a node cannot connect to itself"),
            ConnectionRejection::MissingNode(id) => write!(f, "node {} does not exist", id),
            ConnectionRejection::GroupEndpoint(id) => write!(f, "group {} has no slots", id),
            ConnectionRejection::MissingPort { node, port } => {
                write!(f, "node {} has no slot named {}", node, port)
            }
            ConnectionRejection::TypeMismatch {
                source_type,
                target_type,
            } => write!(f, "cannot connect {} to {}", source_type, target_type),
        }
    }
}

impl std::error::Error for ConnectionRejection {}

fn regular_node<'a>(graph: &'a WorkflowGraph, id: &str) -> Result<&'a Node, ConnectionRejection> {
    let node = graph
        .node(id)
        .ok_or_else(|| ConnectionRejection::MissingNode(id.to_string()))?;
    if node.is_group() {
        return Err(ConnectionRejection::GroupEndpoint(id.to_string()));
    }
    Ok(node)
}

pub fn validate_connection(
    graph: &WorkflowGraph,
    conn: &Connection,
) -> Result<(), ConnectionRejection> {
    if conn.source == conn.target {
        return Err(ConnectionRejection::SelfLoop);
    }
    let source = regular_node(graph, &conn.source)?;
    let target = regular_node(graph, &conn.target)?;
    let output = source
        .output(&conn.source_handle)
        .ok_or_else(|| ConnectionRejection::MissingPort {
            node: conn.source.clone(),
            port: conn.source_handle.clone(),
        })?;
    let input = target
        .input(&conn.target_handle)
        .ok_or_else(|| ConnectionRejection::MissingPort {
            node: conn.target.clone(),
            port: conn.target_handle.clone(),
        })?;
    if !input.accepts(&output.slot_type) {
        return Err(ConnectionRejection::TypeMismatch {
            source_type: output.slot_type.clone(),
            target_type: input.slot_type.clone(),
        });
    }
    Ok(())
}

/// Validate and add a connection, replacing whatever fed the same input.
///
/// Returns the id of the new connection.
pub fn connect(
    graph: &mut WorkflowGraph,
    mut conn: Connection,
) -> Result<String, ConnectionRejection> {
    validate_connection(graph, &conn)?;
    if conn.id.is_empty() {
        conn.id = Uuid::new_v4().to_string();
    }
    graph
        .connections
        .retain(|c| !(c.target == conn.target && c.target_handle == conn.target_handle));
    let id = conn.id.clone();
    graph.connections.push(conn);
    Ok(id)
}

/// Reconnect an existing edge to new endpoints.
///
/// The old edge is only removed when the new one is valid.
pub fn update_connection(
    graph: &mut WorkflowGraph,
    old_id: &str,
    mut new_conn: Connection,
) -> Result<String, ConnectionRejection> {
    validate_connection(graph, &new_conn)?;
    graph.connections.retain(|c| c.id != old_id);
    new_conn.id = old_id.to_string();
    connect(graph, new_conn)
}

/// Build the connection between an existing handle and a newly created node.
pub fn connection_to_new_node(
    params: &ConnectingParams,
    node_id: &str,
    widget: &Widget,
) -> Option<Connection> {
    let port = widget.compatible_port(params.handle_kind, &params.slot_type)?;
    Some(match params.handle_kind {
        HandleKind::Source => Connection::new(&params.node_id, &params.handle, node_id, &port.name),
        HandleKind::Target => Connection::new(node_id, &port.name, &params.node_id, &params.handle),
    })
}

/// Context for the "create a node here" picker shown after a failed connect.
#[derive(Clone, Debug, PartialEq)]
pub struct WidgetSuggestionContext {
    pub position: Pos2,
    pub params: ConnectingParams,
    pub candidates: Vec<String>,
}

pub fn suggest_widgets(
    catalog: &WidgetCatalog,
    params: ConnectingParams,
    position: Pos2,
) -> WidgetSuggestionContext {
    let candidates = catalog
        .compatible_with(params.handle_kind, &params.slot_type)
        .into_iter()
        .map(|w| w.name.clone())
        .collect();
    WidgetSuggestionContext {
        position,
        params,
        candidates,
    }
}
