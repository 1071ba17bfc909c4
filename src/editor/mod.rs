//! # Canvas Editor
//!
//! The egui widget that draws the workflow canvas and turns pointer input
//! into [`AppController`] events.
//!
//! ## Submodules
//! - [`connection_renderer`]: edge drawing and hit testing
//! - [`style`]: colors and sizes
//!
//! ## Event flow
//! A primary press always starts a gesture (`on_mouse_down`). While nodes
//! are dragged the realtime selection is reported after every move, and the
//! release always ends in `on_mouse_up` or `on_node_drag_stop`, so the drop
//! target highlight never outlives the gesture.

pub mod connection_renderer;
pub mod style;

pub use style::EditorStyle;

use std::collections::HashMap;

use eframe::egui;
use egui::{Align2, Color32, CornerRadius, FontId, Pos2, Rect, Sense, Stroke, StrokeKind, Vec2};

use crate::controller::AppController;
use crate::geometry::CanvasTransform;
use crate::gesture::{ConnectingParams, HandleKind};
use crate::graph::{Connection, Node, NodeId, Port, WorkflowGraph};
use crate::group_view::{GroupRenderState, INVISIBLE_TRANSFORM_THRESHOLD, is_highlighted};
use crate::grouping::SelectedNode;
use crate::settings::{EdgeType, SelectionMode};
use connection_renderer::{draw_edge, hit_test_edge};
use style::{HEADER_HEIGHT, NODE_WIDTH, SLOT_RADIUS, SLOT_SPACING, slot_color};

/// Size a regular node is drawn at, in canvas units.
pub fn regular_node_size(node: &Node) -> Vec2 {
    let rows = node.inputs().len().max(node.outputs().len()).max(1);
    Vec2::new(NODE_WIDTH, HEADER_HEIGHT + SLOT_SPACING * rows as f32 + 8.0)
}

/// Canvas position of the `index`-th slot on one side of `rect`.
fn slot_pos(rect: Rect, kind: HandleKind, index: usize) -> Pos2 {
    let y = rect.top() + HEADER_HEIGHT + SLOT_SPACING * (index as f32 + 0.5);
    match kind {
        HandleKind::Target => Pos2::new(rect.left(), y),
        HandleKind::Source => Pos2::new(rect.right(), y),
    }
}

/// Connection from the dragged handle to the slot it was dropped on.
fn connection_between(params: &ConnectingParams, slot: &SlotHit) -> Option<Connection> {
    match (params.handle_kind, slot.kind) {
        (HandleKind::Source, HandleKind::Target) => Some(Connection::new(
            &params.node_id,
            &params.handle,
            &slot.node_id,
            &slot.name,
        )),
        (HandleKind::Target, HandleKind::Source) => Some(Connection::new(
            &slot.node_id,
            &slot.name,
            &params.node_id,
            &params.handle,
        )),
        _ => None,
    }
}

fn delete_target(app: &mut AppController, target: &ContextTarget) {
    match target {
        ContextTarget::Node(id) => app.on_delete_nodes(std::slice::from_ref(id)),
        ContextTarget::Edge(id) => app.on_delete_edges(std::slice::from_ref(id)),
        ContextTarget::Pane => {}
    }
}

#[derive(Clone, Debug, PartialEq)]
struct SlotHit {
    node_id: NodeId,
    name: String,
    kind: HandleKind,
    slot_type: String,
    pos: Pos2,
}

/// What is drawn where this frame, in canvas coordinates.
#[derive(Default)]
struct Layout {
    /// Groups in draw order (largest first).
    groups: Vec<(NodeId, Rect, GroupRenderState)>,
    /// Visible regular nodes in draw order.
    nodes: Vec<(NodeId, Rect)>,
    /// Nodes hidden inside a collapsed group, mapped to that group.
    hidden: HashMap<NodeId, NodeId>,
}

impl Layout {
    fn build(app: &AppController) -> Self {
        let graph = app.graph();
        let mut layout = Layout::default();
        for group in graph.groups() {
            layout
                .groups
                .push((group.id.clone(), group.rect(), app.group_render_state(group)));
        }
        layout.groups.sort_by(|a, b| {
            let area_a = a.1.width() * a.1.height();
            let area_b = b.1.width() * b.1.height();
            area_b.partial_cmp(&area_a).unwrap_or(std::cmp::Ordering::Equal)
        });

        for node in graph.nodes.iter().filter(|n| !n.is_group()) {
            let hidden_by = node.parent.as_ref().filter(|parent| {
                layout
                    .groups
                    .iter()
                    .any(|(id, _, state)| id == *parent && !state.shows_children())
            });
            match hidden_by {
                Some(group) => {
                    layout.hidden.insert(node.id.clone(), group.clone());
                }
                None => layout.nodes.push((node.id.clone(), node.rect())),
            }
        }
        layout
    }

    fn node_rect(&self, id: &str) -> Option<Rect> {
        self.nodes.iter().find(|(n, _)| n == id).map(|(_, r)| *r)
    }

    fn group_rect(&self, id: &str) -> Option<Rect> {
        self.groups.iter().find(|(g, _, _)| g == id).map(|(_, r, _)| *r)
    }

    /// Where an edge attaches to `node_id`. Hidden nodes attach to their group header.
    fn endpoint(
        &self,
        graph: &WorkflowGraph,
        node_id: &str,
        handle: &str,
        kind: HandleKind,
    ) -> Option<Pos2> {
        if let Some(group) = self.hidden.get(node_id) {
            let rect = self.group_rect(group)?;
            let y = rect.top() + HEADER_HEIGHT * 0.5;
            return Some(match kind {
                HandleKind::Target => Pos2::new(rect.left(), y),
                HandleKind::Source => Pos2::new(rect.right(), y),
            });
        }
        let rect = self.node_rect(node_id)?;
        let node = graph.node(node_id)?;
        let index = match kind {
            HandleKind::Target => node.inputs().iter().position(|p| p.name == handle)?,
            HandleKind::Source => node.outputs().iter().position(|p| p.name == handle)?,
        };
        Some(slot_pos(rect, kind, index))
    }

    fn slot_at(&self, graph: &WorkflowGraph, pos: Pos2, radius: f32) -> Option<SlotHit> {
        for (id, rect) in self.nodes.iter().rev() {
            let Some(node) = graph.node(id) else { continue };
            let sides = [
                (HandleKind::Target, node.inputs()),
                (HandleKind::Source, node.outputs()),
            ];
            for (kind, ports) in sides {
                for (index, port) in ports.iter().enumerate() {
                    let slot = slot_pos(*rect, kind, index);
                    if slot.distance(pos) <= radius {
                        return Some(SlotHit {
                            node_id: id.clone(),
                            name: port.name.clone(),
                            kind,
                            slot_type: port.slot_type.clone(),
                            pos: slot,
                        });
                    }
                }
            }
        }
        None
    }

    /// Topmost node under `pos`. Expanded groups are only grabbed by their header.
    fn node_at(&self, pos: Pos2) -> Option<NodeId> {
        if let Some((id, _)) = self.nodes.iter().rev().find(|(_, r)| r.contains(pos)) {
            return Some(id.clone());
        }
        self.groups
            .iter()
            .rev()
            .find(|(_, rect, state)| {
                if state.shows_children() {
                    header_rect(*rect).contains(pos)
                } else {
                    rect.contains(pos)
                }
            })
            .map(|(id, _, _)| id.clone())
    }

    /// Group whose title bar is under `pos`, unless a node covers it.
    fn group_header_at(&self, pos: Pos2) -> Option<NodeId> {
        let id = self.node_at(pos)?;
        self.group_rect(&id)
            .filter(|rect| header_rect(*rect).contains(pos))
            .map(|_| id)
    }
}

fn header_rect(rect: Rect) -> Rect {
    Rect::from_min_size(rect.min, Vec2::new(rect.width(), HEADER_HEIGHT))
}

enum Interaction {
    Idle,
    DraggingNodes { ids: Vec<NodeId>, moved: bool },
    /// Dragging a new connection out of the slot at `from`.
    Connecting { from: Pos2 },
    /// Dragging the loose end of an existing edge; `from` is the fixed end.
    UpdatingEdge { from: Pos2 },
    Panning { moved: bool },
    Selecting { start: Pos2 },
}

/// What a right click landed on.
#[derive(Clone, Debug, PartialEq)]
enum ContextTarget {
    Node(NodeId),
    Edge(String),
    Pane,
}

pub struct CanvasEditor {
    pub style: EditorStyle,
    pub transform: CanvasTransform,
    interaction: Interaction,
    context_target: Option<ContextTarget>,
    finder_query: String,
    /// Screen rect the canvas occupied last frame.
    viewport: Rect,
}

impl Default for CanvasEditor {
    fn default() -> Self {
        Self {
            style: EditorStyle::default(),
            transform: CanvasTransform::default(),
            interaction: Interaction::Idle,
            context_target: None,
            finder_query: String::new(),
            viewport: Rect::ZERO,
        }
    }
}

impl CanvasEditor {
    /// Canvas position at the middle of the visible area.
    pub fn view_center(&self) -> Pos2 {
        self.transform.from_screen(self.viewport.center(), self.viewport.min)
    }

    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        app: &mut AppController,
        edge_type: EdgeType,
        selection_mode: SelectionMode,
    ) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let origin = rect.min;
        self.viewport = rect;

        self.handle_zoom(ui, app, rect);

        let sizes: Vec<(NodeId, Vec2)> = app
            .graph()
            .nodes
            .iter()
            .filter(|n| !n.is_group())
            .map(|n| (n.id.clone(), regular_node_size(n)))
            .collect();
        for (id, size) in sizes {
            app.on_node_measured(&id, size);
        }

        let (pressed, down, released, middle_down, delta, pointer) = ui.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.primary_released(),
                i.pointer.middle_down(),
                i.pointer.delta(),
                i.pointer.interact_pos(),
            )
        });
        let pointer_in_canvas = pointer.filter(|p| rect.contains(*p));

        if middle_down && pointer_in_canvas.is_some() && delta != Vec2::ZERO {
            self.transform.pan += delta;
            app.on_transform_end(self.transform);
        }

        let layout = Layout::build(app);
        // Presses landing on a popup above the canvas are not canvas gestures.
        if pressed && response.hovered() {
            if let Some(screen) = pointer_in_canvas {
                self.on_press(app, &layout, origin, screen, edge_type, selection_mode);
            }
        } else if down {
            self.on_drag(app, delta);
        }
        if released {
            let canvas = pointer.map(|p| self.transform.from_screen(p, origin));
            self.on_release(app, &layout, canvas);
        }
        if response.double_clicked() {
            let header = pointer_in_canvas
                .map(|p| self.transform.from_screen(p, origin))
                .and_then(|p| layout.group_header_at(p));
            if let Some(group) = header {
                app.toggle_group_collapsed(&group);
            }
        }
        if response.secondary_clicked() {
            self.context_target = pointer_in_canvas
                .map(|p| self.target_at(app.graph(), &layout, origin, p, edge_type));
        }
        self.context_menu(&response, app);

        // Geometry may have changed while handling input.
        let layout = Layout::build(app);
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, Color32::from_gray(32));
        self.draw_groups(&painter, app, &layout, origin);
        self.draw_connections(&painter, app.graph(), &layout, origin, edge_type);
        for (id, node_rect) in &layout.nodes {
            if let Some(node) = app.graph().node(id) {
                self.draw_node(&painter, app, node, *node_rect, origin);
            }
        }
        if let Some(pointer) = pointer {
            self.draw_pending_connection(&painter, app, origin, pointer, edge_type);
        }
        if let Interaction::Selecting { start } = self.interaction {
            if let Some(pointer) = pointer {
                let start = self.transform.to_screen(start, origin);
                let selection = Rect::from_two_pos(start, pointer);
                let fill = Color32::from_rgba_unmultiplied(100, 150, 255, 30);
                painter.rect_filled(selection, 0.0, fill);
                painter.rect_stroke(
                    selection,
                    0.0,
                    Stroke::new(1.0, Color32::from_rgb(100, 150, 255)),
                    StrokeKind::Middle,
                );
            }
        }

        self.show_suggestion(ui, app, origin);
        let pointer_canvas = pointer_in_canvas.map(|p| self.transform.from_screen(p, origin));
        self.handle_keys(ui, app, pointer_canvas);
    }

    fn handle_zoom(&mut self, ui: &egui::Ui, app: &mut AppController, rect: Rect) {
        let (scroll, pinch, hover) =
            ui.input(|i| (i.smooth_scroll_delta.y, i.zoom_delta(), i.pointer.hover_pos()));
        let Some(hover) = hover.filter(|p| rect.contains(*p)) else {
            return;
        };
        let factor = pinch * (1.0 + scroll * 0.001);
        if factor != 1.0 {
            self.transform.zoom_around(hover - rect.min, factor);
            app.on_transform_end(self.transform);
        }
    }

    fn on_press(
        &mut self,
        app: &mut AppController,
        layout: &Layout,
        origin: Pos2,
        screen: Pos2,
        edge_type: EdgeType,
        selection_mode: SelectionMode,
    ) {
        app.on_mouse_down();
        let pos = self.transform.from_screen(screen, origin);
        let radius = (SLOT_RADIUS * 2.0).max(8.0 / self.transform.zoom);

        if let Some(slot) = layout.slot_at(app.graph(), pos, radius) {
            // Grabbing a connected input picks up that edge's loose end.
            let existing = app
                .graph()
                .connections
                .iter()
                .find(|c| {
                    slot.kind == HandleKind::Target
                        && c.target == slot.node_id
                        && c.target_handle == slot.name
                })
                .cloned();
            if let Some(edge) = existing {
                let (source, handle) = (&edge.source, &edge.source_handle);
                let fixed_end = layout.endpoint(app.graph(), source, handle, HandleKind::Source);
                if let Some(from) = fixed_end {
                    app.on_edge_update_start(&edge.id, HandleKind::Target);
                    self.interaction = Interaction::UpdatingEdge { from };
                    return;
                }
            }
            app.on_connect_start(ConnectingParams {
                node_id: slot.node_id,
                handle: slot.name,
                handle_kind: slot.kind,
                slot_type: slot.slot_type,
            });
            self.interaction = Interaction::Connecting { from: slot.pos };
            return;
        }

        if let Some(id) = layout.node_at(pos) {
            let already_selected = app.graph().node(&id).is_some_and(|n| n.selected);
            let ids = if already_selected {
                app.graph().selected_ids()
            } else {
                app.select_nodes(std::slice::from_ref(&id));
                vec![id]
            };
            self.interaction = Interaction::DraggingNodes { ids, moved: false };
            return;
        }

        if let Some(edge) = self.edge_at(app.graph(), layout, origin, screen, edge_type) {
            app.select_connection(&edge);
            self.interaction = Interaction::Idle;
            return;
        }

        self.interaction = match selection_mode {
            SelectionMode::Default => Interaction::Panning { moved: false },
            SelectionMode::Figma => Interaction::Selecting { start: pos },
        };
    }

    fn edge_at(
        &self,
        graph: &WorkflowGraph,
        layout: &Layout,
        origin: Pos2,
        screen: Pos2,
        edge_type: EdgeType,
    ) -> Option<String> {
        graph
            .connections
            .iter()
            .find(|c| {
                let ends = (
                    layout.endpoint(graph, &c.source, &c.source_handle, HandleKind::Source),
                    layout.endpoint(graph, &c.target, &c.target_handle, HandleKind::Target),
                );
                match ends {
                    (Some(p1), Some(p2)) => hit_test_edge(
                        edge_type,
                        screen,
                        self.transform.to_screen(p1, origin),
                        self.transform.to_screen(p2, origin),
                        6.0,
                    ),
                    _ => false,
                }
            })
            .map(|c| c.id.clone())
    }

    fn target_at(
        &self,
        graph: &WorkflowGraph,
        layout: &Layout,
        origin: Pos2,
        screen: Pos2,
        edge_type: EdgeType,
    ) -> ContextTarget {
        let pos = self.transform.from_screen(screen, origin);
        if let Some(id) = layout.node_at(pos) {
            return ContextTarget::Node(id);
        }
        match self.edge_at(graph, layout, origin, screen, edge_type) {
            Some(edge) => ContextTarget::Edge(edge),
            None => ContextTarget::Pane,
        }
    }

    fn context_menu(&mut self, response: &egui::Response, app: &mut AppController) {
        let mut picked = false;
        response.context_menu(|ui| match &self.context_target {
            Some(ContextTarget::Node(id)) => {
                let is_group = app.graph().node(id).is_some_and(|n| n.is_group());
                if is_group && ui.button("Collapse / expand").clicked() {
                    app.toggle_group_collapsed(id);
                    ui.close();
                }
                if ui.button("Delete node").clicked() {
                    picked = true;
                    ui.close();
                }
            }
            Some(ContextTarget::Edge(_)) => {
                if ui.button("Delete connection").clicked() {
                    picked = true;
                    ui.close();
                }
            }
            Some(ContextTarget::Pane) | None => {
                if ui.button("Group selection").clicked() {
                    app.create_group("Group");
                    ui.close();
                }
            }
        });
        if picked {
            if let Some(target) = self.context_target.take() {
                delete_target(app, &target);
            }
        }
    }

    fn on_drag(&mut self, app: &mut AppController, delta: Vec2) {
        if delta == Vec2::ZERO {
            return;
        }
        match &mut self.interaction {
            Interaction::DraggingNodes { ids, moved } => {
                *moved = true;
                app.on_nodes_moved(ids, delta / self.transform.zoom);
                let selection: Vec<SelectedNode> = ids
                    .iter()
                    .filter_map(|id| app.graph().node(id))
                    .map(|n| SelectedNode::new(n.id.clone(), n.position_absolute))
                    .collect();
                app.on_selection_change(&selection);
            }
            Interaction::Panning { moved } => {
                *moved = true;
                self.transform.pan += delta;
            }
            _ => {}
        }
    }

    fn on_release(&mut self, app: &mut AppController, layout: &Layout, pos: Option<Pos2>) {
        let radius = (SLOT_RADIUS * 2.0).max(8.0 / self.transform.zoom);
        let drop_slot = pos.and_then(|p| layout.slot_at(app.graph(), p, radius));
        let drop_pos = pos.unwrap_or_default();

        match std::mem::replace(&mut self.interaction, Interaction::Idle) {
            Interaction::Connecting { .. } => {
                let conn = app
                    .connecting_params()
                    .zip(drop_slot.as_ref())
                    .and_then(|(params, slot)| connection_between(params, slot));
                if let Some(conn) = conn {
                    app.on_connect(conn);
                }
                app.on_connect_end(drop_pos);
                app.on_mouse_up();
            }
            Interaction::UpdatingEdge { .. } => {
                let conn = app
                    .connecting_params()
                    .zip(drop_slot.as_ref())
                    .and_then(|(params, slot)| connection_between(params, slot));
                if let Some(conn) = conn {
                    app.on_edge_update(conn);
                }
                app.on_edge_update_end(drop_pos);
                app.on_mouse_up();
            }
            Interaction::DraggingNodes { moved: true, .. } => {
                app.on_node_drag_stop();
            }
            Interaction::DraggingNodes { moved: false, .. } | Interaction::Idle => {
                app.on_mouse_up();
            }
            Interaction::Panning { moved } => {
                app.on_transform_end(self.transform);
                app.on_mouse_up();
                if !moved {
                    app.on_pane_click();
                }
                return;
            }
            Interaction::Selecting { start } => {
                let area = Rect::from_two_pos(start, drop_pos);
                if area.width() < 2.0 && area.height() < 2.0 {
                    app.on_pane_click();
                } else {
                    let ids: Vec<NodeId> = layout
                        .nodes
                        .iter()
                        .filter(|(_, r)| area.contains_rect(*r))
                        .map(|(id, _)| id.clone())
                        .collect();
                    app.select_nodes(&ids);
                }
                app.on_mouse_up();
                return;
            }
        }
    }

    fn handle_keys(&mut self, ui: &egui::Ui, app: &mut AppController, pointer: Option<Pos2>) {
        if ui.ctx().wants_keyboard_input() {
            return;
        }
        let (delete, undo, redo, group, escape, events) = ui.input(|i| {
            let command = i.modifiers.command;
            (
                i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace),
                command && !i.modifiers.shift && i.key_pressed(egui::Key::Z),
                command
                    && (i.key_pressed(egui::Key::Y)
                        || (i.modifiers.shift && i.key_pressed(egui::Key::Z))),
                command && i.key_pressed(egui::Key::G),
                i.key_pressed(egui::Key::Escape),
                i.events.clone(),
            )
        });
        if delete {
            app.delete_selection();
        }
        if undo {
            app.undo();
        }
        if redo {
            app.redo();
        }
        if group {
            app.create_group("Group");
        }
        if escape {
            app.dismiss_suggestion();
        }
        for event in events {
            match event {
                egui::Event::Copy => {
                    if let Some(text) = app.copy() {
                        ui.ctx().copy_text(text);
                    }
                }
                egui::Event::Paste(text) => {
                    app.paste(pointer, Some(&text));
                }
                _ => {}
            }
        }
    }

    fn draw_groups(
        &self,
        painter: &egui::Painter,
        app: &AppController,
        layout: &Layout,
        origin: Pos2,
    ) {
        let zoom = self.transform.zoom;
        let dragging_over = app.ui.grouping.dragging_over_group_id();
        for (id, canvas_rect, state) in &layout.groups {
            let Some(group) = app.graph().node(id) else { continue };
            let rect = self.transform.rect_to_screen(*canvas_rect, origin);
            let header_rect =
                Rect::from_min_size(rect.min, Vec2::new(rect.width(), HEADER_HEIGHT * zoom));
            let base = group
                .color
                .map(|[r, g, b, a]| Color32::from_rgba_unmultiplied(r, g, b, a))
                .unwrap_or(self.style.group_color);

            painter.rect_filled(
                rect,
                8.0,
                Color32::from_rgba_unmultiplied(base.r(), base.g(), base.b(), 50),
            );
            let border = if is_highlighted(group, dragging_over) {
                Stroke::new(3.0, self.style.highlight_color)
            } else {
                Stroke::new(2.0, base)
            };
            painter.rect_stroke(rect, 8.0, border, StrokeKind::Middle);
            painter.rect_filled(
                header_rect,
                CornerRadius {
                    nw: 8,
                    ne: 8,
                    sw: 0,
                    se: 0,
                },
                base,
            );
            painter.text(
                header_rect.left_center() + Vec2::new(10.0 * zoom, 0.0),
                Align2::LEFT_CENTER,
                state.label(),
                FontId::proportional(self.style.font_size * zoom),
                Color32::WHITE,
            );

            if let GroupRenderState::Collapsed { inputs, outputs, .. } = state {
                self.draw_slots(painter, *canvas_rect, HandleKind::Target, inputs, origin);
                self.draw_slots(painter, *canvas_rect, HandleKind::Source, outputs, origin);
            }
        }
    }

    fn draw_slots(
        &self,
        painter: &egui::Painter,
        rect: Rect,
        kind: HandleKind,
        ports: &[Port],
        origin: Pos2,
    ) {
        let zoom = self.transform.zoom;
        let show_labels = zoom >= INVISIBLE_TRANSFORM_THRESHOLD;
        for (index, port) in ports.iter().enumerate() {
            let pos = self.transform.to_screen(slot_pos(rect, kind, index), origin);
            painter.circle_filled(pos, SLOT_RADIUS * zoom, slot_color(&port.slot_type));
            if !show_labels {
                continue;
            }
            let (offset, align) = match kind {
                HandleKind::Target => (Vec2::new(10.0 * zoom, 0.0), Align2::LEFT_CENTER),
                HandleKind::Source => (Vec2::new(-10.0 * zoom, 0.0), Align2::RIGHT_CENTER),
            };
            painter.text(
                pos + offset,
                align,
                &port.name,
                FontId::proportional((self.style.font_size - 2.0) * zoom),
                Color32::LIGHT_GRAY,
            );
        }
    }

    fn draw_node(
        &self,
        painter: &egui::Painter,
        app: &AppController,
        node: &Node,
        rect: Rect,
        origin: Pos2,
    ) {
        let zoom = self.transform.zoom;
        let screen = self.transform.rect_to_screen(rect, origin);
        let header_rect =
            Rect::from_min_size(screen.min, Vec2::new(screen.width(), HEADER_HEIGHT * zoom));
        let category = node
            .widget()
            .and_then(|w| app.catalog().get(w))
            .map(|w| w.category.as_str());
        let known = node.widget().is_some_and(|w| app.catalog().contains(w));

        painter.rect_filled(screen, 6.0, Color32::from_gray(48));
        painter.rect_filled(
            header_rect,
            CornerRadius {
                nw: 6,
                ne: 6,
                sw: 0,
                se: 0,
            },
            self.style.header_color(category),
        );
        let outline = if node.selected {
            Stroke::new(2.0, self.style.highlight_color)
        } else if !known {
            Stroke::new(2.0, Color32::RED)
        } else {
            Stroke::new(1.0, Color32::from_gray(80))
        };
        painter.rect_stroke(screen, 6.0, outline, StrokeKind::Middle);
        painter.text(
            header_rect.left_center() + Vec2::new(8.0 * zoom, 0.0),
            Align2::LEFT_CENTER,
            &node.title,
            FontId::proportional(self.style.font_size * zoom),
            Color32::WHITE,
        );

        self.draw_slots(painter, rect, HandleKind::Target, node.inputs(), origin);
        self.draw_slots(painter, rect, HandleKind::Source, node.outputs(), origin);
    }

    fn draw_connections(
        &self,
        painter: &egui::Painter,
        graph: &WorkflowGraph,
        layout: &Layout,
        origin: Pos2,
        edge_type: EdgeType,
    ) {
        for conn in &graph.connections {
            // Both ends folded into the same collapsed group.
            let folded = (layout.hidden.get(&conn.source), layout.hidden.get(&conn.target));
            if let (Some(a), Some(b)) = folded {
                if a == b {
                    continue;
                }
            }
            let (Some(p1), Some(p2)) = (
                layout.endpoint(graph, &conn.source, &conn.source_handle, HandleKind::Source),
                layout.endpoint(graph, &conn.target, &conn.target_handle, HandleKind::Target),
            ) else {
                continue;
            };
            let slot_type = graph
                .node(&conn.source)
                .and_then(|n| n.output(&conn.source_handle))
                .map(|p| p.slot_type.as_str())
                .unwrap_or_default();
            let (c1, c2) = if conn.selected {
                (self.style.highlight_color, self.style.highlight_color)
            } else if self.style.use_gradient_connections {
                let target_type = graph
                    .node(&conn.target)
                    .and_then(|n| n.input(&conn.target_handle))
                    .map(|p| p.slot_type.as_str())
                    .unwrap_or(slot_type);
                (slot_color(slot_type), slot_color(target_type))
            } else {
                (slot_color(slot_type), slot_color(slot_type))
            };
            draw_edge(
                painter,
                edge_type,
                self.transform.to_screen(p1, origin),
                self.transform.to_screen(p2, origin),
                c1,
                c2,
                2.0 * self.transform.zoom.max(0.5),
            );
        }
    }

    fn draw_pending_connection(
        &self,
        painter: &egui::Painter,
        app: &AppController,
        origin: Pos2,
        pointer: Pos2,
        edge_type: EdgeType,
    ) {
        let from = match self.interaction {
            Interaction::Connecting { from } | Interaction::UpdatingEdge { from } => from,
            _ => return,
        };
        let from = self.transform.to_screen(from, origin);
        let color = app
            .connecting_params()
            .map(|p| slot_color(&p.slot_type))
            .unwrap_or(Color32::WHITE);
        let target_side = app
            .connecting_params()
            .is_some_and(|p| p.handle_kind == HandleKind::Target);
        let (p1, p2) = if target_side { (pointer, from) } else { (from, pointer) };
        draw_edge(painter, edge_type, p1, p2, color, color, 2.0);
    }

    /// Widget picker shown where a connection was dropped.
    fn show_suggestion(&mut self, ui: &egui::Ui, app: &mut AppController, origin: Pos2) {
        let Some(ctx) = app.ui.suggestion.clone() else {
            self.finder_query.clear();
            return;
        };
        let mut picked = None;
        let mut close = false;
        egui::Area::new(egui::Id::new("widget_suggestion"))
            .fixed_pos(self.transform.to_screen(ctx.position, origin))
            .order(egui::Order::Foreground)
            .show(ui.ctx(), |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.label(format!("Connect {} ({})", ctx.params.handle, ctx.params.slot_type));
                    ui.text_edit_singleline(&mut self.finder_query);
                    let query = self.finder_query.to_lowercase();
                    egui::ScrollArea::vertical().max_height(240.0).show(ui, |ui| {
                        let matching =
                            ctx.candidates.iter().filter(|n| n.to_lowercase().contains(&query));
                        for name in matching {
                            if ui.button(name).clicked() {
                                picked = Some(name.clone());
                            }
                        }
                    });
                    if ctx.candidates.is_empty() {
                        ui.weak("No compatible widgets");
                    }
                    if ui.button("Cancel").clicked() {
                        close = true;
                    }
                });
            });
        if let Some(name) = picked {
            app.accept_suggestion(&name);
        } else if close {
            app.dismiss_suggestion();
        }
    }
}
