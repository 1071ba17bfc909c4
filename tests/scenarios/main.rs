use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use egui::{Pos2, Vec2};
use workflow_canvas::controller::{AppController, REFRESH_INTERVAL_SECS};
use workflow_canvas::geometry::{bbox, contains};
use workflow_canvas::gesture::DragGestureState;
use workflow_canvas::graph::{Node, WorkflowGraph};
use workflow_canvas::grouping::{Evaluation, GroupDragTracker, SelectedNode, candidate_group};
use workflow_canvas::live_doc::DocEvent;
use workflow_canvas::storage::{DocumentStore, JsonDirStore, MemoryStore};
use workflow_canvas::widgets::WidgetCatalog;

fn node(id: &str, x: f32, y: f32, w: f32, h: f32) -> Node {
    Node::regular(id, "KSampler", Pos2::new(x, y)).with_size(Vec2::new(w, h))
}

fn group(id: &str, x: f32, y: f32, w: f32, h: f32) -> Node {
    Node::group(id, id, Pos2::new(x, y), Vec2::new(w, h))
}

/// Press, move `id` by `delta`, and report the new selection.
fn drag(
    tracker: &mut GroupDragTracker,
    graph: &mut WorkflowGraph,
    id: &str,
    delta: Vec2,
) -> Evaluation {
    tracker.on_mouse_down();
    graph.move_node(id, delta);
    let position = graph.node(id).map(|n| n.absolute_position());
    tracker.on_selection_change(&[SelectedNode::new(id, position)], graph)
}

#[test]
fn dragging_into_a_group_adopts_the_node() {
    let mut graph = WorkflowGraph::default();
    graph.add_node(node("a", 0.0, 0.0, 10.0, 10.0));
    graph.add_node(group("g", -5.0, -5.0, 50.0, 50.0));
    let mut tracker = GroupDragTracker::default();

    let evaluation = drag(&mut tracker, &mut graph, "a", Vec2::new(5.0, 5.0));
    assert_eq!(evaluation, Evaluation::Hovering(Some("g".into())));
    assert_eq!(tracker.dragging_over_group_id(), Some("g"));

    let outcome = tracker.on_mouse_up(&mut graph);
    assert_eq!(outcome.added, vec![("a".to_string(), "g".to_string())]);
    assert_eq!(graph.node("a").unwrap().parent.as_deref(), Some("g"));
    assert_eq!(graph.node("g").unwrap().children(), ["a".to_string()]);
    // Relative to the group origin.
    assert_eq!(graph.node("a").unwrap().position, Pos2::new(10.0, 10.0));
}

#[test]
fn dragging_out_of_every_group_releases_the_node() {
    let mut graph = WorkflowGraph::default();
    graph.add_node(group("g1", 0.0, 0.0, 100.0, 100.0));
    graph.add_node(node("b", 10.0, 10.0, 10.0, 10.0));
    assert!(graph.add_node_to_group("b", "g1"));
    let mut tracker = GroupDragTracker::default();

    let evaluation = drag(&mut tracker, &mut graph, "b", Vec2::new(300.0, 300.0));
    assert_eq!(evaluation, Evaluation::Hovering(None));

    let outcome = tracker.on_mouse_up(&mut graph);
    assert_eq!(outcome.removed, vec![("b".to_string(), "g1".to_string())]);
    let b = graph.node("b").unwrap();
    assert_eq!(b.parent, None);
    assert_eq!(b.position, Pos2::new(310.0, 310.0));
    assert!(!graph.node("g1").unwrap().children().contains(&"b".to_string()));
    assert!(graph.membership_is_consistent());
}

#[test]
fn dragging_between_groups_changes_nothing() {
    let mut graph = WorkflowGraph::default();
    graph.add_node(group("g1", 0.0, 0.0, 100.0, 100.0));
    graph.add_node(group("g2", 300.0, 0.0, 100.0, 100.0));
    graph.add_node(node("c", 10.0, 10.0, 10.0, 10.0));
    assert!(graph.add_node_to_group("c", "g1"));
    let mut tracker = GroupDragTracker::default();

    let evaluation = drag(&mut tracker, &mut graph, "c", Vec2::new(310.0, 0.0));
    assert_eq!(evaluation, Evaluation::Hovering(Some("g2".into())));
    let before = graph.clone();

    let outcome = tracker.on_mouse_up(&mut graph);
    assert!(outcome.is_empty());
    assert_eq!(graph, before);
    assert_eq!(graph.node("c").unwrap().parent.as_deref(), Some("g1"));
    assert!(graph.node("g2").unwrap().children().is_empty());
}

#[test]
fn releasing_inside_the_current_group_is_a_no_op() {
    let mut graph = WorkflowGraph::default();
    graph.add_node(group("g", 0.0, 0.0, 100.0, 100.0));
    graph.add_node(node("a", 10.0, 10.0, 10.0, 10.0));
    assert!(graph.add_node_to_group("a", "g"));
    let mut tracker = GroupDragTracker::default();

    drag(&mut tracker, &mut graph, "a", Vec2::new(20.0, 20.0));
    let before = graph.clone();
    let outcome = tracker.on_mouse_up(&mut graph);

    assert!(outcome.is_empty());
    assert_eq!(graph, before);
}

#[test]
fn selections_containing_groups_keep_the_previous_target() {
    let mut graph = WorkflowGraph::default();
    graph.add_node(group("g", 0.0, 0.0, 100.0, 100.0));
    graph.add_node(group("far", 1000.0, 1000.0, 10.0, 10.0));
    graph.add_node(node("a", 10.0, 10.0, 10.0, 10.0));
    let mut tracker = GroupDragTracker::default();

    drag(&mut tracker, &mut graph, "a", Vec2::new(1.0, 1.0));
    assert_eq!(tracker.dragging_over_group_id(), Some("g"));

    // Geometry would now point at no group at all.
    graph.move_node("a", Vec2::new(500.0, 500.0));
    let selection = [SelectedNode::new("a", None), SelectedNode::new("far", None)];
    assert_eq!(
        tracker.on_selection_change(&selection, &graph),
        Evaluation::GroupInSelection
    );
    assert_eq!(tracker.dragging_over_group_id(), Some("g"));
}

#[test]
fn mouse_up_always_clears_the_target() {
    let mut graph = WorkflowGraph::default();
    graph.add_node(group("g", 0.0, 0.0, 100.0, 100.0));
    graph.add_node(node("a", 10.0, 10.0, 10.0, 10.0));
    let mut tracker = GroupDragTracker::default();

    drag(&mut tracker, &mut graph, "a", Vec2::new(1.0, 1.0));
    assert!(tracker.dragging_over_group_id().is_some());
    tracker.on_mouse_up(&mut graph);
    assert_eq!(tracker.dragging_over_group_id(), None);
    assert_eq!(tracker.gesture(), DragGestureState::Idle);

    // A second release with nothing tracked stays clear.
    tracker.on_mouse_up(&mut graph);
    assert_eq!(tracker.dragging_over_group_id(), None);
}

#[test]
fn candidate_is_stable_for_identical_inputs() {
    let mut graph = WorkflowGraph::default();
    graph.add_node(group("outer", -100.0, -100.0, 400.0, 400.0));
    graph.add_node(group("inner", 0.0, 0.0, 100.0, 100.0));
    let members = [node("a", 10.0, 10.0, 10.0, 10.0), node("b", 40.0, 40.0, 10.0, 10.0)];
    let area = bbox(members.iter().map(|n| n.rect())).unwrap();

    let first = candidate_group(&graph, area);
    for _ in 0..10 {
        assert_eq!(candidate_group(&graph, area), first);
    }
    // List order decides, not the tightest fit.
    assert_eq!(first.as_deref(), Some("outer"));
    assert!(contains(graph.node("inner").unwrap().rect(), area));
}

#[test]
fn add_and_remove_are_symmetric_and_idempotent() {
    let mut graph = WorkflowGraph::default();
    graph.add_node(group("g", 0.0, 0.0, 100.0, 100.0));
    graph.add_node(node("n", 10.0, 10.0, 10.0, 10.0));

    assert!(graph.add_node_to_group("n", "g"));
    assert!(!graph.add_node_to_group("n", "g"));
    assert_eq!(graph.node("n").unwrap().parent.as_deref(), Some("g"));
    assert_eq!(graph.node("g").unwrap().children(), ["n".to_string()]);

    assert!(graph.remove_node_from_group("n"));
    assert!(!graph.remove_node_from_group("n"));
    assert_eq!(graph.node("n").unwrap().parent, None);
    assert!(graph.node("g").unwrap().children().is_empty());
    assert!(graph.membership_is_consistent());
}

#[test]
fn edits_reach_a_second_window_on_the_same_document() {
    let shared = Arc::new(Mutex::new(MemoryStore::default()));
    let mut first = AppController::new(Box::new(shared.clone()), WidgetCatalog::builtin(), 50);
    let mut second = AppController::new(Box::new(shared.clone()), WidgetCatalog::builtin(), 50);

    let id = first.new_document("Shared").unwrap();
    assert!(second.load_document(&id).unwrap());
    let start = Utc::now();
    second.poll_document_events(start);

    let added = first.on_add_node("VAEDecode", Pos2::new(400.0, 400.0)).unwrap();
    // Too soon: the store is not read again yet.
    second.poll_document_events(start + Duration::milliseconds(500));
    assert!(second.graph().node(&added).is_none());

    let events = second.poll_document_events(start + Duration::seconds(REFRESH_INTERVAL_SECS));

    assert!(
        events
            .iter()
            .any(|e| matches!(e, DocEvent::Updated { id: updated, .. } if *updated == id))
    );
    assert!(second.graph().node(&added).is_some());
    assert_eq!(second.graph().nodes.len(), first.graph().nodes.len());
}

#[test]
fn deleting_a_document_is_seen_by_other_windows() {
    let shared = Arc::new(Mutex::new(MemoryStore::default()));
    let mut first = AppController::new(Box::new(shared.clone()), WidgetCatalog::builtin(), 50);
    let mut second = AppController::new(Box::new(shared.clone()), WidgetCatalog::builtin(), 50);

    let id = first.new_document("Doomed").unwrap();
    assert!(second.load_document(&id).unwrap());
    first.delete_document().unwrap();

    let events = second.poll_document_events(Utc::now());
    assert!(events.contains(&DocEvent::Deleted { id: id.clone() }));
    assert!(second.document().is_deleted());
    assert!(!second.notifications().is_empty());
}

#[test]
fn documents_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = JsonDirStore::open(dir.path()).unwrap();
        let mut app = AppController::new(Box::new(store), WidgetCatalog::builtin(), 50);
        let id = app.new_document("Persistent").unwrap();
        app.on_add_node("SaveImage", Pos2::new(900.0, 100.0));
        app.rename_document("Renamed");
        id
    };

    let store = JsonDirStore::open(dir.path()).unwrap();
    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Renamed");

    let mut app = AppController::new(Box::new(store), WidgetCatalog::builtin(), 50);
    assert_eq!(app.open_or_create(Some(id.as_str())).unwrap(), id);
    assert!(app.graph().nodes.iter().any(|n| n.widget() == Some("SaveImage")));
    assert!(app.graph().membership_is_consistent());
}

#[test]
fn opening_a_document_deleted_elsewhere_keeps_the_current_one_live() {
    let shared = Arc::new(Mutex::new(MemoryStore::default()));
    let mut first = AppController::new(Box::new(shared.clone()), WidgetCatalog::builtin(), 50);
    let mut second = AppController::new(Box::new(shared.clone()), WidgetCatalog::builtin(), 50);

    let mine = first.new_document("Mine").unwrap();
    let doomed = second.new_document("Doomed").unwrap();
    second.delete_document().unwrap();

    assert!(!first.load_document(&doomed).unwrap());
    assert_eq!(first.document().id(), Some(mine.as_str()));
    assert!(!first.notifications().is_empty());

    let added = first.on_add_node("SaveImage", Pos2::new(900.0, 100.0)).unwrap();
    let stored = shared.lock().unwrap().get(&mine).unwrap().unwrap();
    assert!(stored.snapshot.nodes.contains_key(&added));
}
