//! Pointer gesture state and connection-attempt tracking.
//!
//! A drag gesture is the interval between pointer-down and the matching
//! pointer-up. Connection attempts are bound to a [`CancellationToken`] that
//! lives until the attempt resolves or the next gesture begins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::graph::NodeId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DragGestureState {
    #[default]
    Idle,
    MouseDown,
    Dragging,
}

impl DragGestureState {
    /// A new press always starts a fresh gesture.
    pub fn mouse_down(self) -> Self {
        DragGestureState::MouseDown
    }

    /// Selection moved while the pointer is held.
    pub fn drag(self) -> Self {
        match self {
            DragGestureState::Idle => DragGestureState::Idle,
            DragGestureState::MouseDown | DragGestureState::Dragging => DragGestureState::Dragging,
        }
    }

    pub fn mouse_up(self) -> Self {
        DragGestureState::Idle
    }

    pub fn is_pressed(self) -> bool {
        !matches!(self, DragGestureState::Idle)
    }

    pub fn is_dragging(self) -> bool {
        matches!(self, DragGestureState::Dragging)
    }
}

/// Shared cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    Source,
    Target,
}

/// Where a connection drag started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectingParams {
    pub node_id: NodeId,
    pub handle: String,
    pub handle_kind: HandleKind,
    pub slot_type: String,
}

/// Flags for one connect or edge-update attempt.
///
/// The attempt stays observable (see [`ConnectionAttempt::is_live`]) after it
/// ends, so a pane click produced by the same pointer release can be told
/// apart from a fresh click. It is cleared when the next gesture begins.
#[derive(Debug, Default)]
pub struct ConnectionAttempt {
    token: Option<CancellationToken>,
    params: Option<ConnectingParams>,
    connected: bool,
    updating_edge: Option<String>,
    edge_updated: bool,
}

impl ConnectionAttempt {
    pub fn begin_connect(&mut self, params: ConnectingParams) -> CancellationToken {
        self.reset();
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        self.params = Some(params);
        token
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
    }

    /// Finish a connect attempt. Returns the origin when no connection was made.
    pub fn end_connect(&mut self) -> Option<ConnectingParams> {
        if self.connected {
            self.params = None;
            None
        } else {
            self.params.take()
        }
    }

    /// Start dragging one end of an existing edge. `anchor` is the end that stays put.
    pub fn begin_edge_update(
        &mut self,
        edge_id: impl Into<String>,
        anchor: ConnectingParams,
    ) -> CancellationToken {
        self.reset();
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        self.updating_edge = Some(edge_id.into());
        self.params = Some(anchor);
        token
    }

    pub fn updating_edge(&self) -> Option<&str> {
        self.updating_edge.as_deref()
    }

    pub fn mark_edge_updated(&mut self) {
        self.edge_updated = true;
    }

    /// Finish an edge update. Returns the edge id when the update failed.
    pub fn end_edge_update(&mut self) -> Option<String> {
        let edge = self.updating_edge.take();
        if self.edge_updated { None } else { edge }
    }

    pub fn params(&self) -> Option<&ConnectingParams> {
        self.params.as_ref()
    }

    /// True from the start of an attempt until the next gesture cancels it.
    pub fn is_live(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Cancel the current attempt, if any, and clear its flags.
    pub fn cancel(&mut self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.token = None;
        self.params = None;
        self.connected = false;
        self.updating_edge = None;
        self.edge_updated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectingParams {
        ConnectingParams {
            node_id: "4".into(),
            handle: "MODEL".into(),
            handle_kind: HandleKind::Source,
            slot_type: "MODEL".into(),
        }
    }

    #[test]
    fn gesture_transitions() {
        let s = DragGestureState::Idle;
        assert_eq!(s.drag(), DragGestureState::Idle);
        let s = s.mouse_down();
        assert!(s.is_pressed() && !s.is_dragging());
        let s = s.drag();
        assert!(s.is_dragging());
        assert_eq!(s.mouse_down(), DragGestureState::MouseDown);
        assert_eq!(s.mouse_up(), DragGestureState::Idle);
    }

    #[test]
    fn failed_connect_returns_origin() {
        let mut attempt = ConnectionAttempt::default();
        attempt.begin_connect(params());
        assert_eq!(attempt.end_connect(), Some(params()));
        assert!(attempt.is_live());
    }

    #[test]
    fn successful_connect_returns_nothing() {
        let mut attempt = ConnectionAttempt::default();
        attempt.begin_connect(params());
        attempt.mark_connected();
        assert_eq!(attempt.end_connect(), None);
    }

    #[test]
    fn cancel_invalidates_handed_out_token() {
        let mut attempt = ConnectionAttempt::default();
        let token = attempt.begin_connect(params());
        attempt.cancel();
        assert!(token.is_cancelled());
        assert!(!attempt.is_live());
        assert!(attempt.params().is_none());
    }

    #[test]
    fn edge_update_failure_reports_edge() {
        let mut attempt = ConnectionAttempt::default();
        attempt.begin_edge_update("e1", params());
        assert_eq!(attempt.updating_edge(), Some("e1"));
        assert_eq!(attempt.params(), Some(&params()));
        assert_eq!(attempt.end_edge_update(), Some("e1".to_string()));

        attempt.begin_edge_update("e2", params());
        attempt.mark_edge_updated();
        assert_eq!(attempt.end_edge_update(), None);
    }
}
