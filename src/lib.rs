//! Workflow canvas: a node-graph editor core with drag-to-group membership
//! and live document sync.

pub mod clipboard;
pub mod connection;
pub mod controller;
pub mod document;
pub mod editor;
pub mod geometry;
pub mod gesture;
pub mod graph;
pub mod group_view;
pub mod grouping;
pub mod history;
pub mod live_doc;
pub mod settings;
pub mod storage;
pub mod widgets;
