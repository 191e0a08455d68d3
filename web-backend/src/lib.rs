// BugWise web backend
// REST surface over the bugwise-core scan engine: JWT-gated scan
// submission, status polling, history, and dashboard aggregates backed by
// SQLite.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod state;
