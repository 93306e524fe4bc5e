//! Ordering and synchronization core for a SQL-query repository.
//!
//! Folders hold tables, tables hold saved queries. This crate keeps that
//! two-level tree ordered under drag-and-drop, applies edits optimistically
//! against a persistence gateway, and binds the current selection to a
//! shareable address.

pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod nav;
pub mod search;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use gateway::{Gateway, GatewayError, GatewayResult, SqliteGateway};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::collection::Collection;
pub use model::entity::{EntityKind, EntityRef, Folder, FolderId, Query, QueryId, Table, TableId};
pub use model::selection::SelectionState;
pub use nav::{Address, AddressSync, History, MemoryHistory, NavigationController};
pub use service::access::{Actor, AllowList};
pub use service::guard::{EditorDraft, GuardDecision, NavigationIntent, UnsavedChangesGuard};
pub use service::mutation::{
    FlushReport, MutationEngine, MutationError, MutationKind, MutationTicket, Settlement,
};
pub use service::reorder::{resolve_drag, DragItem, ReorderPlan};
pub use service::session::{NavigationOutcome, Session, SessionError, ViewMode};

/// Minimal health check for embedding hosts.
pub fn ping() -> &'static str {
    "pong"
}

pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
