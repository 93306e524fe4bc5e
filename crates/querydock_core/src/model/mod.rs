//! Ordered two-level workspace model.
//!
//! # Responsibility
//! - Define folder/table/query records and their stable identifiers.
//! - Hold the in-memory ordered collection and ephemeral selection state.
//!
//! # Invariants
//! - Deletion is a `deleted_at` tombstone until a hard delete removes the row.
//! - Sibling order is defined by `order_index`, never by insertion order.

pub mod collection;
pub mod entity;
pub mod selection;
