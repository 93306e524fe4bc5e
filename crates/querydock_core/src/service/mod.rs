//! Use-case services over the ordered model.
//!
//! # Responsibility
//! - Resolve drag gestures into reorder plans.
//! - Apply mutations optimistically and reconcile with the gateway.
//! - Guard navigation and bundle everything into a session facade.

pub mod access;
pub mod guard;
pub mod mutation;
pub mod reorder;
pub mod session;
