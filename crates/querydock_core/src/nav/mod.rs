//! Navigable address and selection synchronization.
//!
//! # Responsibility
//! - Encode/decode the shareable address (`folderId`, `tableId`, `queryId`).
//! - Abstract the browser history the address lives in.
//! - Keep selection state and address consistent in both directions.

pub mod address;
pub mod controller;
pub mod history;

pub use address::{Address, AddressError};
pub use controller::{AddressSync, NavigationController, SyncPhase};
pub use history::{History, MemoryHistory};
