//! Bidirectional selection/address binding.
//!
//! # Responsibility
//! - Restore selection from the address once data is ready (INIT).
//! - Afterwards apply only the address parameters that differ (SYNCED).
//! - Project selection changes back into the address exactly once.
//!
//! # Invariants
//! - INIT runs at most once; a broken deep link clears the address.
//! - A write made by this controller is remembered and its notification is
//!   ignored, so one selection change causes one address write.

use crate::model::collection::Collection;
use crate::model::selection::SelectionState;
use crate::nav::address::Address;
use crate::nav::history::History;
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Init,
    Synced,
}

/// Outcome of processing one address notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSync {
    /// Data not ready; nothing processed.
    NotReady,
    /// Same address as last processed.
    Unchanged,
    /// Notification of this controller's own write.
    SelfCaused,
    /// Initial restore completed.
    Initialized,
    /// Initial address named an unknown table and was cleared.
    BrokenLinkCleared,
    /// Back/forward style change; `changed` tells whether selection moved.
    Applied { changed: bool },
}

#[derive(Debug)]
pub struct NavigationController {
    phase: SyncPhase,
    last_seen: Option<String>,
    ignore_next: Option<String>,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationController {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Init,
            last_seen: None,
            ignore_next: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Address → selection.
    pub fn address_changed<H: History + ?Sized>(
        &mut self,
        ready: bool,
        collection: &Collection,
        selection: &mut SelectionState,
        history: &mut H,
    ) -> AddressSync {
        if !ready {
            return AddressSync::NotReady;
        }
        let current = history.current();
        if self.phase == SyncPhase::Synced && self.last_seen.as_deref() == Some(current.as_str()) {
            return AddressSync::Unchanged;
        }
        self.last_seen = Some(current.clone());

        if self.ignore_next.as_deref() == Some(current.as_str()) {
            self.ignore_next = None;
            return AddressSync::SelfCaused;
        }

        match self.phase {
            SyncPhase::Init => self.initialize(&current, collection, selection, history),
            SyncPhase::Synced => apply_difference(&current, collection, selection),
        }
    }

    fn initialize<H: History + ?Sized>(
        &mut self,
        current: &str,
        collection: &Collection,
        selection: &mut SelectionState,
        history: &mut H,
    ) -> AddressSync {
        self.phase = SyncPhase::Synced;
        let address = match Address::parse(current) {
            Ok(address) => address,
            Err(err) => {
                warn!("event=nav_init module=nav status=error error={err}");
                return self.clear_broken_link(selection, history);
            }
        };

        match &address.table_id {
            Some(table_id) => {
                let Some(table) = collection.table(table_id) else {
                    warn!("event=nav_init module=nav status=broken_link");
                    return self.clear_broken_link(selection, history);
                };
                selection.select_table(Some(table_id.clone()));
                if let Some(parent) = collection.effective_parent(table) {
                    selection.open_folder(parent);
                }
            }
            None => selection.select_table(None),
        }
        if let Some(query_id) = address.query_id {
            selection.set_target_query(Some(query_id));
        }
        if let Some(folder_id) = address.folder_id {
            selection.open_folder(folder_id);
        }

        info!(
            "event=nav_init module=nav status=ok table={} query={}",
            selection.selected_table_id().is_some(),
            selection.target_query_id().is_some()
        );
        AddressSync::Initialized
    }

    fn clear_broken_link<H: History + ?Sized>(
        &mut self,
        selection: &mut SelectionState,
        history: &mut H,
    ) -> AddressSync {
        history.replace("");
        self.last_seen = Some(String::new());
        selection.select_table(None);
        AddressSync::BrokenLinkCleared
    }

    /// Selection → address. Returns `true` when an address was written.
    pub fn selection_changed<H: History + ?Sized>(
        &mut self,
        ready: bool,
        collection: &Collection,
        selection: &SelectionState,
        history: &mut H,
    ) -> bool {
        if !ready || self.phase == SyncPhase::Init {
            return false;
        }
        let current = Address::parse(&history.current()).unwrap_or_default();
        let mut next = current.clone();

        match selection.selected_table_id() {
            Some(table_id) => {
                if next.table_id.as_ref() != Some(table_id) {
                    next.table_id = Some(table_id.clone());
                    next.folder_id = collection
                        .table(table_id)
                        .and_then(|table| collection.effective_parent(table));
                }
            }
            None => {
                if next.table_id.is_some() {
                    next.table_id = None;
                    next.folder_id = None;
                }
            }
        }
        next.query_id = selection.target_query_id().cloned();

        if next == current {
            return false;
        }
        let rendered = next.to_query_string();
        self.ignore_next = Some(rendered.clone());
        history.push(&rendered);
        info!(
            "event=nav_sync module=nav status=ok table={} query={}",
            next.table_id.is_some(),
            next.query_id.is_some()
        );
        true
    }
}

fn apply_difference(
    current: &str,
    collection: &Collection,
    selection: &mut SelectionState,
) -> AddressSync {
    let address = match Address::parse(current) {
        Ok(address) => address,
        Err(err) => {
            warn!("event=nav_sync module=nav status=error error={err}");
            return AddressSync::Applied { changed: false };
        }
    };
    let mut changed = false;

    match &address.table_id {
        Some(table_id) if selection.selected_table_id() != Some(table_id) => {
            if collection.table(table_id).is_some() {
                selection.select_table(Some(table_id.clone()));
                changed = true;
            }
        }
        None if selection.selected_table_id().is_some() => {
            selection.select_table(None);
            changed = true;
        }
        _ => {}
    }

    if selection.target_query_id() != address.query_id.as_ref() {
        selection.set_target_query(address.query_id);
        changed = true;
    }

    info!("event=nav_sync module=nav status=applied changed={changed}");
    AddressSync::Applied { changed }
}
