//! Ephemeral selection state.
//!
//! Never persisted; rebuilt from the navigable address on load.
//!
//! # Invariants
//! - Selecting a table always clears the targeted query.

use crate::model::entity::{FolderId, QueryId, TableId};
use std::collections::BTreeSet;

/// Current table/query selection plus expanded folders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected_table_id: Option<TableId>,
    target_query_id: Option<QueryId>,
    expanded_folder_ids: BTreeSet<FolderId>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_table_id(&self) -> Option<&TableId> {
        self.selected_table_id.as_ref()
    }

    pub fn target_query_id(&self) -> Option<&QueryId> {
        self.target_query_id.as_ref()
    }

    pub fn expanded_folder_ids(&self) -> &BTreeSet<FolderId> {
        &self.expanded_folder_ids
    }

    pub fn is_expanded(&self, folder_id: &FolderId) -> bool {
        self.expanded_folder_ids.contains(folder_id)
    }

    /// Selects a table (or none) and drops any query target.
    pub fn select_table(&mut self, table_id: Option<TableId>) {
        self.selected_table_id = table_id;
        self.target_query_id = None;
    }

    pub fn set_target_query(&mut self, query_id: Option<QueryId>) {
        self.target_query_id = query_id;
    }

    pub fn toggle_folder(&mut self, folder_id: &FolderId) {
        if !self.expanded_folder_ids.remove(folder_id) {
            self.expanded_folder_ids.insert(folder_id.clone());
        }
    }

    pub fn open_folder(&mut self, folder_id: FolderId) {
        self.expanded_folder_ids.insert(folder_id);
    }

    pub fn collapse_all(&mut self) {
        self.expanded_folder_ids.clear();
    }

    /// Renames ids after a temporary id is reconciled with a durable one.
    pub(crate) fn remap_folder(&mut self, from: &FolderId, to: &FolderId) {
        if self.expanded_folder_ids.remove(from) {
            self.expanded_folder_ids.insert(to.clone());
        }
    }

    pub(crate) fn remap_table(&mut self, from: &TableId, to: &TableId) {
        if self.selected_table_id.as_ref() == Some(from) {
            self.selected_table_id = Some(to.clone());
        }
    }

    pub(crate) fn remap_query(&mut self, from: &QueryId, to: &QueryId) {
        if self.target_query_id.as_ref() == Some(from) {
            self.target_query_id = Some(to.clone());
        }
    }
}
