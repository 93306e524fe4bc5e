//! In-memory ordered collection of folders, tables and queries.
//!
//! # Responsibility
//! - Act as the single in-memory source of truth for tree structure.
//! - Provide sorted sibling-group accessors and synchronous mutators.
//!
//! # Invariants
//! - Mutators never talk to the gateway; they only update held collections.
//! - Accessors only ever return active (non-tombstoned) entities.
//! - A table whose `folder_id` names no active folder is listed at root.
//! - Sort keys: folders `(order_index, name, id)`, tables
//!   `(order_index, table_name, id)`, queries `(order_index, created_at, id)`.

use crate::model::entity::{Folder, FolderId, Query, QueryId, Table, TableId};
use std::collections::BTreeMap;

/// Ordered collection model held by the mutation engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    folders: Vec<Folder>,
    tables: Vec<Table>,
    /// Query lists are fetched lazily per table.
    queries: BTreeMap<TableId, Vec<Query>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all active folders in display order.
    pub fn folders(&self) -> Vec<&Folder> {
        let mut items = self
            .folders
            .iter()
            .filter(|folder| folder.is_active())
            .collect::<Vec<_>>();
        items.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders
            .iter()
            .find(|folder| &folder.id == id && folder.is_active())
    }

    pub fn table(&self, id: &TableId) -> Option<&Table> {
        self.tables
            .iter()
            .find(|table| &table.id == id && table.is_active())
    }

    pub fn query(&self, id: &QueryId) -> Option<&Query> {
        self.queries
            .values()
            .flatten()
            .find(|query| &query.id == id && query.is_active())
    }

    /// Returns the parent a table is displayed under.
    ///
    /// Dangling folder references resolve to root so orphans stay visible.
    pub fn effective_parent(&self, table: &Table) -> Option<FolderId> {
        table
            .folder_id
            .as_ref()
            .filter(|folder_id| self.folder(folder_id).is_some())
            .cloned()
    }

    /// Returns active tables displayed under `parent` (`None` = root).
    pub fn tables_in(&self, parent: Option<&FolderId>) -> Vec<&Table> {
        let mut items = self
            .tables
            .iter()
            .filter(|table| table.is_active())
            .filter(|table| self.effective_parent(table).as_ref() == parent)
            .collect::<Vec<_>>();
        items.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.table_name.cmp(&b.table_name))
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    /// Returns every active table regardless of parent.
    pub fn all_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|table| table.is_active())
    }

    /// Returns active cached queries of one table in display order.
    ///
    /// Empty when the table's queries were never loaded.
    pub fn queries_in(&self, table_id: &TableId) -> Vec<&Query> {
        let mut items = self
            .queries
            .get(table_id)
            .map(|queries| {
                queries
                    .iter()
                    .filter(|query| query.is_active())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        items.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    pub fn has_queries_loaded(&self, table_id: &TableId) -> bool {
        self.queries.contains_key(table_id)
    }

    /// Returns ids of tables whose query lists are cached.
    pub fn loaded_query_tables(&self) -> Vec<TableId> {
        self.queries.keys().cloned().collect()
    }

    pub fn replace_folders(&mut self, folders: Vec<Folder>) {
        self.folders = folders;
    }

    pub fn replace_tables(&mut self, tables: Vec<Table>) {
        let known = tables
            .iter()
            .filter(|table| table.is_active())
            .map(|table| table.id.clone())
            .collect::<Vec<_>>();
        self.tables = tables;
        self.queries.retain(|table_id, _| known.contains(table_id));
    }

    pub fn replace_queries(&mut self, table_id: TableId, queries: Vec<Query>) {
        self.queries.insert(table_id, queries);
    }

    pub fn upsert_folder(&mut self, folder: Folder) {
        match self.folders.iter_mut().find(|item| item.id == folder.id) {
            Some(slot) => *slot = folder,
            None => self.folders.push(folder),
        }
    }

    pub fn upsert_table(&mut self, table: Table) {
        match self.tables.iter_mut().find(|item| item.id == table.id) {
            Some(slot) => *slot = table,
            None => self.tables.push(table),
        }
    }

    /// Inserts or replaces one query; creates the table's cache slot if absent.
    pub fn upsert_query(&mut self, query: Query) {
        let list = self.queries.entry(query.table_id.clone()).or_default();
        match list.iter_mut().find(|item| item.id == query.id) {
            Some(slot) => *slot = query,
            None => list.push(query),
        }
    }

    /// Removes one folder; its tables keep their reference and display at root.
    pub fn remove_folder(&mut self, id: &FolderId) -> Option<Folder> {
        let index = self.folders.iter().position(|folder| &folder.id == id)?;
        Some(self.folders.remove(index))
    }

    /// Removes one table together with its cached queries.
    pub fn remove_table(&mut self, id: &TableId) -> Option<Table> {
        let index = self.tables.iter().position(|table| &table.id == id)?;
        self.queries.remove(id);
        Some(self.tables.remove(index))
    }

    pub fn remove_query(&mut self, id: &QueryId) -> Option<Query> {
        for list in self.queries.values_mut() {
            if let Some(index) = list.iter().position(|query| &query.id == id) {
                return Some(list.remove(index));
            }
        }
        None
    }

    /// Rewrites every table under `folder_id` to root (hard-delete semantics).
    pub fn detach_tables_from(&mut self, folder_id: &FolderId) {
        for table in self
            .tables
            .iter_mut()
            .filter(|table| table.folder_id.as_ref() == Some(folder_id))
        {
            table.folder_id = None;
        }
    }

    pub fn set_folder_order(&mut self, id: &FolderId, order_index: i64) -> bool {
        match self.folders.iter_mut().find(|folder| &folder.id == id) {
            Some(folder) => {
                folder.order_index = order_index;
                true
            }
            None => false,
        }
    }

    pub fn set_table_location(
        &mut self,
        id: &TableId,
        folder_id: Option<FolderId>,
        order_index: i64,
    ) -> bool {
        match self.tables.iter_mut().find(|table| &table.id == id) {
            Some(table) => {
                table.folder_id = folder_id;
                table.order_index = order_index;
                true
            }
            None => false,
        }
    }

    pub fn set_query_order(&mut self, id: &QueryId, order_index: i64) -> bool {
        match self
            .queries
            .values_mut()
            .flatten()
            .find(|query| &query.id == id)
        {
            Some(query) => {
                query.order_index = order_index;
                true
            }
            None => false,
        }
    }

    /// Swaps a locally minted folder id for the durable record.
    pub fn reconcile_folder(&mut self, local_id: &FolderId, durable: Folder) {
        for table in self
            .tables
            .iter_mut()
            .filter(|table| table.folder_id.as_ref() == Some(local_id))
        {
            table.folder_id = Some(durable.id.clone());
        }
        self.remove_folder(local_id);
        self.upsert_folder(durable);
    }

    /// Swaps a locally minted table id for the durable record.
    pub fn reconcile_table(&mut self, local_id: &TableId, durable: Table) {
        let cached = self.queries.remove(local_id);
        if let Some(index) = self.tables.iter().position(|table| &table.id == local_id) {
            self.tables.remove(index);
        }
        if let Some(mut queries) = cached {
            for query in &mut queries {
                query.table_id = durable.id.clone();
            }
            self.queries.insert(durable.id.clone(), queries);
        }
        self.upsert_table(durable);
    }

    /// Swaps a locally minted query id for the durable record.
    pub fn reconcile_query(&mut self, local_id: &QueryId, durable: Query) {
        self.remove_query(local_id);
        self.upsert_query(durable);
    }
}
