//! Optimistic mutation engine.
//!
//! # Responsibility
//! - Apply every structural change to the in-memory collection first.
//! - Queue the matching gateway calls and settle them in FIFO order.
//! - Resynchronize folders and tables from the gateway after any failure.
//!
//! # Invariants
//! - A mutation call either fails up front with [`MutationError`] and leaves
//!   local state untouched, or applies locally and enqueues exactly one
//!   [`PendingMutation`].
//! - Settlement never retries; a failed batch stops at the first failing
//!   call and reports [`Settlement::NeedsResync`].
//! - Locally minted ids are swapped for durable ids as soon as their create
//!   call settles, in the collection, the selection and the queued calls.

use crate::gateway::{
    Gateway, GatewayError, GatewayResult, NewQuery, NewTable, QueryFields, TableFields,
    TrashListing,
};
use crate::model::collection::Collection;
use crate::model::entity::{
    now_ms, EntityKind, EntityRef, Folder, FolderId, Query, QueryId, Table, TableId,
    TEMP_ID_PREFIX,
};
use crate::model::selection::SelectionState;
use crate::search::{SearchHit, SearchRequest};
use crate::service::access::{Actor, AllowList};
use crate::service::reorder::{resolve_drag, resolve_query_drag, DragItem, ReorderPlan};
use log::{info, warn};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors raised before any local change is applied.
#[derive(Debug)]
pub enum MutationError {
    /// Actor is not on the allow-list.
    Forbidden { email: String },
    /// Name or title is blank after trim.
    BlankName(EntityKind),
    /// Target is not part of the active collection.
    NotFound(EntityRef),
    /// Permanent delete of an entity that is still active.
    NotInTrash(EntityRef),
    /// A read needed to prepare the mutation failed.
    Gateway(GatewayError),
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forbidden { email } => write!(f, "actor is not allowed to edit: {email}"),
            Self::BlankName(kind) => write!(f, "{kind} name must not be blank"),
            Self::NotFound(target) => write!(f, "{target} not found"),
            Self::NotInTrash(target) => write!(f, "{target} is not in the trash"),
            Self::Gateway(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Gateway(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GatewayError> for MutationError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

/// Handle of one queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationTicket(u64);

impl MutationTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl Display for MutationTicket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// User-level mutation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateFolder,
    CreateTable,
    CreateQuery,
    RenameFolder,
    UpdateTable,
    UpdateQuery,
    Reorder,
    SoftDelete,
    Restore,
    HardDelete,
    EmptyTrash,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateFolder => "create_folder",
            Self::CreateTable => "create_table",
            Self::CreateQuery => "create_query",
            Self::RenameFolder => "rename_folder",
            Self::UpdateTable => "update_table",
            Self::UpdateQuery => "update_query",
            Self::Reorder => "reorder",
            Self::SoftDelete => "soft_delete",
            Self::Restore => "restore",
            Self::HardDelete => "hard_delete",
            Self::EmptyTrash => "empty_trash",
        }
    }
}

impl Display for MutationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gateway call waiting in the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    CreateFolder {
        local_id: FolderId,
        name: String,
        order_index: i64,
    },
    CreateTable {
        local_id: TableId,
        draft: NewTable,
    },
    CreateQuery {
        local_id: QueryId,
        draft: NewQuery,
    },
    RenameFolder {
        id: FolderId,
        name: String,
    },
    UpdateTable {
        id: TableId,
        fields: TableFields,
    },
    UpdateQuery {
        id: QueryId,
        fields: QueryFields,
    },
    FolderOrder {
        id: FolderId,
        order_index: i64,
    },
    TableLocation {
        id: TableId,
        folder_id: Option<FolderId>,
        order_index: i64,
    },
    QueryOrder {
        id: QueryId,
        order_index: i64,
    },
    SoftDelete(EntityRef),
    Restore(EntityRef),
    HardDelete(EntityRef),
}

/// Local id swapped for a durable one.
#[derive(Debug, Clone)]
enum IdRemap {
    Folder(FolderId, FolderId),
    Table(TableId, TableId),
    Query(QueryId, QueryId),
}

impl RemoteOp {
    /// Returns a referenced id that is still local-only, if any.
    ///
    /// The id minted by a create call itself does not count.
    fn unresolved_reference(&self) -> Option<&str> {
        let referenced = match self {
            Self::CreateFolder { .. } => None,
            Self::CreateTable { draft, .. } => draft.folder_id.as_ref().map(FolderId::as_str),
            Self::CreateQuery { draft, .. } => Some(draft.table_id.as_str()),
            Self::RenameFolder { id, .. } | Self::FolderOrder { id, .. } => Some(id.as_str()),
            Self::UpdateTable { id, .. } => Some(id.as_str()),
            Self::TableLocation { id, folder_id, .. } => {
                if id.is_temporary() {
                    Some(id.as_str())
                } else {
                    folder_id.as_ref().map(FolderId::as_str)
                }
            }
            Self::UpdateQuery { id, .. } | Self::QueryOrder { id, .. } => Some(id.as_str()),
            Self::SoftDelete(target) | Self::Restore(target) | Self::HardDelete(target) => {
                Some(target.id_str())
            }
        };
        referenced.filter(|id| id.starts_with(TEMP_ID_PREFIX))
    }

    fn remap(&mut self, remap: &IdRemap) {
        match remap {
            IdRemap::Folder(from, to) => match self {
                Self::CreateTable { draft, .. } => swap_optional(&mut draft.folder_id, from, to),
                Self::RenameFolder { id, .. } | Self::FolderOrder { id, .. } => swap(id, from, to),
                Self::TableLocation { folder_id, .. } => swap_optional(folder_id, from, to),
                Self::SoftDelete(EntityRef::Folder(id))
                | Self::Restore(EntityRef::Folder(id))
                | Self::HardDelete(EntityRef::Folder(id)) => swap(id, from, to),
                _ => {}
            },
            IdRemap::Table(from, to) => match self {
                Self::CreateQuery { draft, .. } => swap(&mut draft.table_id, from, to),
                Self::UpdateTable { id, .. } | Self::TableLocation { id, .. } => swap(id, from, to),
                Self::SoftDelete(EntityRef::Table(id))
                | Self::Restore(EntityRef::Table(id))
                | Self::HardDelete(EntityRef::Table(id)) => swap(id, from, to),
                _ => {}
            },
            IdRemap::Query(from, to) => match self {
                Self::UpdateQuery { id, .. } | Self::QueryOrder { id, .. } => swap(id, from, to),
                Self::SoftDelete(EntityRef::Query(id))
                | Self::Restore(EntityRef::Query(id))
                | Self::HardDelete(EntityRef::Query(id)) => swap(id, from, to),
                _ => {}
            },
        }
    }
}

fn swap<T: PartialEq + Clone>(slot: &mut T, from: &T, to: &T) {
    if slot == from {
        *slot = to.clone();
    }
}

fn swap_optional<T: PartialEq + Clone>(slot: &mut Option<T>, from: &T, to: &T) {
    if slot.as_ref() == Some(from) {
        *slot = Some(to.clone());
    }
}

/// Locally applied mutation whose gateway calls have not settled yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub ticket: MutationTicket,
    pub kind: MutationKind,
    /// Calls issued in order; the first failure stops the batch.
    pub ops: Vec<RemoteOp>,
    /// Rename/edit flows surface a blocking alert on failure.
    pub alert_on_failure: bool,
}

/// Outcome of settling one pending mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    NeedsResync { reason: String },
}

impl Settlement {
    pub fn needs_resync(&self) -> bool {
        matches!(self, Self::NeedsResync { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledMutation {
    pub ticket: MutationTicket,
    pub kind: MutationKind,
    pub settlement: Settlement,
    /// User-facing message for flows that alert on failure.
    pub alert: Option<String>,
    /// `true` when this settle drained the outbox and a resync ran and succeeded.
    pub resynced: bool,
    pub resync_error: Option<String>,
}

/// Summary of draining the outbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub settled: Vec<SettledMutation>,
    /// `true` when a resync ran and succeeded.
    pub resynced: bool,
    pub resync_error: Option<String>,
}

impl FlushReport {
    pub fn all_confirmed(&self) -> bool {
        self.settled
            .iter()
            .all(|item| item.settlement == Settlement::Confirmed)
    }

    pub fn alerts(&self) -> impl Iterator<Item = &str> {
        self.settled.iter().filter_map(|item| item.alert.as_deref())
    }
}

/// Optimistic mutation engine over one gateway.
pub struct MutationEngine<G: Gateway> {
    gateway: G,
    allow: AllowList,
    collection: Collection,
    selection: SelectionState,
    outbox: VecDeque<PendingMutation>,
    next_ticket: u64,
    ready: bool,
    stale: bool,
    resync_owed: bool,
}

impl<G: Gateway> MutationEngine<G> {
    pub fn new(gateway: G, allow: AllowList) -> Self {
        Self {
            gateway,
            allow,
            collection: Collection::new(),
            selection: SelectionState::new(),
            outbox: VecDeque::new(),
            next_ticket: 1,
            ready: false,
            stale: false,
            resync_owed: false,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionState {
        &mut self.selection
    }

    /// Collection for reading plus selection for writing, borrowed together.
    pub fn view_mut(&mut self) -> (&Collection, &mut SelectionState) {
        (&self.collection, &mut self.selection)
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// `true` once the first fetch succeeded.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// `true` when the last resync failed and local state may be ahead.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// `true` when a settle failed and the resync waits for the outbox to drain.
    pub fn is_resync_owed(&self) -> bool {
        self.resync_owed
    }

    pub fn pending_count(&self) -> usize {
        self.outbox.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingMutation> {
        self.outbox.iter()
    }

    /// Initial fetch of folders and tables.
    pub fn load(&mut self) -> GatewayResult<()> {
        self.resync()
    }

    /// Replaces folders, tables and every cached query list with durable state.
    pub fn resync(&mut self) -> GatewayResult<()> {
        info!("event=resync module=engine status=start");
        match self.refetch() {
            Ok(()) => {
                self.ready = true;
                self.stale = false;
                // Queued mutations were applied against the replaced state.
                self.resync_owed = !self.outbox.is_empty();
                info!(
                    "event=resync module=engine status=ok folders={} tables={}",
                    self.collection.folders().len(),
                    self.collection.all_tables().count()
                );
                Ok(())
            }
            Err(err) => {
                self.stale = true;
                warn!("event=resync module=engine status=error error={err}");
                Err(err)
            }
        }
    }

    fn refetch(&mut self) -> GatewayResult<()> {
        let folders = self.gateway.list_folders()?;
        let tables = self.gateway.list_tables()?;
        self.collection.replace_folders(folders);
        self.collection.replace_tables(tables);

        for table_id in self.collection.loaded_query_tables() {
            let queries = self.gateway.list_queries(&table_id)?;
            self.collection.replace_queries(table_id, queries);
        }

        let selection_vanished = self
            .selection
            .selected_table_id()
            .is_some_and(|id| self.collection.table(id).is_none());
        if selection_vanished {
            self.selection.select_table(None);
        }
        Ok(())
    }

    /// Fetches (or refreshes) the query list of one table.
    pub fn load_queries(&mut self, table_id: &TableId) -> GatewayResult<()> {
        if table_id.is_temporary() {
            if !self.collection.has_queries_loaded(table_id) {
                self.collection.replace_queries(table_id.clone(), Vec::new());
            }
            return Ok(());
        }
        let queries = self.gateway.list_queries(table_id)?;
        self.collection.replace_queries(table_id.clone(), queries);
        Ok(())
    }

    pub fn list_trash(&self) -> GatewayResult<TrashListing> {
        self.gateway.list_trash()
    }

    pub fn search(&self, request: &SearchRequest) -> GatewayResult<Vec<SearchHit>> {
        self.gateway.search_queries(request)
    }

    /// Creates a folder at the end of the folder list.
    pub fn create_folder(&mut self, actor: &Actor, name: &str) -> Result<FolderId, MutationError> {
        self.authorize(actor)?;
        let name = normalize_name(name, EntityKind::Folder)?;
        let order_index = self.collection.folders().len() as i64;
        let local_id = FolderId::temporary();

        self.collection.upsert_folder(Folder {
            id: local_id.clone(),
            name: name.clone(),
            order_index,
            created_at: now_ms(),
            deleted_at: None,
        });
        self.enqueue(
            MutationKind::CreateFolder,
            vec![RemoteOp::CreateFolder {
                local_id: local_id.clone(),
                name,
                order_index,
            }],
            false,
        );
        Ok(local_id)
    }

    /// Creates a table at the end of its sibling group.
    ///
    /// `draft.order_index` is recomputed from the local sibling count.
    pub fn create_table(
        &mut self,
        actor: &Actor,
        mut draft: NewTable,
    ) -> Result<TableId, MutationError> {
        self.authorize(actor)?;
        draft.table_name = normalize_name(&draft.table_name, EntityKind::Table)?;
        draft.description = normalize_optional(draft.description);
        draft.schema_name = normalize_optional(draft.schema_name);
        let parent = draft
            .folder_id
            .as_ref()
            .filter(|folder_id| self.collection.folder(folder_id).is_some());
        draft.order_index = self.collection.tables_in(parent).len() as i64;
        let local_id = TableId::temporary();

        self.collection.upsert_table(Table {
            id: local_id.clone(),
            table_name: draft.table_name.clone(),
            schema_name: draft.schema_name.clone(),
            description: draft.description.clone(),
            folder_id: draft.folder_id.clone(),
            order_index: draft.order_index,
            created_at: now_ms(),
            deleted_at: None,
        });
        self.collection.replace_queries(local_id.clone(), Vec::new());
        self.enqueue(
            MutationKind::CreateTable,
            vec![RemoteOp::CreateTable {
                local_id: local_id.clone(),
                draft,
            }],
            false,
        );
        Ok(local_id)
    }

    /// Appends a query to a table's list.
    pub fn create_query(
        &mut self,
        actor: &Actor,
        table_id: &TableId,
        title: &str,
        sql_code: &str,
        related_link: Option<&str>,
    ) -> Result<QueryId, MutationError> {
        self.authorize(actor)?;
        let title = normalize_name(title, EntityKind::Query)?;
        if self.collection.table(table_id).is_none() {
            return Err(MutationError::NotFound(EntityRef::Table(table_id.clone())));
        }
        if !self.collection.has_queries_loaded(table_id) {
            self.load_queries(table_id)?;
        }

        let draft = NewQuery {
            table_id: table_id.clone(),
            title,
            sql_code: sql_code.to_string(),
            related_link: normalize_optional(related_link.map(str::to_string)),
            order_index: self.collection.queries_in(table_id).len() as i64,
        };
        let local_id = QueryId::temporary();
        self.collection.upsert_query(Query {
            id: local_id.clone(),
            table_id: table_id.clone(),
            title: draft.title.clone(),
            sql_code: draft.sql_code.clone(),
            related_link: draft.related_link.clone(),
            order_index: draft.order_index,
            created_at: now_ms(),
            deleted_at: None,
        });
        self.enqueue(
            MutationKind::CreateQuery,
            vec![RemoteOp::CreateQuery {
                local_id: local_id.clone(),
                draft,
            }],
            false,
        );
        Ok(local_id)
    }

    pub fn rename_folder(
        &mut self,
        actor: &Actor,
        id: &FolderId,
        name: &str,
    ) -> Result<MutationTicket, MutationError> {
        self.authorize(actor)?;
        let name = normalize_name(name, EntityKind::Folder)?;
        let Some(mut folder) = self.collection.folder(id).cloned() else {
            return Err(MutationError::NotFound(EntityRef::Folder(id.clone())));
        };
        folder.name = name.clone();
        self.collection.upsert_folder(folder);
        Ok(self.enqueue(
            MutationKind::RenameFolder,
            vec![RemoteOp::RenameFolder {
                id: id.clone(),
                name,
            }],
            true,
        ))
    }

    pub fn update_table(
        &mut self,
        actor: &Actor,
        id: &TableId,
        mut fields: TableFields,
    ) -> Result<MutationTicket, MutationError> {
        self.authorize(actor)?;
        fields.table_name = normalize_name(&fields.table_name, EntityKind::Table)?;
        fields.description = normalize_optional(fields.description);
        fields.schema_name = normalize_optional(fields.schema_name);
        let Some(mut table) = self.collection.table(id).cloned() else {
            return Err(MutationError::NotFound(EntityRef::Table(id.clone())));
        };
        table.table_name = fields.table_name.clone();
        table.description = fields.description.clone();
        table.schema_name = fields.schema_name.clone();
        self.collection.upsert_table(table);
        Ok(self.enqueue(
            MutationKind::UpdateTable,
            vec![RemoteOp::UpdateTable {
                id: id.clone(),
                fields,
            }],
            true,
        ))
    }

    pub fn update_query(
        &mut self,
        actor: &Actor,
        id: &QueryId,
        mut fields: QueryFields,
    ) -> Result<MutationTicket, MutationError> {
        self.authorize(actor)?;
        fields.title = normalize_name(&fields.title, EntityKind::Query)?;
        fields.related_link = normalize_optional(fields.related_link);
        let Some(mut query) = self.collection.query(id).cloned() else {
            return Err(MutationError::NotFound(EntityRef::Query(id.clone())));
        };
        query.title = fields.title.clone();
        query.sql_code = fields.sql_code.clone();
        query.related_link = fields.related_link.clone();
        self.collection.upsert_query(query);
        Ok(self.enqueue(
            MutationKind::UpdateQuery,
            vec![RemoteOp::UpdateQuery {
                id: id.clone(),
                fields,
            }],
            true,
        ))
    }

    /// Moves an active entity to the trash.
    ///
    /// Tables of a trashed folder keep their `folder_id` and display at root.
    pub fn soft_delete(
        &mut self,
        actor: &Actor,
        target: EntityRef,
    ) -> Result<MutationTicket, MutationError> {
        self.authorize(actor)?;
        let removed = match &target {
            EntityRef::Folder(id) => self.collection.remove_folder(id).is_some(),
            EntityRef::Table(id) => {
                let removed = self.collection.table(id).is_some()
                    && self.collection.remove_table(id).is_some();
                if removed && self.selection.selected_table_id() == Some(id) {
                    self.selection.select_table(None);
                }
                removed
            }
            EntityRef::Query(id) => {
                let removed = self.collection.query(id).is_some()
                    && self.collection.remove_query(id).is_some();
                if removed && self.selection.target_query_id() == Some(id) {
                    self.selection.set_target_query(None);
                }
                removed
            }
        };
        if !removed {
            return Err(MutationError::NotFound(target));
        }
        Ok(self.enqueue(
            MutationKind::SoftDelete,
            vec![RemoteOp::SoftDelete(target)],
            false,
        ))
    }

    pub fn restore_folder(
        &mut self,
        actor: &Actor,
        mut folder: Folder,
    ) -> Result<MutationTicket, MutationError> {
        self.authorize(actor)?;
        folder.deleted_at = None;
        let target = EntityRef::Folder(folder.id.clone());
        self.collection.upsert_folder(folder);
        Ok(self.enqueue(MutationKind::Restore, vec![RemoteOp::Restore(target)], false))
    }

    pub fn restore_table(
        &mut self,
        actor: &Actor,
        mut table: Table,
    ) -> Result<MutationTicket, MutationError> {
        self.authorize(actor)?;
        table.deleted_at = None;
        let target = EntityRef::Table(table.id.clone());
        self.collection.upsert_table(table);
        Ok(self.enqueue(MutationKind::Restore, vec![RemoteOp::Restore(target)], false))
    }

    /// Restores a query; it only enters the local cache when its table's list is loaded.
    pub fn restore_query(
        &mut self,
        actor: &Actor,
        mut query: Query,
    ) -> Result<MutationTicket, MutationError> {
        self.authorize(actor)?;
        query.deleted_at = None;
        let target = EntityRef::Query(query.id.clone());
        if self.collection.has_queries_loaded(&query.table_id) {
            self.collection.upsert_query(query);
        }
        Ok(self.enqueue(MutationKind::Restore, vec![RemoteOp::Restore(target)], false))
    }

    /// Permanently removes one trashed entity. Callers confirm first.
    ///
    /// Entities still present in the active collection are refused.
    pub fn hard_delete(
        &mut self,
        actor: &Actor,
        target: EntityRef,
    ) -> Result<MutationTicket, MutationError> {
        self.authorize(actor)?;
        let active = match &target {
            EntityRef::Folder(id) => self.collection.folder(id).is_some(),
            EntityRef::Table(id) => self.collection.table(id).is_some(),
            EntityRef::Query(id) => self.collection.query(id).is_some(),
        };
        if active {
            return Err(MutationError::NotInTrash(target));
        }
        self.forget(&target);
        Ok(self.enqueue(
            MutationKind::HardDelete,
            vec![RemoteOp::HardDelete(target)],
            false,
        ))
    }

    /// Hard-deletes every trashed entity: queries, then tables, then folders.
    ///
    /// Returns `None` when the listing is empty.
    pub fn empty_trash(
        &mut self,
        actor: &Actor,
        listing: &TrashListing,
    ) -> Result<Option<MutationTicket>, MutationError> {
        self.authorize(actor)?;
        if listing.is_empty() {
            return Ok(None);
        }

        let targets = listing
            .queries
            .iter()
            .map(|item| EntityRef::Query(item.query.id.clone()))
            .chain(
                listing
                    .tables
                    .iter()
                    .map(|table| EntityRef::Table(table.id.clone())),
            )
            .chain(
                listing
                    .folders
                    .iter()
                    .map(|folder| EntityRef::Folder(folder.id.clone())),
            )
            .collect::<Vec<_>>();
        for target in &targets {
            self.forget(target);
        }
        let ops = targets.into_iter().map(RemoteOp::HardDelete).collect();
        Ok(Some(self.enqueue(MutationKind::EmptyTrash, ops, false)))
    }

    fn forget(&mut self, target: &EntityRef) {
        match target {
            EntityRef::Folder(id) => {
                self.collection.detach_tables_from(id);
                self.collection.remove_folder(id);
            }
            EntityRef::Table(id) => {
                self.collection.remove_table(id);
            }
            EntityRef::Query(id) => {
                self.collection.remove_query(id);
            }
        }
    }

    /// Resolves and applies one sidebar drag. `Ok(None)` means nothing changed.
    pub fn drag(
        &mut self,
        actor: &Actor,
        active: &DragItem,
        over: &DragItem,
    ) -> Result<Option<MutationTicket>, MutationError> {
        let plan = resolve_drag(&self.collection, active, over);
        self.apply_reorder(actor, plan)
    }

    /// Resolves and applies one drag inside a table's query list.
    pub fn drag_query(
        &mut self,
        actor: &Actor,
        table_id: &TableId,
        active: &QueryId,
        over: &QueryId,
    ) -> Result<Option<MutationTicket>, MutationError> {
        let plan = resolve_query_drag(&self.collection, table_id, active, over);
        self.apply_reorder(actor, plan)
    }

    /// Applies a resolved plan locally and queues one positional write per
    /// entity of the renumbered group.
    pub fn apply_reorder(
        &mut self,
        actor: &Actor,
        plan: ReorderPlan,
    ) -> Result<Option<MutationTicket>, MutationError> {
        if plan.is_noop() {
            return Ok(None);
        }
        self.authorize(actor)?;

        let mut ops = Vec::new();
        match plan {
            ReorderPlan::Noop => return Ok(None),
            ReorderPlan::Folders(ordered) => {
                for (index, id) in ordered.into_iter().enumerate() {
                    let order_index = index as i64;
                    self.collection.set_folder_order(&id, order_index);
                    ops.push(RemoteOp::FolderOrder { id, order_index });
                }
            }
            ReorderPlan::FilesInGroup { ordered, .. } => {
                for (index, id) in ordered.into_iter().enumerate() {
                    // Stored parent, so orphans keep their dangling reference.
                    let folder_id = self
                        .collection
                        .table(&id)
                        .and_then(|table| table.folder_id.clone());
                    ops.push(self.place_table(id, folder_id, index));
                }
            }
            ReorderPlan::MoveFile {
                table_id,
                to,
                destination,
                expand,
                ..
            } => {
                for (index, id) in destination.into_iter().enumerate() {
                    let folder_id = if id == table_id {
                        to.clone()
                    } else {
                        self.collection
                            .table(&id)
                            .and_then(|table| table.folder_id.clone())
                    };
                    ops.push(self.place_table(id, folder_id, index));
                }
                if let Some(folder_id) = expand {
                    self.selection.open_folder(folder_id);
                }
            }
            ReorderPlan::Queries { ordered, .. } => {
                for (index, id) in ordered.into_iter().enumerate() {
                    let order_index = index as i64;
                    self.collection.set_query_order(&id, order_index);
                    ops.push(RemoteOp::QueryOrder { id, order_index });
                }
            }
        }
        Ok(Some(self.enqueue(MutationKind::Reorder, ops, false)))
    }

    fn place_table(&mut self, id: TableId, folder_id: Option<FolderId>, index: usize) -> RemoteOp {
        let order_index = index as i64;
        self.collection
            .set_table_location(&id, folder_id.clone(), order_index);
        RemoteOp::TableLocation {
            id,
            folder_id,
            order_index,
        }
    }

    /// Settles the oldest pending mutation.
    ///
    /// A failure owes a resync, paid once the outbox is empty so later queued
    /// mutations still settle against the state they were applied to.
    pub fn settle_next(&mut self) -> Option<SettledMutation> {
        let mut settled = self.settle_front()?;
        if settled.settlement.needs_resync() {
            self.resync_owed = true;
        }
        if self.resync_owed && self.outbox.is_empty() {
            match self.resync() {
                Ok(()) => settled.resynced = true,
                Err(err) => settled.resync_error = Some(err.to_string()),
            }
        }
        Some(settled)
    }

    /// Settles every pending mutation, then resyncs once if any failed.
    pub fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        while let Some(settled) = self.settle_front() {
            report.settled.push(settled);
        }
        let failed = report
            .settled
            .iter()
            .any(|item| item.settlement.needs_resync());
        if failed || self.resync_owed {
            match self.resync() {
                Ok(()) => report.resynced = true,
                Err(err) => report.resync_error = Some(err.to_string()),
            }
        }
        report
    }

    fn settle_front(&mut self) -> Option<SettledMutation> {
        let PendingMutation {
            ticket,
            kind,
            ops,
            alert_on_failure,
        } = self.outbox.pop_front()?;

        let mut remaining = VecDeque::from(ops);
        let mut failure = None;
        while let Some(op) = remaining.pop_front() {
            match self.execute(&op) {
                Ok(Some(remap)) => {
                    for rest in remaining.iter_mut() {
                        rest.remap(&remap);
                    }
                    for pending in self.outbox.iter_mut() {
                        for queued in pending.ops.iter_mut() {
                            queued.remap(&remap);
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    failure = Some(err.to_string());
                    break;
                }
            }
        }

        let (settlement, alert) = match failure {
            None => {
                info!("event=mutation_settle module=engine status=ok ticket={ticket} kind={kind}");
                (Settlement::Confirmed, None)
            }
            Some(reason) => {
                warn!(
                    "event=mutation_settle module=engine status=error ticket={ticket} kind={kind} error={reason}"
                );
                let alert = alert_on_failure.then(|| format!("{kind} failed: {reason}"));
                (Settlement::NeedsResync { reason }, alert)
            }
        };
        Some(SettledMutation {
            ticket,
            kind,
            settlement,
            alert,
            resynced: false,
            resync_error: None,
        })
    }

    fn execute(&mut self, op: &RemoteOp) -> GatewayResult<Option<IdRemap>> {
        if let Some(id) = op.unresolved_reference() {
            return Err(GatewayError::Rejected(format!("unresolved local id {id}")));
        }
        let result = match op {
            RemoteOp::CreateFolder {
                local_id,
                name,
                order_index,
            } => {
                let durable = self.gateway.create_folder(name, *order_index)?;
                let remap = IdRemap::Folder(local_id.clone(), durable.id.clone());
                self.selection.remap_folder(local_id, &durable.id);
                if self.collection.folder(local_id).is_some() {
                    self.collection.reconcile_folder(local_id, durable);
                }
                Some(remap)
            }
            RemoteOp::CreateTable { local_id, draft } => {
                let durable = self.gateway.create_table(draft)?;
                let remap = IdRemap::Table(local_id.clone(), durable.id.clone());
                self.selection.remap_table(local_id, &durable.id);
                if self.collection.table(local_id).is_some() {
                    self.collection.reconcile_table(local_id, durable);
                }
                Some(remap)
            }
            RemoteOp::CreateQuery { local_id, draft } => {
                let durable = self.gateway.create_query(draft)?;
                let remap = IdRemap::Query(local_id.clone(), durable.id.clone());
                self.selection.remap_query(local_id, &durable.id);
                if self.collection.query(local_id).is_some() {
                    self.collection.reconcile_query(local_id, durable);
                }
                Some(remap)
            }
            RemoteOp::RenameFolder { id, name } => {
                self.gateway.rename_folder(id, name)?;
                None
            }
            RemoteOp::UpdateTable { id, fields } => {
                self.gateway.update_table(id, fields)?;
                None
            }
            RemoteOp::UpdateQuery { id, fields } => {
                self.gateway.update_query(id, fields)?;
                None
            }
            RemoteOp::FolderOrder { id, order_index } => {
                self.gateway.update_folder_order(id, *order_index)?;
                None
            }
            RemoteOp::TableLocation {
                id,
                folder_id,
                order_index,
            } => {
                self.gateway
                    .update_table_location(id, folder_id.as_ref(), *order_index)?;
                None
            }
            RemoteOp::QueryOrder { id, order_index } => {
                self.gateway.update_query_order(id, *order_index)?;
                None
            }
            RemoteOp::SoftDelete(target) => {
                self.gateway.soft_delete(target)?;
                None
            }
            RemoteOp::Restore(target) => {
                self.gateway.restore(target)?;
                None
            }
            RemoteOp::HardDelete(target) => {
                self.gateway.hard_delete(target)?;
                None
            }
        };
        Ok(result)
    }

    fn enqueue(
        &mut self,
        kind: MutationKind,
        ops: Vec<RemoteOp>,
        alert_on_failure: bool,
    ) -> MutationTicket {
        let ticket = MutationTicket(self.next_ticket);
        self.next_ticket += 1;
        info!(
            "event=mutation_apply module=engine status=ok ticket={ticket} kind={kind} calls={}",
            ops.len()
        );
        self.outbox.push_back(PendingMutation {
            ticket,
            kind,
            ops,
            alert_on_failure,
        });
        ticket
    }

    fn authorize(&self, actor: &Actor) -> Result<(), MutationError> {
        if self.allow.permits(actor) {
            return Ok(());
        }
        warn!("event=mutation_apply module=engine status=forbidden");
        Err(MutationError::Forbidden {
            email: actor.email().to_string(),
        })
    }
}

fn normalize_name(value: &str, kind: EntityKind) -> Result<String, MutationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MutationError::BlankName(kind));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
