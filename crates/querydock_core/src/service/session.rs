//! Session facade over engine, navigation binding and guard.
//!
//! # Responsibility
//! - Expose the typed action interface a UI layer calls.
//! - Route every navigation through the unsaved-changes guard.
//! - Run the selection → address sync after selection-changing actions.
//! - Gate permanent deletes behind an explicit confirmation step.

use crate::gateway::{
    Gateway, GatewayError, NewTable, QueryFields, TableFields, TrashListing,
};
use crate::model::entity::{EntityRef, Folder, FolderId, Query, QueryId, Table, TableId};
use crate::nav::controller::{AddressSync, NavigationController};
use crate::nav::history::History;
use crate::search::{normalize_search_limit, SearchHit, SearchRequest, DEFAULT_SEARCH_LIMIT};
use crate::service::access::{Actor, AllowList};
use crate::service::guard::{EditorDraft, GuardDecision, NavigationIntent, UnsavedChangesGuard};
use crate::service::mutation::{
    FlushReport, MutationEngine, MutationError, MutationTicket, SettledMutation,
};
use crate::service::reorder::DragItem;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Which main panel is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Main,
    Trash,
}

/// Destructive action waiting for user confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingConfirmation {
    HardDelete(EntityRef),
    EmptyTrash,
}

/// Result of a guarded navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Applied,
    /// Unsaved edits; waiting for `confirm_navigation` or `cancel_navigation`.
    Blocked,
}

#[derive(Debug)]
pub enum SessionError {
    Mutation(MutationError),
    Gateway(GatewayError),
    /// `confirm_pending` called with nothing awaiting confirmation.
    NothingToConfirm,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mutation(err) => write!(f, "{err}"),
            Self::Gateway(err) => write!(f, "{err}"),
            Self::NothingToConfirm => write!(f, "no action is waiting for confirmation"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mutation(err) => Some(err),
            Self::Gateway(err) => Some(err),
            Self::NothingToConfirm => None,
        }
    }
}

impl From<MutationError> for SessionError {
    fn from(value: MutationError) -> Self {
        Self::Mutation(value)
    }
}

impl From<GatewayError> for SessionError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

pub struct Session<G: Gateway, H: History> {
    engine: MutationEngine<G>,
    navigation: NavigationController,
    guard: UnsavedChangesGuard,
    history: H,
    actor: Actor,
    view_mode: ViewMode,
    confirmation: Option<PendingConfirmation>,
    search_limit: u32,
    /// Editor save that has been applied locally but not settled yet.
    unsettled_save: Option<MutationTicket>,
}

impl<G: Gateway, H: History> Session<G, H> {
    pub fn new(gateway: G, allow: AllowList, history: H, actor: Actor) -> Self {
        Self {
            engine: MutationEngine::new(gateway, allow),
            navigation: NavigationController::new(),
            guard: UnsavedChangesGuard::new(),
            history,
            actor,
            view_mode: ViewMode::Main,
            confirmation: None,
            search_limit: DEFAULT_SEARCH_LIMIT,
            unsettled_save: None,
        }
    }

    /// Sets the hit limit used when a search passes none.
    pub fn with_search_limit(mut self, limit: u32) -> Self {
        self.search_limit = normalize_search_limit(Some(limit));
        self
    }

    pub fn search_limit(&self) -> u32 {
        self.search_limit
    }

    pub fn engine(&self) -> &MutationEngine<G> {
        &self.engine
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn navigation(&self) -> &NavigationController {
        &self.navigation
    }

    pub fn guard(&self) -> &UnsavedChangesGuard {
        &self.guard
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn pending_confirmation(&self) -> Option<&PendingConfirmation> {
        self.confirmation.as_ref()
    }

    /// Loads data, then restores selection from the current address.
    pub fn start(&mut self) -> Result<AddressSync, SessionError> {
        self.engine.load()?;
        let outcome = self.address_changed();
        self.ensure_selected_queries();
        Ok(outcome)
    }

    /// Forwards an external address change (typed URL, deep link).
    pub fn address_changed(&mut self) -> AddressSync {
        let ready = self.engine.is_ready();
        let (collection, selection) = self.engine.view_mut();
        let outcome = self
            .navigation
            .address_changed(ready, collection, selection, &mut self.history);
        self.ensure_selected_queries();
        outcome
    }

    pub fn back(&mut self) -> Option<AddressSync> {
        if !self.history.back() {
            return None;
        }
        Some(self.address_changed())
    }

    pub fn forward(&mut self) -> Option<AddressSync> {
        if !self.history.forward() {
            return None;
        }
        Some(self.address_changed())
    }

    /// Runs one navigation through the unsaved-changes guard.
    pub fn navigate(&mut self, intent: NavigationIntent) -> NavigationOutcome {
        match self.guard.request(intent) {
            GuardDecision::Proceed(intent) => {
                self.apply_intent(intent);
                NavigationOutcome::Applied
            }
            GuardDecision::ConfirmationRequired => NavigationOutcome::Blocked,
        }
    }

    /// Discards edits and runs the blocked navigation.
    pub fn confirm_navigation(&mut self) -> bool {
        match self.guard.confirm_discard() {
            Some(intent) => {
                self.apply_intent(intent);
                true
            }
            None => false,
        }
    }

    pub fn cancel_navigation(&mut self) {
        self.guard.cancel();
    }

    fn apply_intent(&mut self, intent: NavigationIntent) {
        let selection = self.engine.selection_mut();
        match intent {
            NavigationIntent::SelectTable(table_id) => {
                selection.select_table(table_id);
                self.view_mode = ViewMode::Main;
            }
            NavigationIntent::SelectQuery(query_id) => {
                selection.set_target_query(Some(query_id));
            }
            NavigationIntent::CollapseToRoot => {
                selection.select_table(None);
                selection.collapse_all();
                self.view_mode = ViewMode::Main;
            }
            NavigationIntent::OpenTrash => self.view_mode = ViewMode::Trash,
            NavigationIntent::OpenMain => self.view_mode = ViewMode::Main,
            NavigationIntent::OpenSearchResult {
                table_id,
                query_id,
                folder_id,
            } => {
                if let Some(folder_id) = folder_id {
                    selection.open_folder(folder_id);
                }
                selection.select_table(Some(table_id));
                selection.set_target_query(Some(query_id));
                self.view_mode = ViewMode::Main;
            }
        }
        self.sync_address();
    }

    /// Projects selection into the address and consumes the resulting notification.
    pub fn sync_address(&mut self) {
        let ready = self.engine.is_ready();
        let wrote = self.navigation.selection_changed(
            ready,
            self.engine.collection(),
            self.engine.selection(),
            &mut self.history,
        );
        if wrote {
            self.address_changed();
        } else {
            self.ensure_selected_queries();
        }
    }

    fn ensure_selected_queries(&mut self) {
        let Some(table_id) = self.engine.selection().selected_table_id().cloned() else {
            return;
        };
        if self.engine.collection().has_queries_loaded(&table_id) {
            return;
        }
        if let Err(err) = self.engine.load_queries(&table_id) {
            warn!("event=gateway_call module=session status=error op=list_queries error={err}");
        }
    }

    /// Folder expansion does not navigate, so it bypasses the guard.
    pub fn toggle_folder(&mut self, folder_id: &FolderId) {
        self.engine.selection_mut().toggle_folder(folder_id);
    }

    /// Recomputes editor dirtiness against the targeted query.
    pub fn track_draft(&mut self, draft: &EditorDraft) {
        let saved = self
            .engine
            .selection()
            .target_query_id()
            .and_then(|query_id| self.engine.collection().query(query_id));
        self.guard.track_draft(saved, draft);
    }

    /// Saves the editor content of one query and marks the editor clean.
    ///
    /// The guard turns dirty again if the save later fails to settle.
    pub fn save_draft(
        &mut self,
        query_id: &QueryId,
        draft: &EditorDraft,
    ) -> Result<MutationTicket, SessionError> {
        let ticket = self.engine.update_query(
            &self.actor,
            query_id,
            QueryFields {
                title: draft.title.clone(),
                sql_code: draft.sql_code.clone(),
                related_link: draft.related_link.clone(),
            },
        )?;
        self.guard.mark_saved();
        self.unsettled_save = Some(ticket);
        Ok(ticket)
    }

    pub fn create_folder(&mut self, name: &str) -> Result<FolderId, SessionError> {
        Ok(self.engine.create_folder(&self.actor, name)?)
    }

    pub fn create_table(&mut self, draft: NewTable) -> Result<TableId, SessionError> {
        Ok(self.engine.create_table(&self.actor, draft)?)
    }

    pub fn create_query(
        &mut self,
        table_id: &TableId,
        title: &str,
        sql_code: &str,
        related_link: Option<&str>,
    ) -> Result<QueryId, SessionError> {
        Ok(self
            .engine
            .create_query(&self.actor, table_id, title, sql_code, related_link)?)
    }

    pub fn rename_folder(
        &mut self,
        id: &FolderId,
        name: &str,
    ) -> Result<MutationTicket, SessionError> {
        Ok(self.engine.rename_folder(&self.actor, id, name)?)
    }

    pub fn update_table(
        &mut self,
        id: &TableId,
        fields: TableFields,
    ) -> Result<MutationTicket, SessionError> {
        let ticket = self.engine.update_table(&self.actor, id, fields)?;
        Ok(ticket)
    }

    pub fn soft_delete(&mut self, target: EntityRef) -> Result<MutationTicket, SessionError> {
        let ticket = self.engine.soft_delete(&self.actor, target)?;
        self.sync_address();
        Ok(ticket)
    }

    pub fn restore_folder(&mut self, folder: Folder) -> Result<MutationTicket, SessionError> {
        Ok(self.engine.restore_folder(&self.actor, folder)?)
    }

    pub fn restore_table(&mut self, table: Table) -> Result<MutationTicket, SessionError> {
        Ok(self.engine.restore_table(&self.actor, table)?)
    }

    pub fn restore_query(&mut self, query: Query) -> Result<MutationTicket, SessionError> {
        Ok(self.engine.restore_query(&self.actor, query)?)
    }

    pub fn drag(
        &mut self,
        active: &DragItem,
        over: &DragItem,
    ) -> Result<Option<MutationTicket>, SessionError> {
        Ok(self.engine.drag(&self.actor, active, over)?)
    }

    pub fn drag_query(
        &mut self,
        table_id: &TableId,
        active: &QueryId,
        over: &QueryId,
    ) -> Result<Option<MutationTicket>, SessionError> {
        Ok(self.engine.drag_query(&self.actor, table_id, active, over)?)
    }

    /// Parks a permanent delete; only entities in the trash listing qualify.
    pub fn request_hard_delete(&mut self, target: EntityRef) -> Result<(), SessionError> {
        let listing = self.engine.list_trash()?;
        let trashed = match &target {
            EntityRef::Folder(id) => listing.folders.iter().any(|folder| &folder.id == id),
            EntityRef::Table(id) => listing.tables.iter().any(|table| &table.id == id),
            EntityRef::Query(id) => listing.queries.iter().any(|item| &item.query.id == id),
        };
        if !trashed {
            return Err(MutationError::NotInTrash(target).into());
        }
        self.confirmation = Some(PendingConfirmation::HardDelete(target));
        Ok(())
    }

    pub fn request_empty_trash(&mut self) {
        self.confirmation = Some(PendingConfirmation::EmptyTrash);
    }

    pub fn cancel_pending(&mut self) {
        self.confirmation = None;
    }

    /// Runs the confirmed destructive action.
    ///
    /// `Ok(None)` when emptying an already empty trash.
    pub fn confirm_pending(&mut self) -> Result<Option<MutationTicket>, SessionError> {
        let confirmation = self
            .confirmation
            .take()
            .ok_or(SessionError::NothingToConfirm)?;
        match confirmation {
            PendingConfirmation::HardDelete(target) => {
                Ok(Some(self.engine.hard_delete(&self.actor, target)?))
            }
            PendingConfirmation::EmptyTrash => {
                let listing = self.engine.list_trash()?;
                Ok(self.engine.empty_trash(&self.actor, &listing)?)
            }
        }
    }

    pub fn trash_listing(&self) -> Result<TrashListing, SessionError> {
        Ok(self.engine.list_trash()?)
    }

    /// Blank text returns no hits without calling the gateway.
    ///
    /// Without an explicit `limit` the session's configured limit applies.
    pub fn search(&self, text: &str, limit: Option<u32>) -> Result<Vec<SearchHit>, SessionError> {
        let limit = limit.unwrap_or(self.search_limit);
        let Some(request) = SearchRequest::new(text, Some(limit)) else {
            return Ok(Vec::new());
        };
        Ok(self.engine.search(&request)?)
    }

    pub fn settle_next(&mut self) -> Option<SettledMutation> {
        let settled = self.engine.settle_next()?;
        self.review_save(std::slice::from_ref(&settled));
        self.sync_address();
        Some(settled)
    }

    /// Drains the outbox and re-projects selection, which a resync may clear.
    pub fn flush(&mut self) -> FlushReport {
        let report = self.engine.flush();
        self.review_save(&report.settled);
        self.sync_address();
        report
    }

    fn review_save(&mut self, settled: &[SettledMutation]) {
        let Some(ticket) = self.unsettled_save else {
            return;
        };
        let Some(outcome) = settled.iter().find(|item| item.ticket == ticket) else {
            return;
        };
        self.unsettled_save = None;
        if outcome.settlement.needs_resync() {
            warn!("event=guard_block module=session status=save_failed ticket={ticket}");
            self.guard.mark_unsaved();
        }
    }
}
