//! Unsaved-changes guard for navigation.
//!
//! # Invariants
//! - Two states: clean and dirty.
//! - Dirty becomes clean only through an explicit discard confirmation or a
//!   successful save.
//! - While dirty, at most one navigation waits for confirmation; a newer
//!   request replaces it.

use crate::model::entity::{FolderId, Query, QueryId, TableId};
use log::info;

/// Navigation the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationIntent {
    /// Select one table (or none).
    SelectTable(Option<TableId>),
    /// Open one query of the selected table in the editor.
    SelectQuery(QueryId),
    /// Clear selection and collapse every folder.
    CollapseToRoot,
    OpenTrash,
    OpenMain,
    /// Jump to a search hit.
    OpenSearchResult {
        table_id: TableId,
        query_id: QueryId,
        folder_id: Option<FolderId>,
    },
}

/// Guard outcome for one navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Nothing to lose; run the intent now.
    Proceed(NavigationIntent),
    /// The intent is parked until the user confirms discarding edits.
    ConfirmationRequired,
}

/// Guard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Clean,
    Dirty,
}

/// In-progress editor content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorDraft {
    pub title: String,
    pub sql_code: String,
    pub related_link: Option<String>,
}

impl EditorDraft {
    pub fn from_query(query: &Query) -> Self {
        Self {
            title: query.title.clone(),
            sql_code: query.sql_code.clone(),
            related_link: query.related_link.clone(),
        }
    }

    /// Blank and missing related links compare equal.
    pub fn differs_from(&self, saved: &Query) -> bool {
        self.title != saved.title
            || self.sql_code != saved.sql_code
            || normalize_link(self.related_link.as_deref())
                != normalize_link(saved.related_link.as_deref())
    }
}

fn normalize_link(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|link| !link.is_empty())
}

#[derive(Debug, Default)]
pub struct UnsavedChangesGuard {
    dirty: bool,
    pending: Option<NavigationIntent>,
}

impl UnsavedChangesGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GuardState {
        if self.dirty {
            GuardState::Dirty
        } else {
            GuardState::Clean
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn pending(&self) -> Option<&NavigationIntent> {
        self.pending.as_ref()
    }

    /// Recomputes dirtiness from the editor against the saved snapshot.
    ///
    /// Without a snapshot there is nothing to lose.
    pub fn track_draft(&mut self, saved: Option<&Query>, draft: &EditorDraft) {
        self.dirty = saved.is_some_and(|query| draft.differs_from(query));
    }

    /// Marks the editor clean after a save.
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Marks the editor dirty again after a save failed to settle.
    pub fn mark_unsaved(&mut self) {
        self.dirty = true;
    }

    pub fn request(&mut self, intent: NavigationIntent) -> GuardDecision {
        if !self.dirty {
            return GuardDecision::Proceed(intent);
        }
        info!("event=guard_block module=guard status=pending intent={intent:?}");
        self.pending = Some(intent);
        GuardDecision::ConfirmationRequired
    }

    /// Discards edits and releases the parked intent.
    pub fn confirm_discard(&mut self) -> Option<NavigationIntent> {
        let intent = self.pending.take()?;
        self.dirty = false;
        info!("event=guard_block module=guard status=discarded");
        Some(intent)
    }

    /// Keeps edits and drops the parked intent.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
