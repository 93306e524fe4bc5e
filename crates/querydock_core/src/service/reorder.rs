//! Drag gesture resolution.
//!
//! # Responsibility
//! - Turn an `(active, over)` drag pair into a concrete reorder/reparent plan.
//! - Compute the new sibling sequence; the engine assigns `0..n-1` from it.
//!
//! # Invariants
//! - Dragging an item onto itself resolves to [`ReorderPlan::Noop`].
//! - Unknown or inactive ids resolve to [`ReorderPlan::Noop`].
//! - Cross-parent moves renumber the destination group only; the source
//!   group keeps its existing `order_index` values.

use crate::model::collection::Collection;
use crate::model::entity::{FolderId, QueryId, TableId};

/// One side of a drag gesture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DragItem {
    Folder(FolderId),
    /// A table, shown as a "file" in the sidebar.
    File(TableId),
}

/// Resolved effect of a drag gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderPlan {
    /// Nothing to do.
    Noop,
    /// Full folder list in its new order.
    Folders(Vec<FolderId>),
    /// New order of one table sibling group.
    FilesInGroup {
        parent: Option<FolderId>,
        ordered: Vec<TableId>,
    },
    /// Reparent one table; `destination` is the full new destination group.
    MoveFile {
        table_id: TableId,
        from: Option<FolderId>,
        to: Option<FolderId>,
        destination: Vec<TableId>,
        /// Folder to expand so the moved file stays visible.
        expand: Option<FolderId>,
    },
    /// New order of one table's query list.
    Queries {
        table_id: TableId,
        ordered: Vec<QueryId>,
    },
}

impl ReorderPlan {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }
}

/// Resolves a sidebar drag (folders and files) against current model state.
pub fn resolve_drag(collection: &Collection, active: &DragItem, over: &DragItem) -> ReorderPlan {
    if active == over {
        return ReorderPlan::Noop;
    }

    match (active, over) {
        (DragItem::Folder(active_id), DragItem::Folder(over_id)) => {
            let ids = collection
                .folders()
                .into_iter()
                .map(|folder| folder.id.clone())
                .collect::<Vec<_>>();
            move_item(&ids, active_id, over_id).map_or(ReorderPlan::Noop, ReorderPlan::Folders)
        }
        (DragItem::File(active_id), DragItem::File(over_id)) => {
            resolve_file_over_file(collection, active_id, over_id)
        }
        (DragItem::File(active_id), DragItem::Folder(folder_id)) => {
            resolve_file_into_folder(collection, active_id, folder_id)
        }
        (DragItem::Folder(_), DragItem::File(_)) => ReorderPlan::Noop,
    }
}

/// Resolves a drag inside one table's query list.
pub fn resolve_query_drag(
    collection: &Collection,
    table_id: &TableId,
    active: &QueryId,
    over: &QueryId,
) -> ReorderPlan {
    if active == over {
        return ReorderPlan::Noop;
    }
    let ids = collection
        .queries_in(table_id)
        .into_iter()
        .map(|query| query.id.clone())
        .collect::<Vec<_>>();
    move_item(&ids, active, over).map_or(ReorderPlan::Noop, |ordered| ReorderPlan::Queries {
        table_id: table_id.clone(),
        ordered,
    })
}

fn resolve_file_over_file(
    collection: &Collection,
    active_id: &TableId,
    over_id: &TableId,
) -> ReorderPlan {
    let (Some(active), Some(over)) = (collection.table(active_id), collection.table(over_id))
    else {
        return ReorderPlan::Noop;
    };
    let from = collection.effective_parent(active);
    let to = collection.effective_parent(over);

    if from == to {
        let ids = sibling_ids(collection, from.as_ref());
        return move_item(&ids, active_id, over_id).map_or(ReorderPlan::Noop, |ordered| {
            ReorderPlan::FilesInGroup {
                parent: from,
                ordered,
            }
        });
    }

    let mut destination = sibling_ids(collection, to.as_ref());
    let Some(insert_at) = destination.iter().position(|id| id == over_id) else {
        return ReorderPlan::Noop;
    };
    destination.insert(insert_at, active_id.clone());
    ReorderPlan::MoveFile {
        table_id: active_id.clone(),
        from,
        to,
        destination,
        expand: None,
    }
}

fn resolve_file_into_folder(
    collection: &Collection,
    active_id: &TableId,
    folder_id: &FolderId,
) -> ReorderPlan {
    let (Some(active), Some(_)) = (collection.table(active_id), collection.folder(folder_id))
    else {
        return ReorderPlan::Noop;
    };
    let from = collection.effective_parent(active);
    let mut destination = sibling_ids(collection, Some(folder_id));
    destination.retain(|id| id != active_id);
    destination.insert(0, active_id.clone());
    ReorderPlan::MoveFile {
        table_id: active_id.clone(),
        from,
        to: Some(folder_id.clone()),
        destination,
        expand: Some(folder_id.clone()),
    }
}

fn sibling_ids(collection: &Collection, parent: Option<&FolderId>) -> Vec<TableId> {
    collection
        .tables_in(parent)
        .into_iter()
        .map(|table| table.id.clone())
        .collect()
}

/// Removes `active` and re-inserts it at `over`'s original index.
fn move_item<T: Clone + PartialEq>(items: &[T], active: &T, over: &T) -> Option<Vec<T>> {
    let from = items.iter().position(|item| item == active)?;
    let to = items.iter().position(|item| item == over)?;
    if from == to {
        return None;
    }
    let mut reordered = items.to_vec();
    let moved = reordered.remove(from);
    reordered.insert(to, moved);
    Some(reordered)
}
