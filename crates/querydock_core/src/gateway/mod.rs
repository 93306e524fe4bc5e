//! Remote persistence gateway contract.
//!
//! # Responsibility
//! - Define the durable-store operations the mutation engine depends on.
//! - Keep transport/storage details behind one trait boundary.
//!
//! # Invariants
//! - `list_*` calls return active rows only; tombstones appear in
//!   [`Gateway::list_trash`] exclusively.
//! - Every call is request/response; failures carry an opaque message.

use crate::db::DbError;
use crate::model::entity::{
    EntityKind, EntityRef, Folder, FolderId, Query, QueryId, Table, TableId,
};
use crate::search::{SearchHit, SearchRequest};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite;

pub use sqlite::SqliteGateway;

/// Result type used by gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced by gateway implementations.
#[derive(Debug)]
pub enum GatewayError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target row does not exist (or is not in the expected lifecycle state).
    NotFound { kind: EntityKind, id: String },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
    /// Remote side refused or failed the call.
    Rejected(String),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "gateway requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "gateway requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid workspace data: {message}"),
            Self::Rejected(message) => write!(f, "gateway call rejected: {message}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for GatewayError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Payload for creating a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTable {
    pub table_name: String,
    pub description: Option<String>,
    pub schema_name: Option<String>,
    pub folder_id: Option<FolderId>,
    pub order_index: i64,
}

/// Payload for creating a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuery {
    pub table_id: TableId,
    pub title: String,
    pub sql_code: String,
    pub related_link: Option<String>,
    pub order_index: i64,
}

/// Editable table fields (full replacement).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFields {
    pub table_name: String,
    pub description: Option<String>,
    pub schema_name: Option<String>,
}

/// Editable query fields (full replacement).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFields {
    pub title: String,
    pub sql_code: String,
    pub related_link: Option<String>,
}

/// Soft-deleted query plus the name of the table it belonged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashedQuery {
    pub query: Query,
    /// `None` when the parent table no longer exists.
    pub table_name: Option<String>,
}

/// Everything currently in the trash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrashListing {
    pub folders: Vec<Folder>,
    pub tables: Vec<Table>,
    pub queries: Vec<TrashedQuery>,
}

impl TrashListing {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.tables.is_empty() && self.queries.is_empty()
    }
}

/// Durable store consumed by the mutation engine.
pub trait Gateway {
    /// Lists active folders.
    fn list_folders(&self) -> GatewayResult<Vec<Folder>>;
    /// Lists active tables.
    fn list_tables(&self) -> GatewayResult<Vec<Table>>;
    /// Lists active queries of one table.
    fn list_queries(&self, table_id: &TableId) -> GatewayResult<Vec<Query>>;
    /// Lists soft-deleted rows of every kind.
    fn list_trash(&self) -> GatewayResult<TrashListing>;
    /// Substring search over active queries.
    fn search_queries(&self, request: &SearchRequest) -> GatewayResult<Vec<SearchHit>>;

    fn create_folder(&self, name: &str, order_index: i64) -> GatewayResult<Folder>;
    fn create_table(&self, draft: &NewTable) -> GatewayResult<Table>;
    fn create_query(&self, draft: &NewQuery) -> GatewayResult<Query>;

    fn rename_folder(&self, id: &FolderId, name: &str) -> GatewayResult<Folder>;
    fn update_table(&self, id: &TableId, fields: &TableFields) -> GatewayResult<Table>;
    fn update_query(&self, id: &QueryId, fields: &QueryFields) -> GatewayResult<Query>;

    /// Positional write for one folder.
    fn update_folder_order(&self, id: &FolderId, order_index: i64) -> GatewayResult<()>;
    /// Positional write (parent + index) for one table.
    fn update_table_location(
        &self,
        id: &TableId,
        folder_id: Option<&FolderId>,
        order_index: i64,
    ) -> GatewayResult<()>;
    /// Positional write for one query.
    fn update_query_order(&self, id: &QueryId, order_index: i64) -> GatewayResult<()>;

    /// Sets the `deleted_at` tombstone.
    fn soft_delete(&self, target: &EntityRef) -> GatewayResult<()>;
    /// Clears the `deleted_at` tombstone.
    fn restore(&self, target: &EntityRef) -> GatewayResult<()>;
    /// Removes the row permanently. Folder children move to root.
    fn hard_delete(&self, target: &EntityRef) -> GatewayResult<()>;
}
