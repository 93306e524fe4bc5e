//! Workspace entity records.
//!
//! # Invariants
//! - Identifiers are opaque strings; locally fabricated ones carry
//!   [`TEMP_ID_PREFIX`] until the gateway assigns a durable id.
//! - An entity is active exactly when `deleted_at` is `None`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Prefix of identifiers minted locally before the gateway confirms a create.
pub const TEMP_ID_PREFIX: &str = "tmp-";

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Mints a durable random id (used by gateway implementations).
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Mints a local placeholder id for an optimistic create.
            pub fn temporary() -> Self {
                Self(format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()))
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            pub fn is_temporary(&self) -> bool {
                self.0.starts_with(TEMP_ID_PREFIX)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Stable folder identifier.
    FolderId
);
entity_id!(
    /// Stable table (file) identifier.
    TableId
);
entity_id!(
    /// Stable query identifier.
    QueryId
);

/// Returns current wall-clock time as epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// Grouping node at the top level of the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub order_index: i64,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms tombstone. `None` means active.
    pub deleted_at: Option<i64>,
}

/// A "file" grouping saved queries; lives under a folder or at root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub table_name: String,
    pub schema_name: Option<String>,
    pub description: Option<String>,
    /// `None` means root ("uncategorized").
    pub folder_id: Option<FolderId>,
    pub order_index: i64,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

/// One saved SQL document inside a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub table_id: TableId,
    pub title: String,
    pub sql_code: String,
    pub related_link: Option<String>,
    pub order_index: i64,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

impl Folder {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl Table {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl Query {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Entity category, used for error reporting and trash grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Folder,
    Table,
    Query,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Table => "table",
            Self::Query => "query",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed reference to one entity of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Folder(FolderId),
    Table(TableId),
    Query(QueryId),
}

impl EntityRef {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Folder(_) => EntityKind::Folder,
            Self::Table(_) => EntityKind::Table,
            Self::Query(_) => EntityKind::Query,
        }
    }

    pub fn id_str(&self) -> &str {
        match self {
            Self::Folder(id) => id.as_str(),
            Self::Table(id) => id.as_str(),
            Self::Query(id) => id.as_str(),
        }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id_str())
    }
}
