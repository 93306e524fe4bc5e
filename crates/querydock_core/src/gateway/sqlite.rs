//! SQLite-backed reference gateway.
//!
//! # Responsibility
//! - Implement [`Gateway`] over a migrated workspace connection.
//! - Keep SQL details and ordering fallbacks inside the storage boundary.
//!
//! # Invariants
//! - Active listings are deterministic: `order_index ASC` with a per-kind
//!   tie-break, or `created_at ASC` when the ordering column is absent.
//! - A store lacking `order_index` degrades instead of failing: positions
//!   are derived from creation order and positional writes are skipped.
//! - Hard-deleting a folder moves its tables to root in the same transaction.

use crate::db::migrations::latest_version;
use crate::gateway::{
    Gateway, GatewayError, GatewayResult, NewQuery, NewTable, QueryFields, TableFields,
    TrashListing, TrashedQuery,
};
use crate::model::entity::{
    now_ms, EntityKind, EntityRef, Folder, FolderId, Query, QueryId, Table, TableId,
};
use crate::search::{like_pattern, SearchHit, SearchRequest};
use log::warn;
use rusqlite::{params, Connection, Params, Row, Transaction, TransactionBehavior};

/// Which entity tables carry an `order_index` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingSupport {
    pub folders: bool,
    pub tables: bool,
    pub queries: bool,
}

/// SQLite-backed gateway borrowing one migrated connection.
pub struct SqliteGateway<'conn> {
    conn: &'conn Connection,
    ordering: OrderingSupport,
}

impl<'conn> SqliteGateway<'conn> {
    /// Creates a gateway after verifying schema version and required tables.
    pub fn try_new(conn: &'conn Connection) -> GatewayResult<Self> {
        ensure_gateway_connection_ready(conn)?;
        let ordering = OrderingSupport {
            folders: table_has_column(conn, "folders", "order_index")?,
            tables: table_has_column(conn, "tables", "order_index")?,
            queries: table_has_column(conn, "queries", "order_index")?,
        };
        if !(ordering.folders && ordering.tables && ordering.queries) {
            warn!(
                "event=gateway_open module=gateway status=degraded folders_ordered={} tables_ordered={} queries_ordered={}",
                ordering.folders, ordering.tables, ordering.queries
            );
        }
        Ok(Self { conn, ordering })
    }

    /// Returns detected ordering support.
    pub fn ordering(&self) -> OrderingSupport {
        self.ordering
    }

    fn load_folder(&self, id: &FolderId) -> GatewayResult<Folder> {
        let sql = format!(
            "SELECT {} FROM folders WHERE id = ?1;",
            folder_columns("", self.ordering.folders)
        );
        query_rows(self.conn, &sql, [id.as_str()], parse_folder)?
            .pop()
            .ok_or_else(|| not_found(EntityKind::Folder, id.as_str()))
    }

    fn load_table(&self, id: &TableId) -> GatewayResult<Table> {
        let sql = format!(
            "SELECT {} FROM tables WHERE id = ?1;",
            table_columns("", self.ordering.tables)
        );
        query_rows(self.conn, &sql, [id.as_str()], parse_table)?
            .pop()
            .ok_or_else(|| not_found(EntityKind::Table, id.as_str()))
    }

    fn load_query(&self, id: &QueryId) -> GatewayResult<Query> {
        let sql = format!(
            "SELECT {} FROM queries WHERE id = ?1;",
            query_columns("", self.ordering.queries)
        );
        query_rows(self.conn, &sql, [id.as_str()], parse_query)?
            .pop()
            .ok_or_else(|| not_found(EntityKind::Query, id.as_str()))
    }

    fn skip_positional_write(&self, kind: EntityKind, id: &str) {
        warn!(
            "event=gateway_call module=gateway status=skipped op=update_order kind={kind} id={id} reason=missing_order_column"
        );
    }
}

impl Gateway for SqliteGateway<'_> {
    fn list_folders(&self) -> GatewayResult<Vec<Folder>> {
        let sql = format!(
            "SELECT {}
             FROM folders
             WHERE deleted_at IS NULL
             ORDER BY {};",
            folder_columns("", self.ordering.folders),
            if self.ordering.folders {
                "order_index ASC, name ASC, id ASC"
            } else {
                "created_at ASC, id ASC"
            }
        );
        query_rows(self.conn, &sql, [], parse_folder)
    }

    fn list_tables(&self) -> GatewayResult<Vec<Table>> {
        let sql = format!(
            "SELECT {}
             FROM tables
             WHERE deleted_at IS NULL
             ORDER BY {};",
            table_columns("", self.ordering.tables),
            if self.ordering.tables {
                "order_index ASC, created_at ASC, id ASC"
            } else {
                "created_at ASC, id ASC"
            }
        );
        query_rows(self.conn, &sql, [], parse_table)
    }

    fn list_queries(&self, table_id: &TableId) -> GatewayResult<Vec<Query>> {
        let sql = format!(
            "SELECT {}
             FROM queries
             WHERE table_id = ?1
               AND deleted_at IS NULL
             ORDER BY {};",
            query_columns("", self.ordering.queries),
            if self.ordering.queries {
                "order_index ASC, created_at ASC, id ASC"
            } else {
                "created_at ASC, id ASC"
            }
        );
        query_rows(self.conn, &sql, [table_id.as_str()], parse_query)
    }

    fn list_trash(&self) -> GatewayResult<TrashListing> {
        let folders_sql = format!(
            "SELECT {}
             FROM folders
             WHERE deleted_at IS NOT NULL
             ORDER BY deleted_at DESC, id ASC;",
            folder_columns("", self.ordering.folders)
        );
        let tables_sql = format!(
            "SELECT {}
             FROM tables
             WHERE deleted_at IS NOT NULL
             ORDER BY deleted_at DESC, id ASC;",
            table_columns("", self.ordering.tables)
        );
        let queries_sql = format!(
            "SELECT {}, t.table_name AS parent_table_name
             FROM queries q
             LEFT JOIN tables t ON t.id = q.table_id
             WHERE q.deleted_at IS NOT NULL
             ORDER BY q.deleted_at DESC, q.id ASC;",
            query_columns("q.", self.ordering.queries)
        );

        Ok(TrashListing {
            folders: query_rows(self.conn, &folders_sql, [], parse_folder)?,
            tables: query_rows(self.conn, &tables_sql, [], parse_table)?,
            queries: query_rows(self.conn, &queries_sql, [], |row, position| {
                Ok(TrashedQuery {
                    query: parse_query(row, position)?,
                    table_name: row.get("parent_table_name")?,
                })
            })?,
        })
    }

    fn search_queries(&self, request: &SearchRequest) -> GatewayResult<Vec<SearchHit>> {
        if request.limit == 0 || request.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {}, t.table_name AS parent_table_name, t.folder_id AS parent_folder_id
             FROM queries q
             INNER JOIN tables t ON t.id = q.table_id
             WHERE q.deleted_at IS NULL
               AND t.deleted_at IS NULL
               AND (q.title LIKE ?1 ESCAPE '\\' OR q.sql_code LIKE ?1 ESCAPE '\\')
             ORDER BY q.created_at DESC, q.id ASC
             LIMIT ?2;",
            query_columns("q.", self.ordering.queries)
        );
        let pattern = like_pattern(request.text.trim());
        query_rows(
            self.conn,
            &sql,
            params![pattern, i64::from(request.limit)],
            |row, position| {
                Ok(SearchHit::new(
                    parse_query(row, position)?,
                    row.get("parent_table_name")?,
                    row.get::<_, Option<String>>("parent_folder_id")?
                        .map(FolderId::from),
                    &request.text,
                ))
            },
        )
    }

    fn create_folder(&self, name: &str, order_index: i64) -> GatewayResult<Folder> {
        let id = FolderId::generate();
        let created_at = now_ms();
        if self.ordering.folders {
            self.conn.execute(
                "INSERT INTO folders (id, name, order_index, created_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, NULL);",
                params![id.as_str(), name, order_index, created_at],
            )?;
        } else {
            self.conn.execute(
                "INSERT INTO folders (id, name, created_at, deleted_at)
                 VALUES (?1, ?2, ?3, NULL);",
                params![id.as_str(), name, created_at],
            )?;
        }
        let mut folder = self.load_folder(&id)?;
        if !self.ordering.folders {
            folder.order_index = order_index;
        }
        Ok(folder)
    }

    fn create_table(&self, draft: &NewTable) -> GatewayResult<Table> {
        let id = TableId::generate();
        let created_at = now_ms();
        let folder_id = draft.folder_id.as_ref().map(FolderId::as_str);
        if self.ordering.tables {
            self.conn.execute(
                "INSERT INTO tables (
                    id, table_name, schema_name, description, folder_id,
                    order_index, created_at, deleted_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL);",
                params![
                    id.as_str(),
                    draft.table_name,
                    draft.schema_name,
                    draft.description,
                    folder_id,
                    draft.order_index,
                    created_at,
                ],
            )?;
        } else {
            self.conn.execute(
                "INSERT INTO tables (
                    id, table_name, schema_name, description, folder_id,
                    created_at, deleted_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL);",
                params![
                    id.as_str(),
                    draft.table_name,
                    draft.schema_name,
                    draft.description,
                    folder_id,
                    created_at,
                ],
            )?;
        }
        let mut table = self.load_table(&id)?;
        if !self.ordering.tables {
            table.order_index = draft.order_index;
        }
        Ok(table)
    }

    fn create_query(&self, draft: &NewQuery) -> GatewayResult<Query> {
        let id = QueryId::generate();
        let created_at = now_ms();
        if self.ordering.queries {
            self.conn.execute(
                "INSERT INTO queries (
                    id, table_id, title, sql_code, related_link,
                    order_index, created_at, deleted_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL);",
                params![
                    id.as_str(),
                    draft.table_id.as_str(),
                    draft.title,
                    draft.sql_code,
                    draft.related_link,
                    draft.order_index,
                    created_at,
                ],
            )?;
        } else {
            self.conn.execute(
                "INSERT INTO queries (
                    id, table_id, title, sql_code, related_link,
                    created_at, deleted_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL);",
                params![
                    id.as_str(),
                    draft.table_id.as_str(),
                    draft.title,
                    draft.sql_code,
                    draft.related_link,
                    created_at,
                ],
            )?;
        }
        let mut query = self.load_query(&id)?;
        if !self.ordering.queries {
            query.order_index = draft.order_index;
        }
        Ok(query)
    }

    fn rename_folder(&self, id: &FolderId, name: &str) -> GatewayResult<Folder> {
        let changed = self.conn.execute(
            "UPDATE folders
             SET name = ?2
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![id.as_str(), name],
        )?;
        if changed == 0 {
            return Err(not_found(EntityKind::Folder, id.as_str()));
        }
        self.load_folder(id)
    }

    fn update_table(&self, id: &TableId, fields: &TableFields) -> GatewayResult<Table> {
        let changed = self.conn.execute(
            "UPDATE tables
             SET table_name = ?2,
                 description = ?3,
                 schema_name = ?4
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![
                id.as_str(),
                fields.table_name,
                fields.description,
                fields.schema_name,
            ],
        )?;
        if changed == 0 {
            return Err(not_found(EntityKind::Table, id.as_str()));
        }
        self.load_table(id)
    }

    fn update_query(&self, id: &QueryId, fields: &QueryFields) -> GatewayResult<Query> {
        let changed = self.conn.execute(
            "UPDATE queries
             SET title = ?2,
                 sql_code = ?3,
                 related_link = ?4
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![
                id.as_str(),
                fields.title,
                fields.sql_code,
                fields.related_link,
            ],
        )?;
        if changed == 0 {
            return Err(not_found(EntityKind::Query, id.as_str()));
        }
        self.load_query(id)
    }

    fn update_folder_order(&self, id: &FolderId, order_index: i64) -> GatewayResult<()> {
        if !self.ordering.folders {
            self.skip_positional_write(EntityKind::Folder, id.as_str());
            return Ok(());
        }
        let changed = self.conn.execute(
            "UPDATE folders
             SET order_index = ?2
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![id.as_str(), order_index],
        )?;
        if changed == 0 {
            return Err(not_found(EntityKind::Folder, id.as_str()));
        }
        Ok(())
    }

    fn update_table_location(
        &self,
        id: &TableId,
        folder_id: Option<&FolderId>,
        order_index: i64,
    ) -> GatewayResult<()> {
        let folder_id = folder_id.map(FolderId::as_str);
        let changed = if self.ordering.tables {
            self.conn.execute(
                "UPDATE tables
                 SET folder_id = ?2,
                     order_index = ?3
                 WHERE id = ?1
                   AND deleted_at IS NULL;",
                params![id.as_str(), folder_id, order_index],
            )?
        } else {
            self.skip_positional_write(EntityKind::Table, id.as_str());
            self.conn.execute(
                "UPDATE tables
                 SET folder_id = ?2
                 WHERE id = ?1
                   AND deleted_at IS NULL;",
                params![id.as_str(), folder_id],
            )?
        };
        if changed == 0 {
            return Err(not_found(EntityKind::Table, id.as_str()));
        }
        Ok(())
    }

    fn update_query_order(&self, id: &QueryId, order_index: i64) -> GatewayResult<()> {
        if !self.ordering.queries {
            self.skip_positional_write(EntityKind::Query, id.as_str());
            return Ok(());
        }
        let changed = self.conn.execute(
            "UPDATE queries
             SET order_index = ?2
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![id.as_str(), order_index],
        )?;
        if changed == 0 {
            return Err(not_found(EntityKind::Query, id.as_str()));
        }
        Ok(())
    }

    fn soft_delete(&self, target: &EntityRef) -> GatewayResult<()> {
        let sql = format!(
            "UPDATE {}
             SET deleted_at = ?2
             WHERE id = ?1
               AND deleted_at IS NULL;",
            entity_table(target.kind())
        );
        let changed = self
            .conn
            .execute(&sql, params![target.id_str(), now_ms()])?;
        if changed == 0 {
            return Err(not_found(target.kind(), target.id_str()));
        }
        Ok(())
    }

    fn restore(&self, target: &EntityRef) -> GatewayResult<()> {
        let sql = format!(
            "UPDATE {}
             SET deleted_at = NULL
             WHERE id = ?1
               AND deleted_at IS NOT NULL;",
            entity_table(target.kind())
        );
        let changed = self.conn.execute(&sql, [target.id_str()])?;
        if changed == 0 {
            return Err(not_found(target.kind(), target.id_str()));
        }
        Ok(())
    }

    fn hard_delete(&self, target: &EntityRef) -> GatewayResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let trashed_sql = format!(
            "SELECT EXISTS(
                SELECT 1 FROM {} WHERE id = ?1 AND deleted_at IS NOT NULL
             );",
            entity_table(target.kind())
        );
        let trashed: bool = tx.query_row(&trashed_sql, [target.id_str()], |row| row.get(0))?;
        if !trashed {
            // Active rows only leave through the trash.
            return Err(not_found(target.kind(), target.id_str()));
        }

        match target {
            EntityRef::Folder(id) => {
                tx.execute(
                    "UPDATE tables SET folder_id = NULL WHERE folder_id = ?1;",
                    [id.as_str()],
                )?;
                tx.execute(
                    "DELETE FROM folders WHERE id = ?1 AND deleted_at IS NOT NULL;",
                    [id.as_str()],
                )?;
            }
            EntityRef::Table(id) => {
                tx.execute("DELETE FROM queries WHERE table_id = ?1;", [id.as_str()])?;
                tx.execute(
                    "DELETE FROM tables WHERE id = ?1 AND deleted_at IS NOT NULL;",
                    [id.as_str()],
                )?;
            }
            EntityRef::Query(id) => {
                tx.execute(
                    "DELETE FROM queries WHERE id = ?1 AND deleted_at IS NOT NULL;",
                    [id.as_str()],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn entity_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Folder => "folders",
        EntityKind::Table => "tables",
        EntityKind::Query => "queries",
    }
}

fn order_expr(prefix: &str, ordered: bool) -> String {
    if ordered {
        format!("{prefix}order_index")
    } else {
        "NULL".to_string()
    }
}

fn folder_columns(prefix: &str, ordered: bool) -> String {
    format!(
        "{prefix}id AS id, {prefix}name AS name, {} AS order_index, \
         {prefix}created_at AS created_at, {prefix}deleted_at AS deleted_at",
        order_expr(prefix, ordered)
    )
}

fn table_columns(prefix: &str, ordered: bool) -> String {
    format!(
        "{prefix}id AS id, {prefix}table_name AS table_name, {prefix}schema_name AS schema_name, \
         {prefix}description AS description, {prefix}folder_id AS folder_id, {} AS order_index, \
         {prefix}created_at AS created_at, {prefix}deleted_at AS deleted_at",
        order_expr(prefix, ordered)
    )
}

fn query_columns(prefix: &str, ordered: bool) -> String {
    format!(
        "{prefix}id AS id, {prefix}table_id AS table_id, {prefix}title AS title, \
         {prefix}sql_code AS sql_code, {prefix}related_link AS related_link, {} AS order_index, \
         {prefix}created_at AS created_at, {prefix}deleted_at AS deleted_at",
        order_expr(prefix, ordered)
    )
}

fn query_rows<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    parse: impl Fn(&Row<'_>, i64) -> GatewayResult<T>,
) -> GatewayResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        let position = items.len() as i64;
        items.push(parse(row, position)?);
    }
    Ok(items)
}

/// `position` stands in for `order_index` when the column is absent.
fn parse_folder(row: &Row<'_>, position: i64) -> GatewayResult<Folder> {
    Ok(Folder {
        id: FolderId::from(row.get::<_, String>("id")?),
        name: row.get("name")?,
        order_index: row
            .get::<_, Option<i64>>("order_index")?
            .unwrap_or(position),
        created_at: row.get("created_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn parse_table(row: &Row<'_>, position: i64) -> GatewayResult<Table> {
    let table_name: String = row.get("table_name")?;
    if table_name.trim().is_empty() {
        return Err(GatewayError::InvalidData(
            "blank value in tables.table_name".to_string(),
        ));
    }
    Ok(Table {
        id: TableId::from(row.get::<_, String>("id")?),
        table_name,
        schema_name: row.get("schema_name")?,
        description: row.get("description")?,
        folder_id: row
            .get::<_, Option<String>>("folder_id")?
            .map(FolderId::from),
        order_index: row
            .get::<_, Option<i64>>("order_index")?
            .unwrap_or(position),
        created_at: row.get("created_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn parse_query(row: &Row<'_>, position: i64) -> GatewayResult<Query> {
    Ok(Query {
        id: QueryId::from(row.get::<_, String>("id")?),
        table_id: TableId::from(row.get::<_, String>("table_id")?),
        title: row.get("title")?,
        sql_code: row.get("sql_code")?,
        related_link: row.get("related_link")?,
        order_index: row
            .get::<_, Option<i64>>("order_index")?
            .unwrap_or(position),
        created_at: row.get("created_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn not_found(kind: EntityKind, id: &str) -> GatewayError {
    GatewayError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn ensure_gateway_connection_ready(conn: &Connection) -> GatewayResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(GatewayError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["folders", "tables", "queries"] {
        if !table_exists(conn, table)? {
            return Err(GatewayError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> GatewayResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> GatewayResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
