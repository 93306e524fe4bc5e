use querydock_core::db::open_db_in_memory;
use querydock_core::gateway::{
    GatewayResult, NewQuery, NewTable, QueryFields, TableFields, TrashListing,
};
use querydock_core::search::{SearchHit, SearchRequest};
use querydock_core::service::mutation::{MutationKind, RemoteOp};
use querydock_core::{
    Actor, AllowList, DragItem, EntityRef, Folder, FolderId, Gateway, GatewayError,
    MutationEngine, MutationError, Query, QueryId, Settlement, SqliteGateway, Table, TableId,
};
use rusqlite::Connection;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

/// SQLite gateway that records every call and fails the ones it is told to.
struct FlakyGateway<'conn> {
    inner: SqliteGateway<'conn>,
    failing: RefCell<HashSet<&'static str>>,
    calls: RefCell<Vec<&'static str>>,
}

impl<'conn> FlakyGateway<'conn> {
    fn new(conn: &'conn Connection) -> Self {
        Self {
            inner: SqliteGateway::try_new(conn).unwrap(),
            failing: RefCell::new(HashSet::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn fail(&self, op: &'static str) {
        self.failing.borrow_mut().insert(op);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    fn reset_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn call(&self, op: &'static str) -> GatewayResult<()> {
        self.calls.borrow_mut().push(op);
        if self.failing.borrow().contains(op) {
            return Err(GatewayError::Rejected(format!("injected failure in {op}")));
        }
        Ok(())
    }
}

impl Gateway for FlakyGateway<'_> {
    fn list_folders(&self) -> GatewayResult<Vec<Folder>> {
        self.call("list_folders")?;
        self.inner.list_folders()
    }

    fn list_tables(&self) -> GatewayResult<Vec<Table>> {
        self.call("list_tables")?;
        self.inner.list_tables()
    }

    fn list_queries(&self, table_id: &TableId) -> GatewayResult<Vec<Query>> {
        self.call("list_queries")?;
        self.inner.list_queries(table_id)
    }

    fn list_trash(&self) -> GatewayResult<TrashListing> {
        self.call("list_trash")?;
        self.inner.list_trash()
    }

    fn search_queries(&self, request: &SearchRequest) -> GatewayResult<Vec<SearchHit>> {
        self.call("search_queries")?;
        self.inner.search_queries(request)
    }

    fn create_folder(&self, name: &str, order_index: i64) -> GatewayResult<Folder> {
        self.call("create_folder")?;
        self.inner.create_folder(name, order_index)
    }

    fn create_table(&self, draft: &NewTable) -> GatewayResult<Table> {
        self.call("create_table")?;
        self.inner.create_table(draft)
    }

    fn create_query(&self, draft: &NewQuery) -> GatewayResult<Query> {
        self.call("create_query")?;
        self.inner.create_query(draft)
    }

    fn rename_folder(&self, id: &FolderId, name: &str) -> GatewayResult<Folder> {
        self.call("rename_folder")?;
        self.inner.rename_folder(id, name)
    }

    fn update_table(&self, id: &TableId, fields: &TableFields) -> GatewayResult<Table> {
        self.call("update_table")?;
        self.inner.update_table(id, fields)
    }

    fn update_query(&self, id: &QueryId, fields: &QueryFields) -> GatewayResult<Query> {
        self.call("update_query")?;
        self.inner.update_query(id, fields)
    }

    fn update_folder_order(&self, id: &FolderId, order_index: i64) -> GatewayResult<()> {
        self.call("update_folder_order")?;
        self.inner.update_folder_order(id, order_index)
    }

    fn update_table_location(
        &self,
        id: &TableId,
        folder_id: Option<&FolderId>,
        order_index: i64,
    ) -> GatewayResult<()> {
        self.call("update_table_location")?;
        self.inner.update_table_location(id, folder_id, order_index)
    }

    fn update_query_order(&self, id: &QueryId, order_index: i64) -> GatewayResult<()> {
        self.call("update_query_order")?;
        self.inner.update_query_order(id, order_index)
    }

    fn soft_delete(&self, target: &EntityRef) -> GatewayResult<()> {
        self.call("soft_delete")?;
        self.inner.soft_delete(target)
    }

    fn restore(&self, target: &EntityRef) -> GatewayResult<()> {
        self.call("restore")?;
        self.inner.restore(target)
    }

    fn hard_delete(&self, target: &EntityRef) -> GatewayResult<()> {
        self.call("hard_delete")?;
        self.inner.hard_delete(target)
    }
}

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn actor() -> Actor {
    Actor::new("dev@example.com")
}

fn seed(conn: &Connection) -> SqliteGateway<'_> {
    SqliteGateway::try_new(conn).unwrap()
}

fn engine(conn: &Connection) -> MutationEngine<FlakyGateway<'_>> {
    let mut engine = MutationEngine::new(FlakyGateway::new(conn), AllowList::Open);
    engine.load().unwrap();
    engine.gateway().reset_calls();
    engine
}

fn new_table(name: &str, folder_id: Option<&FolderId>, order_index: i64) -> NewTable {
    NewTable {
        table_name: name.to_string(),
        description: None,
        schema_name: None,
        folder_id: folder_id.cloned(),
        order_index,
    }
}

fn seed_query(
    gateway: &SqliteGateway<'_>,
    table_id: &TableId,
    title: &str,
    order_index: i64,
) -> QueryId {
    gateway
        .create_query(&NewQuery {
            table_id: table_id.clone(),
            title: title.to_string(),
            sql_code: format!("SELECT '{title}'"),
            related_link: None,
            order_index,
        })
        .unwrap()
        .id
}

fn table_named(engine: &MutationEngine<FlakyGateway<'_>>, name: &str) -> Table {
    engine
        .collection()
        .all_tables()
        .find(|table| table.table_name == name)
        .cloned()
        .unwrap()
}

fn model_group(
    engine: &MutationEngine<FlakyGateway<'_>>,
    parent: Option<&FolderId>,
) -> Vec<TableId> {
    engine
        .collection()
        .tables_in(parent)
        .into_iter()
        .map(|table| table.id.clone())
        .collect()
}

fn persisted_group(conn: &Connection, parent: Option<&FolderId>) -> Vec<TableId> {
    seed(conn)
        .list_tables()
        .unwrap()
        .into_iter()
        .filter(|table| table.folder_id.as_ref() == parent)
        .map(|table| table.id)
        .collect()
}

fn persisted_table(conn: &Connection, id: &TableId) -> Table {
    seed(conn)
        .list_tables()
        .unwrap()
        .into_iter()
        .find(|table| &table.id == id)
        .unwrap()
}

#[test]
fn creating_files_in_a_folder_then_dragging_swaps_their_order() {
    let conn = setup();
    let mut engine = engine(&conn);

    engine.create_folder(&actor(), "Reports").unwrap();
    assert!(engine.flush().all_confirmed());
    let reports = engine.collection().folders()[0].clone();
    assert!(!reports.id.is_temporary());
    assert_eq!(reports.order_index, 0);

    engine
        .create_table(&actor(), new_table("t1", Some(&reports.id), 99))
        .unwrap();
    engine
        .create_table(&actor(), new_table("t2", Some(&reports.id), 99))
        .unwrap();
    assert!(engine.flush().all_confirmed());
    let t1 = table_named(&engine, "t1");
    let t2 = table_named(&engine, "t2");
    assert_eq!((t1.order_index, t2.order_index), (0, 1));

    let ticket = engine
        .drag(&actor(), &DragItem::File(t2.id.clone()), &DragItem::File(t1.id.clone()))
        .unwrap();
    assert!(ticket.is_some());
    assert_eq!(model_group(&engine, Some(&reports.id)), vec![t2.id.clone(), t1.id.clone()]);

    assert!(engine.flush().all_confirmed());
    assert_eq!(persisted_table(&conn, &t1.id).order_index, 1);
    assert_eq!(persisted_table(&conn, &t2.id).order_index, 0);
}

#[test]
fn dropping_root_file_on_folder_reparents_and_expands() {
    let conn = setup();
    let gateway = seed(&conn);
    let reports = gateway.create_folder("Reports", 0).unwrap();
    let t3 = gateway.create_table(&new_table("t3", None, 0)).unwrap();
    let t4 = gateway.create_table(&new_table("t4", None, 1)).unwrap();
    let mut engine = engine(&conn);

    engine
        .drag(&actor(), &DragItem::File(t3.id.clone()), &DragItem::Folder(reports.id.clone()))
        .unwrap();

    assert!(engine.selection().is_expanded(&reports.id));
    assert_eq!(model_group(&engine, Some(&reports.id)), vec![t3.id.clone()]);
    assert_eq!(engine.collection().table(&t4.id).unwrap().order_index, 1);

    assert!(engine.flush().all_confirmed());
    let stored_t3 = persisted_table(&conn, &t3.id);
    let stored_t4 = persisted_table(&conn, &t4.id);
    assert_eq!(stored_t3.folder_id, Some(reports.id.clone()));
    assert_eq!(stored_t3.order_index, 0);
    assert_eq!(stored_t4.folder_id, None);
    assert_eq!(stored_t4.order_index, 1);
    assert_eq!(engine.gateway().calls(), vec!["update_table_location"]);
}

#[test]
fn persisted_order_matches_model_after_many_reorders() {
    let conn = setup();
    let gateway = seed(&conn);
    let a = gateway.create_folder("a", 0).unwrap().id;
    let b = gateway.create_folder("b", 1).unwrap().id;
    let c = gateway.create_folder("c", 2).unwrap().id;
    let d = gateway.create_folder("d", 3).unwrap().id;
    let t1 = gateway.create_table(&new_table("t1", Some(&a), 0)).unwrap().id;
    let t2 = gateway.create_table(&new_table("t2", Some(&a), 1)).unwrap().id;
    let t3 = gateway.create_table(&new_table("t3", Some(&a), 2)).unwrap().id;
    gateway.create_table(&new_table("r1", None, 0)).unwrap();
    let r2 = gateway.create_table(&new_table("r2", None, 1)).unwrap().id;
    let q1 = seed_query(&gateway, &t1, "q1", 0);
    seed_query(&gateway, &t1, "q2", 1);
    let q3 = seed_query(&gateway, &t1, "q3", 2);

    let mut engine = engine(&conn);
    engine.load_queries(&t1).unwrap();

    let drags = [
        (DragItem::Folder(d.clone()), DragItem::Folder(a.clone())),
        (DragItem::Folder(b.clone()), DragItem::Folder(c.clone())),
        (DragItem::File(t3.clone()), DragItem::File(t1.clone())),
        (DragItem::File(r2.clone()), DragItem::File(t2.clone())),
        (DragItem::File(t1.clone()), DragItem::Folder(d.clone())),
    ];
    for (active, over) in &drags {
        assert!(engine.drag(&actor(), active, over).unwrap().is_some());
    }
    engine.drag_query(&actor(), &t1, &q3, &q1).unwrap();

    let report = engine.flush();
    assert!(report.all_confirmed());
    assert!(!report.resynced);

    let model_folders = engine
        .collection()
        .folders()
        .into_iter()
        .map(|folder| folder.id.clone())
        .collect::<Vec<_>>();
    assert_eq!(model_folders, vec![d.clone(), a.clone(), c.clone(), b.clone()]);

    let parents = [None, Some(&a), Some(&b), Some(&c), Some(&d)];
    let before = parents
        .iter()
        .map(|parent| model_group(&engine, *parent))
        .collect::<Vec<_>>();
    for (parent, model) in parents.iter().zip(&before) {
        assert_eq!(&persisted_group(&conn, *parent), model);
    }
    let model_queries = engine
        .collection()
        .queries_in(&t1)
        .into_iter()
        .map(|query| query.id.clone())
        .collect::<Vec<_>>();

    engine.resync().unwrap();

    let persisted_folders = engine
        .collection()
        .folders()
        .into_iter()
        .map(|folder| folder.id.clone())
        .collect::<Vec<_>>();
    assert_eq!(persisted_folders, model_folders);
    let after = parents
        .iter()
        .map(|parent| model_group(&engine, *parent))
        .collect::<Vec<_>>();
    assert_eq!(after, before);
    let persisted_queries = seed(&conn)
        .list_queries(&t1)
        .unwrap()
        .into_iter()
        .map(|query| query.id)
        .collect::<Vec<_>>();
    assert_eq!(persisted_queries, model_queries);
    assert_eq!(persisted_queries[0], q3);
}

#[test]
fn dragging_onto_itself_changes_nothing() {
    let conn = setup();
    let gateway = seed(&conn);
    let folder = gateway.create_folder("Reports", 0).unwrap();
    let table = gateway.create_table(&new_table("t1", None, 0)).unwrap();
    let mut engine = engine(&conn);
    let before = engine.collection().clone();

    let same_file = DragItem::File(table.id.clone());
    let same_folder = DragItem::Folder(folder.id.clone());
    assert_eq!(engine.drag(&actor(), &same_file, &same_file).unwrap(), None);
    assert_eq!(engine.drag(&actor(), &same_folder, &same_folder).unwrap(), None);
    assert_eq!(engine.drag(&actor(), &same_folder, &same_file).unwrap(), None);

    assert_eq!(engine.collection(), &before);
    assert_eq!(engine.pending_count(), 0);
    assert!(engine.flush().settled.is_empty());
    assert!(engine.gateway().calls().is_empty());
}

#[test]
fn cross_parent_move_changes_only_the_moved_file_parent() {
    let conn = setup();
    let gateway = seed(&conn);
    let f1 = gateway.create_folder("F1", 0).unwrap();
    let f2 = gateway.create_folder("F2", 1).unwrap();
    let a = gateway.create_table(&new_table("a", Some(&f1.id), 0)).unwrap();
    let c = gateway.create_table(&new_table("c", Some(&f1.id), 1)).unwrap();
    let b = gateway.create_table(&new_table("b", Some(&f2.id), 0)).unwrap();
    let d = gateway.create_table(&new_table("d", Some(&f2.id), 1)).unwrap();
    gateway.create_table(&new_table("r", None, 0)).unwrap();
    let parents_before = seed(&conn)
        .list_tables()
        .unwrap()
        .into_iter()
        .map(|table| (table.id, table.folder_id))
        .collect::<BTreeMap<_, _>>();
    let folders_before = seed(&conn).list_folders().unwrap();

    let mut engine = engine(&conn);
    engine
        .drag(&actor(), &DragItem::File(a.id.clone()), &DragItem::File(d.id.clone()))
        .unwrap();
    assert!(engine.flush().all_confirmed());

    let parents_after = seed(&conn)
        .list_tables()
        .unwrap()
        .into_iter()
        .map(|table| (table.id, table.folder_id))
        .collect::<BTreeMap<_, _>>();
    for (id, parent) in &parents_after {
        if id == &a.id {
            assert_eq!(parent, &Some(f2.id.clone()));
        } else {
            assert_eq!(parent, &parents_before[id]);
        }
    }
    assert_eq!(seed(&conn).list_folders().unwrap(), folders_before);
    assert_eq!(
        persisted_group(&conn, Some(&f2.id)),
        vec![b.id.clone(), a.id.clone(), d.id.clone()]
    );
    assert_eq!(persisted_table(&conn, &c.id).order_index, 1);
}

#[test]
fn failed_reorder_snaps_back_to_durable_order() {
    let conn = setup();
    let gateway = seed(&conn);
    let reports = gateway.create_folder("Reports", 0).unwrap();
    let t1 = gateway.create_table(&new_table("t1", Some(&reports.id), 0)).unwrap();
    let t2 = gateway.create_table(&new_table("t2", Some(&reports.id), 1)).unwrap();
    let mut engine = engine(&conn);
    engine.gateway().fail("update_table_location");

    engine
        .drag(&actor(), &DragItem::File(t2.id.clone()), &DragItem::File(t1.id.clone()))
        .unwrap();
    assert_eq!(model_group(&engine, Some(&reports.id)), vec![t2.id.clone(), t1.id.clone()]);

    let report = engine.flush();
    assert!(report.resynced);
    assert_eq!(report.settled.len(), 1);
    assert_eq!(report.settled[0].kind, MutationKind::Reorder);
    assert!(report.settled[0].settlement.needs_resync());
    assert!(report.settled[0].alert.is_none());
    assert_eq!(model_group(&engine, Some(&reports.id)), vec![t1.id.clone(), t2.id.clone()]);
    assert_eq!(persisted_group(&conn, Some(&reports.id)), vec![t1.id, t2.id]);
}

#[test]
fn settle_next_resyncs_immediately_on_failure() {
    let conn = setup();
    let gateway = seed(&conn);
    let a = gateway.create_folder("a", 0).unwrap();
    let b = gateway.create_folder("b", 1).unwrap();
    let mut engine = engine(&conn);
    engine.gateway().fail("update_folder_order");

    engine
        .drag(&actor(), &DragItem::Folder(b.id.clone()), &DragItem::Folder(a.id.clone()))
        .unwrap();
    assert_eq!(engine.collection().folders()[0].id, b.id);
    assert_eq!(engine.pending_count(), 1);

    let settled = engine.settle_next().unwrap();
    match settled.settlement {
        Settlement::NeedsResync { reason } => assert!(reason.contains("injected failure")),
        Settlement::Confirmed => panic!("injected failure must not confirm"),
    }
    assert_eq!(engine.pending_count(), 0);
    assert_eq!(engine.collection().folders()[0].id, a.id);
    assert!(!engine.is_stale());
}

#[test]
fn settle_next_defers_resync_until_queued_mutations_settle() {
    let conn = setup();
    let folder = seed(&conn).create_folder("Reports", 0).unwrap();
    let mut engine = engine(&conn);
    engine.gateway().fail("rename_folder");

    engine.rename_folder(&actor(), &folder.id, "Finance").unwrap();
    let scratch = engine.create_folder(&actor(), "Scratch").unwrap();
    assert!(scratch.is_temporary());
    assert_eq!(engine.pending_count(), 2);

    let first = engine.settle_next().unwrap();
    assert!(first.settlement.needs_resync());
    assert!(!first.resynced);
    assert!(engine.is_resync_owed());
    assert!(!engine.gateway().calls().contains(&"list_folders"));

    let second = engine.settle_next().unwrap();
    assert_eq!(second.settlement, Settlement::Confirmed);
    assert!(second.resynced);
    assert!(second.resync_error.is_none());
    assert!(!engine.is_resync_owed());
    assert!(!engine.is_stale());

    let durable = seed(&conn).list_folders().unwrap();
    assert_eq!(durable.len(), 2);
    assert_eq!(
        engine.collection().folders(),
        durable.iter().collect::<Vec<_>>()
    );
    let names = engine
        .collection()
        .folders()
        .iter()
        .map(|folder| folder.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Reports", "Scratch"]);
}

#[test]
fn settle_next_reports_a_failed_resync() {
    let conn = setup();
    let folder = seed(&conn).create_folder("Reports", 0).unwrap();
    let mut engine = engine(&conn);
    engine.gateway().fail("rename_folder");
    engine.gateway().fail("list_folders");

    engine.rename_folder(&actor(), &folder.id, "Finance").unwrap();
    let settled = engine.settle_next().unwrap();

    assert!(settled.settlement.needs_resync());
    assert!(!settled.resynced);
    assert!(settled
        .resync_error
        .as_deref()
        .is_some_and(|err| err.contains("injected failure in list_folders")));
    assert!(engine.is_stale());
    assert!(engine.is_resync_owed());
}

#[test]
fn hard_delete_refuses_active_entities() {
    let conn = setup();
    let gateway = seed(&conn);
    let folder = gateway.create_folder("Reports", 0).unwrap();
    let table = gateway
        .create_table(&new_table("users", Some(&folder.id), 0))
        .unwrap();
    let mut engine = engine(&conn);

    for target in [
        EntityRef::Folder(folder.id.clone()),
        EntityRef::Table(table.id.clone()),
    ] {
        let err = engine.hard_delete(&actor(), target.clone()).unwrap_err();
        assert!(matches!(err, MutationError::NotInTrash(ref refused) if refused == &target));
    }
    assert_eq!(engine.pending_count(), 0);
    assert!(engine.collection().folder(&folder.id).is_some());
    assert!(engine.collection().table(&table.id).is_some());
    assert!(engine.gateway().calls().is_empty());
}

#[test]
fn failed_rename_raises_alert_and_restores_name() {
    let conn = setup();
    let folder = seed(&conn).create_folder("Reports", 0).unwrap();
    let mut engine = engine(&conn);
    engine.gateway().fail("rename_folder");

    engine.rename_folder(&actor(), &folder.id, "  Finance ").unwrap();
    assert_eq!(engine.collection().folder(&folder.id).unwrap().name, "Finance");

    let report = engine.flush();
    let alerts = report.alerts().collect::<Vec<_>>();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].starts_with("rename_folder failed"));
    assert_eq!(engine.collection().folder(&folder.id).unwrap().name, "Reports");
}

#[test]
fn failed_create_drops_dependent_calls_and_local_entities() {
    let conn = setup();
    let mut engine = engine(&conn);
    engine.gateway().fail("create_folder");

    let folder_id = engine.create_folder(&actor(), "Scratch").unwrap();
    assert!(folder_id.is_temporary());
    engine
        .create_table(&actor(), new_table("draft", Some(&folder_id), 0))
        .unwrap();
    assert_eq!(engine.collection().tables_in(Some(&folder_id)).len(), 1);

    let report = engine.flush();
    assert_eq!(report.settled.len(), 2);
    match &report.settled[1].settlement {
        Settlement::NeedsResync { reason } => assert!(reason.contains("unresolved local id")),
        Settlement::Confirmed => panic!("dependent create must not confirm"),
    }
    assert!(report.resynced);
    assert!(engine.collection().folders().is_empty());
    assert_eq!(engine.collection().all_tables().count(), 0);
    assert!(!engine.gateway().calls().contains(&"create_table"));
}

#[test]
fn local_ids_are_reconciled_across_queued_creates() {
    let conn = setup();
    let mut engine = engine(&conn);

    let folder_id = engine.create_folder(&actor(), "Reports").unwrap();
    let table_id = engine
        .create_table(&actor(), new_table("users", Some(&folder_id), 0))
        .unwrap();
    let query_id = engine
        .create_query(&actor(), &table_id, "Active", "SELECT 1", Some("  "))
        .unwrap();
    engine.selection_mut().select_table(Some(table_id.clone()));
    engine.selection_mut().set_target_query(Some(query_id));
    engine.selection_mut().open_folder(folder_id);

    assert!(engine.flush().all_confirmed());

    let folder = engine.collection().folders()[0].clone();
    assert!(!folder.id.is_temporary());
    let table = engine.collection().tables_in(Some(&folder.id))[0].clone();
    assert!(!table.id.is_temporary());
    let query = engine.collection().queries_in(&table.id)[0].clone();
    assert!(!query.id.is_temporary());
    assert_eq!(query.table_id, table.id);
    assert_eq!(query.related_link, None);

    assert_eq!(engine.selection().selected_table_id(), Some(&table.id));
    assert_eq!(engine.selection().target_query_id(), Some(&query.id));
    assert!(engine.selection().is_expanded(&folder.id));
    assert_eq!(persisted_table(&conn, &table.id).folder_id, Some(folder.id));
    assert_eq!(seed(&conn).list_queries(&table.id).unwrap(), vec![query]);
}

#[test]
fn actor_outside_allow_list_cannot_mutate() {
    let conn = setup();
    let folder = seed(&conn).create_folder("Reports", 0).unwrap();
    let mut engine = MutationEngine::new(
        FlakyGateway::new(&conn),
        AllowList::restricted(["lead@example.com"]),
    );
    engine.load().unwrap();
    let guest = Actor::new("guest@example.com");

    let err = engine.create_folder(&guest, "Mine").unwrap_err();
    assert!(matches!(err, MutationError::Forbidden { .. }));
    let err = engine
        .soft_delete(&guest, EntityRef::Folder(folder.id.clone()))
        .unwrap_err();
    assert!(matches!(err, MutationError::Forbidden { .. }));
    assert_eq!(engine.collection().folders().len(), 1);
    assert_eq!(engine.pending_count(), 0);

    engine
        .create_folder(&Actor::new("Lead@Example.com"), "Team")
        .unwrap();
    assert_eq!(engine.pending_count(), 1);
}

#[test]
fn blank_names_are_rejected_before_any_change() {
    let conn = setup();
    let folder = seed(&conn).create_folder("Reports", 0).unwrap();
    let mut engine = engine(&conn);

    assert!(matches!(
        engine.create_folder(&actor(), "   ").unwrap_err(),
        MutationError::BlankName(_)
    ));
    assert!(matches!(
        engine.rename_folder(&actor(), &folder.id, "").unwrap_err(),
        MutationError::BlankName(_)
    ));
    assert!(matches!(
        engine
            .rename_folder(&actor(), &FolderId::new("missing"), "Other")
            .unwrap_err(),
        MutationError::NotFound(_)
    ));
    assert_eq!(engine.pending_count(), 0);
}

#[test]
fn soft_deleted_table_comes_back_unchanged_after_restore() {
    let conn = setup();
    let gateway = seed(&conn);
    let table = gateway.create_table(&new_table("users", None, 0)).unwrap();
    seed_query(&gateway, &table.id, "All", 0);
    let mut engine = engine(&conn);
    engine.load_queries(&table.id).unwrap();
    let original = engine.collection().table(&table.id).cloned().unwrap();

    engine
        .soft_delete(&actor(), EntityRef::Table(table.id.clone()))
        .unwrap();
    assert!(engine.collection().table(&table.id).is_none());
    assert!(engine.flush().all_confirmed());
    assert!(seed(&conn).list_tables().unwrap().is_empty());

    let trash = engine.list_trash().unwrap();
    assert_eq!(trash.tables.len(), 1);
    let trashed = trash.tables[0].clone();
    assert!(trashed.deleted_at.is_some());
    assert_eq!(
        Table {
            deleted_at: None,
            ..trashed.clone()
        },
        original
    );

    engine.restore_table(&actor(), trashed).unwrap();
    assert_eq!(engine.collection().table(&table.id), Some(&original));
    assert!(engine.flush().all_confirmed());
    assert_eq!(seed(&conn).list_tables().unwrap(), vec![original]);
    assert_eq!(seed(&conn).list_queries(&table.id).unwrap().len(), 1);
}

#[test]
fn trashed_folder_leaves_its_tables_at_root_until_restored() {
    let conn = setup();
    let gateway = seed(&conn);
    let folder = gateway.create_folder("Reports", 0).unwrap();
    let table = gateway
        .create_table(&new_table("users", Some(&folder.id), 0))
        .unwrap();
    let mut engine = engine(&conn);

    engine
        .soft_delete(&actor(), EntityRef::Folder(folder.id.clone()))
        .unwrap();
    assert_eq!(model_group(&engine, None), vec![table.id.clone()]);
    assert_eq!(
        engine.collection().table(&table.id).unwrap().folder_id,
        Some(folder.id.clone())
    );
    assert!(engine.flush().all_confirmed());

    let trashed = engine.list_trash().unwrap().folders.remove(0);
    engine.restore_folder(&actor(), trashed).unwrap();
    assert!(engine.flush().all_confirmed());
    assert_eq!(model_group(&engine, Some(&folder.id)), vec![table.id]);
}

#[test]
fn empty_trash_deletes_queries_then_tables_then_folders() {
    let conn = setup();
    let gateway = seed(&conn);
    let folder = gateway.create_folder("Old", 0).unwrap();
    let kept = gateway
        .create_table(&new_table("kept", Some(&folder.id), 0))
        .unwrap();
    let doomed = gateway.create_table(&new_table("doomed", None, 0)).unwrap();
    let query = seed_query(&gateway, &doomed.id, "q", 0);
    let mut engine = engine(&conn);
    engine.load_queries(&doomed.id).unwrap();

    engine
        .soft_delete(&actor(), EntityRef::Query(query.clone()))
        .unwrap();
    engine
        .soft_delete(&actor(), EntityRef::Table(doomed.id.clone()))
        .unwrap();
    engine
        .soft_delete(&actor(), EntityRef::Folder(folder.id.clone()))
        .unwrap();
    assert!(engine.flush().all_confirmed());

    let listing = engine.list_trash().unwrap();
    engine.empty_trash(&actor(), &listing).unwrap().unwrap();
    let pending = engine.pending().next().unwrap().clone();
    assert_eq!(pending.kind, MutationKind::EmptyTrash);
    assert_eq!(
        pending.ops,
        vec![
            RemoteOp::HardDelete(EntityRef::Query(query)),
            RemoteOp::HardDelete(EntityRef::Table(doomed.id)),
            RemoteOp::HardDelete(EntityRef::Folder(folder.id)),
        ]
    );
    assert_eq!(engine.collection().table(&kept.id).unwrap().folder_id, None);

    assert!(engine.flush().all_confirmed());
    assert!(engine.list_trash().unwrap().is_empty());
    assert_eq!(persisted_table(&conn, &kept.id).folder_id, None);
    assert_eq!(
        engine
            .empty_trash(&actor(), &TrashListing::default())
            .unwrap(),
        None
    );
}

#[test]
fn query_drag_persists_new_order() {
    let conn = setup();
    let gateway = seed(&conn);
    let table = gateway.create_table(&new_table("users", None, 0)).unwrap();
    let q1 = seed_query(&gateway, &table.id, "q1", 0);
    let q2 = seed_query(&gateway, &table.id, "q2", 1);
    let q3 = seed_query(&gateway, &table.id, "q3", 2);
    let mut engine = engine(&conn);
    engine.load_queries(&table.id).unwrap();

    engine.drag_query(&actor(), &table.id, &q1, &q3).unwrap();
    assert!(engine.flush().all_confirmed());

    let persisted = seed(&conn)
        .list_queries(&table.id)
        .unwrap()
        .into_iter()
        .map(|query| query.id)
        .collect::<Vec<_>>();
    assert_eq!(persisted, vec![q2, q3, q1]);
}

#[test]
fn resync_clears_selection_of_vanished_table() {
    let conn = setup();
    let table = seed(&conn).create_table(&new_table("users", None, 0)).unwrap();
    let mut engine = engine(&conn);
    engine.selection_mut().select_table(Some(table.id.clone()));

    conn.execute("DELETE FROM tables WHERE id = ?1;", [table.id.as_str()])
        .unwrap();
    engine.resync().unwrap();

    assert!(engine.selection().selected_table_id().is_none());
}

#[test]
fn failed_resync_marks_engine_stale() {
    let conn = setup();
    let folder = seed(&conn).create_folder("Reports", 0).unwrap();
    let mut engine = engine(&conn);
    engine.gateway().fail("rename_folder");
    engine.gateway().fail("list_folders");

    engine.rename_folder(&actor(), &folder.id, "Finance").unwrap();
    let report = engine.flush();

    assert!(!report.resynced);
    assert!(report.resync_error.is_some());
    assert!(engine.is_stale());
    assert_eq!(engine.collection().folder(&folder.id).unwrap().name, "Finance");
}
