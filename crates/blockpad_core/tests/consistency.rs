use blockpad_core::db::open_db_in_memory;
use blockpad_core::{
    repair_page, verify_page, BlockId, BlockStore, BlockType, PageId, SqliteBlockStore,
    TreeEngine, Violation,
};
use rusqlite::{params, Connection};
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

/// Root `a` with children `b`, `c`.
fn nested_page(store: &SqliteBlockStore<'_>) -> (PageId, BlockId, BlockId, BlockId) {
    let page_id = store.create_page("", None).unwrap();
    let a = store.get_page_blocks(page_id).unwrap()[0].id;
    let b = store
        .create_block(page_id, BlockType::Bullet, "b", Some(a), 0)
        .unwrap();
    let c = store
        .create_block(page_id, BlockType::Bullet, "c", Some(a), 1)
        .unwrap();
    (page_id, a, b, c)
}

fn set_child_ids(conn: &Connection, block_id: BlockId, child_ids: &[BlockId]) {
    let json = serde_json::to_string(child_ids).unwrap();
    conn.execute(
        "UPDATE blocks SET child_uuids = ?2 WHERE block_uuid = ?1;",
        params![block_id.to_string(), json],
    )
    .unwrap();
}

#[test]
fn engine_operations_leave_page_consistent() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, _, b, c) = nested_page(engine.store());

    engine.indent(c).unwrap();
    engine.outdent(b).unwrap();
    engine.normalize_group(page_id, None).unwrap();

    let report = verify_page(engine.store(), page_id).unwrap();
    assert!(report.is_consistent(), "{:?}", report.violations);
    assert_eq!(report.block_count, 3);
}

#[test]
fn verify_reports_dangling_and_missing_child_refs() {
    let conn = setup();
    let store = SqliteBlockStore::try_new(&conn).unwrap();
    let (page_id, a, b, c) = nested_page(&store);
    let ghost = Uuid::new_v4();
    set_child_ids(&conn, a, &[b, ghost]);

    let report = verify_page(&store, page_id).unwrap();

    assert!(report.violations.contains(&Violation::DanglingChildRef {
        parent_id: a,
        child_id: ghost
    }));
    assert!(report.violations.contains(&Violation::MissingChildRef {
        parent_id: a,
        child_id: c
    }));
}

#[test]
fn repair_rebuilds_child_ids_from_parent_links() {
    let conn = setup();
    let store = SqliteBlockStore::try_new(&conn).unwrap();
    let (page_id, a, b, c) = nested_page(&store);
    set_child_ids(&conn, a, &[c, Uuid::new_v4(), c]);

    let report = repair_page(&store, page_id).unwrap();
    assert!(!report.is_consistent());

    assert_eq!(store.require_block(a).unwrap().child_ids, vec![c, b]);
    let after = verify_page(&store, page_id).unwrap();
    assert!(after.is_consistent(), "{:?}", after.violations);
    assert_eq!(store.require_block(c).unwrap().position, 0);
    assert_eq!(store.require_block(b).unwrap().position, 1);
}

#[test]
fn repair_closes_position_gaps() {
    let conn = setup();
    let store = SqliteBlockStore::try_new(&conn).unwrap();
    let page_id = store.create_page("", None).unwrap();
    let first = store.get_page_blocks(page_id).unwrap()[0].id;
    let second = store
        .create_block(page_id, BlockType::Text, "x", None, 5)
        .unwrap();

    let report = verify_page(&store, page_id).unwrap();
    assert_eq!(
        report.violations,
        vec![Violation::PositionGap {
            parent_id: None,
            positions: vec![0, 5]
        }]
    );

    repair_page(&store, page_id).unwrap();
    assert_eq!(store.require_block(first).unwrap().position, 0);
    assert_eq!(store.require_block(second).unwrap().position, 1);
}

#[test]
fn repair_turns_orphans_and_cycles_into_roots() {
    let conn = setup();
    let store = SqliteBlockStore::try_new(&conn).unwrap();
    let (page_id, a, b, c) = nested_page(&store);
    conn.execute(
        "UPDATE blocks SET parent_uuid = ?2 WHERE block_uuid = ?1;",
        params![b.to_string(), Uuid::new_v4().to_string()],
    )
    .unwrap();
    conn.execute(
        "UPDATE blocks SET parent_uuid = ?2 WHERE block_uuid = ?1;",
        params![a.to_string(), c.to_string()],
    )
    .unwrap();
    set_child_ids(&conn, c, &[a]);

    let report = verify_page(&store, page_id).unwrap();
    assert!(report
        .violations
        .iter()
        .any(|violation| matches!(violation, Violation::Cycle { .. })));
    assert!(report
        .violations
        .iter()
        .any(|violation| matches!(violation, Violation::MissingParent { block_id, .. } if *block_id == b)));

    repair_page(&store, page_id).unwrap();

    let after = verify_page(&store, page_id).unwrap();
    assert!(after.is_consistent(), "{:?}", after.violations);
    assert_eq!(after.block_count, 3);
    assert!(store.require_block(b).unwrap().is_root());
}

#[test]
fn repair_of_consistent_page_changes_nothing() {
    let conn = setup();
    let store = SqliteBlockStore::try_new(&conn).unwrap();
    let (page_id, a, b, c) = nested_page(&store);
    let before = store.export_page(page_id).unwrap();

    let report = repair_page(&store, page_id).unwrap();

    assert!(report.is_consistent());
    assert_eq!(store.export_page(page_id).unwrap(), before);
    assert_eq!(store.require_block(a).unwrap().child_ids, vec![b, c]);
}
