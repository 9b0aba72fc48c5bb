use blockpad_core::db::open_db_in_memory;
use blockpad_core::{
    verify_page, BlockId, BlockStore, BlockType, EngineConfig, ErrorKind, PageId, PositionPolicy,
    SqliteBlockStore, StoreError, TreeEngine,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn immediate() -> EngineConfig {
    EngineConfig {
        position_policy: PositionPolicy::Immediate,
    }
}

/// Page with root blocks `A`, `B`, `C` at positions 0, 1, 2.
fn abc_page(store: &SqliteBlockStore<'_>) -> (PageId, BlockId, BlockId, BlockId) {
    let page_id = store.create_page("Tree", None).unwrap();
    let a = store.get_page_blocks(page_id).unwrap()[0].id;
    store.update_block_content(a, "A").unwrap();
    let b = store
        .create_block(page_id, BlockType::Text, "B", None, 1)
        .unwrap();
    let c = store
        .create_block(page_id, BlockType::Text, "C", None, 2)
        .unwrap();
    (page_id, a, b, c)
}

fn root_positions(store: &SqliteBlockStore<'_>, page_id: PageId) -> Vec<(BlockId, i64)> {
    store
        .get_page_blocks(page_id)
        .unwrap()
        .into_iter()
        .map(|block| (block.id, block.position))
        .collect()
}

#[test]
fn indent_moves_block_under_previous_sibling_and_reorder_closes_the_gap() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, a, b, c) = abc_page(engine.store());

    assert!(engine.indent(b).unwrap());

    let store = engine.store();
    let moved = store.require_block(b).unwrap();
    assert_eq!(moved.parent_id, Some(a));
    assert_eq!(moved.position, 0);
    assert_eq!(store.require_block(a).unwrap().child_ids, vec![b]);
    assert_eq!(root_positions(store, page_id), vec![(a, 0), (c, 2)]);

    engine.reorder_blocks(page_id, None, &[a, c]).unwrap();
    assert_eq!(root_positions(engine.store(), page_id), vec![(a, 0), (c, 1)]);
}

#[test]
fn indent_first_sibling_and_outdent_root_are_noops() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, a, b, c) = abc_page(engine.store());

    assert!(!engine.indent(a).unwrap());
    assert!(!engine.outdent(a).unwrap());
    assert_eq!(
        root_positions(engine.store(), page_id),
        vec![(a, 0), (b, 1), (c, 2)]
    );
}

#[test]
fn indent_then_outdent_restores_root_membership() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, a, b, c) = abc_page(engine.store());

    assert!(engine.indent(b).unwrap());
    assert!(engine.outdent(b).unwrap());

    let store = engine.store();
    let block = store.require_block(b).unwrap();
    assert_eq!(block.parent_id, None);
    assert_eq!(block.position, 1);
    assert!(store.require_block(a).unwrap().child_ids.is_empty());

    engine.normalize_group(page_id, None).unwrap();
    let ids: Vec<BlockId> = root_positions(engine.store(), page_id)
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec![a, b, c]);
}

#[test]
fn indent_from_nested_group_updates_both_parents() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (_, a, b, c) = abc_page(engine.store());

    engine.indent(b).unwrap();
    engine.indent(c).unwrap();
    assert_eq!(engine.store().require_block(a).unwrap().child_ids, vec![b, c]);

    assert!(engine.indent(c).unwrap());
    let store = engine.store();
    assert_eq!(store.require_block(a).unwrap().child_ids, vec![b]);
    assert_eq!(store.require_block(b).unwrap().child_ids, vec![c]);
    assert_eq!(store.require_block(c).unwrap().parent_id, Some(b));
}

#[test]
fn outdent_places_block_after_former_parent_in_grandparent() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (_, a, b, c) = abc_page(engine.store());
    engine.indent(b).unwrap();
    engine.indent(c).unwrap();
    engine.indent(c).unwrap();

    assert!(engine.outdent(c).unwrap());

    let store = engine.store();
    assert_eq!(store.require_block(a).unwrap().child_ids, vec![b, c]);
    assert!(store.require_block(b).unwrap().child_ids.is_empty());
    let moved = store.require_block(c).unwrap();
    assert_eq!(moved.parent_id, Some(a));
    assert_eq!(moved.position, store.require_block(b).unwrap().position + 1);
}

#[test]
fn unknown_ids_fail_with_not_found() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let missing = Uuid::new_v4();

    for err in [
        engine.indent(missing).unwrap_err(),
        engine.outdent(missing).unwrap_err(),
        engine.create_block_below(missing, "x").unwrap_err(),
        engine.delete_and_merge(missing).unwrap_err(),
    ] {
        assert!(matches!(err, StoreError::BlockNotFound(id) if id == missing));
    }
}

#[test]
fn reorder_rejects_blocks_from_another_group() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, a, b, c) = abc_page(engine.store());
    engine.indent(b).unwrap();

    let err = engine.reorder_blocks(page_id, None, &[c, b, a]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert!(matches!(err, StoreError::NotInSiblingGroup { block_id, .. } if block_id == b));

    let err = engine
        .reorder_blocks(page_id, None, &[c, Uuid::new_v4()])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(root_positions(engine.store(), page_id), vec![(a, 0), (c, 2)]);
}

#[test]
fn reorder_with_partial_list_keeps_whole_group_dense() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, a, b, c) = abc_page(engine.store());

    engine.reorder_blocks(page_id, None, &[c]).unwrap();

    assert_eq!(
        root_positions(engine.store(), page_id),
        vec![(c, 0), (a, 1), (b, 2)]
    );
    assert!(verify_page(engine.store(), page_id).unwrap().is_consistent());
}

#[test]
fn reorder_partial_children_appends_unlisted_child_ids() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, a, b, c) = abc_page(engine.store());
    engine.indent(b).unwrap();
    engine.indent(c).unwrap();

    engine.reorder_blocks(page_id, Some(a), &[c]).unwrap();

    let store = engine.store();
    assert_eq!(store.require_block(a).unwrap().child_ids, vec![c, b]);
    assert_eq!(store.require_block(b).unwrap().position, 1);
    assert!(verify_page(store, page_id).unwrap().is_consistent());
}

#[test]
fn reorder_children_rewrites_parent_child_ids() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, a, b, c) = abc_page(engine.store());
    engine.indent(b).unwrap();
    engine.indent(c).unwrap();

    engine.reorder_blocks(page_id, Some(a), &[c, b]).unwrap();

    let store = engine.store();
    assert_eq!(store.require_block(a).unwrap().child_ids, vec![c, b]);
    let children: Vec<(BlockId, i64)> = store
        .get_child_blocks(a)
        .unwrap()
        .into_iter()
        .map(|block| (block.id, block.position))
        .collect();
    assert_eq!(children, vec![(c, 0), (b, 1)]);
}

#[test]
fn create_block_below_uses_next_position_and_same_parent() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (_, a, b, c) = abc_page(engine.store());
    engine.indent(b).unwrap();
    engine.indent(c).unwrap();

    let new_id = engine.create_block_below(b, "between").unwrap();

    let store = engine.store();
    let created = store.require_block(new_id).unwrap();
    assert_eq!(created.kind, BlockType::Text);
    assert_eq!(created.content, "between");
    assert_eq!(created.parent_id, Some(a));
    assert_eq!(created.position, store.require_block(b).unwrap().position + 1);
    assert_eq!(store.require_block(a).unwrap().child_ids, vec![b, new_id, c]);
}

#[test]
fn split_block_moves_tail_into_new_block() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (_, a, _, _) = abc_page(engine.store());
    engine.edit_content(a, "héllo world").unwrap();

    let tail_id = engine.split_block(a, 5).unwrap();

    let store = engine.store();
    assert_eq!(store.require_block(a).unwrap().content, "héllo");
    assert_eq!(store.require_block(tail_id).unwrap().content, " world");

    let end_id = engine.split_block(a, 99).unwrap();
    assert_eq!(engine.store().require_block(end_id).unwrap().content, "");
}

#[test]
fn delete_and_merge_appends_content_to_previous_sibling() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (_, a, b, _) = abc_page(engine.store());
    engine.edit_content(a, "hello ").unwrap();
    engine.edit_content(b, "world").unwrap();

    let merged = engine.delete_and_merge(b).unwrap().unwrap();

    assert_eq!(merged.target_id, a);
    assert_eq!(merged.content, "hello world");
    let store = engine.store();
    assert_eq!(store.require_block(a).unwrap().content, "hello world");
    assert!(store.get_block(b).unwrap().is_none());
}

#[test]
fn delete_and_merge_first_child_merges_into_parent_and_drops_subtree() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (_, a, b, c) = abc_page(engine.store());
    engine.indent(b).unwrap();
    engine.indent(c).unwrap();
    engine.indent(c).unwrap();

    let merged = engine.delete_and_merge(b).unwrap().unwrap();

    assert_eq!(merged.target_id, a);
    assert_eq!(merged.content, "AB");
    let store = engine.store();
    assert!(store.get_block(b).unwrap().is_none());
    assert!(store.get_block(c).unwrap().is_none());
    assert!(store.require_block(a).unwrap().child_ids.is_empty());
}

#[test]
fn delete_and_merge_without_predecessor_is_noop() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, a, _, _) = abc_page(engine.store());

    assert!(engine.delete_and_merge(a).unwrap().is_none());
    assert_eq!(engine.store().get_page_blocks(page_id).unwrap().len(), 3);
}

#[test]
fn change_type_updates_kind() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (_, a, _, _) = abc_page(engine.store());

    engine.change_type(a, BlockType::H2).unwrap();
    assert_eq!(engine.store().require_block(a).unwrap().kind, BlockType::H2);
}

#[test]
fn update_block_positions_follows_display_order() {
    let conn = setup();
    let engine = TreeEngine::new(SqliteBlockStore::try_new(&conn).unwrap());
    let (page_id, a, b, c) = abc_page(engine.store());

    engine.update_block_positions(&[c, a, b]).unwrap();

    assert_eq!(
        root_positions(engine.store(), page_id),
        vec![(c, 0), (a, 1), (b, 2)]
    );
}

#[test]
fn immediate_policy_keeps_groups_dense() {
    let conn = setup();
    let engine =
        TreeEngine::with_config(SqliteBlockStore::try_new(&conn).unwrap(), immediate());
    let (page_id, a, b, c) = abc_page(engine.store());

    engine.indent(b).unwrap();
    assert_eq!(root_positions(engine.store(), page_id), vec![(a, 0), (c, 1)]);

    let d = engine.create_block_below(a, "D").unwrap();
    assert_eq!(
        root_positions(engine.store(), page_id),
        vec![(a, 0), (d, 1), (c, 2)]
    );

    engine.outdent(b).unwrap();
    assert_eq!(
        root_positions(engine.store(), page_id),
        vec![(a, 0), (b, 1), (d, 2), (c, 3)]
    );

    assert!(engine.delete_block(d).unwrap());
    assert_eq!(
        root_positions(engine.store(), page_id),
        vec![(a, 0), (b, 1), (c, 2)]
    );
}
