//! Page/block store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide durable CRUD and query APIs for `Page` and `Block` records.
//! - Keep SQL details and sibling ordering behavior inside the repository.
//! - Own whole-page snapshot export/import with id remapping.
//!
//! # Invariants
//! - Sibling listings are deterministic: `position ASC`, then insertion order.
//! - The store never renumbers siblings; callers own `position` values.
//! - Creating a child block appends it to the parent's `child_ids`, and
//!   deleting a block removes it from the parent's `child_ids`.
//! - Multi-record writes run inside one transaction via `atomically`.

use crate::db::migrations::latest_version;
use crate::model::block::{
    document_order, Block, BlockId, BlockPatch, BlockProperties, BlockType,
};
use crate::model::page::{normalize_page_title, Page, PageId, PagePatch, DEFAULT_PAGE_ICON};
use crate::model::snapshot::PageSnapshot;
use crate::repo::error::{StoreError, StoreResult};
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// SQL expression for the current time in epoch milliseconds.
const NOW_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

const PAGE_SELECT_SQL: &str = "SELECT
    page_uuid,
    title,
    icon,
    cover_image,
    is_favorite,
    parent_uuid,
    created_at,
    updated_at
FROM pages";

const BLOCK_SELECT_SQL: &str = "SELECT
    block_uuid,
    page_uuid,
    type,
    content,
    properties,
    parent_uuid,
    child_uuids,
    position,
    created_at,
    updated_at
FROM blocks";

/// Field values for a block about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBlock {
    pub page_id: PageId,
    pub kind: BlockType,
    pub content: String,
    pub properties: BlockProperties,
    pub parent_id: Option<BlockId>,
    pub position: i64,
}

impl NewBlock {
    /// Draft with empty properties.
    pub fn new(
        page_id: PageId,
        kind: BlockType,
        content: impl Into<String>,
        parent_id: Option<BlockId>,
        position: i64,
    ) -> Self {
        Self {
            page_id,
            kind,
            content: content.into(),
            properties: BlockProperties::new(),
            parent_id,
            position,
        }
    }
}

/// Repository interface for page and block records.
pub trait BlockStore {
    /// Runs `op` so that all of its writes commit or roll back together.
    ///
    /// Nested calls join the outermost unit of work.
    fn atomically<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Self) -> StoreResult<T>;

    /// Creates a page plus its initial empty root text block.
    fn create_page(&self, title: &str, parent_id: Option<PageId>) -> StoreResult<PageId>;
    /// Loads one page by id.
    fn get_page(&self, page_id: PageId) -> StoreResult<Option<Page>>;
    /// Lists every page, oldest first.
    fn list_pages(&self) -> StoreResult<Vec<Page>>;
    /// Applies a partial page update.
    fn update_page(&self, page_id: PageId, patch: &PagePatch) -> StoreResult<()>;
    /// Deletes a page and all of its blocks. `false` when the page is unknown.
    fn delete_page(&self, page_id: PageId) -> StoreResult<bool>;

    /// Inserts a block with caller-chosen fields.
    fn insert_block(&self, block: &NewBlock) -> StoreResult<BlockId>;
    /// Loads one block by id.
    fn get_block(&self, block_id: BlockId) -> StoreResult<Option<Block>>;
    /// Lists the sibling group `(page_id, parent_id)` by position.
    fn get_sibling_blocks(
        &self,
        page_id: PageId,
        parent_id: Option<BlockId>,
    ) -> StoreResult<Vec<Block>>;
    /// Lists every block of a page by position (cross-parent order is not
    /// meaningful).
    fn get_all_page_blocks(&self, page_id: PageId) -> StoreResult<Vec<Block>>;
    /// Lists direct children of one block by position.
    fn get_child_blocks(&self, parent_id: BlockId) -> StoreResult<Vec<Block>>;
    /// Applies a partial block update and stamps `updated_at`.
    fn update_block(&self, block_id: BlockId, patch: &BlockPatch) -> StoreResult<()>;
    /// Writes `position` for each `(block, position)` pair.
    fn set_positions(&self, positions: &[(BlockId, i64)]) -> StoreResult<()>;
    /// Deletes a block and its descendants. `false` when the block is unknown.
    fn delete_block(&self, block_id: BlockId) -> StoreResult<bool>;

    /// Returns the page with all of its blocks, parents first.
    fn export_page(&self, page_id: PageId) -> StoreResult<PageSnapshot>;
    /// Inserts a snapshot under fresh ids and returns the new page id.
    fn import_page(&self, snapshot: &PageSnapshot) -> StoreResult<PageId>;

    /// Inserts a block with empty properties.
    fn create_block(
        &self,
        page_id: PageId,
        kind: BlockType,
        content: &str,
        parent_id: Option<BlockId>,
        position: i64,
    ) -> StoreResult<BlockId> {
        self.insert_block(&NewBlock::new(page_id, kind, content, parent_id, position))
    }

    /// Lists root-level blocks of a page by position.
    fn get_page_blocks(&self, page_id: PageId) -> StoreResult<Vec<Block>> {
        self.get_sibling_blocks(page_id, None)
    }

    /// Replaces block content.
    fn update_block_content(&self, block_id: BlockId, content: &str) -> StoreResult<()> {
        self.update_block(block_id, &BlockPatch::content(content))
    }

    /// Replaces block type.
    fn update_block_type(&self, block_id: BlockId, kind: BlockType) -> StoreResult<()> {
        self.update_block(block_id, &BlockPatch::kind(kind))
    }

    /// Loads a block or fails with `BlockNotFound`.
    fn require_block(&self, block_id: BlockId) -> StoreResult<Block> {
        self.get_block(block_id)?
            .ok_or(StoreError::BlockNotFound(block_id))
    }

    /// Loads a page or fails with `PageNotFound`.
    fn require_page(&self, page_id: PageId) -> StoreResult<Page> {
        self.get_page(page_id)?
            .ok_or(StoreError::PageNotFound(page_id))
    }
}

/// SQLite-backed block store.
pub struct SqliteBlockStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBlockStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn insert_page_row(&self, page: &Page) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO pages (
                page_uuid,
                title,
                icon,
                cover_image,
                is_favorite,
                parent_uuid,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                page.id.to_string(),
                page.title.as_str(),
                page.icon.as_str(),
                page.cover_image.as_deref(),
                bool_to_int(page.is_favorite),
                page.parent_id.map(|value| value.to_string()),
                page.created_at,
                page.updated_at,
            ],
        )?;
        Ok(())
    }

    fn insert_block_row(&self, block: &Block) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO blocks (
                block_uuid,
                page_uuid,
                type,
                content,
                properties,
                parent_uuid,
                child_uuids,
                position,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                block.id.to_string(),
                block.page_id.to_string(),
                block.kind.as_str(),
                block.content.as_str(),
                encode_properties(&block.properties)?,
                block.parent_id.map(|value| value.to_string()),
                encode_child_ids(&block.child_ids)?,
                block.position,
                block.created_at,
                block.updated_at,
            ],
        )?;
        Ok(())
    }

    fn write_child_ids(&self, block_id: BlockId, child_ids: &[BlockId]) -> StoreResult<()> {
        self.update_block(
            block_id,
            &BlockPatch {
                child_ids: Some(child_ids.to_vec()),
                ..BlockPatch::default()
            },
        )
    }

    /// Rejects page parents that do not exist or would make `page_id` its
    /// own ancestor.
    fn ensure_page_parent_allowed(&self, page_id: PageId, parent_id: PageId) -> StoreResult<()> {
        let mut visited = HashSet::new();
        let mut cursor = Some(parent_id);
        while let Some(current) = cursor {
            if current == page_id || !visited.insert(current) {
                return Err(StoreError::InvalidOperation(format!(
                    "page {page_id} cannot be nested under {parent_id}"
                )));
            }
            cursor = self.require_page(current)?.parent_id;
        }
        Ok(())
    }

    fn now_ms(&self) -> StoreResult<i64> {
        let now = self
            .conn
            .query_row(&format!("SELECT {NOW_MS_SQL};"), [], |row| row.get(0))?;
        Ok(now)
    }

    /// Deletes `root` and everything below it; returns the number of rows
    /// removed.
    fn delete_subtree(&self, root: &Block) -> StoreResult<usize> {
        let mut visited = HashSet::new();
        let mut pending = vec![root.clone()];
        let mut removed = 0;

        while let Some(block) = pending.pop() {
            if !visited.insert(block.id) {
                continue;
            }

            let mut child_ids = block.child_ids;
            for child in self.get_child_blocks(block.id)? {
                if !child_ids.contains(&child.id) {
                    child_ids.push(child.id);
                }
            }
            for child_id in child_ids {
                if visited.contains(&child_id) {
                    continue;
                }
                if let Some(child) = self.get_block(child_id)? {
                    pending.push(child);
                }
            }

            removed += self
                .conn
                .execute("DELETE FROM blocks WHERE block_uuid = ?1;", [block.id.to_string()])?;
        }
        Ok(removed)
    }
}

impl BlockStore for SqliteBlockStore<'_> {
    fn atomically<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Self) -> StoreResult<T>,
    {
        if !self.conn.is_autocommit() {
            return op(self);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let value = op(self)?;
        tx.commit()?;
        Ok(value)
    }

    fn create_page(&self, title: &str, parent_id: Option<PageId>) -> StoreResult<PageId> {
        let page_id = self.atomically(|store| {
            if let Some(parent_id) = parent_id {
                store.require_page(parent_id)?;
            }

            let now = store.now_ms()?;
            let page = Page {
                id: Uuid::new_v4(),
                title: normalize_page_title(title),
                icon: DEFAULT_PAGE_ICON.to_string(),
                cover_image: None,
                created_at: now,
                updated_at: now,
                is_favorite: false,
                parent_id,
            };
            store.insert_page_row(&page)?;
            store.create_block(page.id, BlockType::Text, "", None, 0)?;
            Ok(page.id)
        })?;

        info!(
            "event=page_create module=store status=ok page_id={} nested={}",
            page_id,
            parent_id.is_some()
        );
        Ok(page_id)
    }

    fn get_page(&self, page_id: PageId) -> StoreResult<Option<Page>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PAGE_SELECT_SQL} WHERE page_uuid = ?1;"))?;
        let mut rows = stmt.query([page_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_page_row(row)?));
        }
        Ok(None)
    }

    fn list_pages(&self) -> StoreResult<Vec<Page>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PAGE_SELECT_SQL} ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut pages = Vec::new();
        while let Some(row) = rows.next()? {
            pages.push(parse_page_row(row)?);
        }
        Ok(pages)
    }

    fn update_page(&self, page_id: PageId, patch: &PagePatch) -> StoreResult<()> {
        let mut assignments: Vec<String> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(title) = &patch.title {
            assignments.push("title = ?".to_string());
            bind_values.push(Value::Text(normalize_page_title(title)));
        }
        if let Some(icon) = &patch.icon {
            assignments.push("icon = ?".to_string());
            bind_values.push(Value::Text(icon.clone()));
        }
        if let Some(cover_image) = &patch.cover_image {
            assignments.push("cover_image = ?".to_string());
            bind_values.push(optional_text(cover_image.clone()));
        }
        if let Some(is_favorite) = patch.is_favorite {
            assignments.push("is_favorite = ?".to_string());
            bind_values.push(Value::Integer(bool_to_int(is_favorite)));
        }
        if let Some(parent_id) = patch.parent_id {
            if let Some(parent_id) = parent_id {
                self.ensure_page_parent_allowed(page_id, parent_id)?;
            }
            assignments.push("parent_uuid = ?".to_string());
            bind_values.push(optional_text(parent_id.map(|value| value.to_string())));
        }
        assignments.push(format!("updated_at = {NOW_MS_SQL}"));
        bind_values.push(Value::Text(page_id.to_string()));

        let sql = format!(
            "UPDATE pages SET {} WHERE page_uuid = ?;",
            assignments.join(", ")
        );
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(StoreError::PageNotFound(page_id));
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> StoreResult<bool> {
        let removed_blocks = self.atomically(|store| {
            if store.get_page(page_id)?.is_none() {
                return Ok(None);
            }
            let removed = store
                .conn
                .execute("DELETE FROM blocks WHERE page_uuid = ?1;", [page_id.to_string()])?;
            store
                .conn
                .execute("DELETE FROM pages WHERE page_uuid = ?1;", [page_id.to_string()])?;
            Ok(Some(removed))
        })?;

        match removed_blocks {
            Some(removed) => {
                info!(
                    "event=page_delete module=store status=ok page_id={} blocks_removed={}",
                    page_id, removed
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_block(&self, draft: &NewBlock) -> StoreResult<BlockId> {
        self.atomically(|store| {
            store.require_page(draft.page_id)?;

            let parent = match draft.parent_id {
                Some(parent_id) => {
                    let parent = store
                        .get_block(parent_id)?
                        .filter(|parent| parent.page_id == draft.page_id)
                        .ok_or(StoreError::BlockNotFound(parent_id))?;
                    Some(parent)
                }
                None => None,
            };

            let now = store.now_ms()?;
            let block = Block {
                id: Uuid::new_v4(),
                page_id: draft.page_id,
                kind: draft.kind,
                content: draft.content.clone(),
                properties: draft.properties.clone(),
                parent_id: draft.parent_id,
                child_ids: Vec::new(),
                position: draft.position,
                created_at: now,
                updated_at: now,
            };
            store.insert_block_row(&block)?;

            if let Some(parent) = parent {
                let mut child_ids = parent.child_ids;
                let index = usize::try_from(draft.position.max(0))
                    .unwrap_or(usize::MAX)
                    .min(child_ids.len());
                child_ids.insert(index, block.id);
                store.write_child_ids(parent.id, &child_ids)?;
            }

            debug!(
                "event=block_create module=store status=ok block_id={} page_id={} type={} position={}",
                block.id, block.page_id, block.kind, block.position
            );
            Ok(block.id)
        })
    }

    fn get_block(&self, block_id: BlockId) -> StoreResult<Option<Block>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BLOCK_SELECT_SQL} WHERE block_uuid = ?1;"))?;
        let mut rows = stmt.query([block_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_block_row(row)?));
        }
        Ok(None)
    }

    fn get_sibling_blocks(
        &self,
        page_id: PageId,
        parent_id: Option<BlockId>,
    ) -> StoreResult<Vec<Block>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BLOCK_SELECT_SQL}
             WHERE page_uuid = ?1
               AND parent_uuid IS ?2
             ORDER BY position ASC, rowid ASC;"
        ))?;
        let rows = stmt.query(params![
            page_id.to_string(),
            parent_id.map(|value| value.to_string()),
        ])?;
        collect_blocks(rows)
    }

    fn get_all_page_blocks(&self, page_id: PageId) -> StoreResult<Vec<Block>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BLOCK_SELECT_SQL}
             WHERE page_uuid = ?1
             ORDER BY position ASC, rowid ASC;"
        ))?;
        let rows = stmt.query([page_id.to_string()])?;
        collect_blocks(rows)
    }

    fn get_child_blocks(&self, parent_id: BlockId) -> StoreResult<Vec<Block>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BLOCK_SELECT_SQL}
             WHERE parent_uuid = ?1
             ORDER BY position ASC, rowid ASC;"
        ))?;
        let rows = stmt.query([parent_id.to_string()])?;
        collect_blocks(rows)
    }

    fn update_block(&self, block_id: BlockId, patch: &BlockPatch) -> StoreResult<()> {
        let mut assignments: Vec<String> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(kind) = patch.kind {
            assignments.push("type = ?".to_string());
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(content) = &patch.content {
            assignments.push("content = ?".to_string());
            bind_values.push(Value::Text(content.clone()));
        }
        if let Some(properties) = &patch.properties {
            assignments.push("properties = ?".to_string());
            bind_values.push(Value::Text(encode_properties(properties)?));
        }
        if let Some(parent_id) = patch.parent_id {
            assignments.push("parent_uuid = ?".to_string());
            bind_values.push(optional_text(parent_id.map(|value| value.to_string())));
        }
        if let Some(child_ids) = &patch.child_ids {
            assignments.push("child_uuids = ?".to_string());
            bind_values.push(Value::Text(encode_child_ids(child_ids)?));
        }
        if let Some(position) = patch.position {
            assignments.push("position = ?".to_string());
            bind_values.push(Value::Integer(position));
        }
        assignments.push(format!("updated_at = {NOW_MS_SQL}"));
        bind_values.push(Value::Text(block_id.to_string()));

        let sql = format!(
            "UPDATE blocks SET {} WHERE block_uuid = ?;",
            assignments.join(", ")
        );
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(StoreError::BlockNotFound(block_id));
        }
        Ok(())
    }

    fn set_positions(&self, positions: &[(BlockId, i64)]) -> StoreResult<()> {
        self.atomically(|store| {
            let sql = format!(
                "UPDATE blocks
                 SET position = ?2,
                     updated_at = {NOW_MS_SQL}
                 WHERE block_uuid = ?1;"
            );
            let mut stmt = store.conn.prepare(&sql)?;
            for (block_id, position) in positions {
                let changed = stmt.execute(params![block_id.to_string(), position])?;
                if changed == 0 {
                    return Err(StoreError::BlockNotFound(*block_id));
                }
            }
            Ok(())
        })
    }

    fn delete_block(&self, block_id: BlockId) -> StoreResult<bool> {
        let removed = self.atomically(|store| {
            let Some(block) = store.get_block(block_id)? else {
                return Ok(None);
            };

            let removed = store.delete_subtree(&block)?;

            if let Some(parent_id) = block.parent_id {
                match store.get_block(parent_id)? {
                    Some(parent) => {
                        let child_ids: Vec<BlockId> = parent
                            .child_ids
                            .into_iter()
                            .filter(|id| *id != block_id)
                            .collect();
                        store.write_child_ids(parent_id, &child_ids)?;
                    }
                    None => warn!(
                        "event=block_delete module=store status=warn block_id={} error_code=parent_missing parent_id={}",
                        block_id, parent_id
                    ),
                }
            }
            Ok(Some(removed))
        })?;

        match removed {
            Some(removed) => {
                info!(
                    "event=block_delete module=store status=ok block_id={} rows_removed={}",
                    block_id, removed
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn export_page(&self, page_id: PageId) -> StoreResult<PageSnapshot> {
        let page = self.require_page(page_id)?;
        let blocks = document_order(self.get_all_page_blocks(page_id)?);
        Ok(PageSnapshot { page, blocks })
    }

    fn import_page(&self, snapshot: &PageSnapshot) -> StoreResult<PageId> {
        validate_snapshot(snapshot)?;

        let new_page_id = self.atomically(|store| {
            let parent_id = match snapshot.page.parent_id {
                Some(parent_id) if store.get_page(parent_id)?.is_some() => Some(parent_id),
                _ => None,
            };
            let page = Page {
                id: Uuid::new_v4(),
                title: normalize_page_title(&snapshot.page.title),
                parent_id,
                ..snapshot.page.clone()
            };
            store.insert_page_row(&page)?;

            let mut id_map: HashMap<BlockId, BlockId> = HashMap::new();
            for source in &snapshot.blocks {
                let parent_id = match source.parent_id {
                    None => None,
                    Some(old_parent) => Some(*id_map.get(&old_parent).ok_or_else(|| {
                        StoreError::MalformedImport(format!(
                            "block {} references parent {} before it was imported",
                            source.id, old_parent
                        ))
                    })?),
                };
                let block = Block {
                    id: Uuid::new_v4(),
                    page_id: page.id,
                    parent_id,
                    child_ids: Vec::new(),
                    ..source.clone()
                };
                store.insert_block_row(&block)?;
                id_map.insert(source.id, block.id);
            }

            for source in snapshot.blocks.iter().filter(|b| !b.child_ids.is_empty()) {
                let child_ids = source
                    .child_ids
                    .iter()
                    .map(|old_child| {
                        id_map.get(old_child).copied().ok_or_else(|| {
                            StoreError::MalformedImport(format!(
                                "block {} lists unknown child {}",
                                source.id, old_child
                            ))
                        })
                    })
                    .collect::<StoreResult<Vec<BlockId>>>()?;
                store.conn.execute(
                    "UPDATE blocks SET child_uuids = ?2 WHERE block_uuid = ?1;",
                    params![id_map[&source.id].to_string(), encode_child_ids(&child_ids)?],
                )?;
            }

            Ok(page.id)
        })?;

        info!(
            "event=page_import module=store status=ok page_id={} blocks={}",
            new_page_id,
            snapshot.blocks.len()
        );
        Ok(new_page_id)
    }
}

/// Rejects snapshots that cannot produce a page satisfying the tree
/// invariants, before anything is written.
fn validate_snapshot(snapshot: &PageSnapshot) -> StoreResult<()> {
    let page_id = snapshot.page.id;
    let mut seen: HashSet<BlockId> = HashSet::new();
    for block in &snapshot.blocks {
        if block.page_id != page_id {
            return Err(StoreError::MalformedImport(format!(
                "block {} belongs to page {}, expected {}",
                block.id, block.page_id, page_id
            )));
        }
        if !seen.insert(block.id) {
            return Err(StoreError::MalformedImport(format!(
                "duplicate block id {}",
                block.id
            )));
        }
    }

    let mut listed_children: HashSet<BlockId> = HashSet::new();
    for block in &snapshot.blocks {
        for child_id in &block.child_ids {
            if !listed_children.insert(*child_id) {
                return Err(StoreError::MalformedImport(format!(
                    "block {child_id} is listed as a child more than once"
                )));
            }
        }
    }

    let by_id: HashMap<BlockId, &Block> = snapshot.blocks.iter().map(|b| (b.id, b)).collect();
    for block in &snapshot.blocks {
        if let Some(parent_id) = block.parent_id {
            let listed = by_id
                .get(&parent_id)
                .is_some_and(|parent| parent.child_ids.contains(&block.id));
            if !listed {
                return Err(StoreError::MalformedImport(format!(
                    "block {} is not listed by its parent {}",
                    block.id, parent_id
                )));
            }
        }
        for child_id in &block.child_ids {
            let points_back = by_id
                .get(child_id)
                .is_some_and(|child| child.parent_id == Some(block.id));
            if !points_back {
                return Err(StoreError::MalformedImport(format!(
                    "child {} of block {} does not reference it as parent",
                    child_id, block.id
                )));
            }
        }
    }
    Ok(())
}

fn collect_blocks(mut rows: rusqlite::Rows<'_>) -> StoreResult<Vec<Block>> {
    let mut blocks = Vec::new();
    while let Some(row) = rows.next()? {
        blocks.push(parse_block_row(row)?);
    }
    Ok(blocks)
}

fn parse_page_row(row: &Row<'_>) -> StoreResult<Page> {
    let page_uuid: String = row.get("page_uuid")?;
    let parent_uuid = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "pages.parent_uuid"))
        .transpose()?;

    Ok(Page {
        id: parse_uuid(&page_uuid, "pages.page_uuid")?,
        title: row.get("title")?,
        icon: row.get("icon")?,
        cover_image: row.get("cover_image")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        is_favorite: parse_bool(row.get("is_favorite")?, "pages.is_favorite")?,
        parent_id: parent_uuid,
    })
}

fn parse_block_row(row: &Row<'_>) -> StoreResult<Block> {
    let block_uuid: String = row.get("block_uuid")?;
    let page_uuid: String = row.get("page_uuid")?;
    let parent_uuid = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "blocks.parent_uuid"))
        .transpose()?;

    let type_text: String = row.get("type")?;
    let kind = BlockType::parse(&type_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid block type `{type_text}` in blocks.type"))
    })?;

    let properties_text: String = row.get("properties")?;
    let properties: BlockProperties = serde_json::from_str(&properties_text).map_err(|err| {
        StoreError::InvalidData(format!("invalid json in blocks.properties: {err}"))
    })?;

    let child_text: String = row.get("child_uuids")?;
    let child_ids: Vec<BlockId> = serde_json::from_str(&child_text).map_err(|err| {
        StoreError::InvalidData(format!("invalid json in blocks.child_uuids: {err}"))
    })?;

    Ok(Block {
        id: parse_uuid(&block_uuid, "blocks.block_uuid")?,
        page_id: parse_uuid(&page_uuid, "blocks.page_uuid")?,
        kind,
        content: row.get("content")?,
        properties,
        parent_id: parent_uuid,
        child_ids,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn encode_properties(properties: &BlockProperties) -> StoreResult<String> {
    serde_json::to_string(properties)
        .map_err(|err| StoreError::InvalidData(format!("cannot encode block properties: {err}")))
}

fn encode_child_ids(child_ids: &[BlockId]) -> StoreResult<String> {
    serde_json::to_string(child_ids)
        .map_err(|err| StoreError::InvalidData(format!("cannot encode child ids: {err}")))
}

fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_bool(value: i64, column: &'static str) -> StoreResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

fn optional_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["pages", "blocks"] {
        let exists = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                [table],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }
    Ok(())
}
