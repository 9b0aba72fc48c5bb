//! Tree mutation engine over the block store.
//!
//! # Responsibility
//! - Translate editing intents (indent, outdent, split, merge, reorder)
//!   into block store writes.
//! - Keep parent/child references consistent across every structural
//!   operation.
//!
//! # Invariants
//! - The engine keeps no tree state between calls; every operation re-reads
//!   what it needs from the store.
//! - Each operation runs inside one `BlockStore::atomically` unit.
//! - `parent_id` and `child_ids` agree after every completed operation.
//! - Sibling positions are dense after every operation only under
//!   `PositionPolicy::Immediate`; under `Deferred` they are restored by
//!   `reorder_blocks`, `update_block_positions` or `normalize_group`.

use crate::model::block::{BlockId, BlockPatch, BlockType};
use crate::model::page::PageId;
use crate::repo::block_store::BlockStore;
use crate::repo::error::{StoreError, StoreResult};
use log::{debug, info, warn};
use std::collections::HashSet;

/// When sibling positions are renumbered after a structural change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PositionPolicy {
    /// Raw operations may leave gaps or duplicate ranks; callers normalize.
    #[default]
    Deferred,
    /// Every affected sibling group is renumbered in the same transaction.
    Immediate,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub position_policy: PositionPolicy,
}

/// Result of merging a deleted block into its predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedBlock {
    /// Block that received the deleted block's content.
    pub target_id: BlockId,
    /// Target content after the merge.
    pub content: String,
}

/// Structural editing operations on one store.
pub struct TreeEngine<S: BlockStore> {
    store: S,
    config: EngineConfig,
}

impl<S: BlockStore> TreeEngine<S> {
    /// Creates an engine with the default (deferred) position policy.
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Underlying store, for queries and plain record updates.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn renumbers(&self) -> bool {
        self.config.position_policy == PositionPolicy::Immediate
    }

    /// Makes a block the last child of its previous sibling.
    ///
    /// Returns `Ok(false)` when the block is the first of its sibling group.
    pub fn indent(&self, block_id: BlockId) -> StoreResult<bool> {
        let new_parent = self.store.atomically(|store| {
            let block = store.require_block(block_id)?;
            let siblings = sibling_order(store, block.page_id, block.parent_id)?;
            let index = index_in_group(&siblings, block_id, block.page_id, block.parent_id)?;
            if index == 0 {
                return Ok(None);
            }

            let previous = store.require_block(siblings[index - 1])?;
            let mut adopted: Vec<BlockId> = previous
                .child_ids
                .iter()
                .copied()
                .filter(|id| *id != block_id)
                .collect();
            adopted.push(block_id);
            store.update_block(
                previous.id,
                &BlockPatch {
                    child_ids: Some(adopted.clone()),
                    ..BlockPatch::default()
                },
            )?;

            if let Some(old_parent_id) = block.parent_id {
                detach_child(store, old_parent_id, block_id)?;
            }

            store.update_block(
                block_id,
                &BlockPatch {
                    parent_id: Some(Some(previous.id)),
                    position: Some(adopted.len() as i64 - 1),
                    ..BlockPatch::default()
                },
            )?;

            if self.renumbers() {
                normalize_group_in(store, block.page_id, block.parent_id)?;
                normalize_group_in(store, block.page_id, Some(previous.id))?;
            }
            Ok(Some(previous.id))
        })?;

        match new_parent {
            Some(parent_id) => {
                info!(
                    "event=block_indent module=engine status=ok block_id={} parent_id={}",
                    block_id, parent_id
                );
                Ok(true)
            }
            None => {
                debug!(
                    "event=block_indent module=engine status=noop block_id={} reason=first_sibling",
                    block_id
                );
                Ok(false)
            }
        }
    }

    /// Moves a block out of its parent, directly after the former parent.
    ///
    /// Returns `Ok(false)` for root blocks and for blocks whose parent record
    /// is missing.
    pub fn outdent(&self, block_id: BlockId) -> StoreResult<bool> {
        let moved = self.store.atomically(|store| {
            let block = store.require_block(block_id)?;
            let Some(parent_id) = block.parent_id else {
                return Ok(false);
            };
            let Some(parent) = store.get_block(parent_id)? else {
                warn!(
                    "event=block_outdent module=engine status=noop block_id={} error_code=parent_missing parent_id={}",
                    block_id, parent_id
                );
                return Ok(false);
            };

            detach_child(store, parent.id, block_id)?;

            if let Some(grandparent_id) = parent.parent_id {
                let grandparent = store.require_block(grandparent_id)?;
                let mut child_ids = grandparent.child_ids;
                move_after(&mut child_ids, block_id, parent.id);
                store.update_block(
                    grandparent_id,
                    &BlockPatch {
                        child_ids: Some(child_ids),
                        ..BlockPatch::default()
                    },
                )?;
            }

            store.update_block(
                block_id,
                &BlockPatch {
                    parent_id: Some(parent.parent_id),
                    position: Some(parent.position + 1),
                    ..BlockPatch::default()
                },
            )?;

            if self.renumbers() {
                normalize_group_in(store, block.page_id, Some(parent.id))?;
                let mut order = sibling_order(store, block.page_id, parent.parent_id)?;
                move_after(&mut order, block_id, parent.id);
                write_group(store, parent.parent_id, &order)?;
            }
            Ok(true)
        })?;

        if moved {
            info!(
                "event=block_outdent module=engine status=ok block_id={}",
                block_id
            );
        }
        Ok(moved)
    }

    /// Assigns `position = index` to one sibling group in the given order.
    ///
    /// Every id must belong to the `(page_id, parent_id)` group. Group members
    /// missing from the list follow the listed ones in their current order, so
    /// the whole group ends up dense. For block parents, `child_ids` is
    /// rewritten to the same order.
    pub fn reorder_blocks(
        &self,
        page_id: PageId,
        parent_id: Option<BlockId>,
        ordered_block_ids: &[BlockId],
    ) -> StoreResult<()> {
        self.store.atomically(|store| {
            let mut seen = HashSet::new();
            for block_id in ordered_block_ids {
                if !seen.insert(*block_id) {
                    return Err(StoreError::InvalidOperation(format!(
                        "block {block_id} appears twice in reorder request"
                    )));
                }
                let block = store.require_block(*block_id)?;
                if block.page_id != page_id || block.parent_id != parent_id {
                    return Err(StoreError::NotInSiblingGroup {
                        block_id: *block_id,
                        page_id,
                        parent_id,
                    });
                }
            }
            let mut order = ordered_block_ids.to_vec();
            for member in sibling_order(store, page_id, parent_id)? {
                if !seen.contains(&member) {
                    order.push(member);
                }
            }
            write_group(store, parent_id, &order)
        })?;

        debug!(
            "event=blocks_reorder module=engine status=ok page_id={} count={}",
            page_id,
            ordered_block_ids.len()
        );
        Ok(())
    }

    /// Assigns `position = index` to blocks in the caller's display order,
    /// regardless of sibling group.
    pub fn update_block_positions(&self, ordered_block_ids: &[BlockId]) -> StoreResult<()> {
        let positions: Vec<(BlockId, i64)> = ordered_block_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index as i64))
            .collect();
        self.store.set_positions(&positions)
    }

    /// Rewrites one sibling group to dense positions `0..n-1`.
    ///
    /// Block parents keep their `child_ids` order; root groups keep their
    /// current `position` order, ties broken by insertion order.
    pub fn normalize_group(&self, page_id: PageId, parent_id: Option<BlockId>) -> StoreResult<()> {
        self.store
            .atomically(|store| normalize_group_in(store, page_id, parent_id))
    }

    /// Inserts a new text block right after `block_id` under the same parent.
    pub fn create_block_below(&self, block_id: BlockId, content: &str) -> StoreResult<BlockId> {
        let new_id = self.store.atomically(|store| {
            let current = store.require_block(block_id)?;
            let new_id = store.create_block(
                current.page_id,
                BlockType::Text,
                content,
                current.parent_id,
                current.position + 1,
            )?;

            if let Some(parent_id) = current.parent_id {
                let parent = store.require_block(parent_id)?;
                let mut child_ids = parent.child_ids;
                move_after(&mut child_ids, new_id, current.id);
                store.update_block(
                    parent_id,
                    &BlockPatch {
                        child_ids: Some(child_ids),
                        ..BlockPatch::default()
                    },
                )?;
            }

            if self.renumbers() {
                let mut order = sibling_order(store, current.page_id, current.parent_id)?;
                move_after(&mut order, new_id, current.id);
                write_group(store, current.parent_id, &order)?;
            }
            Ok(new_id)
        })?;

        debug!(
            "event=block_create_below module=engine status=ok block_id={} new_block_id={}",
            block_id, new_id
        );
        Ok(new_id)
    }

    /// Splits a block at a character offset: the head stays, the tail moves
    /// into a new text block below. Offsets past the end split at the end.
    pub fn split_block(&self, block_id: BlockId, char_offset: usize) -> StoreResult<BlockId> {
        self.store.atomically(|_| {
            let block = self.store.require_block(block_id)?;
            let split_at = block
                .content
                .char_indices()
                .nth(char_offset)
                .map_or(block.content.len(), |(index, _)| index);
            let (head, tail) = block.content.split_at(split_at);
            self.store.update_block_content(block_id, head)?;
            self.create_block_below(block_id, tail)
        })
    }

    /// Deletes a block after appending its content to its predecessor (the
    /// previous sibling, else the parent).
    ///
    /// Descendants of the deleted block are deleted with it. Returns
    /// `Ok(None)` without deleting anything when there is no predecessor.
    pub fn delete_and_merge(&self, block_id: BlockId) -> StoreResult<Option<MergedBlock>> {
        let merged = self.store.atomically(|store| {
            let block = store.require_block(block_id)?;
            let siblings = sibling_order(store, block.page_id, block.parent_id)?;
            let index = index_in_group(&siblings, block_id, block.page_id, block.parent_id)?;
            let target_id = match (index, block.parent_id) {
                (0, None) => return Ok(None),
                (0, Some(parent_id)) => parent_id,
                (index, _) => siblings[index - 1],
            };

            let target = store.require_block(target_id)?;
            let content = format!("{}{}", target.content, block.content);
            store.update_block_content(target_id, &content)?;
            store.delete_block(block_id)?;

            if self.renumbers() {
                normalize_group_in(store, block.page_id, block.parent_id)?;
            }
            Ok(Some(MergedBlock { target_id, content }))
        })?;

        match &merged {
            Some(merged) => info!(
                "event=block_merge module=engine status=ok block_id={} target_id={}",
                block_id, merged.target_id
            ),
            None => debug!(
                "event=block_merge module=engine status=noop block_id={} reason=no_predecessor",
                block_id
            ),
        }
        Ok(merged)
    }

    /// Changes a block's type.
    pub fn change_type(&self, block_id: BlockId, kind: BlockType) -> StoreResult<()> {
        self.store.update_block_type(block_id, kind)
    }

    /// Replaces a block's content.
    pub fn edit_content(&self, block_id: BlockId, content: &str) -> StoreResult<()> {
        self.store.update_block_content(block_id, content)
    }

    /// Deletes a block and its descendants.
    pub fn delete_block(&self, block_id: BlockId) -> StoreResult<bool> {
        self.store.atomically(|store| {
            let Some(block) = store.get_block(block_id)? else {
                return Ok(false);
            };
            store.delete_block(block_id)?;
            if self.renumbers() {
                normalize_group_in(store, block.page_id, block.parent_id)?;
            }
            Ok(true)
        })
    }
}

/// Current order of a sibling group. Block parents order by `child_ids`
/// (members missing from it follow by position); root groups by position.
pub(crate) fn sibling_order<S: BlockStore>(
    store: &S,
    page_id: PageId,
    parent_id: Option<BlockId>,
) -> StoreResult<Vec<BlockId>> {
    let siblings = store.get_sibling_blocks(page_id, parent_id)?;
    let Some(parent_id) = parent_id else {
        return Ok(siblings.into_iter().map(|block| block.id).collect());
    };

    let members: HashSet<BlockId> = siblings.iter().map(|block| block.id).collect();
    let mut seen = HashSet::new();
    let mut order: Vec<BlockId> = Vec::with_capacity(siblings.len());
    if let Some(parent) = store.get_block(parent_id)? {
        for child_id in parent.child_ids {
            if members.contains(&child_id) && seen.insert(child_id) {
                order.push(child_id);
            }
        }
    }
    for block in siblings {
        if seen.insert(block.id) {
            order.push(block.id);
        }
    }
    Ok(order)
}

/// Writes dense positions for `order` and, for block parents, makes
/// `child_ids` follow the same order.
pub(crate) fn write_group<S: BlockStore>(
    store: &S,
    parent_id: Option<BlockId>,
    order: &[BlockId],
) -> StoreResult<()> {
    let positions: Vec<(BlockId, i64)> = order
        .iter()
        .enumerate()
        .map(|(index, id)| (*id, index as i64))
        .collect();
    store.set_positions(&positions)?;

    if let Some(parent_id) = parent_id {
        let parent = store.require_block(parent_id)?;
        let mut child_ids = order.to_vec();
        for child_id in parent.child_ids {
            if !child_ids.contains(&child_id) {
                child_ids.push(child_id);
            }
        }
        store.update_block(
            parent_id,
            &BlockPatch {
                child_ids: Some(child_ids),
                ..BlockPatch::default()
            },
        )?;
    }
    Ok(())
}

pub(crate) fn normalize_group_in<S: BlockStore>(
    store: &S,
    page_id: PageId,
    parent_id: Option<BlockId>,
) -> StoreResult<()> {
    let order = sibling_order(store, page_id, parent_id)?;
    write_group(store, parent_id, &order)
}

fn detach_child<S: BlockStore>(store: &S, parent_id: BlockId, child_id: BlockId) -> StoreResult<()> {
    let Some(parent) = store.get_block(parent_id)? else {
        return Ok(());
    };
    let child_ids: Vec<BlockId> = parent
        .child_ids
        .into_iter()
        .filter(|id| *id != child_id)
        .collect();
    store.update_block(
        parent_id,
        &BlockPatch {
            child_ids: Some(child_ids),
            ..BlockPatch::default()
        },
    )
}

fn index_in_group(
    order: &[BlockId],
    block_id: BlockId,
    page_id: PageId,
    parent_id: Option<BlockId>,
) -> StoreResult<usize> {
    order
        .iter()
        .position(|id| *id == block_id)
        .ok_or(StoreError::NotInSiblingGroup {
            block_id,
            page_id,
            parent_id,
        })
}

/// Moves `block_id` directly after `anchor_id`, or to the end when the
/// anchor is absent.
fn move_after(order: &mut Vec<BlockId>, block_id: BlockId, anchor_id: BlockId) {
    order.retain(|id| *id != block_id);
    let index = order
        .iter()
        .position(|id| *id == anchor_id)
        .map_or(order.len(), |index| index + 1);
    order.insert(index, block_id);
}
