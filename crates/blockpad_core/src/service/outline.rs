//! Read-only outline projection of a page.
//!
//! # Responsibility
//! - Rebuild the nested block tree of one page from flat store records.
//! - Provide document order (parents before children) for renderers and
//!   exporters.
//!
//! # Invariants
//! - Every block of the page appears exactly once in the outline.
//! - Blocks whose parent cannot be reached are surfaced as extra roots at the
//!   end instead of being dropped.

use crate::model::block::{document_order, Block, BlockId};
use crate::model::page::{Page, PageId};
use crate::repo::block_store::BlockStore;
use crate::repo::error::StoreResult;
use std::collections::HashMap;

/// One block with its nested children.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineNode {
    pub block: Block,
    /// Zero for top-level nodes.
    pub depth: usize,
    pub children: Vec<OutlineNode>,
}

/// Nested view of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutline {
    pub page: Page,
    pub roots: Vec<OutlineNode>,
}

impl PageOutline {
    /// Consumes the outline, returning blocks in document order.
    pub fn into_blocks(self) -> Vec<Block> {
        let mut out = Vec::new();
        let mut stack: Vec<OutlineNode> = self.roots.into_iter().rev().collect();
        while let Some(OutlineNode {
            block, children, ..
        }) = stack.pop()
        {
            out.push(block);
            stack.extend(children.into_iter().rev());
        }
        out
    }
}

/// Loads a page and projects its blocks into an outline.
pub fn load_outline<S: BlockStore>(store: &S, page_id: PageId) -> StoreResult<PageOutline> {
    let page = store.require_page(page_id)?;
    let blocks = store.get_all_page_blocks(page_id)?;
    Ok(PageOutline {
        page,
        roots: build_outline(blocks),
    })
}

/// Nests flat page blocks. Root order follows the input order, so pass
/// blocks sorted by position.
pub fn build_outline(blocks: Vec<Block>) -> Vec<OutlineNode> {
    let ordered = document_order(blocks);

    let mut depth_of: HashMap<BlockId, usize> = HashMap::with_capacity(ordered.len());
    let mut children_of: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    let mut root_ids = Vec::new();
    let mut depths = Vec::with_capacity(ordered.len());
    for block in &ordered {
        let placed_parent = block
            .parent_id
            .and_then(|parent_id| depth_of.get(&parent_id).map(|depth| (parent_id, *depth)));
        let depth = match placed_parent {
            Some((parent_id, parent_depth)) => {
                children_of.entry(parent_id).or_default().push(block.id);
                parent_depth + 1
            }
            None => {
                root_ids.push(block.id);
                0
            }
        };
        depth_of.insert(block.id, depth);
        depths.push(depth);
    }

    // Children follow their parent in document order, so a reverse walk
    // finishes every child node before its parent.
    let mut built: HashMap<BlockId, OutlineNode> = HashMap::with_capacity(ordered.len());
    for (block, depth) in ordered.into_iter().zip(depths).rev() {
        let children = children_of
            .remove(&block.id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child_id| built.remove(&child_id))
            .collect();
        built.insert(
            block.id,
            OutlineNode {
                block,
                depth,
                children,
            },
        );
    }

    root_ids
        .into_iter()
        .filter_map(|root_id| built.remove(&root_id))
        .collect()
}
