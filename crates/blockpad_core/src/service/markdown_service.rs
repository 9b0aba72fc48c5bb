//! Markdown import/export against the block store.
//!
//! # Responsibility
//! - Store parsed markdown as root blocks of a page.
//! - Export a page's blocks as markdown in document order.
//!
//! # Invariants
//! - Imports are all-or-nothing per call.
//! - Imported blocks are flat root siblings with dense positions that follow
//!   the page's existing root blocks.

use crate::codec::markdown::{parse_markdown, render_markdown};
use crate::model::block::{BlockId, BlockType};
use crate::model::page::PageId;
use crate::repo::block_store::{BlockStore, NewBlock};
use crate::repo::error::StoreResult;
use crate::service::outline::load_outline;
use log::info;

/// Appends the blocks parsed from `markdown` after the page's root blocks.
///
/// Returns the new block ids in document order.
pub fn markdown_to_blocks<S: BlockStore>(
    store: &S,
    page_id: PageId,
    markdown: &str,
) -> StoreResult<Vec<BlockId>> {
    let ids = store.atomically(|store| {
        store.require_page(page_id)?;
        let mut position = store
            .get_page_blocks(page_id)?
            .iter()
            .map(|block| block.position + 1)
            .max()
            .unwrap_or(0);

        let mut ids = Vec::new();
        for parsed in parse_markdown(markdown) {
            let draft = NewBlock {
                page_id,
                kind: parsed.kind,
                content: parsed.content,
                properties: parsed.properties,
                parent_id: None,
                position,
            };
            ids.push(store.insert_block(&draft)?);
            position += 1;
        }
        Ok(ids)
    })?;

    info!(
        "event=markdown_import module=markdown status=ok page_id={} blocks={}",
        page_id,
        ids.len()
    );
    Ok(ids)
}

/// Renders every block of a page as markdown.
pub fn blocks_to_markdown<S: BlockStore>(store: &S, page_id: PageId) -> StoreResult<String> {
    let outline = load_outline(store, page_id)?;
    let blocks = outline.into_blocks();
    let markdown = render_markdown(&blocks);
    info!(
        "event=markdown_export module=markdown status=ok page_id={} blocks={}",
        page_id,
        blocks.len()
    );
    Ok(markdown)
}

/// Replaces a page's blocks with the blocks parsed from `markdown`.
///
/// A page left without blocks gets one empty root text block.
pub fn replace_with_markdown<S: BlockStore>(
    store: &S,
    page_id: PageId,
    markdown: &str,
) -> StoreResult<Vec<BlockId>> {
    store.atomically(|store| {
        store.require_page(page_id)?;
        for block in store.get_all_page_blocks(page_id)? {
            store.delete_block(block.id)?;
        }

        let ids = markdown_to_blocks(store, page_id, markdown)?;
        if !ids.is_empty() {
            return Ok(ids);
        }
        let placeholder = store.create_block(page_id, BlockType::Text, "", None, 0)?;
        Ok(vec![placeholder])
    })
}
