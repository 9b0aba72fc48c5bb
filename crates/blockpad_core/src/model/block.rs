//! Block domain model.
//!
//! # Responsibility
//! - Define the typed content unit stored under a page.
//! - Provide stable string forms for block types used by storage and codec.
//!
//! # Invariants
//! - `child_ids` lists direct children in display order, without duplicates.
//! - `position` ranks a block among siblings sharing `(page_id, parent_id)`.
//! - `content` is plain text; no inline formatting is modeled.

use crate::model::page::PageId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a block.
pub type BlockId = Uuid;

/// Free-form block metadata stored as a JSON object.
pub type BlockProperties = Map<String, Value>;

/// Content kind of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Text,
    H1,
    H2,
    H3,
    Todo,
    Bullet,
    Numbered,
    Quote,
    Code,
    Toggle,
}

impl BlockType {
    /// Every block type, in declaration order.
    pub const ALL: [BlockType; 10] = [
        BlockType::Text,
        BlockType::H1,
        BlockType::H2,
        BlockType::H3,
        BlockType::Todo,
        BlockType::Bullet,
        BlockType::Numbered,
        BlockType::Quote,
        BlockType::Code,
        BlockType::Toggle,
    ];

    /// Storage and wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::H1 => "h1",
            Self::H2 => "h2",
            Self::H3 => "h3",
            Self::Todo => "todo",
            Self::Bullet => "bullet",
            Self::Numbered => "numbered",
            Self::Quote => "quote",
            Self::Code => "code",
            Self::Toggle => "toggle",
        }
    }

    /// Parses a storage name; `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl Display for BlockType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted block record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,
    pub page_id: PageId,
    #[serde(rename = "type")]
    pub kind: BlockType,
    pub content: String,
    #[serde(default)]
    pub properties: BlockProperties,
    /// `None` for root-level blocks.
    #[serde(default)]
    pub parent_id: Option<BlockId>,
    /// Authoritative order of direct children.
    #[serde(default)]
    pub child_ids: Vec<BlockId>,
    pub position: i64,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

impl Block {
    /// Returns whether this block sits at the top level of its page.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Reads a boolean property, treating absence as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.properties
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Partial block update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockPatch {
    pub kind: Option<BlockType>,
    pub content: Option<String>,
    pub properties: Option<BlockProperties>,
    pub parent_id: Option<Option<BlockId>>,
    pub child_ids: Option<Vec<BlockId>>,
    pub position: Option<i64>,
}

impl BlockPatch {
    /// Patch that only replaces content.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Patch that only replaces the block type.
    pub fn kind(kind: BlockType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Returns whether this patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.content.is_none()
            && self.properties.is_none()
            && self.parent_id.is_none()
            && self.child_ids.is_none()
            && self.position.is_none()
    }
}

/// Orders the blocks of one page depth-first: parents before children, root
/// siblings in input order, children in `child_ids` order.
///
/// Children whose parent does not list them follow the listed ones in input
/// order. Blocks unreachable from a root (orphans, cycles) come last.
pub fn document_order(blocks: Vec<Block>) -> Vec<Block> {
    let index_of: HashMap<BlockId, usize> = blocks
        .iter()
        .enumerate()
        .map(|(index, block)| (block.id, index))
        .collect();
    let mut unlisted_children: HashMap<BlockId, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        match block.parent_id {
            None => roots.push(index),
            Some(parent_id) => unlisted_children.entry(parent_id).or_default().push(index),
        }
    }

    let mut visited = vec![false; blocks.len()];
    let mut order = Vec::with_capacity(blocks.len());
    let mut stack: Vec<usize> = roots.into_iter().rev().collect();
    while let Some(index) = stack.pop() {
        if visited[index] {
            continue;
        }
        visited[index] = true;
        order.push(index);

        let block = &blocks[index];
        let mut children: Vec<usize> = block
            .child_ids
            .iter()
            .filter_map(|id| index_of.get(id).copied())
            .filter(|&child| blocks[child].parent_id == Some(block.id))
            .collect();
        if let Some(extra) = unlisted_children.get(&block.id) {
            for &child in extra {
                if !children.contains(&child) {
                    children.push(child);
                }
            }
        }
        stack.extend(children.into_iter().rev());
    }
    order.extend(
        visited
            .iter()
            .enumerate()
            .filter(|(_, seen)| !**seen)
            .map(|(index, _)| index),
    );

    let mut slots: Vec<Option<Block>> = blocks.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}
