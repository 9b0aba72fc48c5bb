//! Whole-page snapshot used for backup and migration.
//!
//! # Invariants
//! - Blocks are listed parents-first, so an importer can remap parent ids in
//!   one forward pass.

use crate::model::block::Block;
use crate::model::page::Page;
use serde::{Deserialize, Serialize};

/// Serializable `{ page, blocks }` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub page: Page,
    pub blocks: Vec<Block>,
}

impl PageSnapshot {
    /// Encodes the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Decodes a snapshot from JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
