//! Storage and structure core of a block-based markdown editor.
//!
//! A page is a tree of typed blocks persisted in SQLite. This crate owns the
//! tree invariants; front ends only issue intents.

pub mod codec;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use codec::markdown::{parse_markdown, render_markdown, ParsedBlock};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::block::{Block, BlockId, BlockPatch, BlockProperties, BlockType};
pub use model::page::{Page, PageId, PagePatch};
pub use model::snapshot::PageSnapshot;
pub use repo::block_store::{BlockStore, NewBlock, SqliteBlockStore};
pub use repo::error::{ErrorKind, StoreError, StoreResult};
pub use service::consistency::{repair_page, verify_page, ConsistencyReport, Violation};
pub use service::markdown_service::{blocks_to_markdown, markdown_to_blocks, replace_with_markdown};
pub use service::outline::{load_outline, OutlineNode, PageOutline};
pub use service::tree_engine::{EngineConfig, MergedBlock, PositionPolicy, TreeEngine};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
