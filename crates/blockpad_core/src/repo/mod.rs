//! Repository layer: the persistence store for pages and blocks.
//!
//! # Responsibility
//! - Define the `BlockStore` data access contract.
//! - Isolate SQLite query details from engine and codec orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`PageNotFound`,
//!   `BlockNotFound`, `MalformedImport`) in addition to DB transport errors.

pub mod block_store;
pub mod error;
