//! Block-document domain model.
//!
//! # Responsibility
//! - Define the `Page` and `Block` records persisted by the store.
//! - Keep records as plain data; live trees are projections built elsewhere.
//!
//! # Invariants
//! - Every record is identified by a stable random UUID.
//! - A block's `child_ids` and its children's `parent_id` agree.

pub mod block;
pub mod page;
pub mod snapshot;
