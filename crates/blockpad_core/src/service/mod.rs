//! Use-case services over the block store.
//!
//! # Responsibility
//! - Turn editing intents into consistent store writes (`tree_engine`).
//! - Connect the markdown codec to stored pages (`markdown_service`).
//! - Project, verify and repair page trees (`outline`, `consistency`).

pub mod consistency;
pub mod markdown_service;
pub mod outline;
pub mod tree_engine;
