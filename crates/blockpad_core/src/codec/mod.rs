//! Store-free text codecs.
//!
//! # Responsibility
//! - Convert between external text formats and block records without
//!   touching storage.

pub mod markdown;
