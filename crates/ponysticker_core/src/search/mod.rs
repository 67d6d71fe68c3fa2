//! Full-text search entry points.
//!
//! # Responsibility
//! - Normalize titles, authors and queries into a shared token stream.
//! - Turn normalized text into FTS5 match expressions.

pub mod fts;
pub mod tokenizer;
