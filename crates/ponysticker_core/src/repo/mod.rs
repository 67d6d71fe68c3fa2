//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the catalog storage contract used by ingestion and queries.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`AlreadyExists`, `NoPartition`)
//!   in addition to DB transport errors.

pub mod catalog_repo;
