//! Sticker package domain model.
//!
//! # Responsibility
//! - Define the package record shared by ingestion, storage and queries.
//! - Own the closed set of catalog partitions and sort orders.
//!
//! # Invariants
//! - A package id selects at most one partition.
//! - Stored packages are immutable; there is no update shape.

pub mod package;
