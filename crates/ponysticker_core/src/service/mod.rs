//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate bundle, catalog and search calls into use-case level APIs.
//! - Keep the HTTP and CLI layers decoupled from storage details.

pub mod create_service;
pub mod index_service;
pub mod query_service;
