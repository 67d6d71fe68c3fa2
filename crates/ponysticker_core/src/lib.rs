//! Core domain logic for PonySticker.
//! Catalog storage, search normalization, bundle ingestion and package
//! authoring live here; the HTTP and CLI crates only wire them up.

pub mod bundle;
pub mod config;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use bundle::{BundleError, BundleStore, StickerName};
pub use config::Paths;
pub use db::{open_db, open_db_in_memory, DbError};
pub use ingest::coordinator::{IngestReport, Ingestor};
pub use ingest::fetch::{BundleSource, Fetcher, HttpTransport};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::package::{OrderKey, Package, PackageId, Repo, StickerId};
pub use repo::catalog_repo::{CatalogRepository, RepoError, RepoResult, SqliteCatalog};
pub use search::tokenizer::normalize;
pub use service::create_service::{CreateRequest, PackageAuthor};
pub use service::index_service::PackageIndexer;
pub use service::query_service::{ListRequest, QueryError, QueryService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
