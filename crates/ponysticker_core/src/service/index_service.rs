//! Package indexing use-case.
//!
//! # Responsibility
//! - Turn a package directory on disk into a catalog row plus index row.
//! - Refresh the per-partition count summaries.
//!
//! # Invariants
//! - Index text is produced by the same tokenizer used for queries.
//! - The metadata document's `packageId` must match the directory id.

use crate::bundle::{BundleError, BundleStore};
use crate::model::package::{Package, PackageId, Repo};
use crate::repo::catalog_repo::{CatalogRepository, IndexRow, RepoError};
use crate::search::tokenizer::normalize;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug)]
pub enum IndexError {
    Bundle(BundleError),
    Repo(RepoError),
    IdMismatch {
        directory: PackageId,
        metadata: PackageId,
    },
}

impl IndexError {
    /// Whether the package was already in the catalog.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Repo(RepoError::AlreadyExists { .. }))
    }
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bundle(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::IdMismatch {
                directory,
                metadata,
            } => write!(
                f,
                "package directory {directory} holds metadata for package {metadata}"
            ),
        }
    }
}

impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Bundle(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::IdMismatch { .. } => None,
        }
    }
}

impl From<BundleError> for IndexError {
    fn from(value: BundleError) -> Self {
        Self::Bundle(value)
    }
}

impl From<RepoError> for IndexError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Builds the normalized index row of a package.
pub fn index_row(package: &Package) -> IndexRow {
    IndexRow {
        title: normalize(&package.title_text()),
        author: normalize(&package.author_text()),
    }
}

/// Indexes package directories into the catalog.
#[derive(Clone)]
pub struct PackageIndexer {
    catalog: Arc<dyn CatalogRepository>,
    store: BundleStore,
}

impl PackageIndexer {
    pub fn new(catalog: Arc<dyn CatalogRepository>, store: BundleStore) -> Self {
        Self { catalog, store }
    }

    /// Reads `<id>/productInfo.meta` and inserts it into its partition.
    ///
    /// Fails with `RepoError::AlreadyExists` when the id is already stored.
    pub fn insert_package(&self, id: PackageId) -> IndexResult<Package> {
        let repo = Repo::for_package(id).ok_or(RepoError::NoPartition(id))?;
        let package = self.store.read_package(id)?;
        if package.package_id != id {
            return Err(IndexError::IdMismatch {
                directory: id,
                metadata: package.package_id,
            });
        }

        self.catalog
            .insert(repo, &package, &index_row(&package), now_millis())?;
        info!("event=package_insert module=service status=ok repo={repo} package_id={id}");
        Ok(package)
    }

    /// Recomputes the summary count of every partition.
    ///
    /// Partitions that fail are logged and skipped.
    pub fn refresh_counts(&self) -> Vec<(Repo, i64)> {
        Repo::ALL
            .into_iter()
            .filter_map(|repo| self.refresh_count(repo))
            .collect()
    }

    /// Recomputes the summary count of one partition.
    pub fn refresh_count(&self, repo: Repo) -> Option<(Repo, i64)> {
        match self.catalog.refresh_count(repo) {
            Ok(count) => {
                info!("event=count_refresh module=service status=ok repo={repo} count={count}");
                Some((repo, count))
            }
            Err(err) => {
                error!("event=count_refresh module=service status=error repo={repo} error={err}");
                None
            }
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
