//! Batch ingestion of a package id range.
//!
//! # Responsibility
//! - Feed every id of `[begin, end)` to a fixed pool of workers.
//! - Run the per-id pipeline: existence check, fetch, unpack, index.
//!
//! # Invariants
//! - The handoff channel has zero capacity: the producer blocks until a worker
//!   takes the id.
//! - `run` returns only after every worker has finished.
//! - A failing id never affects other ids.

use crate::bundle::BundleStore;
use crate::ingest::fetch::{BundleSource, FetchError, FetchOutcome};
use crate::ingest::unpack::{UnpackError, Unpacker};
use crate::model::package::{PackageId, Repo};
use crate::repo::catalog_repo::{CatalogRepository, RepoError};
use crate::service::index_service::{IndexError, PackageIndexer};
use crossbeam::channel;
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::AddAssign;
use std::sync::Arc;
use std::thread;

pub const WORKER_COUNT: usize = 10;

#[derive(Debug)]
pub enum IngestError {
    Repo(RepoError),
    Fetch(FetchError),
    Unpack(UnpackError),
    Index(IndexError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Fetch(err) => write!(f, "{err}"),
            Self::Unpack(err) => write!(f, "{err}"),
            Self::Index(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Fetch(err) => Some(err),
            Self::Unpack(err) => Some(err),
            Self::Index(err) => Some(err),
        }
    }
}

/// Tally of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub stored: usize,
    /// Already stored, or outside every partition.
    pub skipped: usize,
    /// The store reported the package as absent.
    pub missing: usize,
    pub failed: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.stored + self.skipped + self.missing + self.failed
    }

    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Stored => self.stored += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Missing => self.missing += 1,
            JobOutcome::Failed => self.failed += 1,
        }
    }
}

impl AddAssign for IngestReport {
    fn add_assign(&mut self, rhs: Self) {
        self.stored += rhs.stored;
        self.skipped += rhs.skipped;
        self.missing += rhs.missing;
        self.failed += rhs.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Stored,
    Skipped,
    Missing,
    Failed,
}

/// Fetches, unpacks and indexes ranges of store packages.
pub struct Ingestor<S> {
    catalog: Arc<dyn CatalogRepository>,
    source: S,
    unpacker: Unpacker,
    indexer: PackageIndexer,
    workers: usize,
}

impl<S: BundleSource> Ingestor<S> {
    pub fn new(catalog: Arc<dyn CatalogRepository>, source: S, store: BundleStore) -> Self {
        Self {
            indexer: PackageIndexer::new(Arc::clone(&catalog), store.clone()),
            unpacker: Unpacker::new(store),
            catalog,
            source,
            workers: WORKER_COUNT,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Ingests every id in `[begin, end)` and waits for all of them.
    pub fn run(&self, begin: PackageId, end: PackageId) -> IngestReport {
        info!("event=ingest_start module=ingest status=ok begin={begin} end={end}");
        let (sender, receiver) = channel::bounded::<PackageId>(0);

        let report = thread::scope(|scope| {
            let handles: Vec<_> = (0..self.workers)
                .map(|_| {
                    let receiver = receiver.clone();
                    scope.spawn(move || {
                        let mut report = IngestReport::default();
                        for id in receiver {
                            report.record(&self.ingest_one(id));
                        }
                        report
                    })
                })
                .collect();
            drop(receiver);

            for id in begin..end {
                if sender.send(id).is_err() {
                    break;
                }
            }
            drop(sender);

            let mut total = IngestReport::default();
            for handle in handles {
                match handle.join() {
                    Ok(partial) => total += partial,
                    Err(_) => error!("event=ingest_worker module=ingest status=error reason=panic"),
                }
            }
            total
        });

        info!(
            "event=ingest_finish module=ingest status=ok stored={} skipped={} missing={} failed={}",
            report.stored, report.skipped, report.missing, report.failed
        );
        report
    }

    fn ingest_one(&self, id: PackageId) -> JobOutcome {
        match self.process(id) {
            Ok(outcome) => outcome,
            Err(IngestError::Index(err)) if err.is_already_exists() => {
                debug!("event=ingest_package module=ingest status=skip package_id={id} reason=raced");
                JobOutcome::Skipped
            }
            Err(err) => {
                error!("event=ingest_package module=ingest status=error package_id={id} error={err}");
                JobOutcome::Failed
            }
        }
    }

    fn process(&self, id: PackageId) -> Result<JobOutcome, IngestError> {
        let Some(repo) = Repo::for_package(id) else {
            debug!("event=ingest_package module=ingest status=skip package_id={id} reason=no_partition");
            return Ok(JobOutcome::Skipped);
        };
        if self.catalog.exists(repo, id).map_err(IngestError::Repo)? {
            return Ok(JobOutcome::Skipped);
        }

        let body = match self.source.fetch(id).map_err(IngestError::Fetch)? {
            FetchOutcome::Found(body) => body,
            FetchOutcome::Missing { status } => {
                debug!("event=ingest_package module=ingest status=skip package_id={id} reason=missing http_status={status}");
                return Ok(JobOutcome::Missing);
            }
        };

        self.unpacker.unpack(id, body).map_err(IngestError::Unpack)?;
        self.indexer.insert_package(id).map_err(IngestError::Index)?;
        Ok(JobOutcome::Stored)
    }
}

#[cfg(test)]
mod tests {
    use super::{IngestReport, JobOutcome};

    #[test]
    fn report_tallies_outcomes() {
        let mut report = IngestReport::default();
        for outcome in [
            JobOutcome::Stored,
            JobOutcome::Stored,
            JobOutcome::Skipped,
            JobOutcome::Missing,
            JobOutcome::Failed,
        ] {
            report.record(&outcome);
        }
        assert_eq!(
            report,
            IngestReport {
                stored: 2,
                skipped: 1,
                missing: 1,
                failed: 1
            }
        );
        assert_eq!(report.total(), 5);
    }
}
