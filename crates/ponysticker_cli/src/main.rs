//! `ponysticker` command-line entry point.
//!
//! # Responsibility
//! - Resolve the home directory, start logging and open the catalog.
//! - Dispatch the batch commands and the query server.
//!
//! # Invariants
//! - Partition count summaries are refreshed after every catalog-mutating
//!   command, including ones that fail part-way.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use ponysticker_core::config::{Paths, DEFAULT_PORT, HOME_ENV};
use ponysticker_core::db::open_db;
use ponysticker_core::ingest::coordinator::Ingestor;
use ponysticker_core::ingest::fetch::{Fetcher, HttpTransport};
use ponysticker_core::model::package::{PackageId, StickerId};
use ponysticker_core::repo::catalog_repo::{CatalogRepository, SqliteCatalog};
use ponysticker_core::service::create_service::{ensure_custom, CreateRequest, PackageAuthor};
use ponysticker_core::service::index_service::PackageIndexer;
use ponysticker_core::service::query_service::QueryService;
use ponysticker_core::{default_log_level, init_logging, BundleStore};
use ponysticker_http::{serve, AppState};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "ponysticker", version, about = "Sticker catalog builder and query server")]
struct Cli {
    /// Directory holding the catalog database, sticker bundles and logs
    #[arg(long, env = HOME_ENV)]
    home: PathBuf,

    /// trace | debug | info | warn | error
    #[arg(long, default_value = default_log_level())]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and index every store package in [begin, end)
    Update {
        #[arg(allow_negative_numbers = true)]
        begin: PackageId,
        #[arg(allow_negative_numbers = true)]
        end: PackageId,
    },
    /// Index a package directory that is already on disk
    Insert {
        #[arg(allow_negative_numbers = true)]
        id: PackageId,
    },
    /// Author a custom package from the images in its directory
    Create {
        /// Negative package id
        #[arg(allow_negative_numbers = true)]
        id: PackageId,
        /// Id of the first sticker; the rest count down from it
        #[arg(allow_negative_numbers = true)]
        begin: StickerId,
    },
    /// Serve the HTTP query API
    Run {
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = Paths::new(&cli.home);
    paths
        .create_dirs()
        .with_context(|| format!("cannot prepare home directory {}", paths.home.display()))?;
    let log_dir = paths
        .log_dir
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", paths.log_dir.display()))?;
    init_logging(&cli.log_level, &log_dir).map_err(anyhow::Error::msg)?;

    let conn = open_db(&paths.db_path)
        .with_context(|| format!("cannot open catalog {}", paths.db_path.display()))?;
    let catalog: Arc<dyn CatalogRepository> = Arc::new(SqliteCatalog::new(conn));
    let store = BundleStore::new(&paths.sticker_dir);
    let indexer = PackageIndexer::new(Arc::clone(&catalog), store.clone());

    match cli.command {
        Command::Update { begin, end } => {
            let fetcher = Fetcher::new(HttpTransport::new().context("cannot build http client")?);
            let report = Ingestor::new(catalog, fetcher, store).run(begin, end);
            indexer.refresh_counts();
            println!(
                "stored={} skipped={} missing={} failed={}",
                report.stored, report.skipped, report.missing, report.failed
            );
        }
        Command::Insert { id } => {
            let inserted = indexer.insert_package(id);
            indexer.refresh_counts();
            inserted.with_context(|| format!("cannot insert package {id}"))?;
            println!("complete");
        }
        Command::Create { id, begin } => {
            let author = PackageAuthor::new(store, indexer.clone());
            let created = create(&author, id, begin, prompt);
            indexer.refresh_counts();
            created?;
            println!("complete");
        }
        Command::Run { port } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("cannot start async runtime")?;
            let state = AppState::new(QueryService::new(catalog), store);
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
                    .await
                    .with_context(|| format!("cannot bind port {port}"))?;
                info!("event=cli_run module=cli status=ok port={port}");
                serve(listener, state).await.context("http server stopped")
            })?;
        }
    }

    Ok(())
}

/// Checks the id, asks for author and title, then authors the package.
fn create(
    author: &PackageAuthor,
    id: PackageId,
    begin: StickerId,
    mut ask: impl FnMut(&str) -> Result<String>,
) -> Result<()> {
    ensure_custom(id).with_context(|| format!("cannot create package {id}"))?;
    let request = CreateRequest {
        package_id: id,
        begin,
        author: ask("author")?,
        title: ask("title")?,
    };
    author
        .create_package(&request)
        .with_context(|| format!("cannot create package {id}"))?;
    Ok(())
}

/// Prints `label: ` and reads one line from stdin.
fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .with_context(|| format!("cannot read {label}"))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::{create, Cli, Command};
    use clap::{CommandFactory, Parser};
    use ponysticker_core::db::open_db_in_memory;
    use ponysticker_core::repo::catalog_repo::{CatalogRepository, SqliteCatalog};
    use ponysticker_core::service::create_service::{CreateError, PackageAuthor};
    use ponysticker_core::service::index_service::PackageIndexer;
    use ponysticker_core::BundleStore;
    use std::sync::Arc;

    fn author_in(dir: &std::path::Path) -> PackageAuthor {
        let store = BundleStore::new(dir.join("sticker"));
        let catalog: Arc<dyn CatalogRepository> =
            Arc::new(SqliteCatalog::new(open_db_in_memory().unwrap()));
        PackageAuthor::new(store.clone(), PackageIndexer::new(catalog, store))
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn create_accepts_negative_ids() {
        let cli = Cli::try_parse_from(["ponysticker", "--home", "/tmp/p", "create", "-3", "-10"])
            .unwrap();
        assert!(matches!(cli.command, Command::Create { id: -3, begin: -10 }));
    }

    #[test]
    fn create_rejects_store_ids_without_asking() {
        let dir = tempfile::tempdir().unwrap();
        let mut asked = Vec::new();
        let err = create(&author_in(dir.path()), 5, 1, |label| {
            asked.push(label.to_string());
            Ok(String::new())
        })
        .unwrap_err();

        assert!(asked.is_empty());
        assert!(matches!(
            err.downcast_ref::<CreateError>(),
            Some(CreateError::NotCustom(5))
        ));
    }

    #[test]
    fn create_asks_for_author_then_title() {
        let dir = tempfile::tempdir().unwrap();
        let mut asked = Vec::new();
        // The directory has no images, so authoring fails after the prompts.
        let err = create(&author_in(dir.path()), -1, 1, |label| {
            asked.push(label.to_string());
            Ok(label.to_uppercase())
        })
        .unwrap_err();

        assert_eq!(asked, vec!["author", "title"]);
        assert!(err.downcast_ref::<CreateError>().is_some());
    }

    #[test]
    fn run_defaults_to_standard_port() {
        let cli = Cli::try_parse_from(["ponysticker", "--home", "/tmp/p", "run"]).unwrap();
        assert!(matches!(cli.command, Command::Run { port: 50025 }));
    }
}
