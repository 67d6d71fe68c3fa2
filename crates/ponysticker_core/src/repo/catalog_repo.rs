//! Partitioned catalog repository and SQLite implementation.
//!
//! # Responsibility
//! - Store serialized package metadata and its full-text index row per
//!   partition.
//! - Serve paginated listing, full-text search and counts.
//!
//! # Invariants
//! - Catalog row and index row are inserted in one transaction; either both
//!   exist or neither does.
//! - An existing package id is never overwritten; a second insert fails with
//!   [`RepoError::AlreadyExists`].
//! - Every statement runs while the connection lock is held, so at most one
//!   writer touches the store at a time.
//! - SQL text per partition is fixed at compile time.

use crate::db::DbError;
use crate::model::package::{OrderKey, Package, PackageId, Repo};
use crate::search::fts::{is_match_syntax_error, match_expression};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type RepoResult<T> = Result<T, RepoError>;

/// Catalog persistence and query error.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// The id is already stored in its partition.
    AlreadyExists { repo: Repo, id: PackageId },
    /// The id maps to no partition.
    NoPartition(PackageId),
    /// The id belongs to a different partition than the one addressed.
    Misrouted { repo: Repo, id: PackageId },
    /// The normalized query was rejected by the FTS5 parser.
    InvalidQuery { query: String, message: String },
    Serialize(serde_json::Error),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::AlreadyExists { repo, id } => {
                write!(f, "package {id} already exists in {repo}")
            }
            Self::NoPartition(id) => write!(f, "package id {id} maps to no repository"),
            Self::Misrouted { repo, id } => write!(f, "package {id} does not belong to {repo}"),
            Self::InvalidQuery { query, message } => {
                write!(f, "invalid full-text query `{query}`: {message}")
            }
            Self::Serialize(err) => write!(f, "cannot serialize package metadata: {err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialize(err) => Some(err),
            Self::AlreadyExists { .. }
            | Self::NoPartition(_)
            | Self::Misrouted { .. }
            | Self::InvalidQuery { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}

/// Normalized full-text columns stored next to a catalog row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRow {
    pub title: String,
    pub author: String,
}

/// One-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    /// Rows skipped before this page: `(page - 1) * size`.
    pub fn offset(self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.size)
    }

    pub fn limit(self) -> i64 {
        i64::from(self.size)
    }
}

/// Storage contract for the partitioned package catalog.
///
/// Implementations own their synchronization; callers share one instance
/// across threads.
pub trait CatalogRepository: Send + Sync {
    fn exists(&self, repo: Repo, id: PackageId) -> RepoResult<bool>;
    /// Inserts catalog and index rows atomically; never overwrites.
    fn insert(
        &self,
        repo: Repo,
        package: &Package,
        index: &IndexRow,
        inserted_at_ms: i64,
    ) -> RepoResult<()>;
    /// Returns the stored metadata document, if present.
    fn get_meta(&self, repo: Repo, id: PackageId) -> RepoResult<Option<String>>;
    fn list(&self, repo: Repo, page: PageRequest, order: OrderKey) -> RepoResult<Vec<String>>;
    /// Full-text search; `normalized_query` must come from the tokenizer.
    fn search(
        &self,
        repo: Repo,
        page: PageRequest,
        order: OrderKey,
        normalized_query: &str,
    ) -> RepoResult<Vec<String>>;
    fn count(&self, repo: Repo, normalized_query: Option<&str>) -> RepoResult<i64>;
    /// Recomputes and stores the summary row count for `repo`.
    fn refresh_count(&self, repo: Repo) -> RepoResult<i64>;
    /// Last summary count written by [`CatalogRepository::refresh_count`].
    fn recorded_count(&self, repo: Repo) -> RepoResult<i64>;
}

struct RepoSql {
    exists: &'static str,
    insert_catalog: &'static str,
    insert_index: &'static str,
    select_meta: &'static str,
    list_by_id: &'static str,
    list_by_date: &'static str,
    search_by_id: &'static str,
    search_by_date: &'static str,
    count_all: &'static str,
    count_matching: &'static str,
}

macro_rules! repo_sql {
    ($table:literal) => {
        RepoSql {
            exists: concat!(
                "SELECT EXISTS(SELECT 1 FROM ", $table, " WHERE package_id = ?1);"
            ),
            insert_catalog: concat!(
                "INSERT INTO ", $table, " (package_id, meta, inserted_at) VALUES (?1, ?2, ?3);"
            ),
            insert_index: concat!(
                "INSERT INTO ", $table, "_fts (package_id, title, author) VALUES (?1, ?2, ?3);"
            ),
            select_meta: concat!("SELECT meta FROM ", $table, " WHERE package_id = ?1;"),
            list_by_id: concat!(
                "SELECT meta FROM ", $table, " ORDER BY package_id LIMIT ?1 OFFSET ?2;"
            ),
            list_by_date: concat!(
                "SELECT meta FROM ", $table,
                " ORDER BY inserted_at, package_id LIMIT ?1 OFFSET ?2;"
            ),
            search_by_id: concat!(
                "SELECT ", $table, ".meta FROM ", $table, "_fts",
                " JOIN ", $table, " ON ", $table, ".package_id = ", $table, "_fts.package_id",
                " WHERE ", $table, "_fts MATCH ?1",
                " ORDER BY ", $table, ".package_id LIMIT ?2 OFFSET ?3;"
            ),
            search_by_date: concat!(
                "SELECT ", $table, ".meta FROM ", $table, "_fts",
                " JOIN ", $table, " ON ", $table, ".package_id = ", $table, "_fts.package_id",
                " WHERE ", $table, "_fts MATCH ?1",
                " ORDER BY ", $table, ".inserted_at, ", $table, ".package_id LIMIT ?2 OFFSET ?3;"
            ),
            count_all: concat!("SELECT COUNT(*) FROM ", $table, ";"),
            count_matching: concat!(
                "SELECT COUNT(*) FROM ", $table, "_fts",
                " JOIN ", $table, " ON ", $table, ".package_id = ", $table, "_fts.package_id",
                " WHERE ", $table, "_fts MATCH ?1;"
            ),
        }
    };
}

static OFFICIAL_SQL: RepoSql = repo_sql!("official");
static CREATOR_SQL: RepoSql = repo_sql!("creator");
static CUSTOM_SQL: RepoSql = repo_sql!("custom");

fn sql_for(repo: Repo) -> &'static RepoSql {
    match repo {
        Repo::Official => &OFFICIAL_SQL,
        Repo::Creator => &CREATOR_SQL,
        Repo::Custom => &CUSTOM_SQL,
    }
}

/// SQLite-backed catalog sharing one connection behind a writer lock.
#[derive(Debug)]
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Wraps a connection that already has migrations applied.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves no open transaction behind: rusqlite
        // rolls back on drop, so the connection is still consistent.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn collect_meta(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
        rows.collect()
    }
}

impl CatalogRepository for SqliteCatalog {
    fn exists(&self, repo: Repo, id: PackageId) -> RepoResult<bool> {
        let conn = self.lock();
        let found = conn.query_row(sql_for(repo).exists, [id], |row| row.get::<_, bool>(0))?;
        Ok(found)
    }

    fn insert(
        &self,
        repo: Repo,
        package: &Package,
        index: &IndexRow,
        inserted_at_ms: i64,
    ) -> RepoResult<()> {
        let id = package.package_id;
        match Repo::for_package(id) {
            None => return Err(RepoError::NoPartition(id)),
            Some(routed) if routed != repo => return Err(RepoError::Misrouted { repo, id }),
            Some(_) => {}
        }
        let meta = serde_json::to_string(package)?;
        let sql = sql_for(repo);

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        match tx.execute(sql.insert_catalog, params![id, meta, inserted_at_ms]) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                return Err(RepoError::AlreadyExists { repo, id });
            }
            Err(err) => return Err(err.into()),
        }
        tx.execute(sql.insert_index, params![id, index.title, index.author])?;
        tx.commit()?;
        Ok(())
    }

    fn get_meta(&self, repo: Repo, id: PackageId) -> RepoResult<Option<String>> {
        let conn = self.lock();
        let meta = conn
            .query_row(sql_for(repo).select_meta, [id], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(meta)
    }

    fn list(&self, repo: Repo, page: PageRequest, order: OrderKey) -> RepoResult<Vec<String>> {
        let sql = match order {
            OrderKey::PackageId => sql_for(repo).list_by_id,
            OrderKey::Date => sql_for(repo).list_by_date,
        };
        let conn = self.lock();
        let metas = Self::collect_meta(&conn, sql, params![page.limit(), page.offset()])?;
        Ok(metas)
    }

    fn search(
        &self,
        repo: Repo,
        page: PageRequest,
        order: OrderKey,
        normalized_query: &str,
    ) -> RepoResult<Vec<String>> {
        let Some(expr) = match_expression(normalized_query) else {
            return Ok(Vec::new());
        };
        let sql = match order {
            OrderKey::PackageId => sql_for(repo).search_by_id,
            OrderKey::Date => sql_for(repo).search_by_date,
        };
        let conn = self.lock();
        Self::collect_meta(&conn, sql, params![expr, page.limit(), page.offset()])
            .map_err(|err| map_query_error(err, &expr))
    }

    fn count(&self, repo: Repo, normalized_query: Option<&str>) -> RepoResult<i64> {
        let sql = sql_for(repo);
        let conn = self.lock();
        let Some(query) = normalized_query else {
            return Ok(conn.query_row(sql.count_all, [], |row| row.get(0))?);
        };
        let Some(expr) = match_expression(query) else {
            return Ok(0);
        };
        conn.query_row(sql.count_matching, [&expr], |row| row.get(0))
            .map_err(|err| map_query_error(err, &expr))
    }

    fn refresh_count(&self, repo: Repo) -> RepoResult<i64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let count: i64 = tx.query_row(sql_for(repo).count_all, [], |row| row.get(0))?;
        tx.execute(
            "UPDATE repo_counts SET count = ?1 WHERE name = ?2;",
            params![count, repo.as_str()],
        )?;
        tx.commit()?;
        Ok(count)
    }

    fn recorded_count(&self, repo: Repo) -> RepoResult<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT count FROM repo_counts WHERE name = ?1;",
            [repo.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_query_error(err: rusqlite::Error, query: &str) -> RepoError {
    if is_match_syntax_error(&err) {
        return RepoError::InvalidQuery {
            query: query.to_string(),
            message: err.to_string(),
        };
    }

    RepoError::Db(DbError::Sqlite(err))
}
