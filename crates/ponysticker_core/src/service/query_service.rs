//! Catalog query use-cases.
//!
//! # Responsibility
//! - Validate partition, order and page parameters against closed sets.
//! - Route plain listings and full-text searches to the catalog.
//!
//! # Invariants
//! - No storage call is made before every parameter is validated.
//! - Search text is normalized with the indexing tokenizer.

use crate::model::package::{OrderKey, PackageId, Repo};
use crate::repo::catalog_repo::{CatalogRepository, PageRequest, RepoError};
use crate::search::tokenizer::normalize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug)]
pub enum QueryError {
    /// A caller-supplied parameter is outside its allow-list or range.
    InvalidParameter {
        name: &'static str,
        message: String,
    },
    /// The requested package is not stored.
    NotFound { repo: Repo, id: PackageId },
    Repo(RepoError),
}

impl QueryError {
    fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameter { name, message } => {
                write!(f, "parameter {name}: {message}")
            }
            Self::NotFound { repo, id } => write!(f, "no package {id} in {repo}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::InvalidParameter { .. } | Self::NotFound { .. } => None,
        }
    }
}

impl From<RepoError> for QueryError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Unvalidated listing request as received from a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRequest<'a> {
    pub repo: &'a str,
    pub page: u32,
    pub size: u32,
    pub order: &'a str,
    /// Free-text query; `None` or empty lists without filtering.
    pub query: Option<&'a str>,
}

/// Read-side entry point over the catalog.
#[derive(Clone)]
pub struct QueryService {
    catalog: Arc<dyn CatalogRepository>,
}

impl QueryService {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Lists or searches one page of serialized package metadata.
    pub fn list_packages(&self, request: &ListRequest<'_>) -> QueryResult<Vec<String>> {
        let repo = parse_repo(request.repo)?;
        let order = request
            .order
            .parse::<OrderKey>()
            .map_err(|err| QueryError::invalid("order", err.to_string()))?;
        if request.page == 0 {
            return Err(QueryError::invalid("page", "page numbers start at 1"));
        }
        let page = PageRequest::new(request.page, request.size);

        let metas = match non_empty(request.query) {
            Some(text) => self.catalog.search(repo, page, order, &normalize(text))?,
            None => self.catalog.list(repo, page, order)?,
        };
        Ok(metas)
    }

    /// Counts stored packages, optionally restricted to a full-text match.
    pub fn count_packages(&self, repo: &str, query: Option<&str>) -> QueryResult<i64> {
        let repo = parse_repo(repo)?;
        let normalized = non_empty(query).map(normalize);
        Ok(self.catalog.count(repo, normalized.as_deref())?)
    }

    /// Returns the stored metadata document of one package.
    pub fn package_meta(&self, repo: &str, id: PackageId) -> QueryResult<String> {
        let repo = parse_repo(repo)?;
        self.catalog
            .get_meta(repo, id)?
            .ok_or(QueryError::NotFound { repo, id })
    }
}

fn parse_repo(value: &str) -> QueryResult<Repo> {
    value
        .parse::<Repo>()
        .map_err(|err| QueryError::invalid("repo", err.to_string()))
}

fn non_empty(query: Option<&str>) -> Option<&str> {
    query.filter(|text| !text.is_empty())
}

/// Joins serialized metadata documents into one JSON array.
pub fn json_array(metas: &[String]) -> String {
    format!("[{}]", metas.join(","))
}

#[cfg(test)]
mod tests {
    use super::json_array;

    #[test]
    fn json_array_wraps_documents() {
        assert_eq!(json_array(&[]), "[]");
        assert_eq!(
            json_array(&["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]),
            "[{\"a\":1},{\"b\":2}]"
        );
    }
}
