//! Route handlers.
//!
//! # Responsibility
//! - Parse query-string parameters and report malformed ones as 400.
//! - Run catalog and file reads on the blocking pool.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use ponysticker_core::bundle::{StickerName, IMAGE_MIME_TYPE};
use ponysticker_core::model::package::PackageId;
use ponysticker_core::service::query_service::{json_array, ListRequest};
use serde::Deserialize;
use std::str::FromStr;

const JSON_MIME_TYPE: &str = "application/json";

pub const USAGE: &str = "\
APIs:
meta?repo=<REPO>&pkg=<INT>
sticker?pkg=<INT>&sticker=<INT|INT_key|tab_on|tab_off>[&base64=<0|1>]
pkg-list?repo=<REPO>&page=<INT>&size=<INT>&order=<packageId|date>[&q=<STRING>]
pkg-count?repo=<REPO>[&q=<STRING>]
<REPO>=<official|creator|custom>
";

#[derive(Debug, Default, Deserialize)]
pub struct MetaParams {
    repo: Option<String>,
    pkg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StickerParams {
    pkg: Option<String>,
    sticker: Option<String>,
    base64: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    repo: Option<String>,
    page: Option<String>,
    size: Option<String>,
    order: Option<String>,
    q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountParams {
    repo: Option<String>,
    q: Option<String>,
}

pub async fn usage() -> &'static str {
    USAGE
}

pub async fn meta(
    State(state): State<AppState>,
    Query(params): Query<MetaParams>,
) -> Result<Response, ApiError> {
    let id: PackageId = parse_number("pkg", params.pkg.as_deref())?;
    let repo = params.repo.unwrap_or_default();

    let meta = blocking("meta", move || state.query.package_meta(&repo, id))
        .await?
        .map_err(|err| ApiError::from_query("meta", err))?;
    Ok(([(header::CONTENT_TYPE, JSON_MIME_TYPE)], meta).into_response())
}

pub async fn sticker(
    State(state): State<AppState>,
    Query(params): Query<StickerParams>,
) -> Result<Response, ApiError> {
    let id: PackageId = parse_number("pkg", params.pkg.as_deref())?;
    let name = params
        .sticker
        .as_deref()
        .unwrap_or_default()
        .parse::<StickerName>()
        .map_err(|_| ApiError::BadRequest("parameter sticker format error".to_string()))?;
    let as_base64 = params.base64.as_deref() == Some("1");

    let image = blocking("sticker", move || state.store.read_image(id, name))
        .await?
        .map_err(|err| {
            if err.is_not_found() {
                ApiError::NotFound("no such file")
            } else {
                ApiError::internal("sticker", err)
            }
        })?;

    if as_base64 {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        return Ok(encoded.into_response());
    }
    Ok(([(header::CONTENT_TYPE, IMAGE_MIME_TYPE)], image).into_response())
}

pub async fn package_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let page: u32 = parse_number("page", params.page.as_deref())?;
    let size: u32 = parse_number("size", params.size.as_deref())?;

    let metas = blocking("pkg-list", move || {
        state.query.list_packages(&ListRequest {
            repo: params.repo.as_deref().unwrap_or_default(),
            page,
            size,
            order: params.order.as_deref().unwrap_or_default(),
            query: params.q.as_deref(),
        })
    })
    .await?
    .map_err(|err| ApiError::from_query("pkg-list", err))?;

    Ok(([(header::CONTENT_TYPE, JSON_MIME_TYPE)], json_array(&metas)).into_response())
}

pub async fn package_count(
    State(state): State<AppState>,
    Query(params): Query<CountParams>,
) -> Result<String, ApiError> {
    let count = blocking("pkg-count", move || {
        state
            .query
            .count_packages(params.repo.as_deref().unwrap_or_default(), params.q.as_deref())
    })
    .await?
    .map_err(|err| ApiError::from_query("pkg-count", err))?;
    Ok(count.to_string())
}

fn parse_number<T: FromStr>(name: &str, value: Option<&str>) -> Result<T, ApiError> {
    value
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("parameter {name} must be an integer")))
}

async fn blocking<T, F>(route: &'static str, work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::internal(route, err))
}
