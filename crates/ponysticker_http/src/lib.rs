//! Read-only HTTP query service over the sticker catalog.
//!
//! # Responsibility
//! - Expose package metadata, images, listings and counts as GET routes.
//! - Add a permissive CORS header to every response.
//!
//! # Invariants
//! - Handlers never touch SQLite or the file system on async worker threads.

mod error;
mod handlers;

pub use error::{ApiError, INTERNAL_ERROR_BODY};
pub use handlers::USAGE;

use axum::http::{header, HeaderValue};
use axum::middleware;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use log::info;
use ponysticker_core::bundle::BundleStore;
use ponysticker_core::service::query_service::QueryService;
use std::io;
use tokio::net::TcpListener;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
    pub store: BundleStore,
}

impl AppState {
    pub fn new(query: QueryService, store: BundleStore) -> Self {
        Self { query, store }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::usage))
        .route("/meta", get(handlers::meta))
        .route("/sticker", get(handlers::sticker))
        .route("/pkg-list", get(handlers::package_list))
        .route("/pkg-count", get(handlers::package_count))
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

/// Serves the router on `listener` until the process stops.
pub async fn serve(listener: TcpListener, state: AppState) -> io::Result<()> {
    let addr = listener.local_addr()?;
    info!("event=http_serve module=http status=start addr={addr}");
    axum::serve(listener, router(state)).await
}

async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
