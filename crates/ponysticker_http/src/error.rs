//! HTTP error mapping.
//!
//! # Invariants
//! - Internal failures are logged with detail and answered with a fixed body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use ponysticker_core::service::query_service::QueryError;
use std::fmt::Display;

pub const INTERNAL_ERROR_BODY: &str = "internal server error";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(&'static str),
    Internal,
}

impl ApiError {
    /// Logs `err` and returns the opaque 500 error.
    pub fn internal(route: &str, err: impl Display) -> Self {
        error!("event=http_request module=http status=error route={route} error={err}");
        Self::Internal
    }

    pub fn from_query(route: &str, err: QueryError) -> Self {
        match err {
            QueryError::InvalidParameter { name, message } => {
                Self::BadRequest(format!("parameter {name} format error: {message}"))
            }
            QueryError::NotFound { .. } => Self::NotFound("no such package"),
            QueryError::Repo(err) => Self::internal(route, err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            Self::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
            }
        }
    }
}
