use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::error;

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Whether 500 responses include the underlying error message.
pub fn expose_details(enabled: bool) {
    EXPOSE_DETAILS.store(enabled, Ordering::Relaxed);
}

/// Failure of a single database round trip.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Database query timeout")]
    Timeout,
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest {
        error: &'static str,
        message: String,
    },
    #[error("{message}")]
    NotFound {
        error: &'static str,
        message: String,
    },
    #[error("Database query timeout")]
    Timeout,
    #[error("{context}: {source}")]
    Database {
        context: &'static str,
        source: sqlx::Error,
    },
    #[error("{context}: {source}")]
    Internal {
        context: &'static str,
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn bad_request(error: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            error,
            message: message.into(),
        }
    }

    pub fn not_found(error: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            error,
            message: message.into(),
        }
    }

    /// Adapter for `map_err` on database calls, logging the failure.
    ///
    /// ```ignore
    /// let rows = db.timed(...).await.map_err(ApiError::query("Failed to fetch tower data"))?;
    /// ```
    pub fn query(context: &'static str) -> impl FnOnce(QueryError) -> Self {
        move |e| match e {
            QueryError::Timeout => {
                error!(context, "database query timed out");
                Self::Timeout
            }
            QueryError::Sql(source) => {
                error!(context, error = %source, "database error");
                Self::Database { context, source }
            }
        }
    }

    pub fn internal(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| {
            error!(context, error = %source, "internal error");
            Self::Internal { context, source }
        }
    }

    fn details(&self) -> Option<String> {
        let source = match self {
            Self::Database { source, .. } => source.to_string(),
            Self::Internal { source, .. } => source.to_string(),
            _ => return None,
        };
        EXPOSE_DETAILS.load(Ordering::Relaxed).then_some(source)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::BadRequest { error, message } | Self::NotFound { error, message } => {
                json!({ "error": error, "message": message })
            }
            Self::Timeout => json!({
                "error": "Request timeout",
                "details": "Database query timeout",
            }),
            Self::Database { context, .. } | Self::Internal { context, .. } => {
                let mut body = Map::new();
                body.insert("error".to_owned(), Value::from(*context));
                if let Some(details) = self.details() {
                    body.insert("details".to_owned(), Value::from(details));
                }
                Value::Object(body)
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;

    use super::*;

    async fn body(e: ApiError) -> (StatusCode, Value) {
        let resp = e.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn not_found_body() {
        let (status, body) = body(ApiError::not_found(
            "Tower not found",
            "No tower found with site_id: X",
        ))
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Tower not found");
        assert_eq!(body["message"], "No tower found with site_id: X");
    }

    #[actix_web::test]
    async fn timeout_body() {
        let e = ApiError::query("Database error")(QueryError::Timeout);
        let (status, body) = body(e).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "Request timeout");
        assert_eq!(body["details"], "Database query timeout");
    }

    #[actix_web::test]
    async fn database_body_hides_details() {
        let e = ApiError::query("Failed to fetch tower data")(QueryError::Sql(
            sqlx::Error::RowNotFound,
        ));
        let (status, body) = body(e).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch tower data");
        // never enabled in tests
        assert!(body.get("details").is_none());
    }
}
