/*
 * Responsibility
 * - Gateway-wide AppError
 * - IntoResponse (HTTP status + GraphQL-style error envelope)
 * - Conversions from gate / query-executor errors
 *
 * Body shape:
 *   {"errors":[{"message":"...","extensions":{"code":"...","http":{"status":401}}}]}
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::auth::{GateError, Rejection};
use crate::services::query::QueryError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub extensions: ErrorExtensions,
}

#[derive(Debug, Serialize)]
pub struct ErrorExtensions {
    pub code: &'static str,
    pub http: HttpExtension,
}

#[derive(Debug, Serialize)]
pub struct HttpExtension {
    pub status: u16,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(Rejection),
    #[error("bad gateway")]
    BadGateway,
    #[error("internal server error")]
    Internal,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Unauthenticated(rejection) => (
                StatusCode::from_u16(rejection.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
                rejection.code(),
                rejection.to_string(),
            ),
            AppError::BadGateway => (
                StatusCode::BAD_GATEWAY,
                "BAD_GATEWAY",
                "query service unavailable".into(),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "internal server error".into(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = ErrorResponse {
            errors: vec![ErrorBody {
                message,
                extensions: ErrorExtensions {
                    code,
                    http: HttpExtension {
                        status: status.as_u16(),
                    },
                },
            }],
        };

        (status, Json(body)).into_response()
    }
}

impl From<Rejection> for AppError {
    fn from(r: Rejection) -> Self {
        AppError::Unauthenticated(r)
    }
}

impl From<GateError> for AppError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Rejected(r) => r.into(),
            // Not a client problem: the key endpoint is down or misconfigured.
            GateError::Verifier(err) => {
                tracing::error!(error = %err, "token verifier failed");
                AppError::Internal
            }
        }
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        tracing::error!(error = %e, "query execution failed");
        AppError::BadGateway
    }
}
