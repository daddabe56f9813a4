//! Hand-off point between the credential gate and whatever executes queries.
//!
//! The gateway does not run queries itself. Handlers pass the request body
//! together with the request's `AuthCtx` to a `QueryExecutor`.

pub mod upstream;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::services::auth::AuthCtx;

pub use upstream::UpstreamExecutor;

/// GraphQL-over-HTTP request body.
///
/// `query` is optional so persisted-query requests (hash in `extensions`)
/// pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query upstream unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("query upstream returned an unreadable response (status {0})")]
    InvalidResponse(u16),
    #[error("verified claims could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Runs a query on behalf of a gated request.
///
/// `ctx` is the gate's verdict: the complete verified claim set of the user
/// token, or anonymous. Executors decide themselves how much of it reaches
/// the resolvers.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        ctx: &AuthCtx,
        request: QueryRequest,
    ) -> Result<QueryResponse, QueryError>;
}
