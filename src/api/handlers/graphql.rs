/*
 * Responsibility
 * - POST /graphql
 * - Receives the gate's AuthCtx and the GraphQL request body, hands both to the QueryExecutor
 * - Upstream status and body are passed back unchanged
 */
use axum::{Json, extract::State, http::StatusCode};
use serde_json::Value;

use crate::{
    api::extractors::AuthCtxExtractor, error::AppError, services::query::QueryRequest,
    state::AppState,
};

pub async fn graphql(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Json(req): Json<QueryRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    tracing::debug!(
        authenticated = ctx.is_authenticated(),
        operation = ?req.operation_name,
        "executing query"
    );

    let resp = state.executor.execute(&ctx, req).await?;

    Ok((resp.status, Json(resp.body)))
}
