/*
 * Responsibility
 * - URL layout of the gateway
 * - /health is public; /graphql sits behind the credential gate
 */
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::api::handlers::{graphql::graphql, health::health};
use crate::middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    // Size is capped once, app-wide, by middleware::http (RequestBodyLimitLayer);
    // the extractor's own 2 MB default would undercut it.
    let protected = Router::new()
        .route("/graphql", post(graphql))
        .layer(DefaultBodyLimit::disable());
    let protected = middleware::auth::gate::apply(protected, state);

    Router::new().route("/health", get(health)).merge(protected)
}
