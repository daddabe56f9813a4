//! Credential gate middleware: header extraction → gate decision → AuthCtx into extensions.
//!
//! The decision logic lives in `services::auth::gate`; this layer only maps
//! HTTP in and out of it.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::auth::{ROUTER_TOKEN_HEADER, USER_TOKEN_HEADER};
use crate::state::AppState;

/// Put the credential gate in front of every route of `router`.
///
/// ```ignore
/// let protected = Router::new().route("/graphql", post(graphql));
/// let protected = middleware::auth::gate::apply(protected, state.clone());
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // route_layer: unmatched paths still get a plain 404 instead of a 401
    router.route_layer(middleware::from_fn_with_state(state, gate_middleware))
}

async fn gate_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let router_token = header_token(req.headers(), ROUTER_TOKEN_HEADER);
    let user_token = header_token(req.headers(), USER_TOKEN_HEADER);

    let auth_ctx = state
        .gate
        .authenticate(router_token.as_deref(), user_token.as_deref())
        .await?;

    // middleware → extractor
    req.extensions_mut().insert(auth_ctx);

    Ok(next.run(req).await)
}

// Header names are matched case-insensitively by HeaderMap. Values that are
// not valid UTF-8 are kept (lossily) so they fail verification instead of
// silently counting as "absent".
fn header_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderName, HeaderValue};

    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"X-SDD-Router-Token").unwrap(),
            HeaderValue::from_static("R1"),
        );

        assert_eq!(
            header_token(&headers, ROUTER_TOKEN_HEADER).as_deref(),
            Some("R1")
        );
        assert_eq!(header_token(&headers, USER_TOKEN_HEADER), None);
    }

    #[test]
    fn non_utf8_values_are_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_TOKEN_HEADER,
            HeaderValue::from_bytes(b"tok\xffen").unwrap(),
        );

        let token = header_token(&headers, USER_TOKEN_HEADER).unwrap();
        assert!(token.starts_with("tok"));
    }
}
