/*
 * Responsibility
 * - tracing / panic hook setup
 * - Config loading → dependency wiring (verifier, gate, executor) → Router assembly
 * - Middleware application (CORS / request id / limits / timeout)
 * - axum::serve() with graceful shutdown
 */
use std::{panic, process, sync::Arc};

use anyhow::Result;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware;
use crate::services::auth::build_credential_gate;
use crate::services::query::{QueryExecutor, UpstreamExecutor};
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,sdd_gateway=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // stderr may be hidden depending on how the process is launched
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

/// Binary entry point: everything comes from the environment, queries are
/// forwarded to `QUERY_UPSTREAM_URL`.
pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    let executor =
        UpstreamExecutor::new(config.query_upstream_url.clone(), config.upstream_timeout())?;

    serve(config, Arc::new(executor)).await
}

/// Serve the gateway with a caller-supplied executor.
///
/// Tracing is left to the caller; `run()` sets it up for the binary.
pub async fn serve(config: Config, executor: Arc<dyn QueryExecutor>) -> Result<()> {
    tracing::info!(
        "starting gateway in {:?} mode on {} (keys: {}, resource: {})",
        config.app_env,
        config.addr,
        config.public_key_endpoint,
        config.resource_urn
    );

    let gate = build_credential_gate(&config)?;
    let state = AppState::new(gate, executor);
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!("gateway ready at http://{}/graphql", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway stopped");
    Ok(())
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = api::routes(state.clone()).with_state(state);
    let router = middleware::cors::apply(router, config);
    middleware::http::apply(router, config)
}

// Resolves on Ctrl-C or SIGTERM; axum then stops accepting and drains in-flight requests.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::services::auth::testing::RecordingVerifier;
    use crate::services::auth::{AuthCtx, CredentialGate, Identity};
    use crate::services::query::{QueryError, QueryRequest, QueryResponse};

    #[derive(Default)]
    struct StubExecutor {
        seen: Mutex<Vec<AuthCtx>>,
        delay: Duration,
    }

    impl StubExecutor {
        fn seen(&self) -> Vec<AuthCtx> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for StubExecutor {
        async fn execute(
            &self,
            ctx: &AuthCtx,
            _request: QueryRequest,
        ) -> Result<QueryResponse, QueryError> {
            self.seen.lock().unwrap().push(ctx.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(QueryResponse {
                status: StatusCode::OK,
                body: json!({ "data": { "viewer": ctx.subject() } }),
            })
        }
    }

    fn test_config(extra: &[(&'static str, &'static str)]) -> Config {
        let mut vars = HashMap::from([
            ("PUBLIC_KEY_ENDPOINT", "http://127.0.0.1:9/jwks.json"),
            ("RESOURCE_URN", "urn:sdd:resource:catalog"),
            ("QUERY_UPSTREAM_URL", "http://127.0.0.1:9/graphql"),
        ]);
        vars.extend(extra.iter().copied());
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
    }

    fn verifier() -> RecordingVerifier {
        RecordingVerifier::new()
            .accept("R1", Identity::with_subject("router"))
            .accept("U1", Identity::with_subject("u1"))
            .fail_on("R-down")
    }

    fn app_with(
        verifier: RecordingVerifier,
        extra: &[(&'static str, &'static str)],
    ) -> (Router, Arc<StubExecutor>) {
        let executor = Arc::new(StubExecutor::default());
        let state = AppState::new(CredentialGate::new(Arc::new(verifier)), executor.clone());
        (build_router(state, &test_config(extra)), executor)
    }

    fn graphql_request(headers: &[(&str, &str)]) -> Request<Body> {
        let body = r#"{"query":"{ viewer }"}"#;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/graphql")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len());
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_credentials() {
        let (app, _) = app_with(verifier(), &[]);

        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn missing_router_token_is_401() {
        let (app, executor) = app_with(verifier(), &[]);

        let resp = app
            .oneshot(graphql_request(&[("x-sdd-user-token", "U1")]))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(resp).await,
            json!({
                "errors": [{
                    "message": "router token is not present",
                    "extensions": { "code": "UNAUTHENTICATED", "http": { "status": 401 } }
                }]
            })
        );
        assert!(executor.seen().is_empty());
    }

    #[tokio::test]
    async fn unverifiable_router_token_is_401() {
        let (app, executor) = app_with(verifier(), &[]);

        let resp = app
            .oneshot(graphql_request(&[
                ("x-sdd-router-token", "forged"),
                ("x-sdd-user-token", "U1"),
            ]))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(resp).await;
        assert_eq!(body["errors"][0]["message"], "router token cannot be verified");
        assert_eq!(body["errors"][0]["extensions"]["code"], "UNAUTHENTICATED");
        assert!(executor.seen().is_empty());
    }

    #[tokio::test]
    async fn routed_request_without_user_token_runs_anonymously() {
        let (app, executor) = app_with(verifier(), &[]);

        let resp = app
            .oneshot(graphql_request(&[("x-sdd-router-token", "R1")]))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, json!({ "data": { "viewer": null } }));
        assert_eq!(executor.seen(), vec![AuthCtx::anonymous()]);
    }

    #[tokio::test]
    async fn invalid_user_token_runs_anonymously() {
        let (app, executor) = app_with(verifier(), &[]);

        let resp = app
            .oneshot(graphql_request(&[
                ("x-sdd-router-token", "R1"),
                ("x-sdd-user-token", "expired"),
            ]))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(executor.seen(), vec![AuthCtx::anonymous()]);
    }

    #[tokio::test]
    async fn verified_user_reaches_the_executor() {
        let (app, executor) = app_with(verifier(), &[]);

        let resp = app
            .oneshot(graphql_request(&[
                ("X-SDD-Router-Token", "R1"),
                ("X-Sdd-User-Token", "U1"),
            ]))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, json!({ "data": { "viewer": "u1" } }));
        assert_eq!(
            executor.seen(),
            vec![AuthCtx::authenticated(Identity::with_subject("u1"))]
        );
    }

    #[tokio::test]
    async fn verifier_outage_is_500_not_401() {
        let (app, executor) = app_with(verifier(), &[]);

        let resp = app
            .oneshot(graphql_request(&[("x-sdd-router-token", "R-down")]))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(executor.seen().is_empty());
    }

    #[tokio::test]
    async fn request_id_is_set_on_responses() {
        let (app, _) = app_with(verifier(), &[]);

        let resp = app.oneshot(graphql_request(&[])).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn cors_preflight_skips_the_gate() {
        let (app, _) = app_with(verifier(), &[]);

        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/graphql")
            .header(header::ORIGIN, "https://studio.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(
                header::ACCESS_CONTROL_REQUEST_HEADERS,
                "x-sdd-router-token,x-sdd-user-token",
            )
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let allowed = resp
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        assert!(allowed.contains("x-sdd-router-token"));
        assert!(allowed.contains("x-sdd-user-token"));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (app, executor) = app_with(verifier(), &[("BODY_LIMIT_BYTES", "8")]);

        let resp = app
            .oneshot(graphql_request(&[("x-sdd-router-token", "R1")]))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(executor.seen().is_empty());
    }

    #[tokio::test]
    async fn slow_execution_is_a_gateway_timeout() {
        let executor = Arc::new(StubExecutor {
            delay: Duration::from_secs(3),
            ..StubExecutor::default()
        });
        let state = AppState::new(CredentialGate::new(Arc::new(verifier())), executor.clone());
        let app = build_router(state, &test_config(&[("REQUEST_TIMEOUT_SECONDS", "1")]));

        let resp = app
            .oneshot(graphql_request(&[("x-sdd-router-token", "R1")]))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(executor.seen().len(), 1);
    }

    #[tokio::test]
    async fn unknown_routes_are_404_without_credentials() {
        let (app, _) = app_with(verifier(), &[]);

        let resp = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
