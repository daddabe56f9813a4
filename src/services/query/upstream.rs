use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::{Url, form_urlencoded};

use super::{QueryError, QueryExecutor, QueryRequest, QueryResponse};
use crate::services::auth::AuthCtx;

/// Header through which the verified subject reaches the query service.
pub const USER_SUBJECT_HEADER: &str = "x-sdd-user-sub";
/// Header carrying every verified user claim as percent-encoded JSON.
pub const USER_CLAIMS_HEADER: &str = "x-sdd-user-claims";

/// Forwards queries to the query-processing service behind the gateway.
///
/// Only the request body and the verified identity (subject and full claim
/// set) are passed on; none of the caller's own headers (credentials
/// included) are forwarded. Anonymous requests carry neither identity header.
#[derive(Debug, Clone)]
pub struct UpstreamExecutor {
    url: Url,
    http: reqwest::Client,
}

impl UpstreamExecutor {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, http })
    }
}

#[async_trait]
impl QueryExecutor for UpstreamExecutor {
    async fn execute(
        &self,
        ctx: &AuthCtx,
        request: QueryRequest,
    ) -> Result<QueryResponse, QueryError> {
        let mut req = self.http.post(self.url.clone()).json(&request);
        if let Some(identity) = ctx.identity() {
            if let Some(sub) = identity.subject() {
                req = req.header(USER_SUBJECT_HEADER, sub);
            }
            // claim values may be non-ASCII; header values must not be
            let claims: String =
                form_urlencoded::byte_serialize(serde_json::to_string(identity)?.as_bytes())
                    .collect();
            req = req.header(USER_CLAIMS_HEADER, claims);
        }

        let resp = req.send().await?;
        let status = resp.status();
        debug!(status = status.as_u16(), "query upstream responded");

        let body: Value = resp.json().await.map_err(|e| {
            warn!(error = %e, status = status.as_u16(), "query upstream response is not JSON");
            QueryError::InvalidResponse(status.as_u16())
        })?;

        Ok(QueryResponse { status, body })
    }
}
