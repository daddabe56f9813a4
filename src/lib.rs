//! Credential-gating gateway for the query service.
//!
//! Every `/graphql` request must carry a verifiable `x-sdd-router-token`;
//! an optional `x-sdd-user-token` is resolved into an [`services::auth::Identity`]
//! and handed to the query executor through [`services::auth::AuthCtx`].

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
