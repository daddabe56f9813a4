/*
 * Responsibility
 * - Environment / .env loading (key endpoint, resource URN, upstream, CORS, limits)
 * - Value validation (start-up fails on missing or malformed settings)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

const DEFAULT_PORT: u16 = 4000;
// 50 MiB: GraphQL payloads with large variable maps are expected
const DEFAULT_BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_ALGORITHMS: &str = "RS256,ES256,EdDSA";
// upstream calls give up this much earlier than the request as a whole
const UPSTREAM_TIMEOUT_MARGIN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_value(value: Option<&str>) -> Self {
        match value
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,
    pub body_limit_bytes: usize,
    pub request_timeout_seconds: u64,

    // JWKS endpoint of the authorization service
    pub public_key_endpoint: Url,
    // audience every token must be issued for
    pub resource_urn: String,
    pub auth_issuer: Option<String>,
    pub allowed_algorithms: Vec<Algorithm>,
    pub token_leeway_seconds: u64,
    pub jwks_cache_ttl_seconds: u64,
    pub jwks_min_refresh_seconds: u64,

    pub query_upstream_url: Url,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (env, map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = parse_or(&var, "PORT", DEFAULT_PORT)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_value(var("APP_ENV").as_deref());

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let body_limit_bytes = parse_or(&var, "BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT_BYTES)?;
        let request_timeout_seconds = parse_or(&var, "REQUEST_TIMEOUT_SECONDS", 30)?;

        let public_key_endpoint = required_url(&var, "PUBLIC_KEY_ENDPOINT")?;
        let resource_urn = var("RESOURCE_URN").ok_or(ConfigError::Missing("RESOURCE_URN"))?;
        let auth_issuer = var("AUTH_ISSUER");

        let allowed_algorithms = var("ALLOWED_ALGORITHMS")
            .unwrap_or_else(|| DEFAULT_ALGORITHMS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Algorithm::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigError::Invalid("ALLOWED_ALGORITHMS"))?;
        if allowed_algorithms.is_empty() {
            return Err(ConfigError::Invalid("ALLOWED_ALGORITHMS"));
        }

        let token_leeway_seconds = parse_or(&var, "TOKEN_LEEWAY_SECONDS", 60)?;
        let jwks_cache_ttl_seconds = parse_or(&var, "JWKS_CACHE_TTL_SECONDS", 300)?;
        let jwks_min_refresh_seconds = parse_or(&var, "JWKS_MIN_REFRESH_SECONDS", 10)?;

        let query_upstream_url = required_url(&var, "QUERY_UPSTREAM_URL")?;

        Ok(Self {
            addr,
            app_env,
            cors_allowed_origins,
            body_limit_bytes,
            request_timeout_seconds,
            public_key_endpoint,
            resource_urn,
            auth_issuer,
            allowed_algorithms,
            token_leeway_seconds,
            jwks_cache_ttl_seconds,
            jwks_min_refresh_seconds,
            query_upstream_url,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Timeout for the query upstream; shorter than `request_timeout` so an
    /// upstream stall surfaces as 502 rather than a gateway timeout.
    pub fn upstream_timeout(&self) -> Duration {
        self.request_timeout()
            .saturating_sub(UPSTREAM_TIMEOUT_MARGIN)
            .max(UPSTREAM_TIMEOUT_MARGIN)
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn required_url<F>(var: &F, key: &'static str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = var(key).ok_or(ConfigError::Missing(key))?;
    let url = Url::parse(raw.trim()).map_err(|_| ConfigError::Invalid(key))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::Invalid(key)),
    }
}
