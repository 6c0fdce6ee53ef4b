use std::env;

use crate::query::SearchMode;

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

/// AppConfig
///
/// Immutable configuration loaded once at startup and shared through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Postgres connection string. `None` selects the in-memory store (local only).
    pub db_url: Option<String>,
    // Upper bound of the Postgres pool.
    pub max_connections: u32,
    // Runtime environment marker. Controls the development auth bypass and log format.
    pub env: Env,
    // HMAC secret used to verify bearer JWTs.
    pub jwt_secret: String,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Relevance strategy used by free-text search.
    pub search_mode: SearchMode,
}

/// Env
///
/// Runtime context: `Local` enables the `x-user-id` bypass and pretty logs, `Production`
/// requires every secret to be set explicitly and logs JSON.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking values for tests.
    fn default() -> Self {
        Self {
            db_url: None,
            max_connections: 5,
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            search_mode: SearchMode::FullText,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables (after `.env` has been applied).
    ///
    /// # Panics
    /// Panics in `production` when `DATABASE_URL` or `JWT_SECRET` is missing, and in any
    /// environment when `DB_MAX_CONNECTIONS` or `SEARCH_MODE` holds an unparsable value.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let (db_url, jwt_secret) = match env {
            Env::Production => (
                Some(env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod")),
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production."),
            ),
            Env::Local => (
                env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
                env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
            ),
        };

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .map(|raw| {
                raw.parse::<u32>()
                    .expect("FATAL: DB_MAX_CONNECTIONS must be a positive integer")
            })
            .unwrap_or(5);

        let search_mode = env::var("SEARCH_MODE")
            .map(|raw| {
                SearchMode::parse(&raw).expect("FATAL: SEARCH_MODE must be 'fulltext' or 'pattern'")
            })
            .unwrap_or_default();

        Self {
            db_url,
            max_connections,
            env,
            jwt_secret,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            search_mode,
        }
    }
}
