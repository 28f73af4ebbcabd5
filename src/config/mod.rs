use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub mod cors;

pub use cors::create_cors_layer;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_AUDIT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_AUDIT_DRAIN_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the server on the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub audit_queue_capacity: usize,
    pub audit_drain_timeout: Duration,
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Invalid values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let origins =
            lookup("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string());

        Self {
            database_url,
            max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            ),
            bind_addr: parse_or(&lookup, "BIND_ADDR", default_bind_addr()),
            audit_queue_capacity: parse_or(
                &lookup,
                "AUDIT_QUEUE_CAPACITY",
                DEFAULT_AUDIT_QUEUE_CAPACITY,
            )
            .max(1),
            audit_drain_timeout: Duration::from_secs(parse_or(
                &lookup,
                "AUDIT_DRAIN_TIMEOUT_SECS",
                DEFAULT_AUDIT_DRAIN_TIMEOUT_SECS,
            )),
            cors_allowed_origins: origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Config: invalid value, using default");
                default
            }
        },
    }
}
