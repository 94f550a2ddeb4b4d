pub mod rate_limits;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub production: bool,
    pub database_url: String,
    pub redis_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub token_key: [u8; 32],
    pub token_ttl_days: u64,
    pub static_dir: String,
    pub upload_max_bytes: usize,
    pub cache_ttl_seconds: u64,
    pub log_batch_size: usize,
    pub log_flush_interval_seconds: u64,
    pub cors_origins: Vec<String>,
    pub seed_admin: Option<SeedAdmin>,
}

#[derive(Clone, Debug)]
pub struct SeedAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:3000");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");
        let production = env_or("APP_ENV", "development") == "production";

        let cors_origins = env_or(
            "CORS_ORIGINS",
            "http://localhost:5173,http://localhost:5174,http://localhost:3000",
        )
        .split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect();

        let log_batch_size: usize = env_or_parse("LOG_BATCH_SIZE", "10")?;
        if log_batch_size == 0 {
            return Err(anyhow!("invalid LOG_BATCH_SIZE: must be at least 1"));
        }

        Ok(Self {
            http_addr,
            app_mode,
            production,
            database_url: env_or_err("DATABASE_URL")?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            token_key: env_key_32("TOKEN_KEY")?,
            token_ttl_days: env_or_parse("TOKEN_TTL_DAYS", "7")?,
            static_dir: env_or("STATIC_DIR", "static"),
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "5242880")?,
            cache_ttl_seconds: env_or_parse("CACHE_TTL_SECONDS", "300")?,
            log_batch_size,
            log_flush_interval_seconds: env_or_parse("LOG_FLUSH_INTERVAL_SECONDS", "5")?,
            cors_origins,
            seed_admin: seed_admin_from_env(),
        })
    }
}

fn seed_admin_from_env() -> Option<SeedAdmin> {
    let email = std::env::var("SEED_ADMIN_EMAIL").ok()?;
    let password = std::env::var("SEED_ADMIN_PASSWORD").ok()?;
    let username = env_or("SEED_ADMIN_USERNAME", "admin");
    Some(SeedAdmin {
        username,
        email,
        password,
    })
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}
