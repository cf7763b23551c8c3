use std::time::Duration;

use anyhow::{Context, Result, bail};

use murmur_gateway::RelayConfig;

/// Placeholder session secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_ORIGIN: &str = "https://v-cart-one.vercel.app";
const DEV_ORIGIN: &str = "http://localhost:3000";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub session_secret: String,
    pub allowed_origins: Vec<String>,
    pub dev_mode: bool,
    pub relay: RelayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dev_mode = std::env::var("MURMUR_DEV_MODE")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let session_secret = std::env::var("MURMUR_SESSION_SECRET").unwrap_or_default();
        if session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            bail!("MURMUR_SESSION_SECRET is unset or still a placeholder");
        }

        let mut allowed_origins: Vec<String> = std::env::var("MURMUR_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ORIGIN.into())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        if dev_mode && !allowed_origins.iter().any(|o| o == DEV_ORIGIN) {
            allowed_origins.push(DEV_ORIGIN.into());
        }

        let defaults = RelayConfig::default();
        let relay = RelayConfig {
            queue_capacity: env_parse("MURMUR_QUEUE_CAPACITY", defaults.queue_capacity)?,
            enqueue_timeout: env_millis("MURMUR_ENQUEUE_TIMEOUT_MS", defaults.enqueue_timeout)?,
            write_timeout: env_millis("MURMUR_WRITE_TIMEOUT_MS", defaults.write_timeout)?,
            drain_timeout: env_millis("MURMUR_DRAIN_TIMEOUT_MS", defaults.drain_timeout)?,
        };

        Ok(Self {
            host: std::env::var("MURMUR_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("MURMUR_PORT", 8080)?,
            db_path: std::env::var("MURMUR_DB_PATH").unwrap_or_else(|_| "murmur.db".into()),
            session_secret,
            allowed_origins,
            dev_mode,
            relay,
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_millis(env_parse(key, default.as_millis() as u64)?))
}
