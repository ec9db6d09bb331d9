//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

pub const DEFAULT_DATABASE_URL: &str = "sqlite://products.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_SESSION_RETENTION_DAYS: i64 = 30;

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Database URL: DATABASE_URL, then DB_URL, then the local SQLite file.
pub fn db_url() -> String {
    for k in ["DATABASE_URL", "DB_URL"] {
        if let Some(v) = env_opt(k) {
            return v.trim().to_string();
        }
    }
    info!(target = "env", url = DEFAULT_DATABASE_URL, "no database url set; using default");
    DEFAULT_DATABASE_URL.to_string()
}

pub fn max_connections() -> u32 {
    env_parse("DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS).max(1)
}

/// Replacement taxonomy document, if configured.
pub fn taxonomy_path() -> Option<PathBuf> {
    env_opt("TAXONOMY_PATH").map(|p| PathBuf::from(p.trim()))
}

pub fn session_retention_days() -> i64 {
    env_parse("SESSION_RETENTION_DAYS", DEFAULT_SESSION_RETENTION_DAYS)
}

/// Hide credentials in a database URL before it reaches a log line.
pub fn redact_db_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(mut u) => {
            if !u.username().is_empty() {
                let _ = u.set_username("***");
            }
            if u.password().is_some() {
                let _ = u.set_password(Some("***"));
            }
            u.to_string()
        }
        Err(_) => {
            // best-effort: drop any userinfo before '@'
            if let Some(proto) = trimmed.find("//") {
                if let Some(at) = trimmed[proto + 2..].find('@') {
                    let host_part = &trimmed[proto + 2 + at + 1..];
                    return format!("{}***@{}", &trimmed[..proto + 2], host_part);
                }
            }
            trimmed.to_string()
        }
    }
}
