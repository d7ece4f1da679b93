use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local maps. Everything is lost on restart.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Session,
    /// Signed stateless tokens.
    Jwt,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub storage: StorageBackend,
    pub auth: AuthScheme,
    /// File holding the token signing secret.
    pub security_file: PathBuf,
    pub signed_token_ttl: Duration,
    pub session_ttl: Duration,
    pub cleanup_interval: Duration,
    /// Upper bound for each handler's store calls.
    pub request_timeout: Duration,
    /// Upper bound for each session-store call.
    pub store_timeout: Duration,
    pub machine_id: u16,
    /// Optional user created at startup if missing.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "postgres://localhost/scratchpost".into(),
            db_max_connections: 10,
            storage: StorageBackend::Postgres,
            auth: AuthScheme::Session,
            security_file: PathBuf::from("security.txt"),
            signed_token_ttl: Duration::from_secs(300),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            machine_id: std::process::id() as u16,
            admin_username: None,
            admin_password: None,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    let defaults = Config::default();

    let storage = match std::env::var("SCRATCHPOST_STORAGE").ok().as_deref() {
        None | Some("postgres") => StorageBackend::Postgres,
        Some("memory") => StorageBackend::Memory,
        Some(other) => anyhow::bail!(
            "SCRATCHPOST_STORAGE must be 'postgres' or 'memory', got '{}'",
            other
        ),
    };
    let auth = match std::env::var("SCRATCHPOST_AUTH").ok().as_deref() {
        None | Some("session") => AuthScheme::Session,
        Some("jwt") => AuthScheme::Jwt,
        Some(other) => anyhow::bail!(
            "SCRATCHPOST_AUTH must be 'session' or 'jwt', got '{}'",
            other
        ),
    };

    Ok(Config {
        port: env_parse("SCRATCHPOST_PORT")?.unwrap_or(defaults.port),
        database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
        db_max_connections: env_parse("SCRATCHPOST_DB_MAX_CONNECTIONS")?
            .unwrap_or(defaults.db_max_connections),
        storage,
        auth,
        security_file: std::env::var("SCRATCHPOST_SECURITY_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.security_file),
        signed_token_ttl: env_secs("SCRATCHPOST_SIGNED_TOKEN_TTL_SECS")?
            .unwrap_or(defaults.signed_token_ttl),
        session_ttl: env_secs("SCRATCHPOST_SESSION_TTL_SECS")?.unwrap_or(defaults.session_ttl),
        cleanup_interval: env_secs("SCRATCHPOST_CLEANUP_INTERVAL_SECS")?
            .unwrap_or(defaults.cleanup_interval),
        request_timeout: env_secs("SCRATCHPOST_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(defaults.request_timeout),
        store_timeout: env_secs("SCRATCHPOST_STORE_TIMEOUT_SECS")?
            .unwrap_or(defaults.store_timeout),
        machine_id: env_parse("SCRATCHPOST_MACHINE_ID")?.unwrap_or(defaults.machine_id),
        admin_username: std::env::var("SCRATCHPOST_ADMIN_USERNAME").ok(),
        admin_password: std::env::var("SCRATCHPOST_ADMIN_PASSWORD").ok(),
    })
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        _ => Ok(None),
    }
}

fn env_secs(key: &str) -> anyhow::Result<Option<Duration>> {
    let secs: Option<u64> = env_parse(key)?;
    match secs {
        Some(0) => anyhow::bail!("{} must be greater than zero", key),
        other => Ok(other.map(Duration::from_secs)),
    }
}
