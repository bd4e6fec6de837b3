use std::str::FromStr;
use std::time::Duration;

use crate::shared::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CODE_ATTEMPTS: u32 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Which backing collection the store runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Postgres,
}

impl FromStr for Backend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Backend::Memory),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            other => Err(AppError::Config(format!("Unknown backend: {}", other))),
        }
    }
}

/// Connection settings for the Postgres backend
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long establishing a connection may take before it counts as failed
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Runtime configuration of the room store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: Backend,
    pub database: Option<DatabaseConfig>,
    /// Reject malformed message and character payloads before storing them
    pub validate_payloads: bool,
    /// How many fresh codes to try when generating a room code
    pub code_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            database: None,
            validate_payloads: false,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }
}

impl StoreConfig {
    /// Reads configuration from the process environment
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("RPSTORE_BACKEND") {
            Some(value) => value.parse()?,
            None => Backend::Memory,
        };

        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let connect_timeout = parse_or(
            &lookup,
            "DATABASE_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        let database = match (backend, lookup("DATABASE_URL")) {
            (_, Some(url)) => Some(DatabaseConfig {
                url,
                max_connections,
                connect_timeout: Duration::from_secs(connect_timeout),
            }),
            (Backend::Postgres, None) => {
                return Err(AppError::Config(
                    "DATABASE_URL must be set for the postgres backend".to_string(),
                ))
            }
            (Backend::Memory, None) => None,
        };

        let code_attempts = parse_or(&lookup, "RPSTORE_CODE_ATTEMPTS", DEFAULT_CODE_ATTEMPTS)?;
        if code_attempts == 0 {
            return Err(AppError::Config(
                "RPSTORE_CODE_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            backend,
            database,
            validate_payloads: parse_or(&lookup, "RPSTORE_VALIDATE_PAYLOADS", false)?,
            code_attempts,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid value for {}: {}", key, raw))),
        None => Ok(default),
    }
}
