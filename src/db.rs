use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::shared::AppError;

const CREATE_ROOMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rooms (
    id UUID PRIMARY KEY,
    rp_code TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    "desc" TEXT NULL,
    messages JSONB NOT NULL DEFAULT '[]'::jsonb,
    characters JSONB NOT NULL DEFAULT '[]'::jsonb
)
"#;

/// Opens a connection pool and makes sure the rooms table exists
#[instrument(skip(config))]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, AppError> {
    debug!(max_connections = config.max_connections, "Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to connect to database");
            AppError::Connectivity(e.to_string())
        })?;

    ensure_schema(&pool).await?;

    info!("Database connection established");
    Ok(pool)
}

/// Creates the rooms table if it is missing
pub async fn ensure_schema(pool: &PgPool) -> Result<(), AppError> {
    sqlx::query(CREATE_ROOMS_TABLE)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_sqlx(e, None))?;
    Ok(())
}

/// Shared pool handle that is established on first use.
///
/// Establishment happens at most once; a failed attempt leaves the cell empty
/// so the next caller tries again.
pub struct LazyPool {
    config: Option<DatabaseConfig>,
    cell: OnceCell<PgPool>,
}

impl LazyPool {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config: Some(config),
            cell: OnceCell::new(),
        }
    }

    /// Wraps a pool that is already connected
    pub fn established(pool: PgPool) -> Self {
        Self {
            config: None,
            cell: OnceCell::new_with(Some(pool)),
        }
    }

    pub fn is_established(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> Result<&PgPool, AppError> {
        self.cell
            .get_or_try_init(|| async {
                match &self.config {
                    Some(config) => connect(config).await,
                    None => Err(AppError::Connectivity(
                        "No database configuration".to_string(),
                    )),
                }
            })
            .await
    }
}
