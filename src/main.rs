use std::process::ExitCode;
use std::sync::Arc;

use rpstore::{
    config::{Backend, StoreConfig},
    db, AppError, PostgresRoomRepository, RoomStore,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prepares the configured backing store: connects once, creates the rooms
/// table if needed and checks that lookups go through.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rpstore=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, transient = e.is_transient(), "Room store bootstrap failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let config = StoreConfig::from_env()?;
    info!(backend = ?config.backend, "Starting room store");

    let store = match (config.backend, &config.database) {
        (Backend::Postgres, Some(database)) => {
            let pool = db::connect(database).await?;
            RoomStore::with_config(Arc::new(PostgresRoomRepository::new(pool)), &config)
        }
        _ => rpstore::build_store(&config)?,
    };

    // Any code works here; a miss still proves the collection is reachable.
    store.find_room_by_code("healthcheck").await?;

    info!("Room store ready");
    Ok(())
}
