// Library crate for the role-play room store
// This file exposes the public API for integration tests and callers

pub mod config;
pub mod db;
pub mod room;
pub mod shared;

use std::sync::Arc;

use config::{Backend, StoreConfig};

// Re-export commonly used types for easier access in tests
pub use room::{
    Character, EditMarker, InMemoryRoomRepository, Message, MessageEdit, PostgresRoomRepository,
    Room, RoomCreateRequest, RoomId, RoomRepository, RoomStore, RpCode,
};
pub use shared::{AppError, AppResult};

/// Builds a room store on the backend the configuration names.
///
/// The Postgres backend connects lazily: the pool is established by the first
/// operation and shared by every operation after it.
pub fn build_store(config: &StoreConfig) -> Result<RoomStore, AppError> {
    let repository: Arc<dyn RoomRepository + Send + Sync> = match config.backend {
        Backend::Memory => Arc::new(InMemoryRoomRepository::new()),
        Backend::Postgres => {
            let database = config.database.clone().ok_or_else(|| {
                AppError::Config("Postgres backend needs a database configuration".to_string())
            })?;
            Arc::new(PostgresRoomRepository::lazy(database))
        }
    };

    Ok(RoomStore::with_config(repository, config))
}
