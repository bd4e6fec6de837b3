// Public API - what other modules can use
pub use models::{Character, EditMarker, Message, MessageEdit, Room, RoomId, RpCode};
pub use repository::{InMemoryRoomRepository, PostgresRoomRepository, RoomRepository};
pub use service::RoomStore;
pub use types::RoomCreateRequest;

pub mod models;
pub mod repository;
mod service;
pub mod types;
pub mod validation;
