use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

use rpstore::room::models::{ArrayField, MessageEdit, RoomDocument};
use rpstore::room::types::PatchOutcome;
use rpstore::{AppError, InMemoryRoomRepository, RoomId, RoomRepository, RpCode};

// ============================================================================
// Mock Infrastructure
// ============================================================================

fn unreachable() -> AppError {
    AppError::Connectivity("connection refused".to_string())
}

/// Backing store that can never be reached
pub struct UnreachableRoomRepository;

#[async_trait]
impl RoomRepository for UnreachableRoomRepository {
    async fn find_by_code(
        &self,
        _rp_code: &RpCode,
    ) -> Result<Option<(RoomId, RoomDocument)>, AppError> {
        Err(unreachable())
    }
    async fn insert(&self, _room: &RoomDocument) -> Result<RoomId, AppError> {
        Err(unreachable())
    }
    async fn array_push(
        &self,
        _room_id: RoomId,
        _field: ArrayField,
        _value: Value,
    ) -> Result<bool, AppError> {
        Err(unreachable())
    }
    async fn array_len(
        &self,
        _room_id: RoomId,
        _field: ArrayField,
    ) -> Result<Option<usize>, AppError> {
        Err(unreachable())
    }
    async fn array_slice(
        &self,
        _room_id: RoomId,
        _field: ArrayField,
        _offset: usize,
        _count: usize,
    ) -> Result<Option<Vec<Value>>, AppError> {
        Err(unreachable())
    }
    async fn patch_message(
        &self,
        _room_id: RoomId,
        _index: usize,
        _edit: &MessageEdit,
    ) -> Result<PatchOutcome, AppError> {
        Err(unreachable())
    }
}

/// In-memory backing store whose first `failures` calls are refused
pub struct FlakyRoomRepository {
    inner: InMemoryRoomRepository,
    remaining_failures: AtomicUsize,
}

impl FlakyRoomRepository {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryRoomRepository::new(),
            remaining_failures: AtomicUsize::new(failures),
        }
    }

    fn check(&self) -> Result<(), AppError> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(unreachable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RoomRepository for FlakyRoomRepository {
    async fn find_by_code(
        &self,
        rp_code: &RpCode,
    ) -> Result<Option<(RoomId, RoomDocument)>, AppError> {
        self.check()?;
        self.inner.find_by_code(rp_code).await
    }
    async fn insert(&self, room: &RoomDocument) -> Result<RoomId, AppError> {
        self.check()?;
        self.inner.insert(room).await
    }
    async fn array_push(
        &self,
        room_id: RoomId,
        field: ArrayField,
        value: Value,
    ) -> Result<bool, AppError> {
        self.check()?;
        self.inner.array_push(room_id, field, value).await
    }
    async fn array_len(
        &self,
        room_id: RoomId,
        field: ArrayField,
    ) -> Result<Option<usize>, AppError> {
        self.check()?;
        self.inner.array_len(room_id, field).await
    }
    async fn array_slice(
        &self,
        room_id: RoomId,
        field: ArrayField,
        offset: usize,
        count: usize,
    ) -> Result<Option<Vec<Value>>, AppError> {
        self.check()?;
        self.inner.array_slice(room_id, field, offset, count).await
    }
    async fn patch_message(
        &self,
        room_id: RoomId,
        index: usize,
        edit: &MessageEdit,
    ) -> Result<PatchOutcome, AppError> {
        self.check()?;
        self.inner.patch_message(room_id, index, edit).await
    }
}
