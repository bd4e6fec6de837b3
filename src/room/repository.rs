use async_trait::async_trait;
use serde_json::Value;
use sqlx::{types::Json, PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::models::{ArrayField, Character, Message, MessageEdit, RoomDocument, RoomId, RpCode};
use super::types::PatchOutcome;
use crate::config::DatabaseConfig;
use crate::db::LazyPool;
use crate::shared::AppError;

/// Backing collection of room documents.
///
/// Every method is a single atomic operation on one document. Implementations
/// never read an array to append to it or to patch one of its elements.
#[async_trait]
pub trait RoomRepository {
    /// Finds a room by its code, returning its id and the stored document
    async fn find_by_code(
        &self,
        rp_code: &RpCode,
    ) -> Result<Option<(RoomId, RoomDocument)>, AppError>;

    /// Inserts a new room, failing with `DuplicateCode` if the code is taken
    async fn insert(&self, room: &RoomDocument) -> Result<RoomId, AppError>;

    /// Appends one element to an array field. Returns false if no room matched.
    async fn array_push(
        &self,
        room_id: RoomId,
        field: ArrayField,
        value: Value,
    ) -> Result<bool, AppError>;

    /// Length of an array field, without transferring its elements
    async fn array_len(&self, room_id: RoomId, field: ArrayField)
        -> Result<Option<usize>, AppError>;

    /// Bounded window of an array field: at most `count` elements from `offset`
    async fn array_slice(
        &self,
        room_id: RoomId,
        field: ArrayField,
        offset: usize,
        count: usize,
    ) -> Result<Option<Vec<Value>>, AppError>;

    /// Sets `content` and `edited` of one message in place
    async fn patch_message(
        &self,
        room_id: RoomId,
        index: usize,
        edit: &MessageEdit,
    ) -> Result<PatchOutcome, AppError>;
}

#[derive(Default)]
struct Collection {
    documents: HashMap<RoomId, Value>,
    codes: HashMap<String, RoomId>,
}

/// In-memory implementation of RoomRepository for development and testing
///
/// Documents are kept as JSON values, the way a document database holds them.
/// Each operation runs inside a single write or read section, which makes it
/// atomic per document the same way the database backend is.
pub struct InMemoryRoomRepository {
    collection: RwLock<Collection>,
}

impl Default for InMemoryRoomRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            collection: RwLock::new(Collection::default()),
        }
    }

    /// Returns the current number of rooms in the repository
    pub async fn room_count(&self) -> usize {
        self.collection.read().await.documents.len()
    }

    /// Raw stored document, for inspecting the persisted layout
    pub async fn raw_document(&self, room_id: RoomId) -> Option<Value> {
        self.collection.read().await.documents.get(&room_id).cloned()
    }
}

fn array_of(document: &Value, field: ArrayField) -> Option<&Vec<Value>> {
    document.get(field.column()).and_then(Value::as_array)
}

fn array_of_mut(document: &mut Value, field: ArrayField) -> Option<&mut Vec<Value>> {
    document
        .get_mut(field.column())
        .and_then(Value::as_array_mut)
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    #[instrument(skip(self))]
    async fn find_by_code(
        &self,
        rp_code: &RpCode,
    ) -> Result<Option<(RoomId, RoomDocument)>, AppError> {
        debug!(rp_code = %rp_code, "Fetching room by code from memory");

        let collection = self.collection.read().await;
        let Some(room_id) = collection.codes.get(rp_code.as_str()).copied() else {
            debug!(rp_code = %rp_code, "Room not found in memory");
            return Ok(None);
        };
        let document = collection
            .documents
            .get(&room_id)
            .cloned()
            .ok_or_else(|| AppError::DatabaseError("Code index out of sync".to_string()))?;

        Ok(Some((room_id, serde_json::from_value(document)?)))
    }

    #[instrument(skip(self, room), fields(rp_code = %room.rp_code))]
    async fn insert(&self, room: &RoomDocument) -> Result<RoomId, AppError> {
        debug!(title = %room.title, "Creating room in memory");

        let document = serde_json::to_value(room)?;
        let mut collection = self.collection.write().await;
        if collection.codes.contains_key(room.rp_code.as_str()) {
            warn!("Room code already exists in memory");
            return Err(AppError::DuplicateCode(room.rp_code.to_string()));
        }

        let room_id = RoomId::new();
        collection
            .codes
            .insert(room.rp_code.as_str().to_string(), room_id);
        collection.documents.insert(room_id, document);

        debug!(room_id = %room_id, "Room created successfully in memory");
        Ok(room_id)
    }

    #[instrument(skip(self, value))]
    async fn array_push(
        &self,
        room_id: RoomId,
        field: ArrayField,
        value: Value,
    ) -> Result<bool, AppError> {
        let mut collection = self.collection.write().await;
        let Some(document) = collection.documents.get_mut(&room_id) else {
            return Ok(false);
        };
        let array = array_of_mut(document, field)
            .ok_or_else(|| AppError::DatabaseError(format!("{} is not an array", field.column())))?;
        array.push(value);

        debug!(new_len = array.len(), "Appended to array in memory");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn array_len(
        &self,
        room_id: RoomId,
        field: ArrayField,
    ) -> Result<Option<usize>, AppError> {
        let collection = self.collection.read().await;
        Ok(collection
            .documents
            .get(&room_id)
            .map(|document| array_of(document, field).map_or(0, Vec::len)))
    }

    #[instrument(skip(self))]
    async fn array_slice(
        &self,
        room_id: RoomId,
        field: ArrayField,
        offset: usize,
        count: usize,
    ) -> Result<Option<Vec<Value>>, AppError> {
        let collection = self.collection.read().await;
        Ok(collection.documents.get(&room_id).map(|document| {
            array_of(document, field)
                .map(|array| array.iter().skip(offset).take(count).cloned().collect())
                .unwrap_or_default()
        }))
    }

    #[instrument(skip(self, edit))]
    async fn patch_message(
        &self,
        room_id: RoomId,
        index: usize,
        edit: &MessageEdit,
    ) -> Result<PatchOutcome, AppError> {
        let edited = serde_json::to_value(&edit.edited)?;

        let mut collection = self.collection.write().await;
        let Some(document) = collection.documents.get_mut(&room_id) else {
            return Ok(PatchOutcome::RoomNotFound);
        };
        let messages = array_of_mut(document, ArrayField::Messages)
            .ok_or_else(|| AppError::DatabaseError("messages is not an array".to_string()))?;
        let len = messages.len();
        let message = match messages.get_mut(index) {
            Some(Value::Object(message)) => message,
            Some(_) => {
                warn!(index, "Stored message is not an object");
                return Err(AppError::DatabaseError(format!(
                    "Message {} is not an object",
                    index
                )));
            }
            None => return Ok(PatchOutcome::OutOfRange { len }),
        };

        message.insert("content".to_string(), Value::String(edit.content.clone()));
        message.insert("edited".to_string(), edited);

        debug!("Message patched in memory");
        Ok(PatchOutcome::Applied)
    }
}

/// PostgreSQL implementation of room repository
///
/// Rooms live in one row each; messages and characters are JSONB arrays so
/// appends, length checks, windows and patches all run server-side.
pub struct PostgresRoomRepository {
    pool: LazyPool,
}

impl PostgresRoomRepository {
    /// Uses an already established pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: LazyPool::established(pool),
        }
    }

    /// Connects on first use and reuses that connection afterwards
    pub fn lazy(config: DatabaseConfig) -> Self {
        Self {
            pool: LazyPool::new(config),
        }
    }
}

fn sql_index(value: usize) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("Index too large: {}", value)))
}

fn decode_err(e: sqlx::Error) -> AppError {
    warn!(error = %e, "Failed to decode room row");
    AppError::DatabaseError(e.to_string())
}

#[async_trait]
impl RoomRepository for PostgresRoomRepository {
    #[instrument(skip(self))]
    async fn find_by_code(
        &self,
        rp_code: &RpCode,
    ) -> Result<Option<(RoomId, RoomDocument)>, AppError> {
        debug!(rp_code = %rp_code, "Fetching room by code from database");
        let pool = self.pool.get().await?;

        let row = sqlx::query(
            r#"SELECT id, title, "desc", messages, characters FROM rooms WHERE rp_code = $1"#,
        )
        .bind(rp_code.as_str())
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::from_sqlx(e, None))?;

        let Some(row) = row else {
            debug!(rp_code = %rp_code, "Room not found in database");
            return Ok(None);
        };

        let id: Uuid = row.try_get("id").map_err(decode_err)?;
        let Json(messages): Json<Vec<Message>> = row.try_get("messages").map_err(decode_err)?;
        let Json(characters): Json<Vec<Character>> =
            row.try_get("characters").map_err(decode_err)?;
        let document = RoomDocument {
            rp_code: rp_code.clone(),
            title: row.try_get("title").map_err(decode_err)?,
            desc: row.try_get("desc").map_err(decode_err)?,
            messages,
            characters,
        };

        debug!(room_id = %id, "Room found in database");
        Ok(Some((RoomId::from(id), document)))
    }

    #[instrument(skip(self, room), fields(rp_code = %room.rp_code))]
    async fn insert(&self, room: &RoomDocument) -> Result<RoomId, AppError> {
        debug!(title = %room.title, "Creating room in database");
        let pool = self.pool.get().await?;

        let room_id = RoomId::new();
        sqlx::query(
            r#"INSERT INTO rooms (id, rp_code, title, "desc", messages, characters) VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(room_id.as_uuid())
        .bind(room.rp_code.as_str())
        .bind(&room.title)
        .bind(room.desc.as_deref())
        .bind(Json(&room.messages))
        .bind(Json(&room.characters))
        .execute(pool)
        .await
        .map_err(|e| AppError::from_sqlx(e, Some(room.rp_code.as_str())))?;

        debug!(room_id = %room_id, "Room created successfully in database");
        Ok(room_id)
    }

    #[instrument(skip(self, value))]
    async fn array_push(
        &self,
        room_id: RoomId,
        field: ArrayField,
        value: Value,
    ) -> Result<bool, AppError> {
        let pool = self.pool.get().await?;

        let statement = format!(
            "UPDATE rooms SET {col} = {col} || jsonb_build_array($2::jsonb) WHERE id = $1",
            col = field.column()
        );
        let result = sqlx::query(&statement)
            .bind(room_id.as_uuid())
            .bind(Json(value))
            .execute(pool)
            .await
            .map_err(|e| AppError::from_sqlx(e, None))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn array_len(
        &self,
        room_id: RoomId,
        field: ArrayField,
    ) -> Result<Option<usize>, AppError> {
        let pool = self.pool.get().await?;

        let statement = format!(
            "SELECT jsonb_array_length({}) FROM rooms WHERE id = $1",
            field.column()
        );
        let len: Option<i32> = sqlx::query_scalar(&statement)
            .bind(room_id.as_uuid())
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx(e, None))?;

        Ok(len.map(|n| n.max(0) as usize))
    }

    #[instrument(skip(self))]
    async fn array_slice(
        &self,
        room_id: RoomId,
        field: ArrayField,
        offset: usize,
        count: usize,
    ) -> Result<Option<Vec<Value>>, AppError> {
        let pool = self.pool.get().await?;

        let statement = format!(
            r#"SELECT (
                SELECT COALESCE(jsonb_agg(t.e ORDER BY t.n), '[]'::jsonb)
                FROM jsonb_array_elements(r.{col}) WITH ORDINALITY AS t(e, n)
                WHERE t.n > $2 AND t.n <= $2 + $3
            ) FROM rooms r WHERE r.id = $1"#,
            col = field.column()
        );
        let window: Option<Json<Vec<Value>>> = sqlx::query_scalar(&statement)
            .bind(room_id.as_uuid())
            .bind(sql_index(offset)?)
            .bind(sql_index(count)?)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::from_sqlx(e, None))?;

        Ok(window.map(|Json(values)| values))
    }

    #[instrument(skip(self, edit))]
    async fn patch_message(
        &self,
        room_id: RoomId,
        index: usize,
        edit: &MessageEdit,
    ) -> Result<PatchOutcome, AppError> {
        let pool = self.pool.get().await?;

        // The guards sit in the same statement so the patch never creates a
        // message past the end of the array or writes through a non-object.
        let result = sqlx::query(
            r#"UPDATE rooms
               SET messages = jsonb_set(
                   jsonb_set(messages, ARRAY[$2::text, 'content'], to_jsonb($3::text)),
                   ARRAY[$2::text, 'edited'], $4::jsonb)
               WHERE id = $1
                 AND jsonb_array_length(messages) > $5
                 AND jsonb_typeof(messages -> $5::int) = 'object'"#,
        )
        .bind(room_id.as_uuid())
        .bind(index.to_string())
        .bind(&edit.content)
        .bind(Json(&edit.edited))
        .bind(sql_index(index)?)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_sqlx(e, None))?;

        if result.rows_affected() > 0 {
            info!(room_id = %room_id, index, "Message patched in database");
            return Ok(PatchOutcome::Applied);
        }

        let len = match self.array_len(room_id, ArrayField::Messages).await? {
            Some(len) => len,
            None => return Ok(PatchOutcome::RoomNotFound),
        };
        if index < len {
            warn!(room_id = %room_id, index, "Stored message is not an object");
            return Err(AppError::DatabaseError(format!(
                "Message {} is not an object",
                index
            )));
        }
        Ok(PatchOutcome::OutOfRange { len })
    }
}
