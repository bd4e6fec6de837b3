use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    models::{ArrayField, Character, Message, MessageEdit, Room, RoomDocument, RoomId, RpCode},
    repository::RoomRepository,
    types::{PatchOutcome, RoomCreateRequest},
    validation,
};
use crate::{config::StoreConfig, shared::AppError};

/// Room-scoped access to rooms, their message logs and character registries.
///
/// Rooms are discovered by code and mutated by id. Messages and characters are
/// addressed by their position, which never changes because both sequences
/// only grow by appending.
#[derive(Clone)]
pub struct RoomStore {
    repository: Arc<dyn RoomRepository + Send + Sync>,
    validate_payloads: bool,
    code_attempts: u32,
}

impl RoomStore {
    pub fn new(repository: Arc<dyn RoomRepository + Send + Sync>) -> Self {
        Self::with_config(repository, &StoreConfig::default())
    }

    pub fn with_config(
        repository: Arc<dyn RoomRepository + Send + Sync>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            repository,
            validate_payloads: config.validate_payloads,
            code_attempts: config.code_attempts.max(1),
        }
    }

    /// Looks a room up by its code. A missing room is `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn find_room_by_code(&self, rp_code: &str) -> Result<Option<Room>, AppError> {
        let Ok(rp_code) = RpCode::new(rp_code) else {
            return Ok(None);
        };

        let room = self
            .repository
            .find_by_code(&rp_code)
            .await?
            .map(|(id, document)| document.into_room(id));

        debug!(found = room.is_some(), "Room lookup by code finished");
        Ok(room)
    }

    /// Creates a room with empty logs under the given code
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_room(
        &self,
        rp_code: &str,
        request: RoomCreateRequest,
    ) -> Result<RoomId, AppError> {
        let rp_code = RpCode::new(rp_code)?;
        let document = RoomDocument::new(rp_code.clone(), request.title, request.desc);

        let room_id = self.repository.insert(&document).await?;

        info!(room_id = %room_id, rp_code = %rp_code, "Room created successfully");
        Ok(room_id)
    }

    /// Creates a room under a freshly generated code.
    ///
    /// Only a code collision leads to another attempt with a new code; every
    /// other failure is returned as is.
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_room_with_generated_code(
        &self,
        request: RoomCreateRequest,
    ) -> Result<(RoomId, RpCode), AppError> {
        let mut last_error = None;

        for attempt in 1..=self.code_attempts {
            let rp_code = RpCode::generate();
            let document =
                RoomDocument::new(rp_code.clone(), request.title.clone(), request.desc.clone());

            match self.repository.insert(&document).await {
                Ok(room_id) => {
                    info!(room_id = %room_id, rp_code = %rp_code, attempt, "Room created with generated code");
                    return Ok((room_id, rp_code));
                }
                Err(AppError::DuplicateCode(code)) => {
                    debug!(rp_code = %code, attempt, "Generated code already taken");
                    last_error = Some(AppError::DuplicateCode(code));
                }
                Err(e) => return Err(e),
            }
        }

        warn!(attempts = self.code_attempts, "Ran out of room code attempts");
        Err(last_error.unwrap_or_else(|| AppError::DuplicateCode(String::new())))
    }

    /// Appends a message to the room's log
    #[instrument(skip(self, message))]
    pub async fn append_message(&self, room_id: RoomId, message: Message) -> Result<(), AppError> {
        if self.validate_payloads {
            if let Some(chara_index) = validation::validate_message(&message)? {
                if !self.character_exists(room_id, chara_index).await? {
                    return Err(AppError::Validation(format!(
                        "Msg with invalid chara id: {}",
                        chara_index
                    )));
                }
            }
        }

        self.append(room_id, ArrayField::Messages, serde_json::to_value(&message)?)
            .await
    }

    /// Appends a character to the room's registry
    #[instrument(skip(self, character))]
    pub async fn append_character(
        &self,
        room_id: RoomId,
        character: Character,
    ) -> Result<(), AppError> {
        if self.validate_payloads {
            validation::validate_character(&character)?;
        }

        self.append(
            room_id,
            ArrayField::Characters,
            serde_json::to_value(&character)?,
        )
        .await
    }

    async fn append(
        &self,
        room_id: RoomId,
        field: ArrayField,
        value: serde_json::Value,
    ) -> Result<(), AppError> {
        if self.repository.array_push(room_id, field, value).await? {
            debug!(room_id = %room_id, field = field.column(), "Appended to room");
        } else {
            warn!(room_id = %room_id, field = field.column(), "Append matched no room");
        }
        Ok(())
    }

    /// Whether `index` names a character of the room. Only the registry's
    /// length is fetched.
    #[instrument(skip(self))]
    pub async fn character_exists(&self, room_id: RoomId, index: i64) -> Result<bool, AppError> {
        let Ok(index) = usize::try_from(index) else {
            return Ok(false);
        };

        let len = self.character_count(room_id).await?;
        Ok(len.is_some_and(|len| index < len))
    }

    /// Number of messages in the room, or `None` for an unknown room
    pub async fn message_count(&self, room_id: RoomId) -> Result<Option<usize>, AppError> {
        self.repository
            .array_len(room_id, ArrayField::Messages)
            .await
    }

    /// Number of characters in the room, or `None` for an unknown room
    pub async fn character_count(&self, room_id: RoomId) -> Result<Option<usize>, AppError> {
        self.repository
            .array_len(room_id, ArrayField::Characters)
            .await
    }

    /// Reads the single message at `index`
    #[instrument(skip(self))]
    pub async fn get_message(
        &self,
        room_id: RoomId,
        index: usize,
    ) -> Result<Option<Message>, AppError> {
        match self.entry_at(room_id, ArrayField::Messages, index).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Reads the single character at `index`
    #[instrument(skip(self))]
    pub async fn get_character(
        &self,
        room_id: RoomId,
        index: usize,
    ) -> Result<Option<Character>, AppError> {
        match self.entry_at(room_id, ArrayField::Characters, index).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn entry_at(
        &self,
        room_id: RoomId,
        field: ArrayField,
        index: usize,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let window = self
            .repository
            .array_slice(room_id, field, index, 1)
            .await?;
        Ok(window.and_then(|values| values.into_iter().next()))
    }

    /// Replaces `content` and `edited` of the message at `index`.
    ///
    /// Edits past the end of the log fail with `OutOfRangeIndex`; edits on an
    /// unknown room fail with `RoomNotFound`.
    #[instrument(skip(self, edit))]
    pub async fn edit_message(
        &self,
        room_id: RoomId,
        index: usize,
        edit: MessageEdit,
    ) -> Result<(), AppError> {
        if self.validate_payloads {
            validation::validate_content(&edit.content)?;
        }

        match self.repository.patch_message(room_id, index, &edit).await? {
            PatchOutcome::Applied => {
                info!(room_id = %room_id, index, "Message edited successfully");
                Ok(())
            }
            PatchOutcome::RoomNotFound => {
                warn!(room_id = %room_id, "Edit targeted an unknown room");
                Err(AppError::RoomNotFound(room_id))
            }
            PatchOutcome::OutOfRange { len } => {
                warn!(room_id = %room_id, index, len, "Edit targeted a missing message");
                Err(AppError::OutOfRangeIndex { index, len })
            }
        }
    }
}
