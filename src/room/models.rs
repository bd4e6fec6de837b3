use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::shared::AppError;

/// Internal room identifier, assigned by the store at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RoomId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RoomId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| AppError::InvalidRoomId(s.to_string()))
    }
}

/// Client-facing room handle, unique across rooms
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RpCode(String);

impl RpCode {
    pub fn new(code: impl Into<String>) -> Result<Self, AppError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(AppError::Validation("Room code is empty".to_string()));
        }
        Ok(Self(code))
    }

    /// Generates a human-shareable code from two pet name words
    pub fn generate() -> Self {
        Self(petname::Petnames::default().generate_one(2, "-"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `edited` marker of a message: a plain flag or the time of the last edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditMarker {
    Flag(bool),
    At(DateTime<Utc>),
}

impl Default for EditMarker {
    fn default() -> Self {
        EditMarker::Flag(false)
    }
}

impl From<bool> for EditMarker {
    fn from(flag: bool) -> Self {
        EditMarker::Flag(flag)
    }
}

impl From<DateTime<Utc>> for EditMarker {
    fn from(at: DateTime<Utc>) -> Self {
        EditMarker::At(at)
    }
}

/// One entry of a room's message log.
///
/// Only `content` and `edited` are known to the store; every other field the
/// caller supplies is carried through untouched in `extra`. Fields the caller
/// left out stay out of the stored payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited: Option<EditMarker>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// A text message that has not been edited
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            edited: Some(EditMarker::default()),
            extra: Map::new(),
        }
    }

    /// Text content, empty when the payload has none
    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Adds an opaque field to the payload
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// One entry of a room's character registry, opaque to the store
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Character(pub Map<String, Value>);

impl Character {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Persisted layout of a room: one document per room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDocument {
    #[serde(rename = "rpCode")]
    pub rp_code: RpCode,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub characters: Vec<Character>,
}

impl RoomDocument {
    /// Creates a new room document with empty message and character logs
    pub fn new(rp_code: RpCode, title: String, desc: Option<String>) -> Self {
        Self {
            rp_code,
            title,
            desc,
            messages: vec![],
            characters: vec![],
        }
    }

    /// Splits the document into the read view, dropping the code
    pub fn into_room(self, id: RoomId) -> Room {
        Room {
            id,
            rp: RoomPayload {
                title: self.title,
                desc: self.desc,
                messages: self.messages,
                characters: self.characters,
            },
        }
    }
}

/// Room contents as seen by callers; carries neither the code nor the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    pub messages: Vec<Message>,
    pub characters: Vec<Character>,
}

/// Result of looking a room up by its code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub rp: RoomPayload,
}

/// Array-valued fields of a room document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayField {
    Messages,
    Characters,
}

impl ArrayField {
    pub fn column(&self) -> &'static str {
        match self {
            ArrayField::Messages => "messages",
            ArrayField::Characters => "characters",
        }
    }
}

/// Typed patch over the mutable fields of a single message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEdit {
    pub content: String,
    pub edited: EditMarker,
}

impl MessageEdit {
    pub fn new(content: impl Into<String>, edited: impl Into<EditMarker>) -> Self {
        Self {
            content: content.into(),
            edited: edited.into(),
        }
    }

    /// An edit stamped with the current time
    pub fn now(content: impl Into<String>) -> Self {
        Self::new(content, Utc::now())
    }

    pub fn apply(&self, message: &mut Message) {
        message.content = Some(self.content.clone());
        message.edited = Some(self.edited.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_id_parse_round_trip() {
        let id = RoomId::new();
        let parsed: RoomId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_room_id_rejects_garbage() {
        let result = "not-a-uuid".parse::<RoomId>();
        assert!(matches!(result, Err(AppError::InvalidRoomId(_))));
    }

    #[test]
    fn test_blank_code_rejected() {
        assert!(matches!(RpCode::new("  "), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_generated_code_has_two_words() {
        let code = RpCode::generate();
        assert_eq!(code.as_str().split('-').count(), 2);
    }

    #[test]
    fn test_document_without_desc_omits_field() {
        let doc = RoomDocument::new(RpCode::new("abcd").unwrap(), "Test".to_string(), None);
        let value = serde_json::to_value(&doc).unwrap();

        assert!(value.get("desc").is_none());
        assert_eq!(value["rpCode"], "abcd");
        assert_eq!(value["messages"], json!([]));
        assert_eq!(value["characters"], json!([]));
    }

    #[test]
    fn test_document_with_empty_desc_keeps_field() {
        let doc = RoomDocument::new(
            RpCode::new("abcd").unwrap(),
            "Test".to_string(),
            Some(String::new()),
        );
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["desc"], "");
    }

    #[test]
    fn test_message_keeps_opaque_fields() {
        let raw = json!({
            "content": "Hello",
            "edited": false,
            "type": "chara",
            "charaId": 0
        });
        let message: Message = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(message.content(), "Hello");
        assert_eq!(message.edited, Some(EditMarker::Flag(false)));
        assert_eq!(message.field("type"), Some(&json!("chara")));
        assert_eq!(serde_json::to_value(&message).unwrap(), raw);
    }

    #[test]
    fn test_edit_marker_accepts_timestamp() {
        let message: Message = serde_json::from_value(json!({
            "content": "Hi",
            "edited": "2024-05-01T12:00:00Z"
        }))
        .unwrap();
        assert!(matches!(message.edited, Some(EditMarker::At(_))));
    }

    #[test]
    fn test_missing_fields_stay_absent() {
        let raw = json!({ "type": "image", "url": "https://a.b/c.png" });
        let message: Message = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(message.content, None);
        assert_eq!(message.edited, None);
        assert_eq!(message.content(), "");
        assert_eq!(serde_json::to_value(&message).unwrap(), raw);
    }

    #[test]
    fn test_edit_apply_leaves_other_fields() {
        let mut message = Message::new("Hello").with_field("type", "ooc");
        MessageEdit::new("Hi", true).apply(&mut message);

        assert_eq!(message.content(), "Hi");
        assert_eq!(message.edited, Some(EditMarker::Flag(true)));
        assert_eq!(message.field("type"), Some(&json!("ooc")));
    }

    #[test]
    fn test_into_room_strips_code() {
        let id = RoomId::new();
        let doc = RoomDocument::new(RpCode::new("abcd").unwrap(), "Test".to_string(), None);
        let room = doc.into_room(id);

        assert_eq!(room.id, id);
        let value = serde_json::to_value(&room.rp).unwrap();
        assert!(value.get("rpCode").is_none());
        assert!(value.get("id").is_none());
    }
}
