//! Payload rules for messages and characters.
//!
//! The store treats payloads as opaque; these checks are optional and only
//! run when `StoreConfig::validate_payloads` is set.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::models::{Character, Message};
use crate::shared::AppError;

// Length limits count UTF-8 bytes.
pub const MAX_CONTENT_LEN: usize = 50_000;
pub const MAX_URL_LEN: usize = 1_000;
pub const MAX_NAME_LEN: usize = 30;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[-A-Za-z0-9+&@#/%?=~_|!:,.;]+$").expect("valid url pattern")
});

static COLOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9a-f]{6}$").expect("valid color pattern"));

/// Kinds of message a room log accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Narrator,
    Chara,
    Ooc,
    Image,
}

impl MessageKind {
    fn parse(raw: Option<&Value>) -> Result<Self, AppError> {
        match raw.and_then(Value::as_str) {
            Some("narrator") => Ok(MessageKind::Narrator),
            Some("chara") => Ok(MessageKind::Chara),
            Some("ooc") => Ok(MessageKind::Ooc),
            Some("image") => Ok(MessageKind::Image),
            _ => Err(invalid("Msg: invalid type")),
        }
    }
}

fn invalid(reason: impl Into<String>) -> AppError {
    AppError::Validation(reason.into())
}

fn non_blank(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null() && v.as_str() != Some(""))
}

/// Checks text content of narrator, chara and ooc messages and of edits
pub fn validate_content(content: &str) -> Result<(), AppError> {
    if content.is_empty() {
        return Err(invalid("Msg: content is empty"));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err(invalid(format!(
            "Msg: content is too long ({} bytes)",
            content.len()
        )));
    }
    Ok(())
}

/// Validates a message's shape and returns the character index it refers to
pub fn validate_message(message: &Message) -> Result<Option<i64>, AppError> {
    let kind = MessageKind::parse(message.field("type"))?;
    let chara_id = non_blank(message.field("charaId"));

    if kind == MessageKind::Image {
        if !message.content().is_empty() {
            return Err(invalid("Msg: image should not have 'content'"));
        }
        if chara_id.is_some() {
            return Err(invalid("Msg: image should not have 'charaId'"));
        }
        let url = message
            .field("url")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if url.len() > MAX_URL_LEN {
            return Err(invalid(format!(
                "Msg: url is too long ({} bytes)",
                url.len()
            )));
        }
        if !URL_PATTERN.is_match(url) {
            return Err(invalid("Msg: url is invalid"));
        }
        return Ok(None);
    }

    if non_blank(message.field("url")).is_some() {
        return Err(invalid("Msg: non-image should not have 'url'"));
    }
    validate_content(message.content())?;

    match (kind, chara_id) {
        (MessageKind::Chara, None) => Err(invalid("Msg: charaId is empty")),
        (MessageKind::Chara, Some(id)) => chara_index(id).map(Some),
        (_, Some(_)) => Err(invalid("Msg: non-chara msg should not have 'charaId'")),
        (_, None) => Ok(None),
    }
}

fn chara_index(raw: &Value) -> Result<i64, AppError> {
    let parsed = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(format!("Msg with invalid chara id: {}", raw)))
}

/// Validates a character's name and color
pub fn validate_character(character: &Character) -> Result<(), AppError> {
    let name = character
        .field("name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if name.is_empty() {
        return Err(invalid("Chara: name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("Chara: name is too long"));
    }

    let color = character
        .field("color")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !COLOR_PATTERN.is_match(color) {
        return Err(invalid("Chara: color is invalid"));
    }
    Ok(())
}
