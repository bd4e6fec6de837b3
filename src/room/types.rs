use serde::{Deserialize, Serialize};

/// Fields supplied by the caller when creating a room
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomCreateRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl RoomCreateRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            desc: None,
        }
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }
}

/// Outcome of a targeted message patch at the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The message was updated in place
    Applied,
    /// No room has the given id
    RoomNotFound,
    /// The room exists but has no message at that index
    OutOfRange { len: usize },
}
