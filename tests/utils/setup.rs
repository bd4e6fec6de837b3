use std::sync::Arc;

use rpstore::{
    Character, InMemoryRoomRepository, Message, RoomCreateRequest, RoomId, RoomStore,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub store: RoomStore,
    pub repository: Arc<InMemoryRoomRepository>,
    pub room_id: RoomId,
    pub rp_code: String,
}

pub struct TestSetupBuilder {
    rp_code: String,
    request: RoomCreateRequest,
    messages: Vec<Message>,
    characters: Vec<Character>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            rp_code: "abcd".to_string(),
            request: RoomCreateRequest::new("Test"),
            messages: vec![],
            characters: vec![],
        }
    }

    #[allow(dead_code)]
    pub fn with_code(mut self, rp_code: &str) -> Self {
        self.rp_code = rp_code.to_string();
        self
    }

    #[allow(dead_code)]
    pub fn with_desc(mut self, desc: &str) -> Self {
        self.request = self.request.with_desc(desc);
        self
    }

    #[allow(dead_code)]
    pub fn with_messages(mut self, contents: &[&str]) -> Self {
        self.messages = contents.iter().map(|c| Message::new(*c)).collect();
        self
    }

    #[allow(dead_code)]
    pub fn with_characters(mut self, names: &[&str]) -> Self {
        self.characters = names
            .iter()
            .map(|name| Character::new().with_field("name", *name))
            .collect();
        self
    }

    pub async fn build(self) -> TestSetup {
        let repository = Arc::new(InMemoryRoomRepository::new());
        let store = RoomStore::new(repository.clone());

        let room_id = store
            .create_room(&self.rp_code, self.request)
            .await
            .expect("room creation should succeed");

        for message in self.messages {
            store
                .append_message(room_id, message)
                .await
                .expect("message append should succeed");
        }
        for character in self.characters {
            store
                .append_character(room_id, character)
                .await
                .expect("character append should succeed");
        }

        TestSetup {
            store,
            repository,
            room_id,
            rp_code: self.rp_code,
        }
    }
}
