use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::model::{Message, Session};
use crate::users::StoreError;

/// Process-lifetime conversation sessions. Nothing is persisted or evicted.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        user_id: Uuid,
        language: &str,
        topic: &str,
        level: u8,
        system_prompt: &str,
    ) -> Session {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            language: language.to_string(),
            topic: topic.to_string(),
            level,
            messages: vec![Message::system(system_prompt)],
            created_at: now,
            updated_at: now,
        };
        self.write().insert(session.id, session.clone());
        debug!(session_id = %session.id, %user_id, language, topic, level, "session created");
        session
    }

    pub fn get(&self, id: Uuid) -> Result<Session, StoreError> {
        self.read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("session"))
    }

    pub fn add_message(&self, id: Uuid, message: Message) -> Result<(), StoreError> {
        let mut sessions = self.write();
        let session = sessions.get_mut(&id).ok_or(StoreError::NotFound("session"))?;
        session.messages.push(message);
        session.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Transcript without the leading system prompt.
    pub fn get_messages(&self, id: Uuid) -> Result<Vec<Message>, StoreError> {
        self.read()
            .get(&id)
            .map(Session::visible_messages)
            .ok_or(StoreError::NotFound("session"))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Session>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Session>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}
