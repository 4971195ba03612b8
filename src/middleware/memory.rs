use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use rand::Rng;

use super::traits::SessionStore;
use crate::session::SessionData;
use crate::types::SessionId;

/// Process-local [`SessionStore`]. Sessions are lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, SessionData>>,
}

impl MemorySessionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// True when no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

fn generate_session_id() -> SessionId {
    let random_bytes: [u8; 24] = rand::rng().random();
    SessionId(URL_SAFE_NO_PAD.encode(random_bytes))
}

impl SessionStore for MemorySessionStore {
    async fn load(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionData>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.sessions.lock().get(session_id).cloned())
    }

    async fn save(
        &self,
        session_id: Option<&SessionId>,
        data: &SessionData,
    ) -> Result<SessionId, Box<dyn std::error::Error + Send + Sync>> {
        let id = session_id.cloned().unwrap_or_else(generate_session_id);
        self.sessions.lock().insert(id.clone(), data.clone());
        Ok(id)
    }

    async fn delete(
        &self,
        session_id: &SessionId,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sessions.lock().remove(session_id);
        Ok(())
    }
}
