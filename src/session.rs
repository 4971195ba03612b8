use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::Error;

/// Key/value session contents.
pub type SessionData = serde_json::Map<String, JsonValue>;

/// Uniform access to the session bound to the current request.
///
/// The OAuth client, the flow controller and the management-API factory all
/// go through this trait. Implementations sharing one request must observe
/// each other's writes.
pub trait SessionManager: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get_session_item(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<JsonValue>, Error>> + Send;

    fn set_session_item(
        &self,
        key: &str,
        value: JsonValue,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn remove_session_item(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Invalidate the whole session.
    fn destroy_session(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Process-local [`SessionManager`] with no backing store.
///
/// Clones share state. Once destroyed, writes fail with [`Error::Session`].
#[derive(Debug, Clone, Default)]
pub struct InMemorySession {
    inner: Arc<Mutex<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    items: SessionData,
    destroyed: bool,
}

impl InMemorySession {
    /// An empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session pre-populated with `items`.
    #[must_use]
    pub fn with_items(items: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(InMemoryState {
                items,
                destroyed: false,
            })),
        }
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> SessionData {
        self.inner.lock().items.clone()
    }

    /// True once `destroy_session` has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }
}

impl SessionManager for InMemorySession {
    async fn get_session_item(&self, key: &str) -> Result<Option<JsonValue>, Error> {
        Ok(self.inner.lock().items.get(key).cloned())
    }

    async fn set_session_item(&self, key: &str, value: JsonValue) -> Result<(), Error> {
        let mut state = self.inner.lock();
        if state.destroyed {
            return Err(Error::Session("session has been destroyed".into()));
        }
        state.items.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove_session_item(&self, key: &str) -> Result<(), Error> {
        self.inner.lock().items.remove(key);
        Ok(())
    }

    async fn destroy_session(&self) -> Result<(), Error> {
        let mut state = self.inner.lock();
        state.items.clear();
        state.destroyed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn clones_share_items() {
        let session = InMemorySession::new();
        let other = session.clone();

        session.set_session_item("user", json!({"id": "kp_1"})).await.unwrap();
        assert_eq!(
            other.get_session_item("user").await.unwrap(),
            Some(json!({"id": "kp_1"}))
        );

        other.remove_session_item("user").await.unwrap();
        assert_eq!(session.get_session_item("user").await.unwrap(), None);
    }

    #[tokio::test]
    async fn destroyed_session_rejects_writes() {
        let session = InMemorySession::new();
        session.set_session_item("a", json!(1)).await.unwrap();
        session.destroy_session().await.unwrap();

        assert!(session.is_destroyed());
        assert!(session.snapshot().is_empty());
        let err = session.set_session_item("a", json!(2)).await;
        assert!(matches!(err, Err(Error::Session(_))));
    }
}
