use std::sync::Arc;

use axum::http::HeaderMap;
use axum_extra::extract::cookie::Cookie;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use time::Duration;

use super::config::AuthSettings;
use super::cookies;
use super::traits::SessionStore;
use crate::error::Error;
use crate::session::{SessionData, SessionManager};
use crate::types::SessionId;

/// The session bound to one request's cookie.
///
/// Clones share the same state, so every component handling the request
/// sees the same items. Writes stay in memory until [`commit`](Self::commit)
/// or [`persist`](Self::persist); dropping the adapter discards them.
pub struct SessionAdapter<S> {
    store: Arc<S>,
    settings: Arc<AuthSettings>,
    inner: Arc<Mutex<SessionState>>,
}

#[derive(Default)]
struct SessionState {
    id: Option<SessionId>,
    data: SessionData,
    destroyed: bool,
}

// Manual Clone: avoid derive adding an `S: Clone` bound.
impl<S> Clone for SessionAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            settings: self.settings.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S: SessionStore> SessionAdapter<S> {
    /// Resolve the session named by the request's cookie.
    ///
    /// A missing or unknown cookie yields a fresh, empty session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the store fails.
    pub(crate) async fn open(
        store: Arc<S>,
        settings: Arc<AuthSettings>,
        headers: &HeaderMap,
    ) -> Result<Self, Error> {
        let mut state = SessionState::default();
        if let Some(id) = cookies::session_id_from_headers(headers, &settings.session_cookie_name) {
            let loaded = store.load(&id).await.map_err(store_error)?;
            match loaded {
                Some(data) => {
                    state.id = Some(id);
                    state.data = data;
                }
                None => tracing::debug!(session_id = %id, "Unknown session cookie"),
            }
        }

        Ok(Self {
            store,
            settings,
            inner: Arc::new(Mutex::new(state)),
        })
    }

    /// ID of the stored session, `None` until first committed.
    #[must_use]
    pub fn id(&self) -> Option<SessionId> {
        self.inner.lock().id.clone()
    }

    /// Save the session and build its cookie, valid for `max_age`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the session was destroyed or the store fails.
    pub async fn commit(&self, max_age: Duration) -> Result<Cookie<'static>, Error> {
        let id = self.save().await?;
        Ok(cookies::session_cookie(
            &self.settings.session_cookie_name,
            &id,
            max_age,
            self.settings.secure_cookies,
        ))
    }

    /// Save without emitting a cookie. Skipped for sessions that no cookie
    /// references yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the session was destroyed or the store fails.
    pub async fn persist(&self) -> Result<(), Error> {
        if self.id().is_none() {
            tracing::debug!("Not persisting session without a cookie");
            return Ok(());
        }
        self.save().await.map(|_| ())
    }

    /// Delete the session from the store and build a clearing cookie.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the store fails.
    pub async fn destroy(&self) -> Result<Cookie<'static>, Error> {
        let id = {
            let mut state = self.inner.lock();
            state.destroyed = true;
            state.data.clear();
            state.id.take()
        };
        if let Some(id) = id {
            self.store.delete(&id).await.map_err(store_error)?;
        }
        Ok(cookies::clear_session_cookie(
            &self.settings.session_cookie_name,
            self.settings.secure_cookies,
        ))
    }

    async fn save(&self) -> Result<SessionId, Error> {
        let (id, data) = {
            let state = self.inner.lock();
            if state.destroyed {
                return Err(Error::Session("session has been destroyed".into()));
            }
            (state.id.clone(), state.data.clone())
        };

        let saved = self
            .store
            .save(id.as_ref(), &data)
            .await
            .map_err(store_error)?;
        self.inner.lock().id = Some(saved.clone());
        Ok(saved)
    }
}

impl<S: SessionStore> SessionManager for SessionAdapter<S> {
    async fn get_session_item(&self, key: &str) -> Result<Option<JsonValue>, Error> {
        Ok(self.inner.lock().data.get(key).cloned())
    }

    async fn set_session_item(&self, key: &str, value: JsonValue) -> Result<(), Error> {
        let mut state = self.inner.lock();
        if state.destroyed {
            return Err(Error::Session("session has been destroyed".into()));
        }
        state.data.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove_session_item(&self, key: &str) -> Result<(), Error> {
        self.inner.lock().data.remove(key);
        Ok(())
    }

    async fn destroy_session(&self) -> Result<(), Error> {
        self.destroy().await.map(|_| ())
    }
}

fn store_error(e: Box<dyn std::error::Error + Send + Sync>) -> Error {
    Error::Session(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::memory::MemorySessionStore;
    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;
    use serde_json::json;

    fn settings() -> Arc<AuthSettings> {
        Arc::new(AuthSettings::defaults())
    }

    fn cookie_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn commit_then_reopen_from_cookie() {
        let store = Arc::new(MemorySessionStore::new());
        let session = SessionAdapter::open(store.clone(), settings(), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(session.id(), None);

        session.set_session_item("user", json!({"id": "kp_1"})).await.unwrap();
        let cookie = session.commit(Duration::hours(3)).await.unwrap();
        assert_eq!(cookie.name(), "kinde_session");

        let headers = cookie_headers(&format!("kinde_session={}", cookie.value()));
        let reopened = SessionAdapter::open(store, settings(), &headers).await.unwrap();
        assert_eq!(reopened.id(), session.id());
        assert_eq!(
            reopened.get_session_item("user").await.unwrap(),
            Some(json!({"id": "kp_1"}))
        );
    }

    #[tokio::test]
    async fn clones_observe_each_other() {
        let store = Arc::new(MemorySessionStore::new());
        let first = SessionAdapter::open(store, settings(), &HeaderMap::new())
            .await
            .unwrap();
        let second = first.clone();

        first.set_session_item("k", json!("v")).await.unwrap();
        assert_eq!(second.get_session_item("k").await.unwrap(), Some(json!("v")));
        second.remove_session_item("k").await.unwrap();
        assert_eq!(first.get_session_item("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_cookie_starts_empty() {
        let store = Arc::new(MemorySessionStore::new());
        let session = SessionAdapter::open(store, settings(), &cookie_headers("kinde_session=nope"))
            .await
            .unwrap();
        assert_eq!(session.id(), None);
        assert_eq!(session.get_session_item("user").await.unwrap(), None);
    }

    #[tokio::test]
    async fn persist_skips_cookieless_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let session = SessionAdapter::open(store.clone(), settings(), &HeaderMap::new())
            .await
            .unwrap();
        session.set_session_item("k", json!(1)).await.unwrap();
        session.persist().await.unwrap();
        assert!(store.is_empty());

        session.commit(Duration::hours(1)).await.unwrap();
        session.set_session_item("k", json!(2)).await.unwrap();
        session.persist().await.unwrap();
        let id = session.id().unwrap();
        assert_eq!(store.load(&id).await.unwrap().unwrap()["k"], json!(2));
    }

    #[tokio::test]
    async fn destroy_deletes_and_blocks_writes() {
        let store = Arc::new(MemorySessionStore::new());
        let session = SessionAdapter::open(store.clone(), settings(), &HeaderMap::new())
            .await
            .unwrap();
        session.set_session_item("k", json!(1)).await.unwrap();
        session.commit(Duration::hours(1)).await.unwrap();
        assert_eq!(store.len(), 1);

        let cleared = session.destroy().await.unwrap();
        assert_eq!(cleared.value(), "");
        assert!(store.is_empty());
        assert!(session.set_session_item("k", json!(2)).await.is_err());
        assert!(session.commit(Duration::hours(1)).await.is_err());
    }
}
