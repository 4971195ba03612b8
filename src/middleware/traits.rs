use std::future::Future;

use crate::session::SessionData;
use crate::types::SessionId;

/// Consumer-provided session persistence.
///
/// Sessions are identified by opaque IDs carried in the session cookie.
/// The store chooses the ID format (ULID, UUID, etc.).
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for RedisSessions {
///     async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, ...> {
///         let raw: Option<String> = self.redis.get(id.to_string()).await?;
///         Ok(raw.map(|r| serde_json::from_str(&r)).transpose()?)
///     }
///
///     async fn save(&self, id: Option<&SessionId>, data: &SessionData) -> Result<SessionId, ...> {
///         let id = id.cloned().unwrap_or_else(|| SessionId(Ulid::new().to_string()));
///         self.redis.set_ex(id.to_string(), serde_json::to_string(data)?, 3 * 3600).await?;
///         Ok(id)
///     }
///
///     async fn delete(&self, id: &SessionId) -> Result<(), ...> {
///         self.redis.del(id.to_string()).await
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Look up a session by ID. `None` if unknown or expired.
    fn load(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<Option<SessionData>, Box<dyn std::error::Error + Send + Sync>>>
           + Send;

    /// Persist `data`, minting an ID when `session_id` is `None`. Returns the ID.
    fn save(
        &self,
        session_id: Option<&SessionId>,
        data: &SessionData,
    ) -> impl Future<Output = Result<SessionId, Box<dyn std::error::Error + Send + Sync>>> + Send;

    /// Delete a session (logout).
    fn delete(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send;
}
