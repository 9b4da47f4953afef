//! Server-side sessions
//!
//! One [`SessionStore`] over a pluggable [`SessionBackend`]. Entries are stored
//! under `session:<id>` with a store-level TTL, so an expired session and one that
//! never existed both come back as [`SessionError::NotFound`].

pub mod cookie;
pub mod memory_store;
pub mod middleware;
pub mod redis_store;

pub use memory_store::MemorySessionBackend;
pub use middleware::{session_middleware, CurrentSession, SessionLayerState};
pub use redis_store::RedisSessionBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use uuid::Uuid;

const KEY_PREFIX: &str = "session:";
const ID_BYTES: usize = 32;

/// Session value key holding the authenticated user id
pub const USER_ID_KEY: &str = "user_id";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("invalid session: {0}")]
    Invalid(String),

    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to serialize session: {0}")]
    Serialization(String),

    #[error("stored session is corrupt: {0}")]
    Deserialization(String),
}

/// Raw key-value operations a session backend must provide.
///
/// Each call is atomic on its own; nothing spans calls.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Write `payload` under `key`, expiring after `ttl`
    async fn put(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<(), SessionError>;

    /// Read `key`; `None` when absent or expired
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError>;

    /// Remove `key`; absent keys are not an error
    async fn remove(&self, key: &str) -> Result<(), SessionError>;

    async fn ping(&self) -> Result<(), SessionError>;
}

/// Generate a session identifier: 256 random bits, hex encoded.
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_well_formed_id(id: &str) -> bool {
    id.len() == ID_BYTES * 2 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub values: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// New empty session with a fresh id, expiring `ttl` from now
    pub fn new(ttl: Duration) -> Result<Self, SessionError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| SessionError::Invalid("session TTL out of range".to_string()))?;
        let now = Utc::now();

        Ok(Self {
            id: generate_id(),
            values: HashMap::new(),
            created_at: now,
            expires_at: now + ttl,
        })
    }

    pub fn insert<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), SessionError> {
        let value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// User id stored at login/registration
    pub fn user_id(&self) -> Option<Uuid> {
        self.get(USER_ID_KEY)
    }
}

/// Session storage with bounded, cancellable store calls.
///
/// Every backend call is raced against `op_timeout`; dropping the returned
/// future (for example when the client disconnects) abandons the call.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    ttl: Duration,
    op_timeout: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            backend,
            ttl,
            op_timeout,
        }
    }

    /// New session using the configured lifetime (not yet saved)
    pub fn create(&self) -> Result<Session, SessionError> {
        Session::new(self.ttl)
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, SessionError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "Session store call timed out"
                );
                Err(SessionError::StoreUnavailable(format!("{} timed out", op)))
            }
        }
    }

    /// Persist `session`; the store-level TTL is `expires_at - now`.
    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        if !is_well_formed_id(&session.id) {
            return Err(SessionError::Invalid("malformed session id".to_string()));
        }

        let remaining = (session.expires_at - Utc::now())
            .to_std()
            .ok()
            .filter(|d| d.as_millis() > 0)
            .ok_or_else(|| SessionError::Invalid("session already expired".to_string()))?;

        let payload =
            serde_json::to_vec(session).map_err(|e| SessionError::Serialization(e.to_string()))?;
        let key = format!("{}{}", KEY_PREFIX, session.id);

        self.bounded("save", self.backend.put(&key, payload, remaining))
            .await?;

        tracing::debug!(ttl_secs = remaining.as_secs(), "Session saved");
        Ok(())
    }

    /// Load a session. Expired and unknown ids are both `NotFound`.
    pub async fn get(&self, id: &str) -> Result<Session, SessionError> {
        if !is_well_formed_id(id) {
            return Err(SessionError::NotFound);
        }

        let key = format!("{}{}", KEY_PREFIX, id);
        let payload = self
            .bounded("get", self.backend.fetch(&key))
            .await?
            .ok_or(SessionError::NotFound)?;

        serde_json::from_slice(&payload).map_err(|e| {
            tracing::error!(error = %e, "Stored session payload is corrupt");
            SessionError::Deserialization(e.to_string())
        })
    }

    /// Delete a session. Idempotent.
    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        if !is_well_formed_id(id) {
            return Ok(());
        }

        let key = format!("{}{}", KEY_PREFIX, id);
        self.bounded("delete", self.backend.remove(&key)).await
    }

    pub async fn ping(&self) -> Result<(), SessionError> {
        self.bounded("ping", self.backend.ping()).await
    }
}
