//! Redis session backend
//!
//! Uses a `ConnectionManager`: one multiplexed connection, cloned per call and
//! re-established automatically, so concurrent requests need no locking.

use super::{SessionBackend, SessionError};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, RedisError};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

#[derive(Clone)]
pub struct RedisSessionBackend {
    conn: ConnectionManager,
}

fn unavailable(e: RedisError) -> SessionError {
    tracing::warn!(error = %e, "Redis call failed");
    SessionError::StoreUnavailable(e.to_string())
}

impl RedisSessionBackend {
    /// Connect to Redis (the URL may carry credentials and is never logged)
    pub async fn connect(url: &Secret<String>) -> Result<Self, SessionError> {
        tracing::debug!("Connecting to session store...");

        let client = redis::Client::open(url.expose_secret().as_str()).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;

        tracing::info!("Session store connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl SessionBackend for RedisSessionBackend {
    async fn put(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let mut conn = self.conn.clone();

        let payload: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(payload)
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();

        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(())
    }
}
