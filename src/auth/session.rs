//! Server-side sessions.
//!
//! The token is an opaque random handle; all state lives in a
//! [`SessionStore`]. Every store call is bounded by `store_timeout`.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use super::{AuthError, IssuedToken, Principal};

pub const DEFAULT_LIFETIME_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_STORE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const HANDLE_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SessionRecord {
    pub username: String,
    #[sqlx(rename = "sessionid")]
    pub session_id: String,
    #[sqlx(rename = "expirationtime")]
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, record: &SessionRecord) -> anyhow::Result<()>;
    async fn find(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>>;
    /// Deleting a missing row is not an error.
    async fn delete(&self, session_id: &str) -> anyhow::Result<()>;
    /// Remove every row with `expires_at < now`; returns the count removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;
}

pub struct SessionAuthorizer {
    store: Arc<dyn SessionStore>,
    lifetime: Duration,
    store_timeout: std::time::Duration,
}

impl SessionAuthorizer {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            lifetime: Duration::seconds(DEFAULT_LIFETIME_SECS),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub async fn generate(&self, principal: &str) -> Result<IssuedToken, AuthError> {
        let record = SessionRecord {
            username: principal.to_string(),
            session_id: new_handle(),
            expires_at: Utc::now() + self.lifetime,
        };
        self.bounded(self.store.insert(&record)).await?;
        tracing::debug!(username = %principal, "session created");
        Ok(IssuedToken {
            token: record.session_id,
            expires_at: record.expires_at,
        })
    }

    pub async fn validate(&self, token: &str) -> Result<Option<Principal>, AuthError> {
        check_handle(token)?;
        let record = self.bounded(self.store.find(token)).await?;
        Ok(record
            .filter(|r| Utc::now() <= r.expires_at)
            .map(|r| Principal::new(r.username)))
    }

    pub async fn invalidate(&self, token: &str) -> Result<(), AuthError> {
        if check_handle(token).is_err() {
            // nothing could have been stored under it
            return Ok(());
        }
        self.bounded(self.store.delete(token)).await
    }

    pub async fn purge_expired(&self) -> Result<usize, AuthError> {
        let removed = self.bounded(self.store.delete_expired(Utc::now())).await?;
        Ok(removed as usize)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| AuthError::Timeout)?
            .map_err(AuthError::Store)
    }
}

fn new_handle() -> String {
    let mut bytes = [0u8; HANDLE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn check_handle(token: &str) -> Result<(), AuthError> {
    if token.len() == HANDLE_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(AuthError::Malformed("session handle must be 64 hex characters".into()))
    }
}
