//! Storage collaborators.
//!
//! Resources are kept as JSON documents behind [`DocumentStore`]; users and
//! sessions are relational ([`UserStore`], [`crate::auth::session::SessionStore`]).
//! Each trait has an in-memory backend and a PostgreSQL backend.

pub mod memory;
pub mod postgres;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::user::{NewUser, UserView};
use crate::models::Resource;
use crate::query::Query;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not find requested item")]
    NotFound,

    #[error("item already exists")]
    Duplicate,

    #[error("store operation timed out")]
    Timeout,

    #[error("stored document could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Layout of one document collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: &'static str,
    /// Dotted paths that are unique together. `identity.id` is always
    /// unique and is not listed here.
    pub unique: &'static [&'static str],
}

pub const ID_PATH: &str = "identity.id";

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn add(&self, spec: &CollectionSpec, id: &str, doc: Value) -> Result<(), StoreError>;
    async fn get(&self, spec: &CollectionSpec, id: &str) -> Result<Value, StoreError>;
    /// Documents matching `query.filter`, ordered by `query.sort` (insertion
    /// order otherwise), at most `query.limit` of them.
    async fn list(&self, spec: &CollectionSpec, query: &Query) -> Result<Vec<Value>, StoreError>;
    /// Replace the whole document.
    async fn update(&self, spec: &CollectionSpec, id: &str, doc: Value) -> Result<(), StoreError>;
    async fn delete(&self, spec: &CollectionSpec, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// `password_hash` is stored as given.
    async fn create_user(&self, user: &NewUser, password_hash: &str) -> Result<(), StoreError>;
    async fn get_user(&self, username: &str) -> Result<UserView, StoreError>;
    async fn password_hash(&self, username: &str) -> Result<Option<String>, StoreError>;
}

/// Typed view over one collection with every call bounded by `timeout`.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Resource + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn DocumentStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            _marker: PhantomData,
        }
    }

    pub async fn add(&self, item: &T) -> Result<(), StoreError> {
        let id = stamped_id(item)?;
        let doc = serde_json::to_value(item)?;
        self.bounded(self.store.add(&T::COLLECTION, id, doc)).await
    }

    pub async fn get(&self, id: &str) -> Result<T, StoreError> {
        let doc = self.bounded(self.store.get(&T::COLLECTION, id)).await?;
        Ok(serde_json::from_value(doc)?)
    }

    pub async fn list(&self, query: &Query) -> Result<Vec<T>, StoreError> {
        let docs = self.bounded(self.store.list(&T::COLLECTION, query)).await?;
        docs.into_iter()
            .map(|d| serde_json::from_value(d).map_err(StoreError::from))
            .collect()
    }

    pub async fn update(&self, item: &T) -> Result<(), StoreError> {
        let id = stamped_id(item)?;
        let doc = serde_json::to_value(item)?;
        self.bounded(self.store.update(&T::COLLECTION, id, doc)).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.bounded(self.store.delete(&T::COLLECTION, id)).await
    }

    async fn bounded<R, F>(&self, fut: F) -> Result<R, StoreError>
    where
        F: std::future::Future<Output = Result<R, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

fn stamped_id<T: Resource>(item: &T) -> Result<&str, StoreError> {
    item.identity()
        .map(|identity| identity.id.as_str())
        .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("{} has no identity", T::KIND)))
}

/// Split a dotted field name into JSON path segments.
pub fn path_segments(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}
