//! Remote store gateway
//!
//! [`RemoteStore`] is the backend seam: untyped JSON rows over a named
//! collection. [`Gateway`] layers typed CRUD on top of it. No call is
//! retried; every successful mutation is expected to be echoed on the
//! change feed, which the gateway does not wait for.

pub mod http;
pub mod memory;

pub use http::HttpStore;
pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::models::Collection;
use shared::query::{Filter, Query};
use std::sync::Arc;

use crate::{ClientError, ClientResult};

/// Backend abstraction over the four remote collections
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Rows matching the query, empty when nothing matches
    async fn select(&self, query: &Query) -> ClientResult<Vec<Value>>;

    /// Insert rows, returning them with backend-assigned fields
    async fn insert(&self, collection: Collection, rows: Vec<Value>) -> ClientResult<Vec<Value>>;

    /// Patch one row by id; `NotFound` when the id does not exist
    async fn update(&self, collection: Collection, id: &str, patch: Value) -> ClientResult<()>;

    /// Delete every row matching all filters
    async fn delete(&self, collection: Collection, filters: &[Filter]) -> ClientResult<()>;
}

/// Typed CRUD over a [`RemoteStore`]
#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn RemoteStore>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway").finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// List rows matching the query
    pub async fn list<T: DeserializeOwned>(&self, query: &Query) -> ClientResult<Vec<T>> {
        let rows = self.store.select(query).await?;
        rows.into_iter()
            .map(|row| decode_row(query.collection, row))
            .collect()
    }

    /// First row matching the filters
    ///
    /// `Ok(None)` is the expected "absent" branch, not an error.
    pub async fn find_one<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filters: Vec<Filter>,
    ) -> ClientResult<Option<T>> {
        let mut query = Query::all(collection).limit(2);
        query.filters = filters;
        let mut rows = self.store.select(&query).await?;
        if rows.len() > 1 {
            tracing::warn!(
                collection = %collection,
                "More than one row matched a unique lookup, using the first"
            );
        }
        if rows.is_empty() {
            return Ok(None);
        }
        decode_row(collection, rows.swap_remove(0)).map(Some)
    }

    /// Insert one row and return the stored representation
    pub async fn insert<B, T>(&self, collection: Collection, row: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = serde_json::to_value(row)?;
        let mut stored = self.store.insert(collection, vec![value]).await?;
        if stored.is_empty() {
            return Err(ClientError::InvalidResponse(format!(
                "insert into {} returned no row",
                collection
            )));
        }
        decode_row(collection, stored.swap_remove(0))
    }

    /// Insert several rows in one call, returns how many were stored
    pub async fn insert_many<B: Serialize>(
        &self,
        collection: Collection,
        rows: &[B],
    ) -> ClientResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let values = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let stored = self.store.insert(collection, values).await?;
        Ok(stored.len())
    }

    /// Patch one row by id
    pub async fn update<P: Serialize + ?Sized>(
        &self,
        collection: Collection,
        id: &str,
        patch: &P,
    ) -> ClientResult<()> {
        let patch = serde_json::to_value(patch)?;
        self.store.update(collection, id, patch).await
    }

    /// Delete rows matching the filters; an empty filter list is refused
    pub async fn delete_where(&self, collection: Collection, filters: &[Filter]) -> ClientResult<()> {
        if filters.is_empty() {
            return Err(ClientError::InvalidRequest(format!(
                "refusing unfiltered delete on {}",
                collection
            )));
        }
        self.store.delete(collection, filters).await
    }
}

fn decode_row<T: DeserializeOwned>(collection: Collection, row: Value) -> ClientResult<T> {
    serde_json::from_value(row)
        .map_err(|e| ClientError::InvalidResponse(format!("{} row: {}", collection, e)))
}
