//! Storage driver abstraction for the document store.
//!
//! This module defines the traits that abstract over document store
//! implementations, so followers and caches can work with any of them.
//!
//! # Overview
//!
//! The [`StorageDriver`] trait provides a unified async interface for the
//! authoritative store: assigning local indexes on write, answering structured
//! queries, a flat config side table and the lifecycle.
//!
//! # Traits
//!
//! - [`StorageDriver`]: The core trait for document stores
//! - [`StorageDriverBuilder`]: Factory trait for creating ready-to-use drivers
//!
//! # Examples
//!
//! ```ignore
//! use vellum_core::driver::StorageDriver;
//! use vellum_core::query::Query;
//!
//! let stored = driver.upsert(doc).await?;
//! assert_eq!(driver.max_local_index()?, stored.local_index);
//!
//! let latest = driver.query_docs(&Query::new()).await?;
//! ```

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};
use tokio::sync::watch;

use crate::{
    document::{Document, LocalIndex, SharedDoc, WorkspaceAddress},
    error::DocumentStoreResult,
    lifecycle::Lifecycle,
    query::Query,
};

/// Abstract interface for document stores.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and support concurrent access from
/// multiple async tasks. Writes (`upsert`, config writes, `close`) are
/// serialized so local index assignment and index maintenance are atomic with
/// respect to each other. Reads never wait on writers for longer than it takes
/// to copy out shared document handles.
///
/// # Lifecycle
///
/// Every operation except [`lifecycle`](StorageDriver::lifecycle),
/// [`is_closed`](StorageDriver::is_closed), [`workspace`](StorageDriver::workspace)
/// and [`watch_local_index`](StorageDriver::watch_local_index) requires the
/// driver to be ready: it fails with
/// [`NotReady`](crate::error::DocumentStoreError::NotReady) before hatching
/// and [`Closed`](crate::error::DocumentStoreError::Closed) after closing.
#[async_trait]
pub trait StorageDriver: Send + Sync + Debug {
    /// The workspace this driver stores documents for.
    fn workspace(&self) -> &WorkspaceAddress;

    /// Current lifecycle state. Never fails.
    fn lifecycle(&self) -> Lifecycle;

    /// Whether `close` has been called. Never fails.
    fn is_closed(&self) -> bool {
        self.lifecycle().is_closing_or_closed()
    }

    /// Completes initialization. Concurrent calls collapse into one and
    /// hatching a ready driver again is a no-op.
    async fn hatch(&self) -> DocumentStoreResult<()>;

    /// The highest local index assigned so far, or `None` before the first write.
    fn max_local_index(&self) -> DocumentStoreResult<Option<LocalIndex>>;

    /// A receiver that observes the high-water mark after every write.
    ///
    /// Closing the driver also wakes every receiver so followers can notice
    /// and stop.
    fn watch_local_index(&self) -> watch::Receiver<Option<LocalIndex>>;

    /// Runs a structured query.
    ///
    /// # Arguments
    ///
    /// * `query` - The [`Query`] selecting history mode, order, cursors, limit and filter
    ///
    /// # Returns
    ///
    /// The matching documents, in the requested order.
    async fn query_docs(&self, query: &Query) -> DocumentStoreResult<Vec<SharedDoc>>;

    /// Stores `doc` unconditionally under the next local index.
    ///
    /// Any existing document with the same `(path, author)` is replaced, even if
    /// it is newer. Which version is "latest" is decided at query time.
    ///
    /// # Returns
    ///
    /// The stored, immutable document carrying its local index.
    async fn upsert(&self, doc: Document) -> DocumentStoreResult<SharedDoc>;

    async fn get_config(&self, key: &str) -> DocumentStoreResult<Option<String>>;

    async fn set_config(&self, key: &str, value: &str) -> DocumentStoreResult<()>;

    /// Removes a config entry, returning whether it existed.
    async fn delete_config(&self, key: &str) -> DocumentStoreResult<bool>;

    /// All config keys in ascending order.
    async fn list_config_keys(&self) -> DocumentStoreResult<Vec<String>>;

    /// Shuts the driver down for good.
    ///
    /// With `erase` set, every document and config entry is discarded.
    /// Closing an already closed driver is an error.
    async fn close(&self, erase: bool) -> DocumentStoreResult<()>;
}

#[async_trait]
impl<D: StorageDriver + ?Sized> StorageDriver for Arc<D> {
    fn workspace(&self) -> &WorkspaceAddress {
        (**self).workspace()
    }

    fn lifecycle(&self) -> Lifecycle {
        (**self).lifecycle()
    }

    async fn hatch(&self) -> DocumentStoreResult<()> {
        (**self).hatch().await
    }

    fn max_local_index(&self) -> DocumentStoreResult<Option<LocalIndex>> {
        (**self).max_local_index()
    }

    fn watch_local_index(&self) -> watch::Receiver<Option<LocalIndex>> {
        (**self).watch_local_index()
    }

    async fn query_docs(&self, query: &Query) -> DocumentStoreResult<Vec<SharedDoc>> {
        (**self).query_docs(query).await
    }

    async fn upsert(&self, doc: Document) -> DocumentStoreResult<SharedDoc> {
        (**self).upsert(doc).await
    }

    async fn get_config(&self, key: &str) -> DocumentStoreResult<Option<String>> {
        (**self).get_config(key).await
    }

    async fn set_config(&self, key: &str, value: &str) -> DocumentStoreResult<()> {
        (**self).set_config(key, value).await
    }

    async fn delete_config(&self, key: &str) -> DocumentStoreResult<bool> {
        (**self).delete_config(key).await
    }

    async fn list_config_keys(&self) -> DocumentStoreResult<Vec<String>> {
        (**self).list_config_keys().await
    }

    async fn close(&self, erase: bool) -> DocumentStoreResult<()> {
        (**self).close(erase).await
    }
}

/// Factory for drivers that come out hatched and ready.
#[async_trait]
pub trait StorageDriverBuilder {
    type Driver: StorageDriver;

    async fn build(self) -> DocumentStoreResult<Self::Driver>;
}
