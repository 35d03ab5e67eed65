//! In-memory storage implementation for document stores.
//!
//! This module provides an indexed in-memory driver that keeps every document
//! behind shared immutable handles, with async-safe locks around the indexes.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};
use async_trait::async_trait;
use mea::{mutex::Mutex, rwlock::RwLock};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use vellum_core::{
    compare::{apply_query, compare_path_then_newest},
    document::{AuthorAddress, Document, LocalIndex, Path, SharedDoc, WorkspaceAddress},
    driver::{StorageDriver, StorageDriverBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    lifecycle::{Lifecycle, LifecycleCell},
    query::{HistoryMode, Query, SortDirection, WillMatch, clean_up_query},
};

/// Config key holding the store's own identity.
pub const STORAGE_ID_KEY: &str = "storageId";

/// The indexes. Both document maps share the same `Arc<Document>` values, so
/// holding a document in two places costs a pointer, not a copy.
#[derive(Debug, Default)]
struct Indexes {
    /// (path, author) -> doc
    by_path_and_author: HashMap<(Path, AuthorAddress), SharedDoc>,
    /// path -> every version at that path, newest first
    by_path_newest_first: BTreeMap<Path, Vec<SharedDoc>>,
    config: BTreeMap<String, String>,
    highest_local_index: Option<LocalIndex>,
}

impl Indexes {
    fn all_docs(&self) -> Vec<SharedDoc> {
        self.by_path_and_author.values().cloned().collect()
    }

    fn latest_docs(&self) -> Vec<SharedDoc> {
        self.by_path_newest_first
            .values()
            .filter_map(|history| history.first().cloned())
            .collect()
    }
}

/// Thread-safe in-memory document store.
///
/// This struct implements the [`StorageDriver`] trait. It assigns a local
/// index to every write, keeps a per-path history sorted newest first, and
/// answers structured queries over either the full history or the latest
/// version at each path.
///
/// # Concurrency
///
/// Every mutation (`upsert`, config writes, `close`) holds an exclusive write
/// lock for its whole duration, so local index assignment and index updates
/// happen as one step. Readers only take the index read lock long enough to
/// clone out document handles; the documents themselves are immutable and the
/// per-path history lists are replaced wholesale, never edited in place.
///
/// # Example
///
/// ```ignore
/// use vellum_memory::MemoryDriver;
/// use vellum_core::{driver::StorageDriver, query::Query};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let driver = MemoryDriver::builder("+gardening.abcde").build().await?;
///
///     let stored = driver.upsert(doc).await?;
///     assert_eq!(stored.local_index, Some(0));
///
///     let latest = driver.query_docs(&Query::new()).await?;
///     assert_eq!(latest.len(), 1);
///
///     driver.close(true).await?;
///     Ok(())
/// }
/// ```
pub struct MemoryDriver {
    workspace: WorkspaceAddress,
    lifecycle: LifecycleCell,
    /// Serializes mutations.
    write_lock: Mutex<()>,
    /// Collapses concurrent hatch calls into one.
    hatch_lock: Mutex<()>,
    indexes: RwLock<Indexes>,
    /// Publishes the high-water mark after every write.
    local_index_tx: watch::Sender<Option<LocalIndex>>,
}

impl fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("workspace", &self.workspace)
            .field("lifecycle", &self.lifecycle.get())
            .field("max_local_index", &*self.local_index_tx.borrow())
            .finish()
    }
}

impl MemoryDriver {
    /// Creates a new, empty driver in the `New` state.
    ///
    /// It must be hatched before use; [`MemoryDriver::builder`] does that for you.
    pub fn new(workspace: impl Into<WorkspaceAddress>) -> Self {
        let workspace = workspace.into();
        debug!(%workspace, "constructor");

        Self {
            workspace,
            lifecycle: LifecycleCell::new(),
            write_lock: Mutex::new(()),
            hatch_lock: Mutex::new(()),
            indexes: RwLock::new(Indexes::default()),
            local_index_tx: watch::Sender::new(None),
        }
    }

    /// Creates a builder that returns a hatched, ready driver.
    pub fn builder(workspace: impl Into<WorkspaceAddress>) -> MemoryDriverBuilder {
        MemoryDriverBuilder::new(workspace)
    }

    /// The random identity this store assigned itself on first hatch.
    pub async fn storage_id(&self) -> DocumentStoreResult<Option<String>> {
        self.get_config(STORAGE_ID_KEY).await
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn workspace(&self) -> &WorkspaceAddress {
        &self.workspace
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    async fn hatch(&self) -> DocumentStoreResult<()> {
        let _hatching = self.hatch_lock.lock().await;

        match self.lifecycle.get() {
            Lifecycle::Ready => return Ok(()),
            Lifecycle::Closing | Lifecycle::Closed => return Err(DocumentStoreError::Closed),
            Lifecycle::New | Lifecycle::Hatching => {}
        }

        self.lifecycle.set(Lifecycle::Hatching);
        debug!(workspace = %self.workspace, "hatching");

        {
            let _write = self.write_lock.lock().await;
            let mut indexes = self.indexes.write().await;
            indexes
                .config
                .entry(STORAGE_ID_KEY.to_string())
                .or_insert_with(|| Uuid::new_v4().to_string());
        }

        // A close that raced with hatching wins.
        self.lifecycle.transition(Lifecycle::Hatching, Lifecycle::Ready);
        self.lifecycle.ensure_ready()
    }

    fn max_local_index(&self) -> DocumentStoreResult<Option<LocalIndex>> {
        self.lifecycle.ensure_ready()?;

        let max = *self.local_index_tx.borrow();
        debug!(?max, "max_local_index");
        Ok(max)
    }

    fn watch_local_index(&self) -> watch::Receiver<Option<LocalIndex>> {
        self.local_index_tx.subscribe()
    }

    async fn query_docs(&self, query: &Query) -> DocumentStoreResult<Vec<SharedDoc>> {
        debug!(?query, "query_docs");
        self.lifecycle.ensure_ready()?;

        let cleaned = clean_up_query(query)?;
        if cleaned.will_match == WillMatch::Nothing {
            debug!("    query will match nothing; skipping the scan");
            return Ok(vec![]);
        }
        let query = cleaned.query;

        let docs = {
            let indexes = self.indexes.read().await;
            match query.history_mode_or_default() {
                HistoryMode::All => indexes.all_docs(),
                HistoryMode::Latest => indexes.latest_docs(),
            }
        };

        let docs = apply_query(docs, &query, true);
        debug!(count = docs.len(), "    query_docs is done");

        Ok(docs)
    }

    async fn upsert(&self, doc: Document) -> DocumentStoreResult<SharedDoc> {
        let _write = self.write_lock.lock().await;
        self.lifecycle.ensure_ready()?;

        let mut indexes = self.indexes.write().await;

        let local_index = indexes.highest_local_index.map_or(0, |highest| highest + 1);
        let doc: SharedDoc = Arc::new(doc.with_local_index(local_index));
        indexes.highest_local_index = Some(local_index);

        debug!(path = %doc.path, author = %doc.author, local_index, "upsert");

        indexes
            .by_path_and_author
            .insert((doc.path.clone(), doc.author.clone()), doc.clone());

        // Rebuild this path's history without the author's previous version.
        let mut history: Vec<SharedDoc> = indexes
            .by_path_newest_first
            .get(&doc.path)
            .map(|existing| {
                existing
                    .iter()
                    .filter(|other| other.author != doc.author)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        history.push(doc.clone());
        history.sort_by(|a, b| compare_path_then_newest(a, b, SortDirection::Asc));
        indexes.by_path_newest_first.insert(doc.path.clone(), history);

        drop(indexes);
        self.local_index_tx.send_replace(Some(local_index));

        Ok(doc)
    }

    async fn get_config(&self, key: &str) -> DocumentStoreResult<Option<String>> {
        self.lifecycle.ensure_ready()?;

        Ok(self.indexes.read().await.config.get(key).cloned())
    }

    async fn set_config(&self, key: &str, value: &str) -> DocumentStoreResult<()> {
        let _write = self.write_lock.lock().await;
        self.lifecycle.ensure_ready()?;

        debug!(key, "set_config");
        self.indexes
            .write()
            .await
            .config
            .insert(key.to_string(), value.to_string());

        Ok(())
    }

    async fn delete_config(&self, key: &str) -> DocumentStoreResult<bool> {
        let _write = self.write_lock.lock().await;
        self.lifecycle.ensure_ready()?;

        debug!(key, "delete_config");
        Ok(self.indexes.write().await.config.remove(key).is_some())
    }

    async fn list_config_keys(&self) -> DocumentStoreResult<Vec<String>> {
        self.lifecycle.ensure_ready()?;

        // BTreeMap keys are already sorted.
        Ok(self.indexes.read().await.config.keys().cloned().collect())
    }

    async fn close(&self, erase: bool) -> DocumentStoreResult<()> {
        let _write = self.write_lock.lock().await;
        self.lifecycle.ensure_not_closed()?;

        debug!(workspace = %self.workspace, erase, "closing");
        self.lifecycle.set(Lifecycle::Closing);

        if erase {
            *self.indexes.write().await = Indexes::default();
        }

        self.lifecycle.set(Lifecycle::Closed);
        // Wake followers so they notice the store is gone.
        self.local_index_tx.send_modify(|_| {});

        debug!("    closed");
        Ok(())
    }
}

/// Builder for constructing hatched [`MemoryDriver`] instances.
///
/// # Example
///
/// ```ignore
/// use vellum_memory::MemoryDriver;
/// use vellum_core::driver::StorageDriverBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let driver = MemoryDriver::builder("+gardening.abcde").build().await.unwrap();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryDriverBuilder {
    workspace: WorkspaceAddress,
}

impl MemoryDriverBuilder {
    pub fn new(workspace: impl Into<WorkspaceAddress>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl StorageDriverBuilder for MemoryDriverBuilder {
    type Driver = MemoryDriver;

    /// Builds a driver and hatches it.
    async fn build(self) -> DocumentStoreResult<Self::Driver> {
        let driver = MemoryDriver::new(self.workspace);
        driver.hatch().await?;
        Ok(driver)
    }
}
