//! Live, local-index ordered subscriptions over a store's writes.

use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::debug;

use vellum_core::{
    document::{LocalIndex, SharedDoc},
    driver::StorageDriver,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Cursor, HistoryMode, OrderBy, Query},
};

/// Async per-document callback. The follower waits for each returned future
/// before delivering the next document.
pub type FollowerCallback = Arc<dyn Fn(SharedDoc) -> BoxFuture<'static, ()> + Send + Sync>;

/// Delivers every document matching a query, existing and future, in
/// ascending local index order and one at a time.
///
/// The query must use `historyMode = all` and `orderBy = localIndex ASC`, and
/// may not carry a limit. A `start_after` local index cursor resumes delivery
/// after that index; `start_at` is not accepted.
///
/// Nothing happens until [`hatch`](QueryFollower::hatch) is called. Delivery
/// stops when the follower is closed or dropped, when the store closes, or when
/// a store query fails.
///
/// # Example
///
/// ```ignore
/// let follower = QueryFollower::new(driver.clone(), query, |doc| async move {
///     println!("{} @ {:?}", doc.path, doc.local_index);
/// })?;
/// follower.hatch();
/// ```
pub struct QueryFollower {
    driver: Arc<dyn StorageDriver>,
    query: Query,
    callback: FollowerCallback,
    runtime: Handle,
    hatched: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for QueryFollower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryFollower")
            .field("query", &self.query)
            .field("hatched", &self.hatched.load(Ordering::Acquire))
            .finish()
    }
}

impl QueryFollower {
    /// Creates a follower. It does not start delivering until hatched.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Validation`] if the query has the wrong
    /// shape, and [`DocumentStoreError::Initialization`] when called outside a
    /// tokio runtime.
    pub fn new<F, Fut>(driver: Arc<dyn StorageDriver>, query: Query, callback: F) -> DocumentStoreResult<Self>
    where
        F: Fn(SharedDoc) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: FollowerCallback = Arc::new(move |doc| callback(doc).boxed());
        Self::with_callback(driver, query, callback)
    }

    /// Like [`new`](QueryFollower::new), for an already boxed callback.
    pub fn with_callback(
        driver: Arc<dyn StorageDriver>,
        query: Query,
        callback: FollowerCallback,
    ) -> DocumentStoreResult<Self> {
        validate_follower_query(&query)?;
        let runtime = Handle::try_current()
            .map_err(|err| DocumentStoreError::Initialization(err.to_string()))?;

        Ok(Self {
            driver,
            query,
            callback,
            runtime,
            hatched: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Starts delivery. Only the first call has any effect.
    pub fn hatch(&self) {
        if self.hatched.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!(query = ?self.query, "hatching follower");
        let handle = self.runtime.spawn(follow(
            self.driver.clone(),
            self.query.clone(),
            self.callback.clone(),
        ));
        *self.task.lock() = Some(handle);
    }

    /// Stops delivery. A callback that is mid-flight is dropped.
    pub fn close(&self) {
        if let Some(handle) = self.task.lock().take() {
            debug!("closing follower");
            handle.abort();
        }
    }

    /// Whether the delivery task has stopped, or was never started.
    pub fn is_finished(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }
}

impl Drop for QueryFollower {
    fn drop(&mut self) {
        self.close();
    }
}

fn validate_follower_query(query: &Query) -> DocumentStoreResult<()> {
    if query.history_mode_or_default() != HistoryMode::All {
        return Err(DocumentStoreError::validation(
            "follower query must use historyMode \"all\"",
        ));
    }
    if query.order_by_or_default() != OrderBy::LocalIndexAsc {
        return Err(DocumentStoreError::validation(
            "follower query must use orderBy \"localIndex ASC\"",
        ));
    }
    if query.limit.is_some() {
        return Err(DocumentStoreError::validation("follower query may not have a limit"));
    }
    if query.start_at.is_some() {
        return Err(DocumentStoreError::validation("follower query may not have startAt"));
    }
    if query
        .start_after
        .as_ref()
        .is_some_and(|cursor| cursor.path.is_some())
    {
        return Err(DocumentStoreError::validation(
            "follower startAfter must be a localIndex cursor",
        ));
    }
    Ok(())
}

async fn follow(driver: Arc<dyn StorageDriver>, query: Query, callback: FollowerCallback) {
    let mut changes = driver.watch_local_index();
    let mut delivered: Option<LocalIndex> = query
        .start_after
        .as_ref()
        .and_then(|cursor| cursor.local_index);

    loop {
        // Mark the current value seen before querying, so a write that lands
        // during the query still wakes the next round.
        changes.borrow_and_update();

        if driver.is_closed() {
            break;
        }

        let page = Query {
            start_after: delivered.map(Cursor::local_index),
            ..query.clone()
        };
        let docs = match driver.query_docs(&page).await {
            Ok(docs) => docs,
            Err(err) => {
                debug!(%err, "follower query failed; stopping");
                break;
            }
        };

        for doc in docs {
            delivered = doc.local_index.or(delivered);
            callback(doc).await;
        }

        if changes.changed().await.is_err() {
            break;
        }
    }

    debug!(?delivered, "follower stopped");
}
