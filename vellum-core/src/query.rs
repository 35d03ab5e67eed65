//! Query value objects for reading documents.
//!
//! A [`Query`] describes a read: which history to consider, the order to return
//! documents in, an optional pagination cursor, an optional limit and an
//! optional [`Filter`] over document fields.
//!
//! # Query Building
//!
//! Queries can be constructed using the fluent builder API:
//!
//! ```ignore
//! use vellum_core::query::{Query, Filter, HistoryMode, OrderBy, Cursor};
//!
//! let query = Query::builder()
//!     .history_mode(HistoryMode::All)
//!     .order_by(OrderBy::LocalIndexAsc)
//!     .start_after(Cursor::local_index(41))
//!     .filter(Filter::new().path_starts_with("/posts/"))
//!     .limit(10)
//!     .build();
//! ```
//!
//! # Canonical form
//!
//! [`clean_up_query`] fills in defaults, drops empty parts and decides up front
//! whether the query can match anything at all. The cleaned query serializes to
//! a stable string which caches use as a key.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{
    document::{LocalIndex, Path},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Which versions of each path a query considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HistoryMode {
    /// Every stored version, one per author per path.
    #[serde(rename = "all")]
    All,
    /// Only the winning version at each path.
    #[default]
    #[serde(rename = "latest")]
    Latest,
}

impl HistoryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryMode::All => "all",
            HistoryMode::Latest => "latest",
        }
    }
}

impl fmt::Display for HistoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryMode {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(HistoryMode::All),
            "latest" => Ok(HistoryMode::Latest),
            other => Err(DocumentStoreError::validation(format!(
                "unrecognized query historyMode: {other:?}"
            ))),
        }
    }
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// The four total orders a query can return documents in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderBy {
    /// Path ascending; within a path newest first.
    #[default]
    #[serde(rename = "path ASC")]
    PathAsc,
    /// Path descending; within a path newest first.
    #[serde(rename = "path DESC")]
    PathDesc,
    /// Write order.
    #[serde(rename = "localIndex ASC")]
    LocalIndexAsc,
    /// Reverse write order.
    #[serde(rename = "localIndex DESC")]
    LocalIndexDesc,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::PathAsc => "path ASC",
            OrderBy::PathDesc => "path DESC",
            OrderBy::LocalIndexAsc => "localIndex ASC",
            OrderBy::LocalIndexDesc => "localIndex DESC",
        }
    }

    /// Direction of the primary sort key.
    pub fn direction(&self) -> SortDirection {
        match self {
            OrderBy::PathAsc | OrderBy::LocalIndexAsc => SortDirection::Asc,
            OrderBy::PathDesc | OrderBy::LocalIndexDesc => SortDirection::Desc,
        }
    }

    /// Whether the primary sort key is the path.
    pub fn is_path_order(&self) -> bool {
        matches!(self, OrderBy::PathAsc | OrderBy::PathDesc)
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderBy {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path ASC" => Ok(OrderBy::PathAsc),
            "path DESC" => Ok(OrderBy::PathDesc),
            "localIndex ASC" => Ok(OrderBy::LocalIndexAsc),
            "localIndex DESC" => Ok(OrderBy::LocalIndexDesc),
            other => Err(DocumentStoreError::validation(format!(
                "unrecognized query orderBy: {other:?}"
            ))),
        }
    }
}

/// A pagination boundary.
///
/// Only the field matching the query's [`OrderBy`] may be set; a cursor on the
/// other field makes the query match nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_index: Option<LocalIndex>,
}

impl Cursor {
    /// A cursor positioned at a path.
    pub fn path(path: impl Into<Path>) -> Self {
        Cursor {
            path: Some(path.into()),
            local_index: None,
        }
    }

    /// A cursor positioned at a local index.
    pub fn local_index(local_index: LocalIndex) -> Self {
        Cursor {
            path: None,
            local_index: Some(local_index),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.local_index.is_none()
    }

    /// Whether this cursor names a field other than the one `order_by` sorts on.
    pub fn mismatches(&self, order_by: OrderBy) -> bool {
        if order_by.is_path_order() {
            self.local_index.is_some()
        } else {
            self.path.is_some()
        }
    }
}

/// A predicate over document fields. Every condition that is present must hold.
///
/// ```ignore
/// let filter = Filter::new()
///     .path_starts_with("/posts/")
///     .timestamp_gt(1_619_627_796_035_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_starts_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_ends_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_gt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_lt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length_gt: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length_lt: Option<usize>,
}

impl Filter {
    /// Creates an empty filter that matches every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches documents at exactly this path.
    pub fn path(mut self, path: impl Into<Path>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Matches documents whose path starts with `prefix`.
    pub fn path_starts_with(mut self, prefix: impl Into<String>) -> Self {
        self.path_starts_with = Some(prefix.into());
        self
    }

    /// Matches documents whose path ends with `suffix`.
    pub fn path_ends_with(mut self, suffix: impl Into<String>) -> Self {
        self.path_ends_with = Some(suffix.into());
        self
    }

    /// Matches documents written by `author`.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Matches documents with exactly this timestamp.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Matches documents strictly newer than `timestamp`.
    pub fn timestamp_gt(mut self, timestamp: i64) -> Self {
        self.timestamp_gt = Some(timestamp);
        self
    }

    /// Matches documents strictly older than `timestamp`.
    pub fn timestamp_lt(mut self, timestamp: i64) -> Self {
        self.timestamp_lt = Some(timestamp);
        self
    }

    /// Matches documents whose content is exactly `length` bytes long.
    pub fn content_length(mut self, length: usize) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Matches documents whose content is longer than `length` bytes.
    pub fn content_length_gt(mut self, length: usize) -> Self {
        self.content_length_gt = Some(length);
        self
    }

    /// Matches documents whose content is shorter than `length` bytes.
    pub fn content_length_lt(mut self, length: usize) -> Self {
        self.content_length_lt = Some(length);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Filter::default()
    }

    /// Whether no document could ever satisfy every condition at once.
    pub fn is_contradictory(&self) -> bool {
        if let Some(path) = &self.path {
            if let Some(prefix) = &self.path_starts_with {
                if !path.starts_with(prefix.as_str()) {
                    return true;
                }
            }
            if let Some(suffix) = &self.path_ends_with {
                if !path.ends_with(suffix.as_str()) {
                    return true;
                }
            }
        }

        let timestamps = |v: Option<i64>| v.map(i128::from);
        if range_is_empty(
            timestamps(self.timestamp),
            timestamps(self.timestamp_gt),
            timestamps(self.timestamp_lt),
            i128::from(i64::MIN),
        ) {
            return true;
        }

        let lengths = |v: Option<usize>| v.map(|n| n as i128);
        range_is_empty(
            lengths(self.content_length),
            lengths(self.content_length_gt),
            lengths(self.content_length_lt),
            0,
        )
    }
}

// Whether no integer `x` satisfies `gt < x < lt` (and `x == exact` when pinned).
fn range_is_empty(exact: Option<i128>, gt: Option<i128>, lt: Option<i128>, floor: i128) -> bool {
    if lt.is_some_and(|lt| lt <= floor) {
        return true;
    }
    if let (Some(gt), Some(lt)) = (gt, lt) {
        if lt <= gt + 1 {
            return true;
        }
    }
    match exact {
        Some(exact) => gt.is_some_and(|gt| exact <= gt) || lt.is_some_and(|lt| exact >= lt),
        None => false,
    }
}

/// A structured query for reading documents.
///
/// Every field is optional; [`clean_up_query`] fills in the defaults
/// (`historyMode = latest`, `orderBy = path ASC`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_mode: Option<HistoryMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    /// Inclusive pagination boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<Cursor>,
    /// Exclusive pagination boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_after: Option<Cursor>,
    /// Maximum number of documents to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

impl Query {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// The history mode, with the default applied.
    pub fn history_mode_or_default(&self) -> HistoryMode {
        self.history_mode.unwrap_or_default()
    }

    /// The order, with the default applied.
    pub fn order_by_or_default(&self) -> OrderBy {
        self.order_by.unwrap_or_default()
    }

    /// Canonical string form of this query.
    ///
    /// Field order is fixed by the struct layout and absent fields are
    /// skipped, so equal queries always produce equal keys.
    pub fn canonical_key(&self) -> DocumentStoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Whether a cleaned query can return anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WillMatch {
    /// The query has to be run to find out.
    Something,
    /// The query is known to return an empty result.
    Nothing,
}

/// A query with defaults filled in, plus the verdict on whether it can match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedQuery {
    pub query: Query,
    pub will_match: WillMatch,
}

/// Canonicalizes a query and decides whether it can match anything.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Validation`] when both `start_at` and
/// `start_after` are given.
pub fn clean_up_query(query: &Query) -> DocumentStoreResult<CleanedQuery> {
    let order_by = query.order_by_or_default();
    let non_empty = |cursor: &Option<Cursor>| cursor.clone().filter(|c| !c.is_empty());

    let cleaned = Query {
        history_mode: Some(query.history_mode_or_default()),
        order_by: Some(order_by),
        start_at: non_empty(&query.start_at),
        start_after: non_empty(&query.start_after),
        limit: query.limit,
        filter: query.filter.clone().filter(|f| !f.is_empty()),
    };

    if cleaned.start_at.is_some() && cleaned.start_after.is_some() {
        return Err(DocumentStoreError::validation(
            "query may not have both startAt and startAfter",
        ));
    }

    let cursor_mismatch = cleaned
        .start_at
        .iter()
        .chain(cleaned.start_after.iter())
        .any(|cursor| cursor.mismatches(order_by));
    let contradictory_filter = cleaned
        .filter
        .as_ref()
        .is_some_and(Filter::is_contradictory);

    let will_match = if cleaned.limit == Some(0) || cursor_mismatch || contradictory_filter {
        WillMatch::Nothing
    } else {
        WillMatch::Something
    };

    Ok(CleanedQuery {
        query: cleaned,
        will_match,
    })
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder {
            query: Query::default(),
        }
    }

    pub fn history_mode(mut self, history_mode: HistoryMode) -> Self {
        self.query.history_mode = Some(history_mode);
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.query.order_by = Some(order_by);
        self
    }

    /// Sets an inclusive cursor.
    pub fn start_at(mut self, cursor: Cursor) -> Self {
        self.query.start_at = Some(cursor);
        self
    }

    /// Sets an exclusive cursor.
    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.query.start_after = Some(cursor);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}
