//! Document ordering and the sort, cursor and limit pipeline.
//!
//! Both the store and the live cache shape their results with these functions,
//! so a cached slice always agrees with what a fresh query would return.

use std::cmp::Ordering;

use crate::{
    document::{Document, SharedDoc},
    evaluator::doc_matches_filter,
    query::{Cursor, OrderBy, Query, SortDirection},
};

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Orders by `(path, timestamp, signature)` with directions `(direction, DESC, ASC)`.
///
/// Within a path the newest version comes first; equal timestamps fall back to
/// the smaller signature so the order is total and deterministic.
pub fn compare_path_then_newest(a: &Document, b: &Document, direction: SortDirection) -> Ordering {
    directed(a.path.cmp(&b.path), direction)
        .then_with(|| b.timestamp.cmp(&a.timestamp))
        .then_with(|| a.signature.cmp(&b.signature))
}

/// Orders by local index only.
pub fn compare_local_index(a: &Document, b: &Document, direction: SortDirection) -> Ordering {
    directed(a.local_index_or_zero().cmp(&b.local_index_or_zero()), direction)
}

/// Orders two documents the way `order_by` asks for.
pub fn compare_docs(a: &Document, b: &Document, order_by: OrderBy) -> Ordering {
    if order_by.is_path_order() {
        compare_path_then_newest(a, b, order_by.direction())
    } else {
        compare_local_index(a, b, order_by.direction())
    }
}

/// Sorts documents in place by `order_by`.
pub fn sort_docs(docs: &mut [SharedDoc], order_by: OrderBy) {
    docs.sort_by(|a, b| compare_docs(a, b, order_by));
}

/// Whether `doc` lies on the allowed side of `cursor`.
///
/// A cursor naming a field other than the active sort key lets nothing through.
fn cursor_allows(doc: &Document, order_by: OrderBy, cursor: &Cursor, inclusive: bool) -> bool {
    if cursor.mismatches(order_by) {
        return false;
    }

    let ordering = if order_by.is_path_order() {
        cursor.path.as_deref().map(|path| doc.path.as_str().cmp(path))
    } else {
        cursor
            .local_index
            .map(|local_index| doc.local_index_or_zero().cmp(&local_index))
    };

    match ordering.map(|ordering| directed(ordering, order_by.direction())) {
        None | Some(Ordering::Greater) => true,
        Some(Ordering::Equal) => inclusive,
        Some(Ordering::Less) => false,
    }
}

/// Whether `doc` passes the query's `start_at` / `start_after` bounds.
pub fn passes_cursors(doc: &Document, query: &Query) -> bool {
    let order_by = query.order_by_or_default();

    query
        .start_at
        .as_ref()
        .is_none_or(|cursor| cursor_allows(doc, order_by, cursor, true))
        && query
            .start_after
            .as_ref()
            .is_none_or(|cursor| cursor_allows(doc, order_by, cursor, false))
}

/// Sorts, applies cursors and the filter (when `apply_filter`), then truncates at the limit.
pub fn apply_query(mut docs: Vec<SharedDoc>, query: &Query, apply_filter: bool) -> Vec<SharedDoc> {
    sort_docs(&mut docs, query.order_by_or_default());

    let filter = query.filter.as_ref().filter(|_| apply_filter);
    let limit = query.limit.unwrap_or(usize::MAX);

    docs.into_iter()
        .filter(|doc| passes_cursors(doc, query))
        .filter(|doc| filter.is_none_or(|filter| doc_matches_filter(doc, filter)))
        .take(limit)
        .collect()
}

/// Re-applies a query's order, cursors and limit to documents that are already
/// known to match its filter.
pub fn sort_and_limit(docs: Vec<SharedDoc>, query: &Query) -> Vec<SharedDoc> {
    apply_query(docs, query, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;
    use std::sync::Arc;

    fn doc(path: &str, timestamp: i64, signature: &str, local_index: u64) -> SharedDoc {
        Arc::new(Document {
            path: path.to_string(),
            author: format!("@{signature}"),
            content: signature.to_string(),
            content_hash: String::new(),
            timestamp,
            delete_after: None,
            workspace: "+gardening.abcde".to_string(),
            signature: signature.to_string(),
            local_index: Some(local_index),
        })
    }

    fn sigs(docs: &[SharedDoc]) -> Vec<&str> {
        docs.iter().map(|d| d.signature.as_str()).collect()
    }

    fn sample() -> Vec<SharedDoc> {
        vec![
            doc("/b", 10, "s1", 0),
            doc("/a", 10, "s2", 1),
            doc("/a", 20, "s3", 2),
            doc("/a", 20, "s0", 3),
            doc("/c", 5, "s4", 4),
        ]
    }

    #[test]
    fn path_order_breaks_ties_newest_then_signature() {
        let asc = apply_query(sample(), &Query::builder().order_by(OrderBy::PathAsc).build(), true);
        assert_eq!(sigs(&asc), vec!["s0", "s3", "s2", "s1", "s4"]);

        let desc = apply_query(sample(), &Query::builder().order_by(OrderBy::PathDesc).build(), true);
        assert_eq!(sigs(&desc), vec!["s4", "s1", "s0", "s3", "s2"]);
    }

    #[test]
    fn local_index_cursors() {
        let after = Query::builder()
            .order_by(OrderBy::LocalIndexAsc)
            .start_after(Cursor::local_index(2))
            .build();
        assert_eq!(sigs(&apply_query(sample(), &after, true)), vec!["s0", "s4"]);

        let at_desc = Query::builder()
            .order_by(OrderBy::LocalIndexDesc)
            .start_at(Cursor::local_index(2))
            .build();
        assert_eq!(sigs(&apply_query(sample(), &at_desc, true)), vec!["s3", "s2", "s1"]);
    }

    #[test]
    fn path_cursors() {
        let at = Query::builder()
            .order_by(OrderBy::PathAsc)
            .start_at(Cursor::path("/b"))
            .build();
        assert_eq!(sigs(&apply_query(sample(), &at, true)), vec!["s1", "s4"]);

        let after_desc = Query::builder()
            .order_by(OrderBy::PathDesc)
            .start_after(Cursor::path("/b"))
            .build();
        assert_eq!(sigs(&apply_query(sample(), &after_desc, true)), vec!["s0", "s3", "s2"]);
    }

    #[test]
    fn mismatched_cursor_lets_nothing_through() {
        let query = Query::builder()
            .order_by(OrderBy::LocalIndexAsc)
            .start_after(Cursor::path("a"))
            .build();
        assert!(apply_query(sample(), &query, true).is_empty());
    }

    #[test]
    fn filter_then_limit() {
        let query = Query::builder()
            .order_by(OrderBy::LocalIndexAsc)
            .filter(Filter::new().path("/a"))
            .limit(2)
            .build();
        assert_eq!(sigs(&apply_query(sample(), &query, true)), vec!["s2", "s3"]);

        // sort_and_limit trusts the caller to have filtered already
        assert_eq!(sigs(&sort_and_limit(sample(), &query)), vec!["s1", "s2"]);
    }
}
