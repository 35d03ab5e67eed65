//! Filter evaluation for documents.
//!
//! This module provides the evaluation engine that decides whether a
//! [`Document`] satisfies a [`Filter`]. Evaluation is pure and never fails:
//! a condition that cannot hold simply does not match.

use crate::{document::Document, query::Filter};

/// Evaluates filters against a single document.
pub struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns true when every condition present in `filter` holds.
    pub fn evaluate(&self, filter: &Filter) -> bool {
        let doc = self.document;

        let checks = [
            filter.path.as_ref().is_none_or(|path| &doc.path == path),
            filter
                .path_starts_with
                .as_ref()
                .is_none_or(|prefix| doc.path.starts_with(prefix.as_str())),
            filter
                .path_ends_with
                .as_ref()
                .is_none_or(|suffix| doc.path.ends_with(suffix.as_str())),
            filter.author.as_ref().is_none_or(|author| &doc.author == author),
            filter.timestamp.is_none_or(|ts| doc.timestamp == ts),
            filter.timestamp_gt.is_none_or(|ts| doc.timestamp > ts),
            filter.timestamp_lt.is_none_or(|ts| doc.timestamp < ts),
            filter
                .content_length
                .is_none_or(|len| doc.content_length() == len),
            filter
                .content_length_gt
                .is_none_or(|len| doc.content_length() > len),
            filter
                .content_length_lt
                .is_none_or(|len| doc.content_length() < len),
        ];

        checks.iter().all(|passed| *passed)
    }
}

/// Returns true when `doc` satisfies `filter`.
pub fn doc_matches_filter(doc: &Document, filter: &Filter) -> bool {
    DocumentEvaluator::new(doc).evaluate(filter)
}
