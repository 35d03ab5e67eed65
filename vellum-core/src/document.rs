//! The document value and the small types that travel with it.
//!
//! A [`Document`] is immutable once it has been stored. Stores hand out
//! [`SharedDoc`] handles so the same value can sit in several indexes and
//! cache entries at once without copying.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hierarchical key a document lives at, e.g. `/posts/0001.txt`.
pub type Path = String;

/// Author identity string, e.g. `@suzy.4e0a...`.
pub type AuthorAddress = String;

/// Workspace (namespace) identifier, e.g. `+gardening.abcde`.
pub type WorkspaceAddress = String;

/// Store-assigned write counter. Starts at 0 and grows by exactly one per accepted write.
pub type LocalIndex = u64;

/// A stored document, shared by reference between indexes and caches.
pub type SharedDoc = Arc<Document>;

/// One author's version of the record at a path.
///
/// Documents are uniquely identified for storage purposes by `(path, author)`.
/// Several documents may share a `path`; together they form the version history
/// at that path.
///
/// The `local_index` is local bookkeeping assigned by the store on write. It is
/// never part of the document's authorial identity and is not serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Hierarchical key.
    pub path: Path,
    /// Identity of the author who signed this version.
    pub author: AuthorAddress,
    /// Payload.
    pub content: String,
    /// Digest of `content`.
    pub content_hash: String,
    /// Author-supplied microseconds since the epoch.
    pub timestamp: i64,
    /// Optional expiry timestamp in microseconds.
    pub delete_after: Option<i64>,
    /// Namespace the document belongs to.
    pub workspace: WorkspaceAddress,
    /// Author's signature over the other fields.
    pub signature: String,
    /// Assigned by the store on write.
    #[serde(skip)]
    pub local_index: Option<LocalIndex>,
}

impl Document {
    /// Consumes this document and returns it carrying the given local index.
    ///
    /// Documents are never mutated after they are stored; the store stamps the
    /// index once, before sharing the document.
    pub fn with_local_index(self, local_index: LocalIndex) -> Self {
        Self {
            local_index: Some(local_index),
            ..self
        }
    }

    /// The local index, or 0 for documents that have not been stored yet.
    pub fn local_index_or_zero(&self) -> LocalIndex {
        self.local_index.unwrap_or(0)
    }

    /// Length of the content in UTF-8 bytes.
    pub fn content_length(&self) -> usize {
        self.content.len()
    }
}

/// The fields a caller supplies when writing a document through a cache.
///
/// Everything else (author, hash, workspace, signature) is filled in locally.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocToSet {
    pub path: Path,
    pub content: String,
    /// Defaults to "now" when absent.
    pub timestamp: Option<i64>,
    pub delete_after: Option<i64>,
}

impl DocToSet {
    pub fn new(path: impl Into<Path>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            timestamp: None,
            delete_after: None,
        }
    }
}

/// An author's address together with its encoded secret key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorKeypair {
    pub address: AuthorAddress,
    pub secret: String,
}

impl std::fmt::Debug for AuthorKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthorKeypair({}, <redacted>)", self.address)
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestResult {
    /// The document was accepted and is the latest at its path.
    AcceptedAndLatest,
}

/// A write outcome together with the document that was written.
#[derive(Debug, Clone)]
pub struct IngestResultAndDoc {
    pub ingest_result: IngestResult,
    pub doc_ingested: Option<SharedDoc>,
}

/// Current time in microseconds since the epoch.
pub fn microsecond_now() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document {
            path: "/a".to_string(),
            author: "@suzy.abc".to_string(),
            content: "\u{2603}".to_string(),
            content_hash: "h".to_string(),
            timestamp: 10,
            delete_after: None,
            workspace: "+gardening.abcde".to_string(),
            signature: "sig".to_string(),
            local_index: None,
        }
    }

    #[test]
    fn with_local_index_stamps_a_copy() {
        let original = doc();
        let stored = original.clone().with_local_index(7);

        assert_eq!(original.local_index, None);
        assert_eq!(stored.local_index, Some(7));
        assert_eq!(stored.content, original.content);
    }

    #[test]
    fn content_length_counts_utf8_bytes() {
        assert_eq!(doc().content_length(), 3);
    }

    #[test]
    fn local_index_is_not_serialized() {
        let json = serde_json::to_value(doc().with_local_index(3)).unwrap();

        assert!(json.get("localIndex").is_none());
        assert_eq!(json["contentHash"], "h");
        assert_eq!(json["deleteAfter"], serde_json::Value::Null);
    }
}
