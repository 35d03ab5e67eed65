//! Convenient re-exports of commonly used types from vellum.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use vellum::prelude::*;
//! ```
//!
//! This provides access to:
//! - Documents, keypairs and write results
//! - Storage driver traits and lifecycle states
//! - Query construction
//! - Crypto and validation capabilities
//! - Error types

pub use vellum_core::{
    document::{AuthorKeypair, DocToSet, Document, IngestResult, IngestResultAndDoc, LocalIndex, SharedDoc},
    driver::{StorageDriver, StorageDriverBuilder},
    lifecycle::Lifecycle,
    query::{Cursor, Filter, HistoryMode, OrderBy, Query, QueryBuilder},
    crypto::{CryptoDriver, Ed25519CryptoDriver, generate_author_keypair},
    validator::{FormatValidator, ValidatorEs4},
    error::{DocumentStoreError, DocumentStoreResult},
};
