//! Main vellum crate providing a unified interface to the document store.
//!
//! This crate is the primary entry point for users of vellum. It re-exports the
//! core types from the sub-crates and gives convenient access to the in-memory
//! store and the live cache.
//!
//! # Features
//!
//! - **Multi-author documents** - One version per `(path, author)`, with the latest winning per path
//! - **Structured queries** - History modes, path or local index ordering, cursors, limits and filters
//! - **Followers** - Ordered delivery of every matching document, including future writes
//! - **Live cache** - Instant reads, background refreshes and optimistic local writes
//! - **Signing** - Ed25519 author identities and a document validator
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vellum::{prelude::*, memory::MemoryDriver, cache::LiveCache};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let driver = Arc::new(MemoryDriver::builder("+gardening.abcde").build().await?);
//!     let validator = Arc::new(ValidatorEs4::new(Arc::new(Ed25519CryptoDriver)));
//!     let keypair = generate_author_keypair(validator.crypto(), "suzy")?;
//!
//!     // Write through the store directly...
//!     let doc = validator.generate_document(
//!         &keypair,
//!         driver.workspace(),
//!         &DocToSet::new("/posts/hello.txt", "hello"),
//!     )?;
//!     driver.upsert(doc).await?;
//!
//!     let latest = driver
//!         .query_docs(&Query::builder().order_by(OrderBy::PathDesc).build())
//!         .await?;
//!     println!("{latest:?}");
//!
//!     // ...or optimistically through a cache.
//!     let cache = LiveCache::builder(driver.clone(), validator).build()?;
//!     cache.set(&keypair, &DocToSet::new("/posts/hello.txt", "hello again"))?;
//!
//!     driver.close(false).await
//! }
//! ```
//!
//! # Stores
//!
//! - [`memory`] - The indexed in-memory store
//!
//! # Caching
//!
//! - [`cache`] - `LiveCache` and `QueryFollower`

pub mod prelude;

pub use vellum_core::{compare, crypto, document, driver, error, evaluator, lifecycle, query, validator};

/// In-memory store implementations.
pub mod memory {
    pub use vellum_memory::{MemoryDriver, MemoryDriverBuilder, STORAGE_ID_KEY};
}

/// Live caching and followers.
pub mod cache {
    pub use vellum_cache::{
        CacheObserver, DEFAULT_TIME_TO_LIVE, FollowerCallback, LiveCache, LiveCacheBuilder,
        QueryFollower, Unsubscribe,
    };
}
