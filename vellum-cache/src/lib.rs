//! Live query cache and write followers for vellum.
//!
//! This crate sits in front of any `StorageDriver` and provides:
//!
//! - **Query followers** ([`follower`]) - Ordered, back-pressured delivery of every document
//!   matching a query, including documents written later
//! - **Live cache** ([`cache`]) - Immediate answers from the last known result, background
//!   refreshes, optimistic local writes and change observers
//!
//! Both spawn their background work on the tokio runtime they were created in.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vellum_cache::LiveCache;
//! use vellum_core::{crypto::Ed25519CryptoDriver, validator::ValidatorEs4};
//!
//! let validator = Arc::new(ValidatorEs4::new(Arc::new(Ed25519CryptoDriver)));
//! let cache = LiveCache::builder(driver, validator).build()?;
//!
//! cache.set(&keypair, &DocToSet::new("/posts/hello.txt", "hello"))?;
//! let latest = cache.get_latest_doc_at_path("/posts/hello.txt")?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as vellum_cache;

pub mod cache;
pub mod follower;

pub use cache::{CacheObserver, DEFAULT_TIME_TO_LIVE, LiveCache, LiveCacheBuilder, Unsubscribe};
pub use follower::{FollowerCallback, QueryFollower};
