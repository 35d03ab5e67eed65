//! In-memory document store for vellum.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StorageDriver` trait. It uses async-aware locks for concurrent access and
//! is meant for tests, short-lived sessions and as the reference behavior for
//! other drivers.
//!
//! # Features
//!
//! - **Two indexes** - By `(path, author)` and by path with the newest version first
//! - **Local indexes** - Every write gets the next local index, starting at 0
//! - **Full query support** - History modes, orderings, cursors, limits and filters
//! - **Change notification** - A watch channel carrying the highest local index
//! - **Config side table** - Flat string key/value pairs, including the store's own `storageId`
//!
//! # Quick Start
//!
//! ```ignore
//! use vellum_core::{driver::{StorageDriver, StorageDriverBuilder}, query::Query};
//! use vellum_memory::MemoryDriver;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = MemoryDriver::builder("+gardening.abcde").build().await?;
//!
//!     driver.upsert(doc).await?;
//!     let docs = driver.query_docs(&Query::new()).await?;
//!
//!     driver.close(false).await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as vellum_memory;

pub mod store;

pub use store::{MemoryDriver, MemoryDriverBuilder, STORAGE_ID_KEY};
