//! Core types and traits for the vellum document store.
//!
//! This crate is the core of the vellum project and provides:
//!
//! - **Documents** ([`document`]) - The immutable, multi-author document value and its helpers
//! - **Queries** ([`query`]) - Query value objects, canonicalization and contradiction detection
//! - **Ordering** ([`compare`]) - The comparators and the sort/cursor/limit pipeline shared by stores and caches
//! - **Filter evaluation** ([`evaluator`]) - Matching documents against a [`query::Filter`]
//! - **Storage drivers** ([`driver`]) - The async trait every document store implements
//! - **Lifecycle** ([`lifecycle`]) - The `NEW → HATCHING → READY → CLOSED` state machine
//! - **Crypto** ([`crypto`]) - The hashing and signing capability, with an ed25519 implementation
//! - **Validation** ([`validator`]) - Building, signing and checking documents
//! - **Error handling** ([`error`]) - The shared error taxonomy and result type
//!
//! # Example
//!
//! ```ignore
//! use vellum_core::query::{Query, HistoryMode, OrderBy};
//!
//! let query = Query::builder()
//!     .history_mode(HistoryMode::All)
//!     .order_by(OrderBy::LocalIndexAsc)
//!     .limit(10)
//!     .build();
//! ```

#[allow(unused_extern_crates)]
extern crate self as vellum_core;

pub mod compare;
pub mod crypto;
pub mod document;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod lifecycle;
pub mod query;
pub mod validator;
