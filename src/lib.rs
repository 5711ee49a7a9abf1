//! catalog-dl core library
//!
//! Ingestion engine for a catalog of content-addressed items: each item is
//! resolved to a concrete fetch location, its bytes are streamed to disk
//! under retry, and the per-item outcome is recorded so the catalog can be
//! processed incrementally and re-run without duplicating work.
//!
//! # Architecture
//!
//! - [`store`] - durable catalog and per-item status machine
//! - [`resolver`] - lookup page or direct reference to absolute URL
//! - [`fetch`] - streaming fetch with atomic placement
//! - [`retry`] - failure classification and backoff
//! - [`engine`] - orchestrator and bounded worker pool
//! - [`import`] - catalog export import
//! - [`db`] - `SQLite` connection and migrations

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod db;
pub mod engine;
pub mod fetch;
pub mod http_client;
pub mod import;
pub mod resolver;
pub mod retry;
pub mod store;
mod user_agent;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use engine::{EngineConfig, EngineError, Orchestrator, RunPhase, RunSummary};
pub use fetch::{FetchError, FetchOutcome, FetchTarget, Fetcher, HttpFetcher, derive_filename};
pub use resolver::{DirectResolver, LinkPageConfig, LinkPageResolver, ResolveError, Resolver};
pub use retry::{Backoff, FailureKind, RetryDecision, RetryPolicy};
pub use store::{
    Item, ItemStatus, ItemStore, MemoryItemStore, NewItem, SqliteItemStore, StoreError,
};
