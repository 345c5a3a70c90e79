//! Catalog loader: product metadata dump parsing and PostgreSQL bulk load
//!
//! This crate turns a loosely structured product-catalog dump (one blank-line
//! delimited block per product, `key: value` fields plus multi-line
//! `categories` and `reviews` sections) into a normalized relational store:
//!
//! 1. **Parse Pass** -- Stream the dump line by line, accumulate one block at a
//!    time and emit five deduplicated collections: products, categories,
//!    product-category links, similar links and reviews
//! 2. **Load Pass** -- Commit products first, then load reviews, similar links
//!    and the category chain concurrently, each as one transaction
//!
//! # Architecture
//!
//! - **Streaming parse** -- Never holds more than one block of raw text; `.gz`
//!   and `.bz2` dumps are decompressed on the fly
//! - **Malformed-line tolerance** -- Bad category segments and review lines are
//!   counted and dropped, never fatal
//! - **Ownership hand-off** -- The parser returns a [`models::Catalog`] by value
//!   and the loader consumes it; there is no shared global state
//! - **Dependency-aware load** -- Products are the commit barrier; the remaining
//!   branches run as independent tokio tasks with their own connections
//! - **Per-collection reporting** -- Every collection ends loaded, failed (with
//!   the store error) or skipped (with the blocking collection)
//!
//! # Key Modules
//!
//! - [`grammar`] -- Line-level grammar and whitespace normalization
//! - [`parser`] -- Block state machine and dump readers
//! - [`models`] -- Entity types and the [`models::Catalog`] collections
//! - [`load`] -- Load orchestration and [`load::LoadReport`]
//! - [`store`] -- [`store::CatalogStore`] trait and the PostgreSQL implementation
//! - [`extract`] -- CSV export of parsed collections
//! - [`stats`] -- Parse counters
//! - [`config`] -- Constants for parsing and loading
//!
//! # Example Usage
//!
//! ```bash
//! # Parse only and write CSVs
//! catalog-loader extract -i amazon-meta.txt.gz -o output/
//!
//! # Create tables and load
//! catalog-loader load -i amazon-meta.txt.gz --database-url postgres://localhost/catalog --create-schema
//! ```

pub mod config;
pub mod extract;
pub mod grammar;
pub mod load;
pub mod models;
pub mod parser;
pub mod stats;
pub mod store;
