//! Destination of the bulk load.
//!
//! Each insert method receives a whole collection and must either commit all of
//! it as one durable unit or fail without leaving rows behind.

mod postgres;

pub use postgres::PgCatalogStore;

use crate::models::{Category, Product, ProductCategory, Review, SimilarLink};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{relation}: row references missing key {key}")]
    MissingReference { relation: &'static str, key: String },

    #[error("{relation}: duplicate key {key}")]
    DuplicateKey { relation: &'static str, key: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Bulk-insert target for the five catalog relations.
///
/// Implementations are shared across concurrently running load branches, so
/// every call must use its own connection or transaction.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    async fn insert_products(&self, rows: &[Product]) -> Result<u64, StoreError>;
    async fn insert_categories(&self, rows: &[Category]) -> Result<u64, StoreError>;
    async fn insert_product_categories(&self, rows: &[ProductCategory])
        -> Result<u64, StoreError>;
    async fn insert_similar(&self, rows: &[SimilarLink]) -> Result<u64, StoreError>;
    async fn insert_reviews(&self, rows: &[Review]) -> Result<u64, StoreError>;
}
