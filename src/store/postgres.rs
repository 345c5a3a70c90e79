use super::{CatalogStore, StoreError};
use crate::config::{ACQUIRE_TIMEOUT_SECS, INSERT_CHUNK_ROWS};
use crate::models::{Category, Collection, Product, ProductCategory, Review, SimilarLink};
use anyhow::{Context, Result};
use sqlx::postgres::{PgDatabaseError, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::{Executor, PgPool, Postgres, QueryBuilder, Row};
use std::time::{Duration, Instant};
use tracing::debug;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const INSERT_PRODUCTS: &str = "INSERT INTO product (asin, title, product_group, salesrank) ";
const INSERT_CATEGORIES: &str = "INSERT INTO category (id, name) ";
const INSERT_PRODUCT_CATEGORIES: &str =
    "INSERT INTO product_category (product_asin, category_id) ";
const INSERT_SIMILAR: &str = "INSERT INTO similar_product (product_asin, similar_asin) ";
const INSERT_REVIEWS: &str =
    "INSERT INTO review (product_asin, review_date, customer_id, rating, votes, helpful) ";

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    /// Opens a pool of `max_connections`. A load needs at least
    /// [`MIN_LOAD_CONNECTIONS`](crate::config::MIN_LOAD_CONNECTIONS).
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the catalog DDL. Safe to run against an existing schema.
    pub async fn create_schema(&self) -> Result<()> {
        self.pool
            .execute(SCHEMA_SQL)
            .await
            .context("Failed to create catalog schema")?;
        Ok(())
    }

    pub async fn count_rows(&self, collection: Collection) -> Result<i64> {
        let sql = format!("SELECT count(*) AS cnt FROM {}", collection.table());
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to execute count query: {sql}"))?;
        let count: i64 = row
            .try_get("cnt")
            .context("Missing 'cnt' field in result")?;
        Ok(count)
    }

    /// Writes `rows` as multi-row INSERTs of at most [`INSERT_CHUNK_ROWS`] rows,
    /// all inside one transaction.
    async fn insert_chunked<'a, T, F>(
        &self,
        collection: Collection,
        statement: &'static str,
        rows: &'a [T],
        bind: F,
    ) -> Result<u64, StoreError>
    where
        T: Sync,
        F: Fn(&mut Separated<'_, 'a, Postgres, &'static str>, &'a T) + Send + Sync,
    {
        if rows.is_empty() {
            return Ok(0);
        }

        let relation = collection.table();
        let start = Instant::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(relation, e))?;
        let mut inserted = 0u64;

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut qb: QueryBuilder<'a, Postgres> = QueryBuilder::new(statement);
            qb.push_values(chunk, |mut tuple, row| bind(&mut tuple, row));
            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| classify(relation, e))?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(|e| classify(relation, e))?;
        debug!(
            relation,
            rows = inserted,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Transaction committed"
        );
        Ok(inserted)
    }
}

/// Maps constraint violations onto the typed variants.
fn classify(relation: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let key = db
            .try_downcast_ref::<PgDatabaseError>()
            .and_then(|pg| pg.detail())
            .unwrap_or_else(|| db.message())
            .to_string();
        if db.is_foreign_key_violation() {
            return StoreError::MissingReference { relation, key };
        }
        if db.is_unique_violation() {
            return StoreError::DuplicateKey { relation, key };
        }
    }
    StoreError::Database(err)
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalogStore {
    async fn insert_products(&self, rows: &[Product]) -> Result<u64, StoreError> {
        self.insert_chunked(Collection::Product, INSERT_PRODUCTS, rows, |b, p| {
            b.push_bind(&p.asin)
                .push_bind(&p.title)
                .push_bind(&p.group)
                .push_bind(p.salesrank);
        })
        .await
    }

    async fn insert_categories(&self, rows: &[Category]) -> Result<u64, StoreError> {
        self.insert_chunked(Collection::Category, INSERT_CATEGORIES, rows, |b, c| {
            b.push_bind(c.id).push_bind(&c.name);
        })
        .await
    }

    async fn insert_product_categories(
        &self,
        rows: &[ProductCategory],
    ) -> Result<u64, StoreError> {
        self.insert_chunked(
            Collection::ProductCategory,
            INSERT_PRODUCT_CATEGORIES,
            rows,
            |b, l| {
                b.push_bind(&l.product_asin).push_bind(l.category_id);
            },
        )
        .await
    }

    async fn insert_similar(&self, rows: &[SimilarLink]) -> Result<u64, StoreError> {
        self.insert_chunked(Collection::SimilarLink, INSERT_SIMILAR, rows, |b, l| {
            b.push_bind(&l.product_asin).push_bind(&l.similar_asin);
        })
        .await
    }

    async fn insert_reviews(&self, rows: &[Review]) -> Result<u64, StoreError> {
        self.insert_chunked(Collection::Review, INSERT_REVIEWS, rows, |b, r| {
            b.push_bind(&r.product_asin)
                .push_bind(r.date)
                .push_bind(&r.customer_id)
                .push_bind(r.rating)
                .push_bind(r.votes)
                .push_bind(r.helpful);
        })
        .await
    }
}
