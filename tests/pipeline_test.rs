//! End-to-end tests for the parse -> load pipeline.
//!
//! The loader is exercised against `MemoryStore`, an in-process
//! [`CatalogStore`] that behaves like the relational schema where it matters
//! for ordering: it rejects rows whose product or category is not committed
//! yet, rejects duplicate keys, applies each bulk call atomically, and records
//! when every call begins and commits.
//!
//! # Key Patterns
//!
//! - **Fixture dumps**: `sample_dump()` mirrors the real dump layout (indented
//!   fields, multi-line `categories` and `reviews` sections)
//! - **Barrier checks**: the event log must show the product commit before any
//!   dependent insert begins
//! - **Concurrency checks**: a rendezvous forces reviews and similar links to
//!   be in flight at the same time
//! - **Failure injection**: a chosen collection fails or panics, and the report
//!   must name it while sibling branches still commit

use bzip2::write::BzEncoder;
use catalog_loader::load::{load_catalog, LoadError, Outcome};
use catalog_loader::models::{
    Catalog, Category, Collection, Product, ProductCategory, Review, SimilarLink,
};
use catalog_loader::parser::{parse_file, parse_reader};
use catalog_loader::store::{CatalogStore, StoreError};
use chrono::NaiveDate;
use flate2::write::GzEncoder;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::Barrier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Begin(Collection),
    Commit(Collection),
}

#[derive(Default)]
struct State {
    products: HashSet<String>,
    categories: HashSet<i32>,
    product_categories: HashSet<(String, i32)>,
    similar: HashSet<(String, String)>,
    reviews: Vec<Review>,
    events: Vec<Event>,
}

#[derive(Default)]
struct MemoryStore {
    state: Mutex<State>,
    fail: Option<Collection>,
    panic_on: Option<Collection>,
    rendezvous: Option<Barrier>,
}

impl MemoryStore {
    fn new() -> Self {
        Self::default()
    }

    fn failing(collection: Collection) -> Self {
        Self {
            fail: Some(collection),
            ..Self::default()
        }
    }

    fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    fn count(&self, collection: Collection) -> usize {
        let state = self.state.lock().unwrap();
        match collection {
            Collection::Product => state.products.len(),
            Collection::Category => state.categories.len(),
            Collection::ProductCategory => state.product_categories.len(),
            Collection::SimilarLink => state.similar.len(),
            Collection::Review => state.reviews.len(),
        }
    }

    /// Common prologue of every insert: log, yield, optionally rendezvous or fail.
    async fn begin(&self, collection: Collection) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .events
            .push(Event::Begin(collection));
        tokio::task::yield_now().await;

        if let Some(barrier) = &self.rendezvous {
            if matches!(collection, Collection::Review | Collection::SimilarLink) {
                barrier.wait().await;
            }
        }
        if self.panic_on == Some(collection) {
            panic!("injected panic in {collection}");
        }
        if self.fail == Some(collection) {
            return Err(StoreError::DuplicateKey {
                relation: collection.table(),
                key: "injected".into(),
            });
        }
        Ok(())
    }

    fn commit(state: &mut State, collection: Collection, rows: usize) -> u64 {
        state.events.push(Event::Commit(collection));
        rows as u64
    }
}

fn missing(collection: Collection, key: &str) -> StoreError {
    StoreError::MissingReference {
        relation: collection.table(),
        key: key.to_string(),
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_products(&self, rows: &[Product]) -> Result<u64, StoreError> {
        self.begin(Collection::Product).await?;
        let mut state = self.state.lock().unwrap();
        if let Some(dup) = rows.iter().find(|p| state.products.contains(&p.asin)) {
            return Err(StoreError::DuplicateKey {
                relation: "product",
                key: dup.asin.clone(),
            });
        }
        state.products.extend(rows.iter().map(|p| p.asin.clone()));
        Ok(Self::commit(&mut state, Collection::Product, rows.len()))
    }

    async fn insert_categories(&self, rows: &[Category]) -> Result<u64, StoreError> {
        self.begin(Collection::Category).await?;
        let mut state = self.state.lock().unwrap();
        if let Some(dup) = rows.iter().find(|c| state.categories.contains(&c.id)) {
            return Err(StoreError::DuplicateKey {
                relation: "category",
                key: dup.id.to_string(),
            });
        }
        state.categories.extend(rows.iter().map(|c| c.id));
        Ok(Self::commit(&mut state, Collection::Category, rows.len()))
    }

    async fn insert_product_categories(
        &self,
        rows: &[ProductCategory],
    ) -> Result<u64, StoreError> {
        self.begin(Collection::ProductCategory).await?;
        let mut state = self.state.lock().unwrap();
        for link in rows {
            if !state.products.contains(&link.product_asin) {
                return Err(missing(Collection::ProductCategory, &link.product_asin));
            }
            if !state.categories.contains(&link.category_id) {
                return Err(missing(
                    Collection::ProductCategory,
                    &link.category_id.to_string(),
                ));
            }
        }
        state.product_categories.extend(
            rows.iter()
                .map(|l| (l.product_asin.clone(), l.category_id)),
        );
        Ok(Self::commit(&mut state, Collection::ProductCategory, rows.len()))
    }

    async fn insert_similar(&self, rows: &[SimilarLink]) -> Result<u64, StoreError> {
        self.begin(Collection::SimilarLink).await?;
        let mut state = self.state.lock().unwrap();
        if let Some(link) = rows
            .iter()
            .find(|l| !state.products.contains(&l.product_asin))
        {
            return Err(missing(Collection::SimilarLink, &link.product_asin));
        }
        state.similar.extend(
            rows.iter()
                .map(|l| (l.product_asin.clone(), l.similar_asin.clone())),
        );
        Ok(Self::commit(&mut state, Collection::SimilarLink, rows.len()))
    }

    async fn insert_reviews(&self, rows: &[Review]) -> Result<u64, StoreError> {
        self.begin(Collection::Review).await?;
        let mut state = self.state.lock().unwrap();
        if let Some(review) = rows
            .iter()
            .find(|r| !state.products.contains(&r.product_asin))
        {
            return Err(missing(Collection::Review, &review.product_asin));
        }
        state.reviews.extend_from_slice(rows);
        Ok(Self::commit(&mut state, Collection::Review, rows.len()))
    }
}

/// Two blocks in the dump's own layout, plus the preamble the real file starts with.
fn sample_dump() -> &'static str {
    "# Full information about Amazon Share the Love products
Total items: 2

Id:   1
ASIN: P1
  title: Patterns of Preaching: A Sermon Sampler
  group: Book
  salesrank: 396585
  similar: 2  Q1  Q2
  categories: 1
   |Books[283155]|Subjects[1000]|Religion & Spirituality[22]
  reviews: total: 0  downloaded: 0  avg rating: 0

Id:   2
ASIN: P2
  title: Candlemas: Feast of Flames
  group: Book
  salesrank: 168596
  similar: 0
  categories: 0
  reviews: total: 1  downloaded: 1  avg rating: 5
    2001-3-5  cutoff: cust1  rating: 5  votes:  10  helpful:   7
"
}

fn sample_catalog() -> Catalog {
    parse_reader(Cursor::new(sample_dump())).unwrap()
}

fn assert_barrier(events: &[Event]) {
    let product_commit = events
        .iter()
        .position(|e| *e == Event::Commit(Collection::Product))
        .expect("products never committed");
    for (i, event) in events.iter().enumerate() {
        if let Event::Begin(collection) = event {
            if *collection != Collection::Product {
                assert!(
                    i > product_commit,
                    "{collection} began before products committed: {events:?}"
                );
            }
        }
    }
}

#[test]
fn sample_dump_parses_into_five_collections() {
    let catalog = sample_catalog();

    assert_eq!(catalog.products.len(), 2);
    assert_eq!(
        catalog.products[0],
        Product {
            asin: "P1".into(),
            title: Some("Patterns of Preaching: A Sermon Sampler".into()),
            group: Some("Book".into()),
            salesrank: Some(396585),
        }
    );
    assert_eq!(catalog.similar.len(), 2);
    assert_eq!(catalog.categories.len(), 3);
    assert_eq!(catalog.product_categories.len(), 3);
    assert_eq!(
        catalog.reviews,
        vec![Review {
            product_asin: "P2".into(),
            date: NaiveDate::from_ymd_opt(2001, 3, 5).unwrap(),
            customer_id: "cust1".into(),
            rating: 5,
            votes: 10,
            helpful: 7,
        }]
    );
    // the preamble block has no ASIN
    assert_eq!(catalog.stats.blocks_without_identifier, 1);
    assert_eq!(catalog.stats.dropped(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn end_to_end_load_into_empty_store() {
    let store = Arc::new(MemoryStore::new());
    let report = load_catalog(Arc::clone(&store), sample_catalog()).await;

    assert!(report.is_success(), "{:?}", report.summary());
    assert_eq!(store.count(Collection::Product), 2);
    assert_eq!(store.count(Collection::SimilarLink), 2);
    assert!(store.count(Collection::Category) <= 3);
    assert_eq!(store.count(Collection::ProductCategory), 3);
    assert_eq!(store.count(Collection::Review), 1);

    assert_eq!(report.rows(Collection::Product), Some(2));
    assert_eq!(report.rows(Collection::Review), Some(1));
    assert_barrier(&store.events());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn categories_commit_before_links() {
    let store = Arc::new(MemoryStore::new());
    load_catalog(Arc::clone(&store), sample_catalog()).await;

    let events = store.events();
    let category_commit = events
        .iter()
        .position(|e| *e == Event::Commit(Collection::Category))
        .unwrap();
    let links_begin = events
        .iter()
        .position(|e| *e == Event::Begin(Collection::ProductCategory))
        .unwrap();
    assert!(category_commit < links_begin);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reviews_and_similar_run_concurrently() {
    let store = Arc::new(MemoryStore {
        rendezvous: Some(Barrier::new(2)),
        ..MemoryStore::default()
    });

    // Each branch waits for the other inside its insert; a sequential loader
    // would never get past the first one.
    let report = tokio::time::timeout(
        Duration::from_secs(10),
        load_catalog(Arc::clone(&store), sample_catalog()),
    )
    .await
    .expect("review and similar branches did not overlap");

    assert!(report.is_success());
}

#[tokio::test]
async fn dangling_similar_targets_do_not_block_load() {
    let catalog = parse_reader(Cursor::new("ASIN: X\nsimilar: 3 A B C\n")).unwrap();
    let store = Arc::new(MemoryStore::new());
    let report = load_catalog(Arc::clone(&store), catalog).await;

    assert!(report.is_success());
    assert_eq!(store.count(Collection::Product), 1);
    assert_eq!(store.count(Collection::SimilarLink), 3);
}

#[tokio::test]
async fn product_failure_skips_every_dependent() {
    let store = Arc::new(MemoryStore::failing(Collection::Product));
    let report = load_catalog(Arc::clone(&store), sample_catalog()).await;

    assert!(matches!(
        report.outcome(Collection::Product),
        Some(Outcome::Failed(LoadError::Insert {
            collection: Collection::Product,
            source: StoreError::DuplicateKey { .. },
        }))
    ));
    for collection in [
        Collection::Category,
        Collection::ProductCategory,
        Collection::SimilarLink,
        Collection::Review,
    ] {
        assert!(matches!(
            report.outcome(collection),
            Some(Outcome::Skipped {
                blocked_by: Collection::Product
            })
        ));
    }
    assert_eq!(store.events(), vec![Event::Begin(Collection::Product)]);
}

#[tokio::test]
async fn category_failure_only_blocks_links() {
    let store = Arc::new(MemoryStore::failing(Collection::Category));
    let report = load_catalog(Arc::clone(&store), sample_catalog()).await;

    assert!(matches!(
        report.outcome(Collection::Category),
        Some(Outcome::Failed(_))
    ));
    assert!(matches!(
        report.outcome(Collection::ProductCategory),
        Some(Outcome::Skipped {
            blocked_by: Collection::Category
        })
    ));
    assert_eq!(report.rows(Collection::SimilarLink), Some(2));
    assert_eq!(report.rows(Collection::Review), Some(1));
    assert_eq!(store.count(Collection::Review), 1);

    let msg = report.ensure_success().unwrap_err().to_string();
    assert!(msg.contains("categories"));
}

#[tokio::test]
async fn review_for_unknown_product_fails_its_branch_only() {
    let mut catalog = sample_catalog();
    catalog.reviews.push(Review {
        product_asin: "GHOST".into(),
        date: NaiveDate::from_ymd_opt(2002, 1, 1).unwrap(),
        customer_id: "c".into(),
        rating: 1,
        votes: 0,
        helpful: 0,
    });

    let store = Arc::new(MemoryStore::new());
    let report = load_catalog(Arc::clone(&store), catalog).await;

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].collection(), Collection::Review);
    assert!(matches!(
        failures[0],
        LoadError::Insert {
            source: StoreError::MissingReference { key, .. },
            ..
        } if key == "GHOST"
    ));

    // siblings stay committed
    assert_eq!(store.count(Collection::Product), 2);
    assert_eq!(store.count(Collection::SimilarLink), 2);
    assert_eq!(store.count(Collection::ProductCategory), 3);
    assert_eq!(store.count(Collection::Review), 0);
}

#[tokio::test]
async fn reloading_into_populated_store_reports_duplicates() {
    let store = Arc::new(MemoryStore::new());
    assert!(load_catalog(Arc::clone(&store), sample_catalog())
        .await
        .is_success());

    let report = load_catalog(Arc::clone(&store), sample_catalog()).await;
    assert!(!report.is_success());
    let summary = report.summary();
    assert_eq!(summary[0].status, "failed");
    assert!(summary[0].error.as_deref().unwrap().contains("duplicate key P1"));
    assert!(summary[1..].iter().all(|p| p.status == "skipped"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_branch_is_reported_as_task_failure() {
    let store = Arc::new(MemoryStore {
        panic_on: Some(Collection::SimilarLink),
        ..MemoryStore::default()
    });
    let report = load_catalog(Arc::clone(&store), sample_catalog()).await;

    assert!(matches!(
        report.outcome(Collection::SimilarLink),
        Some(Outcome::Failed(LoadError::Task {
            collection: Collection::SimilarLink,
            ..
        }))
    ));
    assert_eq!(report.rows(Collection::Review), Some(1));
    assert_eq!(report.rows(Collection::ProductCategory), Some(3));
}

#[tokio::test]
async fn empty_catalog_loads_nothing() {
    let store = Arc::new(MemoryStore::new());
    let report = load_catalog(Arc::clone(&store), Catalog::default()).await;

    assert!(report.is_success());
    for collection in Collection::ALL {
        assert_eq!(report.rows(collection), Some(0));
    }
}

fn temp_with_suffix(suffix: &str, bytes: &[u8]) -> NamedTempFile {
    let mut tmp = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    tmp.write_all(bytes).unwrap();
    tmp.flush().unwrap();
    tmp
}

#[test]
fn parse_file_reads_plain_dump() {
    let tmp = temp_with_suffix(".txt", sample_dump().as_bytes());
    let catalog = parse_file(tmp.path()).unwrap();
    assert_eq!(catalog.products.len(), 2);
    assert_eq!(catalog.reviews.len(), 1);
}

#[test]
fn parse_file_decompresses_gzip() {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(sample_dump().as_bytes()).unwrap();
    let tmp = temp_with_suffix(".gz", &encoder.finish().unwrap());

    let catalog = parse_file(tmp.path()).unwrap();
    assert_eq!(catalog.products.len(), 2);
    assert_eq!(catalog.product_categories.len(), 3);
}

#[test]
fn parse_file_decompresses_bzip2() {
    let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    encoder.write_all(sample_dump().as_bytes()).unwrap();
    let tmp = temp_with_suffix(".bz2", &encoder.finish().unwrap());

    let catalog = parse_file(tmp.path()).unwrap();
    assert_eq!(catalog.products.len(), 2);
    assert_eq!(catalog.similar.len(), 2);
}

#[test]
fn corrupt_gzip_is_a_read_failure() {
    let tmp = temp_with_suffix(".gz", b"this is not gzip data");
    let err = parse_file(tmp.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read"));
}

#[test]
fn missing_dump_is_fatal() {
    let err = parse_file("/nonexistent/amazon-meta.txt").unwrap_err();
    assert!(err.to_string().contains("Failed to open catalog dump"));
}
