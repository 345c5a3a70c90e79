use crate::models::{Catalog, Collection};
use crate::store::{CatalogStore, StoreError};
use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load {collection}")]
    Insert {
        collection: Collection,
        #[source]
        source: StoreError,
    },

    #[error("{collection} loader task did not complete")]
    Task {
        collection: Collection,
        #[source]
        source: JoinError,
    },
}

impl LoadError {
    pub fn collection(&self) -> Collection {
        match self {
            LoadError::Insert { collection, .. } | LoadError::Task { collection, .. } => {
                *collection
            }
        }
    }
}

/// What happened to one collection.
#[derive(Debug)]
pub enum Outcome {
    Loaded { rows: u64 },
    Failed(LoadError),
    /// Never attempted because a collection it depends on failed.
    Skipped { blocked_by: Collection },
}

impl Outcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Outcome::Loaded { .. })
    }
}

/// Serializable view of one [`Outcome`]
#[derive(Debug, Serialize)]
pub struct PhaseSummary {
    pub collection: Collection,
    pub status: &'static str,
    pub rows: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    outcomes: Vec<(Collection, Outcome)>,
    elapsed: Duration,
}

impl LoadReport {
    fn push(&mut self, collection: Collection, outcome: Outcome) {
        self.outcomes.push((collection, outcome));
    }

    /// Outcomes in dependency order
    pub fn outcomes(&self) -> impl Iterator<Item = (Collection, &Outcome)> {
        self.outcomes.iter().map(|(c, o)| (*c, o))
    }

    pub fn outcome(&self, collection: Collection) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(c, _)| *c == collection)
            .map(|(_, o)| o)
    }

    pub fn rows(&self, collection: Collection) -> Option<u64> {
        match self.outcome(collection)? {
            Outcome::Loaded { rows } => Some(*rows),
            _ => None,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &LoadError> {
        self.outcomes.iter().filter_map(|(_, o)| match o {
            Outcome::Failed(e) => Some(e),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.is_loaded())
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn summary(&self) -> Vec<PhaseSummary> {
        self.outcomes()
            .map(|(collection, outcome)| match outcome {
                Outcome::Loaded { rows } => PhaseSummary {
                    collection,
                    status: "loaded",
                    rows: Some(*rows),
                    error: None,
                },
                Outcome::Failed(e) => PhaseSummary {
                    collection,
                    status: "failed",
                    rows: None,
                    error: Some(error_chain(e)),
                },
                Outcome::Skipped { blocked_by } => PhaseSummary {
                    collection,
                    status: "skipped",
                    rows: None,
                    error: Some(format!("blocked by failed {blocked_by}")),
                },
            })
            .collect()
    }

    /// Fails naming every collection that did not load.
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        let failed: Vec<String> = self
            .outcomes
            .iter()
            .filter(|(_, o)| !o.is_loaded())
            .map(|(c, _)| c.to_string())
            .collect();
        bail!(
            "{} of {} collections did not load: {}",
            failed.len(),
            self.outcomes.len(),
            failed.join(", ")
        );
    }
}

/// Renders an error followed by its source chain, `: `-separated.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn outcome(collection: Collection, result: Result<u64, StoreError>, start: Instant) -> Outcome {
    match result {
        Ok(rows) => {
            info!(
                collection = %collection,
                rows,
                elapsed_secs = start.elapsed().as_secs_f64(),
                "Committed"
            );
            Outcome::Loaded { rows }
        }
        Err(source) => {
            warn!(collection = %collection, error = %source, "Bulk insert failed");
            Outcome::Failed(LoadError::Insert { collection, source })
        }
    }
}

fn joined(collection: Collection, result: Result<Outcome, JoinError>) -> Outcome {
    result.unwrap_or_else(|source| {
        warn!(collection = %collection, error = %source, "Loader task aborted");
        Outcome::Failed(LoadError::Task { collection, source })
    })
}

/// Writes a parsed catalog to `store` respecting foreign-key order.
///
/// Products are committed first. Once that barrier holds, reviews, similar
/// links and the category -> product-category chain run as three independent
/// tasks. Failures are reported per collection; nothing already committed is
/// rolled back.
pub async fn load_catalog<S: CatalogStore>(store: Arc<S>, catalog: Catalog) -> LoadReport {
    let start = Instant::now();
    let Catalog {
        products,
        categories,
        product_categories,
        similar,
        reviews,
        ..
    } = catalog;
    let mut report = LoadReport::default();

    info!(rows = products.len(), "Loading products");
    let step = Instant::now();
    let products_outcome = outcome(
        Collection::Product,
        store.insert_products(&products).await,
        step,
    );
    drop(products);

    let barrier_held = products_outcome.is_loaded();
    report.push(Collection::Product, products_outcome);
    if !barrier_held {
        warn!("Product load failed, skipping dependent collections");
        for collection in [
            Collection::Category,
            Collection::ProductCategory,
            Collection::SimilarLink,
            Collection::Review,
        ] {
            report.push(
                collection,
                Outcome::Skipped {
                    blocked_by: Collection::Product,
                },
            );
        }
        report.elapsed = start.elapsed();
        return report;
    }

    let review_task = tokio::spawn({
        let store = Arc::clone(&store);
        async move {
            info!(rows = reviews.len(), "Loading reviews");
            let step = Instant::now();
            outcome(Collection::Review, store.insert_reviews(&reviews).await, step)
        }
    });

    let similar_task = tokio::spawn({
        let store = Arc::clone(&store);
        async move {
            info!(rows = similar.len(), "Loading similar links");
            let step = Instant::now();
            outcome(
                Collection::SimilarLink,
                store.insert_similar(&similar).await,
                step,
            )
        }
    });

    let category_task = tokio::spawn({
        let store = Arc::clone(&store);
        async move {
            info!(rows = categories.len(), "Loading categories");
            let step = Instant::now();
            let categories_outcome = outcome(
                Collection::Category,
                store.insert_categories(&categories).await,
                step,
            );
            if !categories_outcome.is_loaded() {
                return (
                    categories_outcome,
                    Outcome::Skipped {
                        blocked_by: Collection::Category,
                    },
                );
            }

            info!(rows = product_categories.len(), "Loading product-category links");
            let step = Instant::now();
            let links_outcome = outcome(
                Collection::ProductCategory,
                store.insert_product_categories(&product_categories).await,
                step,
            );
            (categories_outcome, links_outcome)
        }
    });

    let (category_join, similar_join, review_join) =
        tokio::join!(category_task, similar_task, review_task);

    match category_join {
        Ok((categories_outcome, links_outcome)) => {
            report.push(Collection::Category, categories_outcome);
            report.push(Collection::ProductCategory, links_outcome);
        }
        Err(source) => {
            warn!(error = %source, "Category loader task aborted");
            report.push(
                Collection::Category,
                Outcome::Failed(LoadError::Task {
                    collection: Collection::Category,
                    source,
                }),
            );
            report.push(
                Collection::ProductCategory,
                Outcome::Skipped {
                    blocked_by: Collection::Category,
                },
            );
        }
    }
    report.push(
        Collection::SimilarLink,
        joined(Collection::SimilarLink, similar_join),
    );
    report.push(Collection::Review, joined(Collection::Review, review_join));

    report.elapsed = start.elapsed();
    report
}
