use crate::config::{IDENTIFIER_KEY, PROGRESS_INTERVAL, READ_BUFFER_SIZE};
use crate::grammar::{
    normalize_line, parse_category_path, parse_header, parse_review, similar_targets, ReviewLine,
};
use crate::models::{Catalog, Category, Product, ProductCategory, Review, SimilarLink};
use crate::stats::ParseStats;
use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use indicatif::ProgressBar;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::mem;
use std::path::Path;
use tracing::{debug, info};

/// Which multi-line section continuation lines belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Section {
    #[default]
    None,
    Categories,
    Reviews,
}

/// Everything collected for the product currently being read.
///
/// Derived entities wait here until the block closes, so they always attach to
/// the block's final identifier.
#[derive(Debug, Default)]
struct Block {
    started: bool,
    asin: Option<String>,
    title: Option<String>,
    group: Option<String>,
    salesrank: Option<i32>,
    similar: Vec<String>,
    categories: Vec<Category>,
    reviews: Vec<ReviewLine>,
}

/// Streaming state machine turning dump lines into a [`Catalog`].
#[derive(Default)]
pub struct CatalogParser {
    section: Section,
    block: Block,
    products: Vec<Product>,
    product_index: FxHashMap<String, usize>,
    categories: Vec<Category>,
    category_ids: FxHashSet<i32>,
    product_categories: Vec<ProductCategory>,
    product_category_set: FxHashSet<ProductCategory>,
    similar: Vec<SimilarLink>,
    similar_set: FxHashSet<SimilarLink>,
    reviews: Vec<Review>,
    stats: ParseStats,
}

impl CatalogParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Consumes one physical line (with or without its terminator).
    pub fn feed_line(&mut self, raw: &str) {
        self.stats.inc_lines();
        let line = normalize_line(raw);

        if line.is_empty() {
            self.flush_block();
            return;
        }
        self.block.started = true;

        if let Some((key, value)) = parse_header(&line) {
            self.section = Section::None;
            self.apply_attribute(&key, value);
            return;
        }

        match self.section {
            Section::Categories => {
                let (categories, malformed) = parse_category_path(&line);
                if malformed > 0 {
                    debug!(malformed, line = %line, "Ignoring malformed category segments");
                    self.stats.add_malformed_categories(malformed);
                }
                self.block.categories.extend(categories);
            }
            Section::Reviews => match parse_review(&line) {
                Some(review) => self.block.reviews.push(review),
                None => {
                    debug!(line = %line, "Dropping malformed review line");
                    self.stats.inc_malformed_reviews();
                }
            },
            Section::None => {}
        }
    }

    fn apply_attribute(&mut self, key: &str, value: &str) {
        match key {
            IDENTIFIER_KEY => self.block.asin = Some(value.to_string()),
            "title" => self.block.title = Some(value.to_string()),
            "group" => self.block.group = Some(value.to_string()),
            "salesrank" => self.block.salesrank = value.parse().ok(),
            "similar" => self
                .block
                .similar
                .extend(similar_targets(value).map(str::to_string)),
            "categories" => self.section = Section::Categories,
            "reviews" => self.section = Section::Reviews,
            _ => {}
        }
    }

    /// Closes the pending block. A block without an identifier is discarded
    /// together with everything derived from it.
    fn flush_block(&mut self) {
        self.section = Section::None;
        let block = mem::take(&mut self.block);
        if !block.started {
            return;
        }
        self.stats.inc_blocks();

        let Some(asin) = block.asin else {
            debug!(
                similar = block.similar.len(),
                categories = block.categories.len(),
                reviews = block.reviews.len(),
                "Discarding block without identifier"
            );
            self.stats.inc_anonymous_blocks();
            return;
        };

        let product = Product {
            asin: asin.clone(),
            title: block.title,
            group: block.group,
            salesrank: block.salesrank,
        };

        match self.product_index.get(&asin) {
            Some(&pos) => {
                debug!(asin = %asin, "Duplicate product block replaces earlier one");
                self.stats.inc_duplicates();
                self.forget_derived(&asin);
                self.products[pos] = product;
            }
            None => {
                self.product_index.insert(asin.clone(), self.products.len());
                self.products.push(product);
            }
        }
        self.stats.inc_products();

        for category in block.categories {
            let link = ProductCategory {
                product_asin: asin.clone(),
                category_id: category.id,
            };
            if self.category_ids.insert(category.id) {
                self.categories.push(category);
            }
            if self.product_category_set.insert(link.clone()) {
                self.product_categories.push(link);
            }
        }

        for target in block.similar {
            let link = SimilarLink {
                product_asin: asin.clone(),
                similar_asin: target,
            };
            if self.similar_set.insert(link.clone()) {
                self.similar.push(link);
            }
        }

        self.reviews
            .extend(block.reviews.into_iter().map(|r| Review {
                product_asin: asin.clone(),
                date: r.date,
                customer_id: r.customer_id,
                rating: r.rating,
                votes: r.votes,
                helpful: r.helpful,
            }));
    }

    /// Drops links and reviews emitted by an earlier block for `asin`.
    fn forget_derived(&mut self, asin: &str) {
        self.product_categories.retain(|l| l.product_asin != asin);
        self.product_category_set.retain(|l| l.product_asin != asin);
        self.similar.retain(|l| l.product_asin != asin);
        self.similar_set.retain(|l| l.product_asin != asin);
        self.reviews.retain(|r| r.product_asin != asin);
    }

    /// Flushes the pending block and hands over the collections.
    pub fn finish(mut self) -> Catalog {
        self.flush_block();
        Catalog {
            products: self.products,
            categories: self.categories,
            product_categories: self.product_categories,
            similar: self.similar,
            reviews: self.reviews,
            stats: self.stats,
        }
    }
}

/// Opens a dump, decompressing `.gz` and `.bz2` inputs on the fly.
pub fn open_dump(path: impl AsRef<Path>) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open catalog dump: {}", path.display()))?;

    let reader: Box<dyn BufRead + Send> = match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            MultiGzDecoder::new(file),
        )),
        Some("bz2") => Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            BzDecoder::new(file),
        )),
        _ => Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file)),
    };
    Ok(reader)
}

/// Parses a whole stream. Only read errors are fatal; bytes that are not
/// valid UTF-8 are replaced rather than rejected.
pub fn parse_reader<R: BufRead>(reader: R) -> Result<Catalog> {
    parse_with_progress(reader, &ProgressBar::hidden())
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<Catalog> {
    let path = path.as_ref();
    let reader = open_dump(path)?;
    info!("Parsing catalog dump: {}", path.display());

    let pb = ProgressBar::new_spinner();
    let catalog = parse_with_progress(reader, &pb)
        .with_context(|| format!("Failed to read catalog dump: {}", path.display()))?;
    pb.finish_and_clear();

    info!(
        products = catalog.products.len(),
        categories = catalog.categories.len(),
        product_categories = catalog.product_categories.len(),
        similar = catalog.similar.len(),
        reviews = catalog.reviews.len(),
        dropped = catalog.stats.dropped(),
        "Parse complete"
    );
    Ok(catalog)
}

fn parse_with_progress<R: BufRead>(mut reader: R, pb: &ProgressBar) -> Result<Catalog> {
    let mut parser = CatalogParser::new();
    let mut buf = Vec::with_capacity(1024);

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("Failed to read line from catalog dump")?;
        if read == 0 {
            break;
        }
        parser.feed_line(&String::from_utf8_lossy(&buf));

        let lines = parser.stats().lines_read;
        if lines % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!("{lines} lines"));
            pb.tick();
        }
    }

    Ok(parser.finish())
}
