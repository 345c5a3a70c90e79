use crate::config::CSV_BUFFER_SIZE;
use crate::models::Catalog;
use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

pub const PRODUCTS_CSV: &str = "products.csv";
pub const CATEGORIES_CSV: &str = "categories.csv";
pub const PRODUCT_CATEGORIES_CSV: &str = "product_categories.csv";
pub const SIMILAR_CSV: &str = "similar.csv";
pub const REVIEWS_CSV: &str = "reviews.csv";

/// Writes each parsed collection to its own CSV file under `output_dir`.
///
/// Absent optional fields become empty cells.
pub fn write_csvs(catalog: &Catalog, output_dir: impl AsRef<Path>) -> Result<()> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    write_collection(
        output_dir,
        PRODUCTS_CSV,
        &["asin", "title", "group", "salesrank"],
        &catalog.products,
    )?;
    write_collection(
        output_dir,
        CATEGORIES_CSV,
        &["id", "name"],
        &catalog.categories,
    )?;
    write_collection(
        output_dir,
        PRODUCT_CATEGORIES_CSV,
        &["product_asin", "category_id"],
        &catalog.product_categories,
    )?;
    write_collection(
        output_dir,
        SIMILAR_CSV,
        &["product_asin", "similar_asin"],
        &catalog.similar,
    )?;
    write_collection(
        output_dir,
        REVIEWS_CSV,
        &["product_asin", "date", "customer_id", "rating", "votes", "helpful"],
        &catalog.reviews,
    )?;

    info!(dir = %output_dir.display(), "CSV export complete");
    Ok(())
}

fn write_collection<T: Serialize>(
    output_dir: &Path,
    file_name: &str,
    header: &[&str],
    rows: &[T],
) -> Result<()> {
    let path = output_dir.join(file_name);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    // Header is written by hand so that empty collections still get one.
    let mut writer: Writer<BufWriter<File>> = WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::with_capacity(CSV_BUFFER_SIZE, file));
    writer.write_record(header)?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}
