use crate::stats::ParseStats;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// One catalog entry. Only the projected fields survive parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub asin: String,
    pub title: Option<String>,
    pub group: Option<String>,
    pub salesrank: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Category {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProductCategory {
    pub product_asin: String,
    pub category_id: i32,
}

/// Directed "customers also bought" edge. The target may be absent from the dump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SimilarLink {
    pub product_asin: String,
    pub similar_asin: String,
}

/// A customer review. The row id is generated by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub product_asin: String,
    pub date: NaiveDate,
    pub customer_id: String,
    pub rating: i32,
    pub votes: i32,
    pub helpful: i32,
}

/// The five collections produced by one parse, handed by value to the loader.
#[derive(Debug, Default)]
pub struct Catalog {
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
    pub product_categories: Vec<ProductCategory>,
    pub similar: Vec<SimilarLink>,
    pub reviews: Vec<Review>,
    pub stats: ParseStats,
}

/// Relations written by the loader, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Collection {
    Product,
    Category,
    ProductCategory,
    SimilarLink,
    Review,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Product,
        Collection::Category,
        Collection::ProductCategory,
        Collection::SimilarLink,
        Collection::Review,
    ];

    /// Name of the backing table
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Product => "product",
            Collection::Category => "category",
            Collection::ProductCategory => "product_category",
            Collection::SimilarLink => "similar_product",
            Collection::Review => "review",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Product => "products",
            Collection::Category => "categories",
            Collection::ProductCategory => "product-category links",
            Collection::SimilarLink => "similar links",
            Collection::Review => "reviews",
        };
        f.write_str(name)
    }
}
