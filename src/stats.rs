use serde::Serialize;

/// Counters collected while parsing a dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub lines_read: u64,
    pub blocks_closed: u64,
    pub products_emitted: u64,
    pub duplicate_products: u64,
    pub blocks_without_identifier: u64,
    pub malformed_categories: u64,
    pub malformed_reviews: u64,
}

impl ParseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_lines(&mut self) {
        self.lines_read += 1;
    }

    pub fn inc_blocks(&mut self) {
        self.blocks_closed += 1;
    }

    pub fn inc_products(&mut self) {
        self.products_emitted += 1;
    }

    pub fn inc_duplicates(&mut self) {
        self.duplicate_products += 1;
    }

    pub fn inc_anonymous_blocks(&mut self) {
        self.blocks_without_identifier += 1;
    }

    pub fn add_malformed_categories(&mut self, count: u64) {
        self.malformed_categories += count;
    }

    pub fn inc_malformed_reviews(&mut self) {
        self.malformed_reviews += 1;
    }

    /// Continuation lines (or segments) that were dropped
    pub fn dropped(&self) -> u64 {
        self.malformed_categories + self.malformed_reviews
    }
}
