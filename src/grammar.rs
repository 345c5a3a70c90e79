//! Line-level grammar of the catalog dump.
//!
//! Every matcher here expects a line that already went through [`normalize_line`];
//! the patterns assume single spaces and no surrounding whitespace.

use crate::models::Category;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static HEADER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+):\s*(.+)$").unwrap());

static CATEGORY_SEGMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)\[(\d+)\]$").unwrap());

static REVIEW_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2}) \w+: (\w+) \w+: (\w+) \w+: (\w+) \w+: (\w+)$")
        .unwrap()
});

/// A review continuation line, before it is attached to its product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewLine {
    pub date: NaiveDate,
    pub customer_id: String,
    pub rating: i32,
    pub votes: i32,
    pub helpful: i32,
}

/// Collapses whitespace runs to one space and trims both ends.
pub fn normalize_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for word in line.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Splits a `key: value` line. The key comes back lower-cased.
pub fn parse_header(line: &str) -> Option<(String, &str)> {
    let caps = HEADER_REGEX.captures(line)?;
    let key = caps.get(1)?.as_str().to_ascii_lowercase();
    let value = caps.get(2)?.as_str();
    Some((key, value))
}

/// Targets of a `similar` value (`<count> <asin> <asin> ...`); the count is skipped.
pub fn similar_targets(value: &str) -> impl Iterator<Item = &str> {
    value.split_whitespace().skip(1)
}

/// Parses a category path such as `|Books[283155]|Subjects[1000]`.
///
/// Returns the categories found and the number of segments that did not match
/// `name[id]`. Text before the first `|` is not a segment.
pub fn parse_category_path(line: &str) -> (Vec<Category>, u64) {
    let mut categories = Vec::new();
    let mut malformed = 0u64;

    for segment in line.split('|').skip(1) {
        match parse_category_segment(segment) {
            Some(category) => categories.push(category),
            None => malformed += 1,
        }
    }

    (categories, malformed)
}

fn parse_category_segment(segment: &str) -> Option<Category> {
    let caps = CATEGORY_SEGMENT_REGEX.captures(segment)?;
    let id = caps[2].parse::<i32>().ok()?;
    Some(Category {
        id,
        name: caps[1].to_string(),
    })
}

/// Parses `YYYY-M-D cutoff: <customer> cutoff: <rating> cutoff: <votes> cutoff: <helpful>`.
///
/// The labels between fields are not checked beyond being single words.
pub fn parse_review(line: &str) -> Option<ReviewLine> {
    let caps = REVIEW_REGEX.captures(line)?;

    let year = caps[1].parse::<i32>().ok()?;
    let month = caps[2].parse::<u32>().ok()?;
    let day = caps[3].parse::<u32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    Some(ReviewLine {
        date,
        customer_id: caps[4].to_string(),
        rating: caps[5].parse().ok()?,
        votes: caps[6].parse().ok()?,
        helpful: caps[7].parse().ok()?,
    })
}
