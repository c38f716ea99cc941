//! Cleaning pass: raw text columns to typed columns.
//!
//! Column lookup goes through alias lists so tables produced by different
//! scrapers (`title` vs `nom`, `price_raw` vs `prix`) clean the same way.
//! Every function here is total and deterministic, and cleaning an already
//! cleaned table yields the same table.

pub mod table;

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::models::StoredListing;
pub use table::Table;

pub const PRICE_ALIASES: [&str; 4] = ["price_cfa", "price", "prix", "price_raw"];
pub const ADDRESS_ALIASES: [&str; 5] = [
    "address_raw",
    "adresse",
    "address",
    "location",
    "ad__card-location",
];
pub const TITLE_ALIASES: [&str; 6] = [
    "title",
    "nom",
    "name",
    "details",
    "detail",
    "ad__card-description",
];

/// Separators tried in order when cutting the city out of an address
pub const CITY_SEPARATORS: [char; 5] = ['•', '-', ' ', ',', '/'];

pub const PRICE_COLUMN: &str = "price_cfa";
pub const CITY_COLUMN: &str = "city";
pub const TITLE_LEN_COLUMN: &str = "title_len";

fn price_digits() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d[\d\s.,]*").expect("valid price regex"))
}

/// Options for [`clean`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CleanOptions {
    /// Minimum share of non-null cells a row needs to be kept, 0 disables
    pub drop_threshold: f64,
    /// Remove exact duplicate rows
    pub dedupe: bool,
}

/// First run of digits as an integer, ignoring spaces and thousands
/// separators. `"125 000 FCFA"` gives `125000`.
pub fn parse_price(text: &str) -> Option<i64> {
    let token = price_digits().find(text)?;
    let digits: String = token
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Leading token of an address, cut at the first separator present.
/// `"Dakar - Liberté 6"` gives `"Dakar"`.
pub fn extract_city(address: &str) -> Option<String> {
    let address = address.trim();
    let city = CITY_SEPARATORS
        .iter()
        .find(|sep| address.contains(**sep))
        .and_then(|sep| address.split(*sep).next())
        .unwrap_or(address)
        .trim();
    (!city.is_empty()).then(|| city.to_string())
}

pub fn title_len(title: Option<&str>) -> usize {
    title.map_or(0, |t| t.chars().count())
}

/// Add `price_cfa`, `city` and `title_len` to a raw table, then optionally
/// dedupe and drop sparse rows.
pub fn clean(raw: &Table, options: CleanOptions) -> Table {
    let mut table = raw.clone();

    let prices: Vec<Option<String>> = match table.find_column(&PRICE_ALIASES) {
        Some(col) => table
            .column(col)
            .map(|cell| cell.and_then(parse_price).map(|p| p.to_string()))
            .collect(),
        None => vec![None; table.len()],
    };
    table.set_column(PRICE_COLUMN, prices);

    let cities: Vec<Option<String>> = match table.find_column(&ADDRESS_ALIASES) {
        Some(col) => table
            .column(col)
            .map(|cell| cell.and_then(extract_city))
            .collect(),
        None => vec![None; table.len()],
    };
    table.set_column(CITY_COLUMN, cities);

    let lengths: Vec<Option<String>> = match table.find_column(&TITLE_ALIASES) {
        Some(col) => table
            .column(col)
            .map(|cell| Some(title_len(cell).to_string()))
            .collect(),
        None => vec![Some("0".to_string()); table.len()],
    };
    table.set_column(TITLE_LEN_COLUMN, lengths);

    if options.dedupe {
        let mut seen = HashSet::new();
        table.rows.retain(|row| seen.insert(row.clone()));
    }

    if options.drop_threshold > 0.0 {
        let needed = (table.headers.len() as f64 * options.drop_threshold) as usize;
        table
            .rows
            .retain(|row| row.iter().filter(|cell| cell.is_some()).count() >= needed);
    }

    table
}

/// A stored listing with its derived analysis fields
#[derive(Debug, Clone, Serialize)]
pub struct CleanedListing {
    #[serde(flatten)]
    pub listing: StoredListing,
    pub price_cfa: Option<i64>,
    pub city: Option<String>,
    pub title_len: usize,
}

impl From<StoredListing> for CleanedListing {
    fn from(listing: StoredListing) -> Self {
        Self {
            price_cfa: listing.price_raw.as_deref().and_then(parse_price),
            city: listing.address_raw.as_deref().and_then(extract_city),
            title_len: title_len(listing.title.as_deref()),
            listing,
        }
    }
}
