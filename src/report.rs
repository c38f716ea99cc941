//! Aggregates over cleaned listings, printed as plain text tables.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::cleaning::{Table, CITY_COLUMN, PRICE_COLUMN};

pub const UNKNOWN_CATEGORY: &str = "Inconnu";
pub const UNKNOWN_CITY: &str = "N/A";

/// Upper bounds and labels of the fixed price ranges, in CFA
const PRICE_RANGES: [(i64, &str); 6] = [
    (50_000, "<=50k"),
    (100_000, "50-100k"),
    (200_000, "100-200k"),
    (300_000, "200-300k"),
    (500_000, "300-500k"),
    (1_000_000, "500k-1M"),
];
const TOP_RANGE: &str = ">1M";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub low: i64,
    pub high: i64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub rows: usize,
    pub priced: usize,
    pub histogram: Vec<Bucket>,
    pub median_by_category: Vec<(String, Option<f64>)>,
    pub top_cities: Vec<(String, usize)>,
    pub price_ranges: Vec<(&'static str, usize)>,
}

impl Report {
    pub fn from_table(table: &Table, top_n: usize) -> Self {
        let prices: Vec<Option<i64>> = match table.column_index(PRICE_COLUMN) {
            Some(col) => table
                .column(col)
                .map(|cell| cell.and_then(|v| v.trim().parse().ok()))
                .collect(),
            None => vec![None; table.len()],
        };
        let categories: Vec<Option<&str>> = match table.column_index("category") {
            Some(col) => table.column(col).collect(),
            None => vec![None; table.len()],
        };
        let cities: Vec<Option<&str>> = match table.column_index(CITY_COLUMN) {
            Some(col) => table.column(col).collect(),
            None => vec![None; table.len()],
        };

        let known: Vec<i64> = prices.iter().flatten().copied().collect();
        Self {
            rows: table.len(),
            priced: known.len(),
            histogram: histogram(&known, 40),
            median_by_category: median_by_category(&categories, &prices),
            top_cities: top_cities(&cities, top_n),
            price_ranges: price_ranges(&known),
        }
    }
}

/// Equal-width buckets spanning the observed prices. Bounds are computed
/// in `i128` and saturate at the `i64` range.
pub fn histogram(prices: &[i64], bins: usize) -> Vec<Bucket> {
    let (Some(&min), Some(&max)) = (prices.iter().min(), prices.iter().max()) else {
        return Vec::new();
    };
    let bins = bins.max(1) as i128;
    let (min, max) = (min as i128, max as i128);
    let width = (max - min) / bins + 1;
    let bound = |i: i128| -> i64 {
        (min + i * width).clamp(i64::MIN as i128, i64::MAX as i128) as i64
    };
    let mut buckets: Vec<Bucket> = (0..bins)
        .map(|i| Bucket {
            low: bound(i),
            high: bound(i + 1),
            count: 0,
        })
        .collect();
    for &price in prices {
        let index = (((price as i128 - min) / width) as usize).min(buckets.len() - 1);
        buckets[index].count += 1;
    }
    while buckets.last().is_some_and(|b| b.count == 0) {
        buckets.pop();
    }
    buckets
}

pub fn median(values: &mut [i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] as f64 + values[mid] as f64) / 2.0
    } else {
        values[mid] as f64
    })
}

/// Median price per category, highest first; categories without prices last
pub fn median_by_category(
    categories: &[Option<&str>],
    prices: &[Option<i64>],
) -> Vec<(String, Option<f64>)> {
    let mut groups: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for (category, price) in categories.iter().zip(prices) {
        let entry = groups
            .entry(category.unwrap_or(UNKNOWN_CATEGORY).to_string())
            .or_default();
        if let Some(price) = price {
            entry.push(*price);
        }
    }
    let mut medians: Vec<(String, Option<f64>)> = groups
        .into_iter()
        .map(|(category, mut values)| (category, median(&mut values)))
        .collect();
    medians.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    medians
}

/// Most frequent cities, null counted as `N/A`
pub fn top_cities(cities: &[Option<&str>], n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for city in cities {
        *counts.entry(city.unwrap_or(UNKNOWN_CITY)).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(city, count)| (city.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

/// Counts per fixed price range, every range present
pub fn price_ranges(prices: &[i64]) -> Vec<(&'static str, usize)> {
    let mut counts: Vec<(&'static str, usize)> = PRICE_RANGES
        .iter()
        .map(|(_, label)| (*label, 0))
        .chain(std::iter::once((TOP_RANGE, 0)))
        .collect();
    for price in prices {
        let index = PRICE_RANGES
            .iter()
            .position(|(upper, _)| price <= upper)
            .unwrap_or(PRICE_RANGES.len());
        counts[index].1 += 1;
    }
    counts
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Listings: {} ({} with a price)", self.rows, self.priced)?;

        writeln!(f, "\nPrice distribution (CFA)")?;
        for bucket in &self.histogram {
            writeln!(f, "  {:>10} - {:<10} {}", bucket.low, bucket.high, bucket.count)?;
        }

        writeln!(f, "\nMedian price by category (CFA)")?;
        for (category, median) in &self.median_by_category {
            match median {
                Some(m) => writeln!(f, "  {:<24} {:.0}", category, m)?,
                None => writeln!(f, "  {:<24} -", category)?,
            }
        }

        writeln!(f, "\nTop {} cities", self.top_cities.len())?;
        for (city, count) in &self.top_cities {
            writeln!(f, "  {:<24} {}", city, count)?;
        }

        writeln!(f, "\nPrice ranges (CFA)")?;
        for (label, count) in &self.price_ranges {
            writeln!(f, "  {:<10} {}", label, count)?;
        }
        Ok(())
    }
}
