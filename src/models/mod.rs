use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScoutError;

/// Origin site of a listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Source {
    #[serde(rename = "coinafrique-sn")]
    CoinAfrique,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::CoinAfrique => "coinafrique-sn",
        }
    }
}

/// Animal categories listed on the marketplace
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Chiens,
    Moutons,
    #[serde(rename = "Poules-Lapins-Pigeons")]
    PoulesLapinsPigeons,
    #[serde(rename = "Autres animaux")]
    AutresAnimaux,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Chiens,
        Category::Moutons,
        Category::PoulesLapinsPigeons,
        Category::AutresAnimaux,
    ];

    /// Display label, also the value stored in the `category` column
    pub fn label(&self) -> &'static str {
        match self {
            Category::Chiens => "Chiens",
            Category::Moutons => "Moutons",
            Category::PoulesLapinsPigeons => "Poules-Lapins-Pigeons",
            Category::AutresAnimaux => "Autres animaux",
        }
    }

    /// Path of the category index on the marketplace host
    pub fn path(&self) -> &'static str {
        match self {
            Category::Chiens => "/categorie/chiens",
            Category::Moutons => "/categorie/moutons",
            Category::PoulesLapinsPigeons => "/categorie/poules-lapins-et-pigeons",
            Category::AutresAnimaux => "/categorie/autres-animaux",
        }
    }

    /// Stem used for the per-category CSV files
    pub fn file_stem(&self) -> &'static str {
        match self {
            Category::Chiens => "chiens",
            Category::Moutons => "moutons",
            Category::PoulesLapinsPigeons => "poules_lapins_pigeons",
            Category::AutresAnimaux => "autres_animaux",
        }
    }

    /// Lookup by label or file stem, case-insensitive
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| {
            c.label().to_lowercase() == wanted || c.file_stem() == wanted
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| ScoutError::UnknownCategory(s.to_string()))
    }
}

/// One scraped listing, the unit flowing through the pipeline.
///
/// `link` is the identity key. It is only `None` when extraction failed,
/// and such records never reach the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub source: Source,
    pub category: Category,
    pub title: Option<String>,
    pub price_raw: Option<String>,
    pub address_raw: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub page: u32,
}

impl Listing {
    /// Listing for a detail page whose fetch or parse failed
    pub fn unresolved(category: Category, page: u32, link: impl Into<String>) -> Self {
        Self::from_detail(category, page, link, DetailFields::default())
    }

    pub fn from_detail(
        category: Category,
        page: u32,
        link: impl Into<String>,
        fields: DetailFields,
    ) -> Self {
        Self {
            source: Source::CoinAfrique,
            category,
            title: fields.title,
            price_raw: fields.price_raw,
            address_raw: fields.address_raw,
            image_url: fields.image_url,
            link: Some(link.into()),
            page,
        }
    }

    /// True when none of the extractable fields were found
    pub fn is_blank(&self) -> bool {
        self.title.is_none()
            && self.price_raw.is_none()
            && self.address_raw.is_none()
            && self.image_url.is_none()
    }
}

/// Fields extracted from a single detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub title: Option<String>,
    pub price_raw: Option<String>,
    pub address_raw: Option<String>,
    pub image_url: Option<String>,
}

/// A persisted listing row
#[derive(Debug, Clone, Serialize)]
pub struct StoredListing {
    pub id: i64,
    pub source: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub price_raw: Option<String>,
    pub address_raw: Option<String>,
    pub image_url: Option<String>,
    pub link: String,
    pub page: Option<i64>,
    pub scraped_at: Option<NaiveDateTime>,
}

/// Cookie copied out of the browser session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
}

/// Counts reported by a persistence batch or a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl UpsertStats {
    pub fn merge(&mut self, other: UpsertStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

impl fmt::Display for UpsertStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} skipped, {} errors",
            self.inserted, self.updated, self.skipped, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_labels_and_stems() {
        assert_eq!("Moutons".parse::<Category>().unwrap(), Category::Moutons);
        assert_eq!(
            "autres animaux".parse::<Category>().unwrap(),
            Category::AutresAnimaux
        );
        assert_eq!(
            "poules_lapins_pigeons".parse::<Category>().unwrap(),
            Category::PoulesLapinsPigeons
        );
        assert!("Chats".parse::<Category>().is_err());
    }

    #[test]
    fn unresolved_listing_keeps_link() {
        let listing = Listing::unresolved(Category::Chiens, 3, "https://x/annonce/1");
        assert!(listing.is_blank());
        assert_eq!(listing.link.as_deref(), Some("https://x/annonce/1"));
        assert_eq!(listing.page, 3);
    }
}
