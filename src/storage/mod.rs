//! SQLite store for raw listings, keyed on the unique `link` column.
//!
//! Each write call runs in its own transaction, committed before it
//! returns, so a batch is durable even when a later batch fails. The store
//! assumes a single writer process.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Category, Listing, StoredListing, UpsertStats};

const DDL_RAW: &str = r"
CREATE TABLE IF NOT EXISTS raw_listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT,
    category TEXT,
    title TEXT,
    price_raw TEXT,
    address_raw TEXT,
    image_url TEXT,
    link TEXT UNIQUE,
    page INTEGER,
    scraped_at TEXT DEFAULT (CURRENT_TIMESTAMP)
)
";

const UPDATE_BY_LINK: &str = r"
UPDATE raw_listings SET
    source = ?, category = ?, title = ?, price_raw = ?,
    address_raw = ?, image_url = ?, page = ?,
    scraped_at = CURRENT_TIMESTAMP
WHERE link = ?
";

const INSERT: &str = r"
INSERT INTO raw_listings
    (source, category, title, price_raw, address_raw, image_url, link, page, scraped_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
";

const INSERT_OR_IGNORE: &str = r"
INSERT OR IGNORE INTO raw_listings
    (source, category, title, price_raw, address_raw, image_url, link, page)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
";

const SELECT_COLUMNS: &str =
    "SELECT id, source, category, title, price_raw, address_raw, image_url, link, page, scraped_at FROM raw_listings";

#[derive(Clone)]
pub struct ListingStore {
    pool: SqlitePool,
}

impl ListingStore {
    /// Open (creating if needed) the database file and its table.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!("Opened listing store at {}", path.display());
        Self::with_pool(pool).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(DDL_RAW).execute(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Update the row sharing each listing's link, or insert it when absent.
    ///
    /// Listings without a link are skipped. A failing row is counted as an
    /// error and the rest of the batch still goes through.
    pub async fn upsert(&self, listings: &[Listing]) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        if listings.is_empty() {
            return Ok(stats);
        }

        let mut tx = self.pool.begin().await?;
        for listing in listings {
            let Some(link) = listing.link.as_deref() else {
                warn!(
                    "Dropping listing without link (title: {:?})",
                    listing.title.as_deref().unwrap_or("-")
                );
                stats.skipped += 1;
                continue;
            };
            match upsert_one(&mut tx, listing, link).await {
                Ok(true) => stats.updated += 1,
                Ok(false) => stats.inserted += 1,
                Err(e) => {
                    warn!("Failed to store {}: {}", link, e);
                    stats.errors += 1;
                }
            }
        }
        tx.commit().await?;

        debug!("Upsert batch: {}", stats);
        Ok(stats)
    }

    /// Insert listings whose link is not stored yet, never overwriting.
    ///
    /// Links already stored and listings without a link count as skipped;
    /// a failing row counts as an error and the batch carries on.
    pub async fn insert_if_absent(&self, listings: &[Listing]) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        if listings.is_empty() {
            return Ok(stats);
        }

        let mut tx = self.pool.begin().await?;
        for listing in listings {
            let Some(link) = listing.link.as_deref() else {
                stats.skipped += 1;
                continue;
            };
            let result = sqlx::query(INSERT_OR_IGNORE)
                .bind(listing.source.as_str())
                .bind(listing.category.label())
                .bind(listing.title.as_deref())
                .bind(listing.price_raw.as_deref())
                .bind(listing.address_raw.as_deref())
                .bind(listing.image_url.as_deref())
                .bind(link)
                .bind(listing.page)
                .execute(&mut *tx)
                .await;
            match result {
                Ok(done) if done.rows_affected() > 0 => stats.inserted += 1,
                Ok(_) => stats.skipped += 1,
                Err(e) => {
                    warn!("Insert failed for {}: {}", link, e);
                    stats.errors += 1;
                }
            }
        }
        tx.commit().await?;

        debug!("Insert-only batch: {}", stats);
        Ok(stats)
    }

    /// Every stored listing, newest first
    pub async fn fetch_all(&self) -> Result<Vec<StoredListing>> {
        let sql = format!("{} ORDER BY id DESC", SELECT_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(stored_listing).collect()
    }

    /// Stored listings of one category, newest first
    pub async fn fetch_category(&self, category: Category) -> Result<Vec<StoredListing>> {
        let sql = format!("{} WHERE category = ? ORDER BY id DESC", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(category.label())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(stored_listing).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM raw_listings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Returns `true` when an existing row was updated, `false` on insert.
async fn upsert_one(
    tx: &mut Transaction<'_, Sqlite>,
    listing: &Listing,
    link: &str,
) -> std::result::Result<bool, sqlx::Error> {
    let updated = sqlx::query(UPDATE_BY_LINK)
        .bind(listing.source.as_str())
        .bind(listing.category.label())
        .bind(listing.title.as_deref())
        .bind(listing.price_raw.as_deref())
        .bind(listing.address_raw.as_deref())
        .bind(listing.image_url.as_deref())
        .bind(listing.page)
        .bind(link)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    if updated > 0 {
        return Ok(true);
    }

    sqlx::query(INSERT)
        .bind(listing.source.as_str())
        .bind(listing.category.label())
        .bind(listing.title.as_deref())
        .bind(listing.price_raw.as_deref())
        .bind(listing.address_raw.as_deref())
        .bind(listing.image_url.as_deref())
        .bind(link)
        .bind(listing.page)
        .execute(&mut **tx)
        .await?;
    Ok(false)
}

fn stored_listing(row: &SqliteRow) -> Result<StoredListing> {
    Ok(StoredListing {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        category: row.try_get("category")?,
        title: row.try_get("title")?,
        price_raw: row.try_get("price_raw")?,
        address_raw: row.try_get("address_raw")?,
        image_url: row.try_get("image_url")?,
        link: row.try_get("link")?,
        page: row.try_get("page")?,
        scraped_at: row.try_get("scraped_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    fn listing(link: Option<&str>, title: &str) -> Listing {
        Listing {
            source: Source::CoinAfrique,
            category: Category::Moutons,
            title: Some(title.to_string()),
            price_raw: Some("125 000 FCFA".to_string()),
            address_raw: Some("Dakar - Liberté 6".to_string()),
            image_url: None,
            link: link.map(str::to_string),
            page: 1,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = ListingStore::in_memory().await.unwrap();
        let row = listing(Some("https://sn.coinafrique.com/annonce/moutons/1"), "Bélier");

        let first = store.upsert(&[row.clone()]).await.unwrap();
        assert_eq!((first.inserted, first.updated), (1, 0));

        let second = store.upsert(&[row]).await.unwrap();
        assert_eq!((second.inserted, second.updated), (0, 1));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_overwrites_fields() {
        let store = ListingStore::in_memory().await.unwrap();
        let link = "https://sn.coinafrique.com/annonce/moutons/2";
        store.upsert(&[listing(Some(link), "old")]).await.unwrap();
        let mut fresh = listing(Some(link), "new");
        fresh.page = 4;
        store.upsert(&[fresh]).await.unwrap();

        let rows = store.fetch_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title.as_deref(), Some("new"));
        assert_eq!(rows[0].page, Some(4));
        assert!(rows[0].scraped_at.is_some());
    }

    #[tokio::test]
    async fn stored_links_match_distinct_input_links() {
        let store = ListingStore::in_memory().await.unwrap();
        let batch = vec![
            listing(Some("a"), "1"),
            listing(Some("b"), "2"),
            listing(Some("a"), "3"),
            listing(None, "4"),
            listing(Some("c"), "5"),
            listing(Some("b"), "6"),
        ];
        let stats = store.upsert(&batch).await.unwrap();
        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.updated, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn null_links_are_never_stored() {
        let store = ListingStore::in_memory().await.unwrap();
        let stats = store
            .upsert(&[listing(None, "orphan"), listing(None, "orphan 2")])
            .await
            .unwrap();
        assert_eq!(stats, UpsertStats { skipped: 2, ..UpsertStats::default() });
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn row_errors_do_not_abort_the_batch() {
        let store = ListingStore::in_memory().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON raw_listings \
             WHEN NEW.title = 'boom' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let stats = store
            .upsert(&[
                listing(Some("a"), "fine"),
                listing(Some("b"), "boom"),
                listing(Some("c"), "fine too"),
            ])
            .await
            .unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn insert_if_absent_counts_row_errors() {
        let store = ListingStore::in_memory().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON raw_listings \
             WHEN NEW.title = 'boom' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let stats = store
            .insert_if_absent(&[listing(Some("a"), "fine"), listing(Some("b"), "boom")])
            .await
            .unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn insert_if_absent_never_overwrites() {
        let store = ListingStore::in_memory().await.unwrap();
        store.upsert(&[listing(Some("a"), "original")]).await.unwrap();

        let stats = store
            .insert_if_absent(&[
                listing(Some("a"), "replacement"),
                listing(Some("b"), "new"),
                listing(None, "no link"),
            ])
            .await
            .unwrap();
        assert_eq!(
            stats,
            UpsertStats {
                inserted: 1,
                skipped: 2,
                ..UpsertStats::default()
            }
        );

        let rows = store.fetch_all().await.unwrap();
        let a = rows.iter().find(|r| r.link == "a").unwrap();
        assert_eq!(a.title.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn fetch_all_is_newest_first() {
        let store = ListingStore::in_memory().await.unwrap();
        store
            .upsert(&[listing(Some("first"), "1"), listing(Some("second"), "2")])
            .await
            .unwrap();
        let mut dog = listing(Some("third"), "3");
        dog.category = Category::Chiens;
        store.upsert(&[dog]).await.unwrap();

        let links: Vec<_> = store
            .fetch_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.link)
            .collect();
        assert_eq!(links, vec!["third", "second", "first"]);

        let sheep = store.fetch_category(Category::Moutons).await.unwrap();
        assert_eq!(sheep.len(), 2);
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("app.db");
        let store = ListingStore::open(&path).await.unwrap();
        store.upsert(&[listing(Some("a"), "x")]).await.unwrap();
        store.close().await;

        let reopened = ListingStore::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
