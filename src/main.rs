mod cleaning;
mod config;
mod error;
mod files;
mod models;
mod report;
mod scrapers;
mod storage;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cleaning::{clean, CleanOptions, CleanedListing, Table};
use config::{ScoutConfig, DEFAULT_CONFIG_FILE};
use files::DataLayout;
use models::Category;
use report::Report;
use scrapers::browser::purge_driver_caches;
use scrapers::http::SessionConfig;
use scrapers::{scrape_and_persist, DetailFetcher, HarvestMode, ListingBrowser, ScrapeRequest};
use storage::ListingStore;

/// Animal Scout - CoinAfrique Senegal animal listings
#[derive(Parser, Debug)]
#[command(name = "animal-scout", version, about)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// SQLite database, overrides the config file
    #[arg(long)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape a category and upsert its listings
    Scrape {
        #[arg(long)]
        category: Category,

        /// Scrape pages 1..=N
        #[arg(long, conflicts_with_all = ["start", "end"])]
        pages: Option<u32>,

        #[arg(long, default_value_t = 1)]
        start: u32,

        #[arg(long)]
        end: Option<u32>,

        /// Follow every listing to its detail page
        #[arg(long)]
        detail: bool,

        /// Detail fetch workers, overrides the config file
        #[arg(long)]
        workers: Option<usize>,

        /// Add new links only, leave stored rows untouched
        #[arg(long)]
        insert_only: bool,
    },

    /// Print stored listings, newest first
    List {
        #[arg(long)]
        category: Option<Category>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Also write every selected row, cleaned, to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Clean one raw CSV file
    Clean {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Minimum share of filled cells a row needs to be kept
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,

        #[arg(long)]
        dedupe: bool,
    },

    /// Regenerate stale cleaned files from the raw CSV exports
    Sync,

    /// Summarise all cleaned files
    Report {
        #[arg(long, default_value_t = 15)]
        top: usize,
    },

    /// Remove stale browser driver caches
    PurgeCaches,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = ScoutConfig::load_or_default(&cli.config);
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    let layout = DataLayout::under(&config.data_dir);

    match cli.command {
        Command::Scrape {
            category,
            pages,
            start,
            end,
            detail,
            workers,
            insert_only,
        } => {
            let end = match (pages, end) {
                (Some(n), _) => n,
                (None, Some(end)) => end,
                (None, None) => start,
            };
            let start = if pages.is_some() { 1 } else { start };
            anyhow::ensure!(end >= start, "page range {}..={} is empty", start, end);

            let mut request = ScrapeRequest::new(category, start..=end);
            request.mode = if detail {
                HarvestMode::Detail
            } else {
                HarvestMode::ListOnly
            };
            request.workers = workers.unwrap_or(config.workers);
            request.pause_ms = config.pause_ms;
            request.insert_only = insert_only;

            info!("🐑 Animal Scout - {} pages {}-{}", category, start, end);
            if config.purge_driver_caches {
                let removed = purge_driver_caches();
                info!("Purged {} driver cache directories", removed.len());
            }

            let store = ListingStore::open(&config.db_path).await?;
            let fetcher = DetailFetcher::new(
                SessionConfig {
                    timeout: config.detail_timeout(),
                    ..SessionConfig::default()
                },
                request.workers,
            );
            let mut browser = ListingBrowser::new(config.browser_options())?;

            let summary = scrape_and_persist(&mut browser, &fetcher, &store, &request).await?;
            drop(browser);
            store.close().await;

            println!("{}", serde_json::to_string_pretty(&summary.stats)?);
        }

        Command::List {
            category,
            limit,
            csv,
        } => {
            let store = ListingStore::open(&config.db_path).await?;
            let listings = match category {
                Some(category) => store.fetch_category(category).await?,
                None => store.fetch_all().await?,
            };
            info!("{} stored listings", listings.len());

            if let Some(path) = csv {
                let cleaned = clean(&Table::from_listings(&listings), CleanOptions::default());
                files::write_table(&path, &cleaned)?;
                info!("💾 Saved {} rows to {}", cleaned.len(), path.display());
            }

            for listing in listings.into_iter().take(limit).map(CleanedListing::from) {
                let stored = &listing.listing;
                println!(
                    "{}. {} ({})",
                    stored.id,
                    stored.title.as_deref().unwrap_or("-"),
                    listing
                        .price_cfa
                        .map_or_else(|| "prix inconnu".to_string(), |p| format!("{} CFA", p))
                );
                println!(
                    "   {} | {}",
                    stored.category.as_deref().unwrap_or("-"),
                    listing.city.as_deref().unwrap_or("-")
                );
                println!("   URL: {}", stored.link);
            }
            store.close().await;
        }

        Command::Clean {
            input,
            output,
            threshold,
            dedupe,
        } => {
            anyhow::ensure!(
                (0.0..=1.0).contains(&threshold),
                "threshold must be between 0 and 1"
            );
            let raw = files::read_table(&input)?;
            let cleaned = clean(
                &raw,
                CleanOptions {
                    drop_threshold: threshold,
                    dedupe,
                },
            );
            files::write_table(&output, &cleaned)?;
            info!(
                "💾 Cleaned {} rows into {} ({} kept)",
                raw.len(),
                output.display(),
                cleaned.len()
            );
        }

        Command::Sync => {
            layout.ensure_dirs()?;
            for (category, status) in files::sync_cleaned(&layout) {
                println!("{:<24} {:?}", category.label(), status);
            }
        }

        Command::Report { top } => {
            let table = files::load_cleaned(&layout)?;
            if table.is_empty() {
                warn!(
                    "No cleaned data under {}, run `sync` first",
                    layout.clean_dir.display()
                );
                return Ok(());
            }
            print!("{}", Report::from_table(&table, top));
        }

        Command::PurgeCaches => {
            let removed = purge_driver_caches();
            if removed.is_empty() {
                println!("No driver caches found");
            }
            for dir in removed {
                println!("Removed {}", dir.display());
            }
        }
    }

    Ok(())
}
