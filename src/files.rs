//! Per-category CSV files: raw exports and their cleaned counterparts.
//!
//! A cleaned file is regenerated whenever it is missing or older than its
//! raw file. Staleness is judged on modification times only.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cleaning::{clean, CleanOptions, Table};
use crate::error::Result;
use crate::models::Category;

/// Options applied when regenerating cleaned files
pub const SYNC_OPTIONS: CleanOptions = CleanOptions {
    drop_threshold: 0.7,
    dedupe: true,
};

#[derive(Debug, Clone)]
pub struct DataLayout {
    pub raw_dir: PathBuf,
    pub clean_dir: PathBuf,
}

impl DataLayout {
    /// `webscraper_csv/` and `cleaned/` under `data_dir`
    pub fn under(data_dir: &Path) -> Self {
        Self {
            raw_dir: data_dir.join("webscraper_csv"),
            clean_dir: data_dir.join("cleaned"),
        }
    }

    pub fn raw_path(&self, category: Category) -> PathBuf {
        self.raw_dir.join(format!("{}.csv", category.file_stem()))
    }

    pub fn clean_path(&self, category: Category) -> PathBuf {
        self.clean_dir
            .join(format!("{}_clean.csv", category.file_stem()))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.raw_dir)?;
        std::fs::create_dir_all(&self.clean_dir)?;
        Ok(())
    }
}

/// Outcome of syncing one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    MissingRaw,
    RawEmpty,
    Cleaned,
    UpToDate,
    Failed(String),
}

pub fn read_table(path: &Path) -> Result<Table> {
    Table::read_csv(BufReader::new(File::open(path)?))
}

pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    table.write_csv(BufWriter::new(File::create(path)?))
}

/// True when `derived` is missing or older than `source`
pub fn is_stale(source: &Path, derived: &Path) -> Result<bool> {
    if !derived.exists() {
        return Ok(true);
    }
    let source_time = std::fs::metadata(source)?.modified()?;
    let derived_time = std::fs::metadata(derived)?.modified()?;
    Ok(source_time > derived_time)
}

fn sync_one(layout: &DataLayout, category: Category) -> Result<SyncStatus> {
    let raw_path = layout.raw_path(category);
    let clean_path = layout.clean_path(category);
    if !raw_path.exists() {
        return Ok(SyncStatus::MissingRaw);
    }
    if !is_stale(&raw_path, &clean_path)? {
        return Ok(SyncStatus::UpToDate);
    }

    let raw = read_table(&raw_path)?;
    if raw.is_empty() {
        return Ok(SyncStatus::RawEmpty);
    }
    let cleaned = clean(&raw, SYNC_OPTIONS);
    write_table(&clean_path, &cleaned)?;
    debug!(
        "Cleaned {}: {} raw rows, {} kept",
        raw_path.display(),
        raw.len(),
        cleaned.len()
    );
    Ok(SyncStatus::Cleaned)
}

/// Regenerate stale cleaned files for every category.
pub fn sync_cleaned(layout: &DataLayout) -> Vec<(Category, SyncStatus)> {
    Category::ALL
        .into_iter()
        .map(|category| {
            let status = sync_one(layout, category).unwrap_or_else(|e| {
                warn!("Cleaning {} failed: {}", category, e);
                SyncStatus::Failed(e.to_string())
            });
            info!("{}: {:?}", category, status);
            (category, status)
        })
        .collect()
}

/// Concatenate every cleaned file, tagging rows with their category.
pub fn load_cleaned(layout: &DataLayout) -> Result<Table> {
    let mut combined: Option<Table> = None;
    for category in Category::ALL {
        let path = layout.clean_path(category);
        if !path.exists() {
            continue;
        }
        let mut table = match read_table(&path) {
            Ok(table) => table,
            Err(e) => {
                warn!("Skipping unreadable {}: {}", path.display(), e);
                continue;
            }
        };
        table.set_column("category", vec![Some(category.label().to_string()); table.len()]);

        match combined.as_mut() {
            None => combined = Some(table),
            Some(all) => append(all, &table),
        }
    }
    Ok(combined.unwrap_or_default())
}

/// Append `other`'s rows, aligning columns by name and adding new ones.
fn append(target: &mut Table, other: &Table) {
    for header in &other.headers {
        if target.column_index(header).is_none() {
            target.set_column(header, Vec::new());
        }
    }
    for row in &other.rows {
        let mut aligned = vec![None; target.headers.len()];
        for (header, cell) in other.headers.iter().zip(row) {
            if let Some(index) = target.column_index(header) {
                aligned[index] = cell.clone();
            }
        }
        target.push_cells(aligned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn sync_reports_each_category() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::under(dir.path());
        layout.ensure_dirs().unwrap();

        write(
            &layout.raw_path(Category::Moutons),
            "Nom,prix,adresse\nBélier,125 000 FCFA,Dakar - Liberté 6\nBélier,125 000 FCFA,Dakar - Liberté 6\n",
        );
        write(&layout.raw_path(Category::Chiens), "Nom,prix,adresse\n");

        let statuses: std::collections::HashMap<_, _> = sync_cleaned(&layout).into_iter().collect();
        assert_eq!(statuses[&Category::Moutons], SyncStatus::Cleaned);
        assert_eq!(statuses[&Category::Chiens], SyncStatus::RawEmpty);
        assert_eq!(statuses[&Category::AutresAnimaux], SyncStatus::MissingRaw);

        let cleaned = read_table(&layout.clean_path(Category::Moutons)).unwrap();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.get(0, "price_cfa"), Some("125000"));
        assert_eq!(cleaned.get(0, "city"), Some("Dakar"));
    }

    #[test]
    fn fresh_clean_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::under(dir.path());
        let raw = layout.raw_path(Category::Chiens);
        let cleaned = layout.clean_path(Category::Chiens);
        write(&raw, "title,price\nChiot,50 000\n");
        write(&cleaned, "title,price,price_cfa\nChiot,50 000,50000\n");

        let now = SystemTime::now();
        set_mtime(&raw, now - Duration::from_secs(60));
        set_mtime(&cleaned, now);
        assert!(!is_stale(&raw, &cleaned).unwrap());

        let statuses = sync_cleaned(&layout);
        assert!(statuses.contains(&(Category::Chiens, SyncStatus::UpToDate)));

        set_mtime(&raw, now + Duration::from_secs(60));
        assert!(is_stale(&raw, &cleaned).unwrap());
        let statuses = sync_cleaned(&layout);
        assert!(statuses.contains(&(Category::Chiens, SyncStatus::Cleaned)));
    }

    #[test]
    fn load_cleaned_tags_and_aligns_categories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::under(dir.path());
        write(
            &layout.clean_path(Category::Chiens),
            "title,price_cfa,city\nChiot,50000,Dakar\n",
        );
        write(
            &layout.clean_path(Category::Moutons),
            "nom,city,price_cfa\nBélier,Thiès,125000\n",
        );

        let all = load_cleaned(&layout).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get(0, "category"), Some("Chiens"));
        assert_eq!(all.get(1, "category"), Some("Moutons"));
        assert_eq!(all.get(1, "price_cfa"), Some("125000"));
        assert_eq!(all.get(1, "city"), Some("Thiès"));
        assert_eq!(all.get(1, "nom"), Some("Bélier"));
        assert_eq!(all.get(0, "nom"), None);
    }
}
