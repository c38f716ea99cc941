use std::io::{Read, Write};

use crate::error::Result;
use crate::models::StoredListing;

/// Column-named table of nullable text cells. Empty cells read from CSV
/// are null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row of text cells, blank cells becoming null. Short rows
    /// are padded and long rows truncated to the header width.
    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let row = cells
            .into_iter()
            .map(|cell| {
                let cell: String = cell.into();
                (!cell.trim().is_empty()).then_some(cell)
            })
            .collect();
        self.push_cells(row);
    }

    pub fn push_cells(&mut self, mut row: Vec<Option<String>>) {
        row.resize(self.headers.len(), None);
        self.rows.push(row);
    }

    /// Index of the header with exactly this name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// First column, in table order, whose trimmed lowercase name is one of
    /// `aliases`
    pub fn find_column(&self, aliases: &[&str]) -> Option<usize> {
        self.headers.iter().position(|header| {
            let normalized = header.trim().to_lowercase();
            aliases.iter().any(|alias| *alias == normalized)
        })
    }

    pub fn column(&self, index: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).and_then(|cell| cell.as_deref()))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    /// Replace the column named `name`, appending it when absent.
    pub fn set_column(&mut self, name: &str, values: Vec<Option<String>>) {
        let index = match self.column_index(name) {
            Some(index) => index,
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    row.push(None);
                }
                self.headers.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[index] = value;
        }
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut table = Table::new(reader.headers()?.iter());
        for record in reader.records() {
            table.push_row(record?.iter());
        }
        Ok(table)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Tabular view of persisted listings, for cleaning database rows
    pub fn from_listings(listings: &[StoredListing]) -> Self {
        let mut table = Table::new([
            "id",
            "source",
            "category",
            "title",
            "price_raw",
            "address_raw",
            "image_url",
            "link",
            "page",
            "scraped_at",
        ]);
        for l in listings {
            table.push_cells(vec![
                Some(l.id.to_string()),
                l.source.clone(),
                l.category.clone(),
                l.title.clone(),
                l.price_raw.clone(),
                l.address_raw.clone(),
                l.image_url.clone(),
                Some(l.link.clone()),
                l.page.map(|p| p.to_string()),
                l.scraped_at.map(|t| t.to_string()),
            ]);
        }
        table
    }
}
