//! CSV input.
//!
//! Every `.csv` file in the input directory holds one record per row with
//! the columns first name, last name, address, second address line, postal
//! code, city and country, below a header row.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{AddressRecord, HomeCountry};

/// Column names in input order.
pub const COLUMNS: [&str; 7] = [
    "first_name",
    "last_name",
    "address",
    "address_2",
    "postal_code",
    "city",
    "country",
];

/// Records read from an input directory.
#[derive(Debug, Clone, Default)]
pub struct InputBatch {
    /// Unique records in file and row order
    pub records: Vec<AddressRecord>,
    /// Rows with the wrong number of fields, fields joined by commas
    pub erroneous_lines: Vec<String>,
}

/// List the `.csv` files in `dir`, sorted by name.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read every CSV file in `dir`.
///
/// A blank country is read as the home country. Exact duplicates are
/// removed, keeping the first.
pub fn read_input_dir(dir: &Path, home: &HomeCountry) -> Result<InputBatch> {
    let files = list_csv_files(dir)?;
    info!(count = files.len(), dir = %dir.display(), "parsing input files");

    let mut batch = InputBatch::default();
    let mut seen = HashSet::new();

    for file in files {
        let (records, erroneous) = read_csv_file(&file, home)?;
        debug!(file = %file.display(), records = records.len(), erroneous = erroneous.len(), "read input file");

        batch.erroneous_lines.extend(erroneous);
        for record in records {
            if seen.insert(record.clone()) {
                batch.records.push(record);
            }
        }
    }

    info!(records = batch.records.len(), "read data entries");
    Ok(batch)
}

fn read_csv_file(path: &Path, home: &HomeCountry) -> Result<(Vec<AddressRecord>, Vec<String>)> {
    let file = fs::File::open(path)
        .map_err(|e| Error::input(format!("{}: {}", path.display(), e)))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut records = Vec::new();
    let mut erroneous = Vec::new();

    for row in reader.records() {
        let row = row?;
        if row.len() != COLUMNS.len() {
            erroneous.push(row.iter().collect::<Vec<_>>().join(","));
            continue;
        }

        let field = |index: usize| row.get(index).unwrap_or_default().to_string();
        let mut country = field(6);
        if country.trim().is_empty() {
            country = home.name.clone();
        }

        records.push(AddressRecord {
            first_name: field(0),
            last_name: field(1),
            address: field(2),
            address_2: field(3),
            postal_code: field(4),
            city: field(5),
            country,
        });
    }

    Ok((records, erroneous))
}
