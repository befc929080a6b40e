// Subgroup export: copies of the catalog split into one file per make, fuel
// type and transmission, kept in a `subgroups/` directory next to the main
// file. The main file stays the source of truth; these are rebuilt on every
// local save.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::local::{parse, write_file, Header, Loaded};
use crate::record::{fold, Field, Vehicle};

/// Grouping criteria, each with its own directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Make,
    FuelType,
    Transmission,
}

impl Grouping {
    pub const ALL: [Grouping; 3] = [Grouping::Make, Grouping::FuelType, Grouping::Transmission];

    pub fn dir_name(self) -> &'static str {
        match self {
            Grouping::Make => "by_make",
            Grouping::FuelType => "by_fuel_type",
            Grouping::Transmission => "by_transmission",
        }
    }

    fn field(self) -> Field {
        match self {
            Grouping::Make => Field::Make,
            Grouping::FuelType => Field::FuelType,
            Grouping::Transmission => Field::Transmission,
        }
    }
}

/// Root of the subgroup tree for a given catalog file.
pub fn root_for(catalog: &Path) -> PathBuf {
    catalog
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("subgroups")
}

/// Make a value usable as a file name.
pub fn file_stem(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "Unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Rebuild every subgroup file from `records`.
pub fn export(catalog: &Path, header: &Header, records: &[Vehicle]) -> io::Result<()> {
    let root = root_for(catalog);
    for grouping in Grouping::ALL {
        let dir = root.join(grouping.dir_name());
        fs::create_dir_all(&dir)?;
        clear_csv_files(&dir)?;

        // Values that differ only in case/accents share one file.
        let mut groups: BTreeMap<String, (String, Vec<Vehicle>)> = BTreeMap::new();
        for vehicle in records {
            let value = vehicle.value(grouping.field());
            groups
                .entry(fold(&value))
                .or_insert_with(|| (value.clone(), Vec::new()))
                .1
                .push(vehicle.clone());
        }

        for (label, members) in groups.values() {
            let path = dir.join(format!("{}.csv", file_stem(label)));
            write_file(&path, header, members)?;
        }
        debug!(grouping = grouping.dir_name(), files = groups.len(), "exported subgroups");
    }
    Ok(())
}

fn clear_csv_files(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "csv") {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// Files currently present for one grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSummary {
    pub files: Vec<String>,
}

/// What the subgroup tree next to `catalog` contains, sorted by file name.
pub fn summary(catalog: &Path) -> Result<Vec<(Grouping, GroupSummary)>> {
    let root = root_for(catalog);
    Grouping::ALL
        .into_iter()
        .map(|grouping| {
            let dir = root.join(grouping.dir_name());
            let mut files = Vec::new();
            match fs::read_dir(&dir) {
                Ok(entries) => {
                    for entry in entries {
                        let entry = entry.map_err(|e| CatalogError::persistence(&dir, e))?;
                        let path = entry.path();
                        if path.extension().is_some_and(|ext| ext == "csv") {
                            files.push(entry.file_name().to_string_lossy().into_owned());
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CatalogError::persistence(&dir, e)),
            }
            files.sort();
            Ok((grouping, GroupSummary { files }))
        })
        .collect()
}

/// Load a single subgroup file. A missing file reads as empty.
pub fn read_subgroup(path: &Path) -> Result<Loaded> {
    match fs::read(path) {
        Ok(bytes) => parse(&bytes)
            .map(|(_, loaded)| loaded)
            .map_err(|e| CatalogError::persistence(path, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Loaded::default()),
        Err(e) => Err(CatalogError::persistence(path, e)),
    }
}
