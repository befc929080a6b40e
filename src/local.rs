// Local store adapter: the catalog as a UTF-8 (with BOM) CSV file.
//
// Persistence is a full rewrite: every mutation re-loads the file, changes
// the in-memory collection and writes the whole collection back through a
// temporary file that is atomically moved over the original.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};
use crate::record::{validate_for_write, Field, RawRecord, Vehicle, VehiclePatch};
use crate::subgroups;

/// Byte-order marker written at the start of every file so spreadsheet tools
/// pick up the encoding.
pub const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Outcome of a load: the usable records plus how many rows were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Loaded {
    pub records: Vec<Vehicle>,
    pub skipped: usize,
}

/// Column layout of a catalog file.
///
/// Labels are kept exactly as read (`Marca`, `Año`, ...) so a rewrite does
/// not rename the columns of a localized file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    columns: Vec<(Field, String)>,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            columns: Field::ALL
                .into_iter()
                .map(|f| (f, f.name().to_string()))
                .collect(),
        }
    }
}

impl Header {
    fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> (Header, Vec<Option<Field>>) {
        let mut columns: Vec<(Field, String)> = Vec::new();
        let mut positions = Vec::new();
        for label in labels {
            let label = label.trim();
            match label.parse::<Field>() {
                Ok(field) if !columns.iter().any(|(f, _)| *f == field) => {
                    columns.push((field, label.to_string()));
                    positions.push(Some(field));
                }
                _ => {
                    warn!(column = label, "ignoring unrecognised catalog column");
                    positions.push(None);
                }
            }
        }
        // Columns absent from the file still get written on the next save.
        for field in Field::ALL {
            if !columns.iter().any(|(f, _)| *f == field) {
                columns.push((field, field.name().to_string()));
            }
        }
        (Header { columns }, positions)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(|(_, label)| label.as_str()).collect()
    }

    fn row(&self, vehicle: &Vehicle) -> Vec<String> {
        self.columns.iter().map(|(f, _)| vehicle.value(*f)).collect()
    }
}

/// Parse the raw bytes of a catalog file.
pub(crate) fn parse(bytes: &[u8]) -> io::Result<(Header, Loaded)> {
    let body = bytes.strip_prefix(BOM).unwrap_or(bytes);
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok((Header::default(), Loaded::default()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body);
    let labels: Vec<String> = reader
        .byte_headers()
        .map_err(io::Error::from)?
        .iter()
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .collect();
    let (header, positions) = Header::from_labels(labels.iter().map(String::as_str));

    let mut loaded = Loaded::default();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "skipping unreadable row");
                loaded.skipped += 1;
                continue;
            }
        };
        let mut raw = RawRecord::default();
        for (value, field) in row.iter().zip(&positions) {
            let slot = match field {
                Some(Field::Make) => &mut raw.make,
                Some(Field::Model) => &mut raw.model,
                Some(Field::Year) => &mut raw.year,
                Some(Field::FuelType) => &mut raw.fuel_type,
                Some(Field::Transmission) => &mut raw.transmission,
                None => continue,
            };
            *slot = Some(value.to_string());
        }
        match raw.normalize() {
            Ok(vehicle) => loaded.records.push(vehicle),
            Err(reason) => {
                let line = row.position().map(|p| p.line()).unwrap_or_default();
                warn!(line, %reason, "skipping catalog row");
                loaded.skipped += 1;
            }
        }
    }
    Ok((header, loaded))
}

/// Atomically replace `path` with the given records.
pub(crate) fn write_file(path: &Path, header: &Header, records: &[Vehicle]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(BOM)?;
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(&mut tmp);
        writer.write_record(header.labels()).map_err(io::Error::from)?;
        for vehicle in records {
            writer
                .write_record(header.row(vehicle))
                .map_err(io::Error::from)?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// CSV-backed catalog.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    header: Header,
    subgroups: bool,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalStore {
            path: path.into(),
            header: Header::default(),
            subgroups: false,
        }
    }

    /// Also export per-make / per-fuel / per-transmission files on every save.
    pub fn with_subgroups(mut self, enabled: bool) -> Self {
        self.subgroups = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row. A missing file is created with the canonical header.
    pub fn load_all(&mut self) -> Result<Loaded> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "creating empty catalog file");
                self.header = Header::default();
                write_file(&self.path, &self.header, &[])
                    .map_err(|e| CatalogError::persistence(&self.path, e))?;
                return Ok(Loaded::default());
            }
            Err(e) => return Err(CatalogError::persistence(&self.path, e)),
        };

        let (header, loaded) =
            parse(&bytes).map_err(|e| CatalogError::persistence(&self.path, e))?;
        self.header = header;
        debug!(
            path = %self.path.display(),
            records = loaded.records.len(),
            skipped = loaded.skipped,
            "loaded catalog"
        );
        Ok(loaded)
    }

    /// Overwrite the file with `records`.
    pub fn save_all(&self, records: &[Vehicle]) -> Result<()> {
        for vehicle in records {
            validate_for_write(vehicle)?;
        }
        write_file(&self.path, &self.header, records)
            .map_err(|e| CatalogError::persistence(&self.path, e))?;
        debug!(path = %self.path.display(), records = records.len(), "saved catalog");

        if self.subgroups {
            if let Err(e) = subgroups::export(&self.path, &self.header, records) {
                warn!(error = %e, "subgroup export failed");
            }
        }
        Ok(())
    }

    /// Append one record and persist.
    pub fn append(&mut self, vehicle: &Vehicle) -> Result<(Vehicle, Vec<Vehicle>)> {
        validate_for_write(vehicle)?;
        let mut loaded = self.reload_for_write()?;
        let record = vehicle.without_id();
        loaded.push(record.clone());
        self.save_all(&loaded)?;
        Ok((record, loaded))
    }

    /// Apply `patch` to the row selected as `expected` at `index`.
    pub fn update(
        &mut self,
        index: usize,
        expected: &Vehicle,
        patch: &VehiclePatch,
    ) -> Result<(Vehicle, Vec<Vehicle>)> {
        patch.validate()?;
        let mut records = self.reload_for_write()?;
        let at = locate(&records, index, expected)?;
        let updated = patch.apply(&records[at]);
        validate_for_write(&updated)?;
        records[at] = updated.clone();
        self.save_all(&records)?;
        Ok((updated, records))
    }

    /// Remove the row selected as `expected` at `index`.
    pub fn remove(&mut self, index: usize, expected: &Vehicle) -> Result<(Vehicle, Vec<Vehicle>)> {
        let mut records = self.reload_for_write()?;
        let at = locate(&records, index, expected)?;
        let removed = records.remove(at);
        self.save_all(&records)?;
        Ok((removed, records))
    }

    fn reload_for_write(&mut self) -> Result<Vec<Vehicle>> {
        let loaded = self.load_all()?;
        if loaded.skipped > 0 {
            warn!(
                skipped = loaded.skipped,
                "malformed rows will be dropped by this rewrite"
            );
        }
        Ok(loaded.records)
    }
}

// The row at `index` wins if it still holds the selected record; otherwise
// the first row with identical fields, so a file edited since the listing
// never gets the wrong row changed.
fn locate(records: &[Vehicle], index: usize, expected: &Vehicle) -> Result<usize> {
    if records
        .get(index)
        .is_some_and(|r| r.same_fields(expected))
    {
        return Ok(index);
    }
    records
        .iter()
        .position(|r| r.same_fields(expected))
        .ok_or_else(|| CatalogError::NotFound(format!("{} {}", expected.make, expected.model)))
}
