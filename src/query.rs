// Query engine: search, filter, sort and aggregate over an in-memory
// collection. Nothing here knows where the records came from.

use crate::record::{fold, Field, Vehicle};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn is_descending(self) -> bool {
        self == Direction::Descending
    }
}

/// Records whose make or model contains `text`, ignoring case and accents.
pub fn search(records: &[Vehicle], text: &str) -> Vec<Vehicle> {
    let needle = fold(text);
    records
        .iter()
        .filter(|v| contains_folded(v, &needle))
        .cloned()
        .collect()
}

/// Single-record form of [`search`].
pub fn matches_text(vehicle: &Vehicle, text: &str) -> bool {
    contains_folded(vehicle, &fold(text))
}

fn contains_folded(vehicle: &Vehicle, needle: &str) -> bool {
    fold(&vehicle.make).contains(needle) || fold(&vehicle.model).contains(needle)
}

pub fn filter_by_fuel_type(records: &[Vehicle], value: &str) -> Vec<Vehicle> {
    filter_exact(records, Field::FuelType, value)
}

pub fn filter_by_transmission(records: &[Vehicle], value: &str) -> Vec<Vehicle> {
    filter_exact(records, Field::Transmission, value)
}

fn filter_exact(records: &[Vehicle], field: Field, value: &str) -> Vec<Vehicle> {
    let wanted = fold(value);
    records
        .iter()
        .filter(|v| fold(&v.value(field)) == wanted)
        .cloned()
        .collect()
}

/// Records with `min <= year <= max`. An inverted range is simply empty.
pub fn filter_by_year_range(records: &[Vehicle], min: i32, max: i32) -> Vec<Vehicle> {
    records
        .iter()
        .filter(|v| (min..=max).contains(&v.year))
        .cloned()
        .collect()
}

/// Stable sort by one field. Text fields compare in folded form, the year
/// numerically. Equal keys keep their input order in both directions.
pub fn sort_by(records: &[Vehicle], field: Field, direction: Direction) -> Vec<Vehicle> {
    let mut keyed: Vec<(SortKey, &Vehicle)> = records
        .iter()
        .map(|v| (SortKey::of(v, field), v))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| match direction {
        Direction::Ascending => a.cmp(b),
        Direction::Descending => b.cmp(a),
    });
    keyed.into_iter().map(|(_, v)| v.clone()).collect()
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Year(i32),
    Text(String),
}

impl SortKey {
    fn of(vehicle: &Vehicle, field: Field) -> SortKey {
        match field {
            Field::Year => SortKey::Year(vehicle.year),
            other => SortKey::Text(fold(&vehicle.value(other))),
        }
    }
}

/// Aggregate figures for a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub total: usize,
    pub oldest: Option<Vehicle>,
    pub newest: Option<Vehicle>,
    /// `None` for an empty collection.
    pub average_year: Option<f64>,
    pub counts_by_make: Vec<(String, usize)>,
    pub counts_by_fuel_type: Vec<(String, usize)>,
    pub counts_by_transmission: Vec<(String, usize)>,
}

pub fn statistics(records: &[Vehicle]) -> Statistics {
    let mut oldest: Option<&Vehicle> = None;
    let mut newest: Option<&Vehicle> = None;
    for v in records {
        // strict comparisons: the first record with the extreme year stays
        if oldest.map_or(true, |o| v.year < o.year) {
            oldest = Some(v);
        }
        if newest.map_or(true, |n| v.year > n.year) {
            newest = Some(v);
        }
    }

    let average_year = if records.is_empty() {
        None
    } else {
        let sum: i64 = records.iter().map(|v| i64::from(v.year)).sum();
        Some(sum as f64 / records.len() as f64)
    };

    Statistics {
        total: records.len(),
        oldest: oldest.cloned(),
        newest: newest.cloned(),
        average_year,
        counts_by_make: tally(records, Field::Make),
        counts_by_fuel_type: tally(records, Field::FuelType),
        counts_by_transmission: tally(records, Field::Transmission),
    }
}

// Groups by folded value; the label is the first spelling seen and groups
// appear in first-seen order.
fn tally(records: &[Vehicle], field: Field) -> Vec<(String, usize)> {
    let mut keys: Vec<String> = Vec::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for v in records {
        let value = v.value(field);
        let key = fold(&value);
        match keys.iter().position(|k| *k == key) {
            Some(i) => counts[i].1 += 1,
            None => {
                keys.push(key);
                counts.push((value, 1));
            }
        }
    }
    counts
}

impl Statistics {
    /// Average year for display, or `"undefined"` for an empty collection.
    pub fn average_label(&self) -> String {
        self.average_year
            .map_or_else(|| "undefined".to_string(), |avg| format!("{:.1}", avg))
    }
}
