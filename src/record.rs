// Record model: the fixed-shape vehicle record, the loose row/wire shape it
// is normalized from, and the field-level rules applied on read and write.

use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::{CatalogError, Result};

/// Oldest accepted model year.
pub const MIN_YEAR: i32 = 1900;

/// Newest accepted model year: next calendar year, so announced models fit.
pub fn max_year() -> i32 {
    chrono::Local::now().year() + 1
}

/// Comparison form of a text value: trimmed, lowercase, without diacritics.
///
/// `"  Tóyota "` and `"toyota"` fold to the same string.
pub fn fold(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Identifier assigned by the remote catalog. The service may hand back
/// either a number or a string, so both are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RecordId {
    fn from(n: u64) -> Self {
        RecordId::Number(n)
    }
}

/// The five descriptive attributes of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Make,
    Model,
    Year,
    FuelType,
    Transmission,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Make,
        Field::Model,
        Field::Year,
        Field::FuelType,
        Field::Transmission,
    ];

    /// Canonical column / wire name.
    pub fn name(self) -> &'static str {
        match self {
            Field::Make => "Make",
            Field::Model => "Model",
            Field::Year => "Year",
            Field::FuelType => "FuelType",
            Field::Transmission => "Transmission",
        }
    }

    // Folded, separator-free spellings accepted for this field.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::Make => &["make", "marca", "brand"],
            Field::Model => &["model", "modelo"],
            Field::Year => &["year", "ano", "anio"],
            Field::FuelType => &["fueltype", "fuel", "tipocombustible", "combustible"],
            Field::Transmission => &["transmission", "transmision", "gearbox"],
        }
    }
}

/// Which spelling of the field names a remote service expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireNames {
    /// `Make`, `Model`, `Year`, `FuelType`, `Transmission`.
    #[default]
    Canonical,
    /// `Marca`, `Modelo`, `Año`, `TipoCombustible`, `Transmisión`.
    Localized,
}

impl WireNames {
    pub fn name(self, field: Field) -> &'static str {
        match self {
            WireNames::Canonical => field.name(),
            WireNames::Localized => match field {
                Field::Make => "Marca",
                Field::Model => "Modelo",
                Field::Year => "Año",
                Field::FuelType => "TipoCombustible",
                Field::Transmission => "Transmisión",
            },
        }
    }
}

impl FromStr for WireNames {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match fold(s).as_str() {
            "canonical" | "english" | "en" => Ok(WireNames::Canonical),
            "localized" | "localised" | "spanish" | "es" => Ok(WireNames::Localized),
            _ => Err(CatalogError::Validation(format!(
                "unknown field naming {:?}",
                s.trim()
            ))),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = CatalogError;

    /// Accepts canonical names, their localized equivalents and any
    /// case/accent/separator variant of them (`"tipo_combustible"`, `"Año"`).
    fn from_str(s: &str) -> Result<Self> {
        let key: String = fold(s)
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect();
        Field::ALL
            .into_iter()
            .find(|field| field.aliases().contains(&key.as_str()))
            .ok_or_else(|| CatalogError::Validation(format!("unknown field {:?}", s.trim())))
    }
}

/// Why a row or payload could not become a [`Vehicle`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("missing field {0}")]
    MissingField(Field),
    #[error("invalid year {0:?}")]
    InvalidYear(String),
}

impl From<SkipReason> for CatalogError {
    fn from(reason: SkipReason) -> Self {
        CatalogError::Validation(reason.to_string())
    }
}

/// A validated vehicle record.
///
/// `id` is only present for records that came from the remote catalog;
/// local rows are addressed by position (see `session::Locator`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vehicle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(rename = "Make")]
    pub make: String,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "FuelType")]
    pub fuel_type: String,
    #[serde(rename = "Transmission")]
    pub transmission: String,
}

impl Vehicle {
    /// Build a record from user-supplied values, applying the same rules
    /// used when reading a row.
    pub fn new(
        make: &str,
        model: &str,
        year: i32,
        fuel_type: &str,
        transmission: &str,
    ) -> Result<Vehicle> {
        let raw = RawRecord {
            id: None,
            make: Some(make.to_string()),
            model: Some(model.to_string()),
            year: Some(year.to_string()),
            fuel_type: Some(fuel_type.to_string()),
            transmission: Some(transmission.to_string()),
        };
        Ok(raw.normalize()?)
    }

    /// Display value of one field.
    pub fn value(&self, field: Field) -> String {
        match field {
            Field::Make => self.make.clone(),
            Field::Model => self.model.clone(),
            Field::Year => self.year.to_string(),
            Field::FuelType => self.fuel_type.clone(),
            Field::Transmission => self.transmission.clone(),
        }
    }

    /// Whether the five descriptive fields are identical (the id is ignored).
    pub fn same_fields(&self, other: &Vehicle) -> bool {
        self.make == other.make
            && self.model == other.model
            && self.year == other.year
            && self.fuel_type == other.fuel_type
            && self.transmission == other.transmission
    }

    /// Copy of the record without the remote identifier.
    pub fn without_id(&self) -> Vehicle {
        Vehicle {
            id: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} | Year: {} | Fuel: {} | Transmission: {}",
            self.make, self.model, self.year, self.fuel_type, self.transmission
        )
    }
}

/// Loosely-typed record as it arrives from a CSV row or a JSON payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default, rename = "Make", alias = "Marca", alias = "make", alias = "marca")]
    pub make: Option<String>,
    #[serde(default, rename = "Model", alias = "Modelo", alias = "model", alias = "modelo")]
    pub model: Option<String>,
    #[serde(
        default,
        rename = "Year",
        alias = "Año",
        alias = "year",
        alias = "año",
        alias = "Ano",
        deserialize_with = "loose_year"
    )]
    pub year: Option<String>,
    #[serde(
        default,
        rename = "FuelType",
        alias = "TipoCombustible",
        alias = "fuel_type",
        alias = "tipoCombustible"
    )]
    pub fuel_type: Option<String>,
    #[serde(
        default,
        rename = "Transmission",
        alias = "Transmisión",
        alias = "Transmision",
        alias = "transmission",
        alias = "transmisión"
    )]
    pub transmission: Option<String>,
}

// The service may send the year as a number or as text.
fn loose_year<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(Option::<Loose>::deserialize(deserializer)?.map(|v| match v {
        Loose::Int(n) => n.to_string(),
        Loose::Float(f) => f.to_string(),
        Loose::Text(s) => s,
    }))
}

impl RawRecord {
    /// Turn a loose record into a [`Vehicle`], or report why it must be skipped.
    pub fn normalize(self) -> std::result::Result<Vehicle, SkipReason> {
        Ok(Vehicle {
            id: self.id,
            make: clean_text(Field::Make, self.make.as_deref())?,
            model: clean_text(Field::Model, self.model.as_deref())?,
            year: parse_year(self.year.as_deref())?,
            fuel_type: clean_text(Field::FuelType, self.fuel_type.as_deref())?,
            transmission: clean_text(Field::Transmission, self.transmission.as_deref())?,
        })
    }
}

/// Re-check a record right before it is persisted; callers may have built
/// it by hand instead of going through [`RawRecord::normalize`].
pub fn validate_for_write(vehicle: &Vehicle) -> Result<()> {
    for field in [Field::Make, Field::Model, Field::FuelType, Field::Transmission] {
        let value = vehicle.value(field);
        if value.trim().is_empty() {
            return Err(SkipReason::MissingField(field).into());
        }
        if value.trim() != value {
            return Err(CatalogError::Validation(format!(
                "{} has surrounding whitespace",
                field
            )));
        }
    }
    check_year_range(vehicle.year, &vehicle.year.to_string())?;
    Ok(())
}

fn clean_text(field: Field, raw: Option<&str>) -> std::result::Result<String, SkipReason> {
    let value = raw.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(SkipReason::MissingField(field));
    }
    Ok(value.to_string())
}

/// Parse a year given as text. `"2019"` and `"2019.0"` are accepted.
pub fn parse_year(raw: Option<&str>) -> std::result::Result<i32, SkipReason> {
    let text = raw.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(SkipReason::MissingField(Field::Year));
    }
    let year = match text.parse::<i32>() {
        Ok(year) => year,
        Err(_) => match text.parse::<f64>() {
            Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i32::MAX as f64 => f as i32,
            _ => return Err(SkipReason::InvalidYear(text.to_string())),
        },
    };
    check_year_range(year, text)?;
    Ok(year)
}

fn check_year_range(year: i32, text: &str) -> std::result::Result<(), SkipReason> {
    if (MIN_YEAR..=max_year()).contains(&year) {
        Ok(())
    } else {
        Err(SkipReason::InvalidYear(text.to_string()))
    }
}

/// Subset of fields to change on an existing record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VehiclePatch {
    #[serde(rename = "Make", skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(rename = "Model", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "Year", skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(rename = "FuelType", skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<String>,
    #[serde(rename = "Transmission", skip_serializing_if = "Option::is_none")]
    pub transmission: Option<String>,
}

impl VehiclePatch {
    pub fn is_empty(&self) -> bool {
        self.make.is_none()
            && self.model.is_none()
            && self.year.is_none()
            && self.fuel_type.is_none()
            && self.transmission.is_none()
    }

    /// Set one field from user input, normalizing it like a row value.
    pub fn set(&mut self, field: Field, raw: &str) -> Result<()> {
        match field {
            Field::Year => self.year = Some(parse_year(Some(raw))?),
            Field::Make => self.make = Some(clean_text(field, Some(raw))?),
            Field::Model => self.model = Some(clean_text(field, Some(raw))?),
            Field::FuelType => self.fuel_type = Some(clean_text(field, Some(raw))?),
            Field::Transmission => self.transmission = Some(clean_text(field, Some(raw))?),
        }
        Ok(())
    }

    /// Builder-style [`VehiclePatch::set`].
    pub fn with(mut self, field: Field, raw: &str) -> Result<Self> {
        self.set(field, raw)?;
        Ok(self)
    }

    /// The record with this patch applied; fields not in the patch are kept.
    pub fn apply(&self, vehicle: &Vehicle) -> Vehicle {
        Vehicle {
            id: vehicle.id.clone(),
            make: self.make.clone().unwrap_or_else(|| vehicle.make.clone()),
            model: self.model.clone().unwrap_or_else(|| vehicle.model.clone()),
            year: self.year.unwrap_or(vehicle.year),
            fuel_type: self
                .fuel_type
                .clone()
                .unwrap_or_else(|| vehicle.fuel_type.clone()),
            transmission: self
                .transmission
                .clone()
                .unwrap_or_else(|| vehicle.transmission.clone()),
        }
    }

    /// Reject empty patches and values that would not survive a write.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(CatalogError::Validation("no changes given".into()));
        }
        for (field, value) in [
            (Field::Make, &self.make),
            (Field::Model, &self.model),
            (Field::FuelType, &self.fuel_type),
            (Field::Transmission, &self.transmission),
        ] {
            if let Some(v) = value {
                if v.trim().is_empty() {
                    return Err(SkipReason::MissingField(field).into());
                }
            }
        }
        if let Some(year) = self.year {
            check_year_range(year, &year.to_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn raw(make: &str, model: &str, year: &str, fuel: &str, trans: &str) -> RawRecord {
        RawRecord {
            id: None,
            make: Some(make.into()),
            model: Some(model.into()),
            year: Some(year.into()),
            fuel_type: Some(fuel.into()),
            transmission: Some(trans.into()),
        }
    }

    #[test]
    fn normalize_trims_but_keeps_spelling() {
        let v = raw("  Toyota ", "Corolla", " 2019 ", " diesel", "AUTOMATICA ")
            .normalize()
            .expect("valid row");
        assert_eq!(v.make, "Toyota");
        assert_eq!(v.year, 2019);
        assert_eq!(v.fuel_type, "diesel");
        assert_eq!(v.transmission, "AUTOMATICA");
    }

    #[rstest]
    #[case("abc")]
    #[case("1899")]
    #[case("2019.5")]
    #[case("99999")]
    fn rejects_bad_years(#[case] year: &str) {
        let err = raw("Ford", "Ka", year, "Gasoline", "Manual")
            .normalize()
            .unwrap_err();
        assert_eq!(err, SkipReason::InvalidYear(year.to_string()));
    }

    #[test]
    fn accepts_float_year_with_zero_fraction() {
        let v = raw("Ford", "Ka", "2019.0", "Gasoline", "Manual")
            .normalize()
            .expect("valid row");
        assert_eq!(v.year, 2019);
    }

    #[test]
    fn rejects_blank_required_field() {
        let err = raw("Ford", "   ", "2019", "Gasoline", "Manual")
            .normalize()
            .unwrap_err();
        assert_eq!(err, SkipReason::MissingField(Field::Model));
    }

    #[test]
    fn normalized_records_pass_write_validation() {
        let rows = [
            raw(" Fiat", "Uno ", "1995", " nafta ", "manual"),
            raw("Tesla", "Model 3", &max_year().to_string(), "electric", "automatic"),
            raw("Ford", "T", "1900", "Gasoline", "Manual"),
        ];
        for row in rows {
            let v = row.normalize().expect("valid row");
            validate_for_write(&v).expect("normalized record must be writable");
        }
    }

    #[test]
    fn write_validation_catches_hand_built_records() {
        let mut v = Vehicle::new("Fiat", "Uno", 1995, "Nafta", "Manual").expect("valid");
        v.model = " ".into();
        assert!(matches!(validate_for_write(&v), Err(CatalogError::Validation(_))));
        v.model = "Uno".into();
        v.year = 1800;
        assert!(matches!(validate_for_write(&v), Err(CatalogError::Validation(_))));
    }

    #[rstest]
    #[case("make", Field::Make)]
    #[case("Marca", Field::Make)]
    #[case("Año", Field::Year)]
    #[case("ano", Field::Year)]
    #[case("tipo_combustible", Field::FuelType)]
    #[case("FuelType", Field::FuelType)]
    #[case("Transmisión", Field::Transmission)]
    fn parses_field_names(#[case] input: &str, #[case] expected: Field) {
        assert_eq!(input.parse::<Field>().expect("known field"), expected);
    }

    #[test]
    fn unknown_field_name_is_a_validation_error() {
        assert!(matches!(
            "colour".parse::<Field>(),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn fold_strips_case_and_diacritics() {
        assert_eq!(fold("  Tóyota "), "toyota");
        assert_eq!(fold("Híbrido"), "hibrido");
    }

    #[test]
    fn deserializes_localized_wire_names_and_numeric_year() {
        let json = r#"{"id": 7, "Marca": "Renault", "Modelo": "Clio", "Año": 2015,
                       "TipoCombustible": "Nafta", "Transmisión": "Manual"}"#;
        let raw: RawRecord = serde_json::from_str(json).expect("decode");
        let v = raw.normalize().expect("valid");
        assert_eq!(v.id, Some(RecordId::Number(7)));
        assert_eq!(v.model, "Clio");
        assert_eq!(v.year, 2015);
    }

    #[test]
    fn serializes_canonical_names_without_missing_id() {
        let v = Vehicle::new("Renault", "Clio", 2015, "Nafta", "Manual").expect("valid");
        let json = serde_json::to_value(&v).expect("encode");
        assert_eq!(json["Make"], "Renault");
        assert_eq!(json["Year"], 2015);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let v = Vehicle::new("Renault", "Clio", 2015, "Nafta", "Manual").expect("valid");
        let patch = VehiclePatch::default()
            .with(Field::Year, "2021")
            .expect("valid year");
        let updated = patch.apply(&v);
        assert_eq!(updated.year, 2021);
        assert_eq!(updated.make, "Renault");
        assert_eq!(updated.transmission, "Manual");

        let body = serde_json::to_value(&patch).expect("encode");
        assert_eq!(body, serde_json::json!({ "Year": 2021 }));
    }

    #[rstest]
    #[case(WireNames::Canonical, Field::Year, "Year")]
    #[case(WireNames::Localized, Field::Year, "Año")]
    #[case(WireNames::Localized, Field::FuelType, "TipoCombustible")]
    fn wire_names_per_field(#[case] names: WireNames, #[case] field: Field, #[case] expected: &str) {
        assert_eq!(names.name(field), expected);
    }

    #[test]
    fn wire_names_parse_from_settings() {
        assert_eq!("Spanish".parse::<WireNames>().expect("known"), WireNames::Localized);
        assert_eq!("canonical".parse::<WireNames>().expect("known"), WireNames::Canonical);
        assert!("klingon".parse::<WireNames>().is_err());
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(matches!(
            VehiclePatch::default().validate(),
            Err(CatalogError::Validation(_))
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn text() -> impl Strategy<Value = Option<String>> {
            proptest::option::of("[ \\t]{0,2}\\PC{0,12}[ \\t]{0,2}")
        }

        fn year_text() -> impl Strategy<Value = String> {
            prop_oneof![
                any::<i32>().prop_map(|y| y.to_string()),
                (1850i32..2200).prop_map(|y| format!("{}.0", y)),
                (1850i32..2200).prop_map(|y| format!("  {} ", y)),
                "\\PC{0,6}",
            ]
        }

        proptest! {
            #[test]
            fn normalized_rows_always_pass_write_validation(
                make in text(),
                model in text(),
                year in proptest::option::of(year_text()),
                fuel_type in text(),
                transmission in text(),
            ) {
                let row = RawRecord { id: None, make, model, year, fuel_type, transmission };
                if let Ok(vehicle) = row.normalize() {
                    prop_assert!(validate_for_write(&vehicle).is_ok(), "{:?}", vehicle);
                }
            }
        }
    }
}
