//! Measurement units
//!
//! Canonical unit names are seeded as `measurement_types` rows; every alias
//! below resolves to its canonical row.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{MeasurementType, MeasurementTypeId};

/// Canonical unit name and the spellings that map to it
pub const MEASUREMENT_UNITS: &[(&str, &[&str])] = &[
    ("tsp", &["tsp", "tsps", "teaspoon", "teaspoons"]),
    ("tbsp", &["tbsp", "tbsps", "tbs", "tbl", "tablespoon", "tablespoons"]),
    ("cup", &["cup", "cups", "c"]),
    ("oz", &["oz", "ozs", "ounce", "ounces"]),
    ("lb", &["lb", "lbs", "pound", "pounds"]),
    ("g", &["g", "gr", "gram", "grams"]),
    ("kg", &["kg", "kgs", "kilogram", "kilograms"]),
    ("mg", &["mg", "milligram", "milligrams"]),
    ("ml", &["ml", "milliliter", "milliliters", "millilitre", "millilitres"]),
    ("l", &["l", "liter", "liters", "litre", "litres"]),
    ("pint", &["pint", "pints", "pt"]),
    ("quart", &["quart", "quarts", "qt"]),
    ("gallon", &["gallon", "gallons", "gal"]),
    ("pinch", &["pinch", "pinches"]),
    ("dash", &["dash", "dashes"]),
    ("clove", &["clove", "cloves"]),
    ("can", &["can", "cans"]),
    ("package", &["package", "packages", "pkg", "pkgs"]),
    ("slice", &["slice", "slices"]),
    ("piece", &["piece", "pieces"]),
    ("stick", &["stick", "sticks"]),
    ("bunch", &["bunch", "bunches"]),
    ("sprig", &["sprig", "sprigs"]),
];

/// Unit of one ingredient line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "measurement", rename_all = "snake_case")]
pub enum Unit {
    Known(MeasurementType),
    Unknown,
}

impl Unit {
    pub fn measurement_type_id(&self) -> Option<MeasurementTypeId> {
        match self {
            Unit::Known(m) => Some(m.id),
            Unit::Unknown => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Unit::Known(m) => Some(&m.name),
            Unit::Unknown => None,
        }
    }
}

/// Alias lookup over the seeded measurement types
#[derive(Debug, Clone, Default)]
pub struct UnitTable {
    by_alias: HashMap<String, MeasurementType>,
}

impl UnitTable {
    pub fn from_measurement_types(types: &[MeasurementType]) -> Self {
        let mut by_alias = HashMap::new();
        for measurement in types {
            by_alias.insert(measurement.name.to_lowercase(), measurement.clone());
            if let Some((_, aliases)) = MEASUREMENT_UNITS
                .iter()
                .find(|(canonical, _)| *canonical == measurement.name)
            {
                for alias in aliases.iter() {
                    by_alias.insert((*alias).to_string(), measurement.clone());
                }
            }
        }
        Self { by_alias }
    }

    /// Case-insensitive; a trailing `.` is ignored (`Tbsp.`)
    pub fn lookup(&self, token: &str) -> Option<&MeasurementType> {
        let token = token.trim_end_matches(['.', ',']).to_lowercase();
        self.by_alias.get(&token)
    }
}

#[cfg(test)]
pub(crate) fn seeded_table() -> UnitTable {
    let types: Vec<MeasurementType> = MEASUREMENT_UNITS
        .iter()
        .enumerate()
        .map(|(i, (name, _))| MeasurementType {
            id: i as i64 + 1,
            name: (*name).to_string(),
        })
        .collect();
    UnitTable::from_measurement_types(&types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_map_to_canonical() {
        let table = seeded_table();
        assert_eq!(table.lookup("Cups").map(|m| m.name.as_str()), Some("cup"));
        assert_eq!(table.lookup("tablespoons").map(|m| m.name.as_str()), Some("tbsp"));
        assert_eq!(table.lookup("Tbsp.").map(|m| m.name.as_str()), Some("tbsp"));
        assert_eq!(table.lookup("LBS").map(|m| m.name.as_str()), Some("lb"));
    }

    #[test]
    fn test_unknown_token() {
        let table = seeded_table();
        assert!(table.lookup("eggs").is_none());
        assert!(table.lookup("handful").is_none());
    }

    #[test]
    fn test_only_seeded_units_are_known() {
        let table = UnitTable::from_measurement_types(&[MeasurementType {
            id: 9,
            name: "cup".to_string(),
        }]);
        assert_eq!(table.lookup("cups").map(|m| m.id), Some(9));
        assert!(table.lookup("tsp").is_none());
    }
}
