//! Catalog entities shared across recipes and jobs

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type IngredientId = i64;
pub type MeasurementTypeId = i64;
pub type NutrientId = i64;
pub type RecipeId = i64;

/// Source tag for zero-valued associations
pub const PLACEHOLDER_SOURCE: &str = "placeholder";

/// One ingredient shared by every recipe that mentions it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalIngredient {
    pub id: IngredientId,
    /// Lookup key: trimmed, lowercased, single-spaced
    pub name: String,
    /// Casing from the first line that created it
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Reference row for a unit of measure (`tsp`, `cup`, `g`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementType {
    pub id: MeasurementTypeId,
    pub name: String,
}

/// Reference row for a tracked nutrient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nutrient {
    pub id: NutrientId,
    pub name: String,
    /// Default unit (`kcal`, `g`, `mg`)
    pub unit: String,
}

/// Nutrient fact attached to an ingredient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientNutrient {
    pub ingredient_id: IngredientId,
    pub nutrient_id: NutrientId,
    pub amount: BigDecimal,
    pub unit: String,
    pub is_placeholder: bool,
    /// `placeholder` or `fdc:<food id>`
    pub source: String,
}

impl IngredientNutrient {
    /// Zero-valued association awaiting enrichment
    pub fn placeholder(ingredient_id: IngredientId, nutrient: &Nutrient) -> Self {
        Self {
            ingredient_id,
            nutrient_id: nutrient.id,
            amount: BigDecimal::from(0),
            unit: nutrient.unit.clone(),
            is_placeholder: true,
            source: PLACEHOLDER_SOURCE.to_string(),
        }
    }

    /// Replace the placeholder value with a looked-up one
    pub fn enriched(mut self, amount: BigDecimal, unit: impl Into<String>, fdc_id: i64) -> Self {
        self.amount = amount;
        self.unit = unit.into();
        self.is_placeholder = false;
        self.source = format!("fdc:{}", fdc_id);
        self
    }
}

/// Row counts of the reference tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCounts {
    pub measurement_types: u64,
    pub nutrients: u64,
}
