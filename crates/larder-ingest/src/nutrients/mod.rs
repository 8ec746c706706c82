//! Nutrient integration
//!
//! Every canonical ingredient gets one association per baseline nutrient.
//! Missing associations are created as zero-valued placeholders; when a
//! [`FoodLookup`] is configured, placeholders are overwritten with values
//! from the best search hit. Lookup failures never fail the row.

pub mod fdc;

use bigdecimal::BigDecimal;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{CanonicalIngredient, IngredientId, IngredientNutrient, Nutrient};
use crate::store::{CatalogStore, StoreResult};

pub use fdc::{FdcClient, FoodDetails, FoodLookup, FoodMatch, FoodNutrientValue, LookupError};

/// A tracked nutrient and the names FoodData Central reports it under
pub struct BaselineNutrient {
    pub name: &'static str,
    pub unit: &'static str,
    pub fdc_names: &'static [&'static str],
}

pub const BASELINE_NUTRIENTS: &[BaselineNutrient] = &[
    BaselineNutrient {
        name: "Calories",
        unit: "kcal",
        fdc_names: &["Energy", "Energy (Atwater General Factors)"],
    },
    BaselineNutrient {
        name: "Protein",
        unit: "g",
        fdc_names: &["Protein"],
    },
    BaselineNutrient {
        name: "Total Fat",
        unit: "g",
        fdc_names: &["Total lipid (fat)"],
    },
    BaselineNutrient {
        name: "Carbohydrates",
        unit: "g",
        fdc_names: &["Carbohydrate, by difference"],
    },
    BaselineNutrient {
        name: "Fiber",
        unit: "g",
        fdc_names: &["Fiber, total dietary"],
    },
    BaselineNutrient {
        name: "Sugar",
        unit: "g",
        fdc_names: &["Sugars, total including NLEA", "Total Sugars", "Sugars, total"],
    },
    BaselineNutrient {
        name: "Sodium",
        unit: "mg",
        fdc_names: &["Sodium, Na"],
    },
];

const AMOUNT_SCALE: i64 = 4;

fn baseline_for(nutrient: &Nutrient) -> Option<&'static BaselineNutrient> {
    BASELINE_NUTRIENTS.iter().find(|b| b.name == nutrient.name)
}

/// Value for `baseline` in `details`, matching name and unit
fn find_value<'a>(
    baseline: &BaselineNutrient,
    details: &'a FoodDetails,
) -> Option<&'a FoodNutrientValue> {
    details.nutrients.iter().find(|value| {
        baseline.fdc_names.contains(&value.name.as_str())
            && value.unit.eq_ignore_ascii_case(baseline.unit)
    })
}

fn to_decimal(amount: f64) -> Option<BigDecimal> {
    if !amount.is_finite() {
        return None;
    }
    BigDecimal::from_str(&amount.to_string())
        .ok()
        .map(|d| d.round(AMOUNT_SCALE))
}

pub struct NutrientIntegrator {
    store: Arc<dyn CatalogStore>,
    lookup: Option<Arc<dyn FoodLookup>>,
    timeout: Duration,
    search_limit: usize,
    baseline: Option<Vec<Nutrient>>,
    /// Ingredients already sent to the lookup during this run
    attempted: HashSet<IngredientId>,
}

impl NutrientIntegrator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        lookup: Option<Arc<dyn FoodLookup>>,
        timeout: Duration,
        search_limit: usize,
    ) -> Self {
        Self {
            store,
            lookup,
            timeout,
            search_limit: search_limit.max(1),
            baseline: None,
            attempted: HashSet::new(),
        }
    }

    /// Ensure placeholders exist for every baseline nutrient, then try to
    /// enrich them once per ingredient per run
    pub async fn associate_nutrient_data(
        &mut self,
        ingredient: &CanonicalIngredient,
    ) -> StoreResult<Vec<IngredientNutrient>> {
        let baseline = self.baseline_nutrients().await?;

        let existing: HashSet<_> = self
            .store
            .ingredient_nutrients(ingredient.id)
            .await?
            .into_iter()
            .map(|a| a.nutrient_id)
            .collect();
        for nutrient in baseline.iter().filter(|n| !existing.contains(&n.id)) {
            self.store
                .insert_ingredient_nutrient_if_absent(&IngredientNutrient::placeholder(
                    ingredient.id,
                    nutrient,
                ))
                .await?;
        }

        let associations = self.store.ingredient_nutrients(ingredient.id).await?;
        let has_placeholders = associations.iter().any(|a| a.is_placeholder);
        if !has_placeholders || !self.attempted.insert(ingredient.id) {
            return Ok(associations);
        }
        let Some(lookup) = self.lookup.clone() else {
            return Ok(associations);
        };

        let details = match tokio::time::timeout(
            self.timeout,
            Self::fetch_details(lookup.as_ref(), &ingredient.name, self.search_limit),
        )
        .await
        {
            Ok(Ok(Some(details))) => details,
            Ok(Ok(None)) => {
                debug!(ingredient = %ingredient.name, "No food data match");
                return Ok(associations);
            },
            Ok(Err(e)) => {
                warn!(ingredient = %ingredient.name, error = %e, "Nutrient lookup failed; keeping placeholders");
                return Ok(associations);
            },
            Err(_) => {
                let e = LookupError::Timeout(self.timeout);
                warn!(ingredient = %ingredient.name, error = %e, "Nutrient lookup failed; keeping placeholders");
                return Ok(associations);
            },
        };

        let mut enriched = 0usize;
        for association in associations.iter().filter(|a| a.is_placeholder) {
            let Some(nutrient) = baseline.iter().find(|n| n.id == association.nutrient_id) else {
                continue;
            };
            let Some(value) = baseline_for(nutrient).and_then(|b| find_value(b, &details)) else {
                continue;
            };
            let Some(amount) = to_decimal(value.amount) else {
                continue;
            };
            let updated = association.clone().enriched(
                amount,
                value.unit.to_lowercase(),
                details.fdc_id,
            );
            self.store.save_ingredient_nutrient(&updated).await?;
            enriched += 1;
        }
        debug!(
            ingredient = %ingredient.name,
            fdc_id = details.fdc_id,
            enriched,
            "Nutrient placeholders enriched"
        );

        self.store.ingredient_nutrients(ingredient.id).await
    }

    async fn baseline_nutrients(&mut self) -> StoreResult<Vec<Nutrient>> {
        if let Some(cached) = &self.baseline {
            return Ok(cached.clone());
        }
        let mut nutrients = Vec::with_capacity(BASELINE_NUTRIENTS.len());
        for baseline in BASELINE_NUTRIENTS {
            let (nutrient, _) = self
                .store
                .find_or_create_nutrient(baseline.name, baseline.unit)
                .await?;
            nutrients.push(nutrient);
        }
        self.baseline = Some(nutrients.clone());
        Ok(nutrients)
    }

    /// Best search hit's details, if any
    async fn fetch_details(
        lookup: &dyn FoodLookup,
        name: &str,
        limit: usize,
    ) -> Result<Option<FoodDetails>, LookupError> {
        let foods = lookup.search_foods(name, limit).await?;
        let best = foods.into_iter().max_by(|a, b| {
            a.score
                .unwrap_or(0.0)
                .total_cmp(&b.score.unwrap_or(0.0))
                .then(b.fdc_id.cmp(&a.fdc_id))
        });
        match best {
            Some(food) => lookup.get_food_details(food.fdc_id).await.map(Some),
            None => Ok(None),
        }
    }
}
