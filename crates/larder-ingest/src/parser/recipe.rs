//! Recipe parser
//!
//! Turns one [`RawRow`] into a [`ParsedRecipe`], creating canonical
//! ingredients and their nutrient associations along the way. Failures are
//! classified so the orchestrator can count them:
//!
//! | Condition                                   | Result                  |
//! |---------------------------------------------|-------------------------|
//! | blank or missing title                      | `RowFailure::Skip`      |
//! | ingredient block present but not list-shaped| `RowFailure::Malformed` |
//! | store error                                 | `RowFailure::Store`     |
//! | no ingredient block, or no parseable lines  | imported, no ingredients|
//! | unparsable cook time or servings            | field omitted           |
//!
//! Cook time accepts "45", "20 min", "1 hour 30 minutes" or "1h30m".
//! Servings accepts "4", "4 servings" or a range such as "4-6" (lower bound).

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use super::ingredient::IngredientParser;
use super::list::parse_list_block;
use super::steps::{ParsedStep, StepParser};
use super::units::Unit;
use crate::models::IngredientId;
use crate::nutrients::NutrientIntegrator;
use crate::source::RawRow;
use crate::store::StoreError;

/// One ingredient line of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    /// 1-based order within the recipe
    pub position: i32,
    pub ingredient_id: IngredientId,
    /// Normalized canonical name
    pub ingredient_name: String,
    pub quantity: Option<BigDecimal>,
    pub unit: Unit,
    pub original_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecipe {
    /// Record number in the source
    pub source_record: u64,
    pub name: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub steps: Vec<ParsedStep>,
    pub ingredients: Vec<RecipeIngredient>,
    pub cook_time_minutes: Option<i32>,
    pub servings: Option<i32>,
}

/// Why a row did not produce a recipe
#[derive(Error, Debug)]
pub enum RowFailure {
    #[error("skipped: {0}")]
    Skip(String),

    #[error("malformed: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

const HOUR_WORDS: &[&str] = &["h", "hr", "hrs", "hour", "hours"];
const MINUTE_WORDS: &[&str] = &["m", "min", "mins", "minute", "minutes"];
const SERVING_WORDS: &[&str] = &["serving", "servings", "people", "persons", "portions"];

/// Split into digit runs and letter runs; `None` on any other character
fn duration_tokens(text: &str) -> Option<Vec<&str>> {
    let mut tokens = Vec::new();
    let mut start: Option<(usize, bool)> = None;
    for (i, c) in text.char_indices() {
        let kind = if c.is_ascii_digit() {
            Some(true)
        } else if c.is_ascii_alphabetic() {
            Some(false)
        } else if c.is_whitespace() {
            None
        } else {
            return None;
        };
        match (start, kind) {
            (Some((s, digits)), Some(k)) if digits != k => {
                tokens.push(&text[s..i]);
                start = Some((i, k));
            },
            (Some((s, _)), None) => {
                tokens.push(&text[s..i]);
                start = None;
            },
            (None, Some(k)) => start = Some((i, k)),
            _ => {},
        }
    }
    if let Some((s, _)) = start {
        tokens.push(&text[s..]);
    }
    Some(tokens)
}

/// Total minutes from "45", "20 min", "1 hour 30 minutes", "1h30m"
fn parse_minutes(text: Option<&str>) -> Option<i32> {
    let text = text?.trim().to_lowercase();
    let tokens = duration_tokens(&text)?;
    if tokens.is_empty() {
        return None;
    }

    let mut total: i32 = 0;
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        let value: i32 = token.parse().ok()?;
        let factor = match iter.peek() {
            Some(unit) if HOUR_WORDS.contains(unit) => 60,
            Some(unit) if MINUTE_WORDS.contains(unit) => 1,
            // a bare number is only accepted as the last token
            Some(_) => return None,
            None => 1,
        };
        if iter.peek().is_some() {
            iter.next();
        }
        total = total.checked_add(value.checked_mul(factor)?)?;
    }
    Some(total)
}

/// "4", "4 servings", or the lower bound of "4-6" / "4 to 6"
fn parse_servings(text: Option<&str>) -> Option<i32> {
    let text = text?.trim().to_lowercase();
    let mut words: Vec<&str> = text.split_whitespace().collect();
    if words.last().is_some_and(|w| SERVING_WORDS.contains(w)) {
        words.pop();
    }
    let number = words.join(" ");
    if let Ok(n) = number.parse::<i32>() {
        return Some(n);
    }

    let (low, high) = number
        .split_once('-')
        .or_else(|| number.split_once(" to "))?;
    let low: i32 = low.trim().parse().ok()?;
    let high: i32 = high.trim().parse().ok()?;
    (low <= high).then_some(low)
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub struct RecipeParser {
    ingredients: IngredientParser,
    steps: StepParser,
    nutrients: NutrientIntegrator,
}

impl RecipeParser {
    pub fn new(
        ingredients: IngredientParser,
        steps: StepParser,
        nutrients: NutrientIntegrator,
    ) -> Self {
        Self {
            ingredients,
            steps,
            nutrients,
        }
    }

    pub async fn parse(&mut self, row: &RawRow) -> Result<ParsedRecipe, RowFailure> {
        let Some(name) = non_blank(row.title.as_deref()) else {
            return Err(RowFailure::Skip("missing title".to_string()));
        };

        let lines = parse_list_block(row.ingredients.as_deref().unwrap_or_default())
            .map_err(|e| RowFailure::Malformed(format!("ingredients: {}", e)))?;

        let mut ingredients = Vec::with_capacity(lines.len());
        let mut integrated = HashSet::new();
        for text in &lines {
            let Some(resolved) = self.ingredients.parse_line(text).await? else {
                continue;
            };
            if integrated.insert(resolved.ingredient.id) {
                self.nutrients
                    .associate_nutrient_data(&resolved.ingredient)
                    .await?;
            }
            ingredients.push(RecipeIngredient {
                position: ingredients.len() as i32 + 1,
                ingredient_id: resolved.ingredient.id,
                ingredient_name: resolved.ingredient.name,
                quantity: resolved.line.quantity,
                unit: resolved.line.unit,
                original_text: resolved.line.original_text,
            });
        }

        let instructions = non_blank(row.instructions.as_deref());
        let steps = instructions
            .as_deref()
            .map(|text| self.steps.parse_instructions(text))
            .unwrap_or_default();

        debug!(
            record = row.record_number,
            ingredients = ingredients.len(),
            steps = steps.len(),
            "Recipe parsed"
        );

        Ok(ParsedRecipe {
            source_record: row.record_number,
            name,
            description: non_blank(row.description.as_deref()),
            instructions,
            steps,
            ingredients,
            cook_time_minutes: parse_minutes(row.cook_time.as_deref()),
            servings: parse_servings(row.servings.as_deref()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::units::seeded_table;
    use crate::store::MemoryStore;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    fn parser(store: Arc<MemoryStore>) -> RecipeParser {
        RecipeParser::new(
            IngredientParser::new(seeded_table(), store.clone()),
            StepParser::new().unwrap(),
            NutrientIntegrator::new(store, None, Duration::from_secs(1), 5),
        )
    }

    fn row(title: Option<&str>, ingredients: Option<&str>) -> RawRow {
        RawRow {
            record_number: 1,
            title: title.map(String::from),
            ingredients: ingredients.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_row() {
        let store = Arc::new(MemoryStore::new());
        let mut parser = parser(store.clone());
        let raw = RawRow {
            record_number: 7,
            title: Some("  Pancakes ".into()),
            description: Some("Fluffy".into()),
            ingredients: Some("['1 1/2 cups flour', '2 eggs', '', '1 cup milk']".into()),
            instructions: Some("Mix. Fry.".into()),
            cook_time: Some("20 minutes".into()),
            servings: Some("4-6".into()),
        };

        let recipe = parser.parse(&raw).await.unwrap();

        assert_eq!(recipe.source_record, 7);
        assert_eq!(recipe.name, "Pancakes");
        assert_eq!(recipe.ingredients.len(), 3);
        assert_eq!(recipe.ingredients[0].position, 1);
        assert_eq!(
            recipe.ingredients[0].quantity,
            Some(BigDecimal::from_str("1.5").unwrap())
        );
        assert_eq!(recipe.ingredients[1].ingredient_name, "eggs");
        assert_eq!(recipe.ingredients[2].position, 3);
        assert_eq!(recipe.steps.len(), 2);
        assert_eq!(recipe.cook_time_minutes, Some(20));
        assert_eq!(recipe.servings, Some(4));
        assert_eq!(
            store.all_ingredient_nutrients().await.len(),
            3 * crate::nutrients::BASELINE_NUTRIENTS.len()
        );
    }

    #[tokio::test]
    async fn test_blank_title_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut parser = parser(store.clone());

        let err = parser
            .parse(&row(Some("   "), Some("['1 cup flour']")))
            .await
            .unwrap_err();
        assert!(matches!(err, RowFailure::Skip(_)));
        assert!(store.ingredients().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_ingredients() {
        let store = Arc::new(MemoryStore::new());
        let mut parser = parser(store);

        let err = parser
            .parse(&row(Some("Soup"), Some("{not a list")))
            .await
            .unwrap_err();
        assert!(matches!(err, RowFailure::Malformed(_)));
    }

    #[tokio::test]
    async fn test_missing_or_empty_ingredients_still_import() {
        let store = Arc::new(MemoryStore::new());
        let mut parser = parser(store);

        let recipe = parser.parse(&row(Some("Water"), None)).await.unwrap();
        assert!(recipe.ingredients.is_empty());

        let recipe = parser
            .parse(&row(Some("Air"), Some("['', '2 1/2']")))
            .await
            .unwrap();
        assert!(recipe.ingredients.is_empty());
    }

    #[tokio::test]
    async fn test_bad_numbers_are_omitted() {
        let store = Arc::new(MemoryStore::new());
        let mut parser = parser(store);
        let raw = RawRow {
            cook_time: Some("about an hour".into()),
            servings: Some("".into()),
            ..row(Some("Stew"), None)
        };

        let recipe = parser.parse(&raw).await.unwrap();
        assert_eq!(recipe.cook_time_minutes, None);
        assert_eq!(recipe.servings, None);
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_minutes(Some("45")), Some(45));
        assert_eq!(parse_minutes(Some(" 90 min")), Some(90));
        assert_eq!(parse_minutes(Some("20 Minutes")), Some(20));
        assert_eq!(parse_minutes(Some("1 hour 30 minutes")), Some(90));
        assert_eq!(parse_minutes(Some("2 hours")), Some(120));
        assert_eq!(parse_minutes(Some("1h30m")), Some(90));
        assert_eq!(parse_minutes(Some("1 hour and 30 minutes")), None);
        assert_eq!(parse_minutes(Some("45 seconds")), None);
        assert_eq!(parse_minutes(Some("1.5 hours")), None);
        assert_eq!(parse_minutes(Some("PT20M")), None);
        assert_eq!(parse_minutes(Some("99999999999")), None);
        assert_eq!(parse_minutes(Some("   ")), None);
        assert_eq!(parse_minutes(None), None);
    }

    #[test]
    fn test_parse_servings() {
        assert_eq!(parse_servings(Some("4")), Some(4));
        assert_eq!(parse_servings(Some("4 servings")), Some(4));
        assert_eq!(parse_servings(Some("4-6")), Some(4));
        assert_eq!(parse_servings(Some("4 to 6")), Some(4));
        assert_eq!(parse_servings(Some("6-4")), None);
        assert_eq!(parse_servings(Some("4 dozen cookies")), None);
        assert_eq!(parse_servings(Some("serves many")), None);
        assert_eq!(parse_servings(None), None);
    }
}
