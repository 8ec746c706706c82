//! Ingredient line parser
//!
//! `"1 1/2 cups All-Purpose Flour, sifted"` becomes quantity `1.5`, unit
//! `cup` and ingredient `all-purpose flour`. Text parsing is pure
//! ([`parse_line_text`]); resolving the name to a canonical ingredient goes
//! through a per-run cache and then the catalog store.

use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::units::{Unit, UnitTable};
use crate::models::CanonicalIngredient;
use crate::store::{CatalogStore, StoreResult};

/// Fractional quantities are kept to this many decimal places
const QUANTITY_SCALE: i64 = 4;

/// Parsed text of one ingredient line, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientLine {
    pub original_text: String,
    pub quantity: Option<BigDecimal>,
    pub unit: Unit,
    /// Name as written
    pub name: String,
    /// Trimmed, lowercased, single-spaced lookup key
    pub normalized_name: String,
}

/// Why a line produced no ingredient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSkip {
    Empty,
    NoIngredientName,
}

/// A parsed line bound to its canonical ingredient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIngredient {
    pub line: IngredientLine,
    pub ingredient: CanonicalIngredient,
}

pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn vulgar_fraction(c: char) -> Option<(u32, u32)> {
    Some(match c {
        '½' => (1, 2),
        '⅓' => (1, 3),
        '⅔' => (2, 3),
        '¼' => (1, 4),
        '¾' => (3, 4),
        '⅕' => (1, 5),
        '⅛' => (1, 8),
        '⅜' => (3, 8),
        '⅝' => (5, 8),
        '⅞' => (7, 8),
        _ => return None,
    })
}

fn ratio(numerator: u32, denominator: u32) -> Option<BigDecimal> {
    if denominator == 0 {
        return None;
    }
    Some((BigDecimal::from(numerator) / BigDecimal::from(denominator)).round(QUANTITY_SCALE))
}

/// `1`, `1.5`, `.5`
fn parse_number(token: &str) -> Option<BigDecimal> {
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    let dots = token.chars().filter(|c| *c == '.').count();
    if digits == 0 || dots > 1 || digits + dots != token.len() || token.ends_with('.') {
        return None;
    }
    if token.starts_with('.') {
        return BigDecimal::from_str(&format!("0{}", token)).ok();
    }
    BigDecimal::from_str(token).ok()
}

/// `1/2`, `½`
fn parse_fraction(token: &str) -> Option<BigDecimal> {
    let mut chars = token.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some((n, d)) = vulgar_fraction(c) {
            return ratio(n, d);
        }
    }
    let (numerator, denominator) = token.split_once(['/', '⁄'])?;
    ratio(numerator.parse().ok()?, denominator.parse().ok()?)
}

/// One token holding a complete amount: number, fraction, `1½`, or a range
/// (`2-3`, lower bound)
fn parse_amount(token: &str) -> Option<BigDecimal> {
    if let Some(value) = parse_number(token).or_else(|| parse_fraction(token)) {
        return Some(value);
    }

    if let Some((low, high)) = token.split_once(['-', '–']) {
        let low = parse_amount(low)?;
        parse_amount(high)?;
        return Some(low);
    }

    let last = token.chars().last()?;
    if vulgar_fraction(last).is_some() {
        let whole = &token[..token.len() - last.len_utf8()];
        let whole: u32 = whole.parse().ok()?;
        return Some(BigDecimal::from(whole) + parse_fraction(&last.to_string())?);
    }

    None
}

fn is_whole(value: &BigDecimal) -> bool {
    value.is_integer()
}

/// Leading quantity and how many tokens it used
fn parse_quantity(tokens: &[&str]) -> (Option<BigDecimal>, usize) {
    let Some(first) = tokens.first().and_then(|t| parse_amount(t)) else {
        return (None, 0);
    };

    // Mixed number written as two tokens: "1 1/2"
    if is_whole(&first) && !tokens[0].contains(['-', '–']) {
        if let Some(fraction) = tokens.get(1).and_then(|t| parse_fraction(t)) {
            if fraction < BigDecimal::from(1) {
                return (Some(first + fraction), 2);
            }
        }
    }

    (Some(first), 1)
}

fn strip_parentheticals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {},
        }
    }
    out
}

/// Name part of a line: drop a leading "of", parentheticals and anything
/// after the first comma ("onion, finely chopped")
fn clean_name(rest: &str) -> String {
    let without_notes = strip_parentheticals(rest);
    let head = without_notes
        .split_once(',')
        .map_or(without_notes.as_str(), |(head, _)| head);
    let head = head.trim();
    let head = head
        .strip_prefix("of ")
        .or_else(|| head.strip_prefix("Of "))
        .unwrap_or(head);
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse one ingredient line without touching the store
pub fn parse_line_text(text: &str, units: &UnitTable) -> Result<IngredientLine, LineSkip> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LineSkip::Empty);
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let (quantity, mut consumed) = parse_quantity(&tokens);

    // A unit needs a name after it; a bare "1 tsp" names no ingredient.
    let mut unit = Unit::Unknown;
    if let Some(measurement) = tokens.get(consumed).and_then(|t| units.lookup(t)) {
        if consumed + 1 == tokens.len() {
            return Err(LineSkip::NoIngredientName);
        }
        unit = Unit::Known(measurement.clone());
        consumed += 1;
    }

    let name = clean_name(&tokens[consumed..].join(" "));
    if !name.chars().any(char::is_alphabetic) {
        return Err(LineSkip::NoIngredientName);
    }

    Ok(IngredientLine {
        original_text: trimmed.to_string(),
        quantity,
        unit,
        normalized_name: normalize_name(&name),
        name,
    })
}

/// Resolves normalized names to canonical ingredients
///
/// The cache lives for one ingestion run. Names missing from both the cache
/// and the store are created with the casing of their first sighting.
pub struct IngredientResolver {
    store: Arc<dyn CatalogStore>,
    cache: HashMap<String, CanonicalIngredient>,
}

impl IngredientResolver {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    pub async fn resolve(&mut self, line: &IngredientLine) -> StoreResult<CanonicalIngredient> {
        if let Some(cached) = self.cache.get(&line.normalized_name) {
            return Ok(cached.clone());
        }

        let ingredient = match self.store.find_ingredient(&line.normalized_name).await? {
            Some(existing) => existing,
            None => {
                let created = self
                    .store
                    .create_ingredient(&line.normalized_name, &line.name)
                    .await?;
                debug!(id = created.id, name = %created.name, "Created canonical ingredient");
                created
            },
        };

        self.cache
            .insert(line.normalized_name.clone(), ingredient.clone());
        Ok(ingredient)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

pub struct IngredientParser {
    units: UnitTable,
    resolver: IngredientResolver,
}

impl IngredientParser {
    pub fn new(units: UnitTable, store: Arc<dyn CatalogStore>) -> Self {
        Self {
            units,
            resolver: IngredientResolver::new(store),
        }
    }

    /// `Ok(None)` when the line holds no ingredient
    pub async fn parse_line(&mut self, text: &str) -> StoreResult<Option<ResolvedIngredient>> {
        let line = match parse_line_text(text, &self.units) {
            Ok(line) => line,
            Err(reason) => {
                debug!(?reason, text, "Ingredient line skipped");
                return Ok(None);
            },
        };

        let ingredient = self.resolver.resolve(&line).await?;
        Ok(Some(ResolvedIngredient { line, ingredient }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::units::seeded_table;
    use crate::store::MemoryStore;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn parse(text: &str) -> IngredientLine {
        parse_line_text(text, &seeded_table()).unwrap()
    }

    #[test]
    fn test_fraction_with_unit() {
        let line = parse("1/2 tsp salt");
        assert_eq!(line.quantity, Some(dec("0.5")));
        assert_eq!(line.unit.name(), Some("tsp"));
        assert_eq!(line.normalized_name, "salt");
    }

    #[test]
    fn test_count_without_unit() {
        let line = parse("3 eggs");
        assert_eq!(line.quantity, Some(dec("3")));
        assert_eq!(line.unit, Unit::Unknown);
        assert_eq!(line.name, "eggs");
    }

    #[test]
    fn test_quantity_forms() {
        assert_eq!(parse("1 1/2 cups flour").quantity, Some(dec("1.5")));
        assert_eq!(parse("1.25 cups milk").quantity, Some(dec("1.25")));
        assert_eq!(parse(".5 lb butter").quantity, Some(dec("0.5")));
        assert_eq!(parse("½ cup sugar").quantity, Some(dec("0.5")));
        assert_eq!(parse("1½ cups oats").quantity, Some(dec("1.5")));
        assert_eq!(parse("2 ¾ cups water").quantity, Some(dec("2.75")));
        assert_eq!(parse("2-3 cloves garlic").quantity, Some(dec("2")));
        assert_eq!(parse("1/3 cup oil").quantity, Some(dec("0.3333")));
        assert_eq!(parse("salt to taste").quantity, None);
    }

    #[test]
    fn test_unit_aliases_and_case() {
        let line = parse("2 Tablespoons Olive Oil");
        assert_eq!(line.unit.name(), Some("tbsp"));
        assert_eq!(line.name, "Olive Oil");
        assert_eq!(line.normalized_name, "olive oil");
    }

    #[test]
    fn test_unmatched_unit_stays_in_name() {
        let line = parse("2 handfuls spinach");
        assert_eq!(line.unit, Unit::Unknown);
        assert_eq!(line.normalized_name, "handfuls spinach");
    }

    #[test]
    fn test_unit_without_name_is_skipped() {
        let table = seeded_table();
        assert_eq!(parse_line_text("1 tsp", &table), Err(LineSkip::NoIngredientName));
        assert_eq!(parse_line_text("2 Cans.", &table), Err(LineSkip::NoIngredientName));
        assert_eq!(parse_line_text("pinch", &table), Err(LineSkip::NoIngredientName));

        // not a unit, so it is the ingredient
        let line = parse("3 eggs");
        assert_eq!(line.name, "eggs");
    }

    #[test]
    fn test_notes_are_dropped() {
        let line = parse("1 cup onion (about 1 medium), finely chopped");
        assert_eq!(line.normalized_name, "onion");
        let line = parse("1 pinch of Salt");
        assert_eq!(line.unit.name(), Some("pinch"));
        assert_eq!(line.name, "Salt");
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        let line = parse("  2   cups   brown    sugar ");
        assert_eq!(line.normalized_name, "brown sugar");
        assert_eq!(line.original_text, "2   cups   brown    sugar");
    }

    #[test]
    fn test_skips() {
        let table = seeded_table();
        assert_eq!(parse_line_text("   ", &table), Err(LineSkip::Empty));
        assert_eq!(parse_line_text("2 1/2", &table), Err(LineSkip::NoIngredientName));
        assert_eq!(parse_line_text("3 (15)", &table), Err(LineSkip::NoIngredientName));
    }

    #[tokio::test]
    async fn test_same_name_resolves_once() {
        let store = Arc::new(MemoryStore::new());
        let mut parser = IngredientParser::new(seeded_table(), store.clone());

        let first = parser.parse_line("2 cups flour").await.unwrap().unwrap();
        let second = parser.parse_line("1 cup Flour").await.unwrap().unwrap();

        assert_eq!(first.ingredient.id, second.ingredient.id);
        assert_eq!(first.ingredient.name, "flour");
        assert_eq!(store.ingredients().await.len(), 1);
        assert_eq!(parser.resolver.cached(), 1);
    }

    #[tokio::test]
    async fn test_existing_ingredient_is_reused() {
        let store = Arc::new(MemoryStore::new());
        let existing = store.create_ingredient("butter", "Butter").await.unwrap();
        let mut parser = IngredientParser::new(seeded_table(), store.clone());

        let resolved = parser.parse_line("1 stick butter").await.unwrap().unwrap();
        assert_eq!(resolved.ingredient, existing);
        assert_eq!(resolved.line.unit.name(), Some("stick"));
    }

    #[tokio::test]
    async fn test_skipped_line_creates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut parser = IngredientParser::new(seeded_table(), store.clone());

        assert!(parser.parse_line("").await.unwrap().is_none());
        assert!(parser.parse_line("1 tsp").await.unwrap().is_none());
        assert!(store.ingredients().await.is_empty());
    }
}
