//! Recipe row parsing
//!
//! - [`list`]: list-shaped text blocks (`['a', "b"]` or one item per line)
//! - [`units`]: measurement unit aliases
//! - [`ingredient`]: one ingredient line to quantity, unit and canonical
//!   ingredient
//! - [`steps`]: instruction text to numbered steps
//! - [`recipe`]: one raw row to a [`recipe::ParsedRecipe`]

pub mod ingredient;
pub mod list;
pub mod recipe;
pub mod steps;
pub mod units;

pub use ingredient::{IngredientLine, IngredientParser, LineSkip, ResolvedIngredient};
pub use recipe::{ParsedRecipe, RecipeIngredient, RecipeParser, RowFailure};
pub use steps::{ParsedStep, StepParser};
pub use units::{Unit, UnitTable};
