//! Consolidated shopping-list building over a planned week.
//!
//! The list is derived, never persisted: it is recomputed in full on every
//! request so it can never drift from the current plan/pantry state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dish::{DayPlan, IngredientCategory};
use crate::quantity::{parse_quantity, split_leading_number};

/// A derived shopping-list line. `total_quantity` sums parsed magnitudes;
/// the unit string is kept from the first occurrence, so mixed units for the
/// same ingredient sum as raw numbers. Known limitation, kept per app
/// behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroceryItem {
    pub name: String,
    pub category: IngredientCategory,
    pub total_quantity: f32,
    pub unit: String,
    pub source_dishes: Vec<String>,
    pub is_stocked: bool,
}

/// The normalization fold used for stock matching: lowercase, trim, strip
/// non-alphanumerics, singularize by removing one trailing "s".
pub fn normalize_ingredient_name(name: &str) -> String {
    let mut folded: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if folded.len() > 1 && folded.ends_with('s') {
        folded.pop();
    }
    folded
}

/// The app-level pantry matcher used for swipe-deck display: equal after
/// normalization, or substring containment in either direction. Looser than
/// the grocery stock check; the two are deliberately distinct contracts.
pub fn fuzzy_pantry_match(recipe_ingredient: &str, pantry_name: &str) -> bool {
    let a = normalize_ingredient_name(recipe_ingredient);
    let b = normalize_ingredient_name(pantry_name);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

/// Folds every non-null lunch/dinner slot of the week into one consolidated
/// list. Quantities with a parseable leading number contribute their
/// magnitude; unparsable quantities count as 1 and keep the literal string as
/// the unit. Output ordering is not stable; grouping-key uniqueness is the
/// only contract.
pub fn generate_grocery_list(week: &[DayPlan], pantry_names: &[String]) -> Vec<GroceryItem> {
    let stocked: Vec<String> = pantry_names
        .iter()
        .map(|n| normalize_ingredient_name(n))
        .filter(|n| !n.is_empty())
        .collect();

    let mut grouped: HashMap<String, GroceryItem> = HashMap::new();

    for day in week {
        for dish in [day.lunch.as_ref(), day.dinner.as_ref()].into_iter().flatten() {
            for ingredient in &dish.ingredients {
                let key = ingredient.name.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }

                let (numeric_part, rest) = split_leading_number(&ingredient.quantity);
                let (magnitude, unit) = match parse_quantity(numeric_part) {
                    Some(value) => (value, rest.trim().to_string()),
                    None => (1.0, ingredient.quantity.trim().to_string()),
                };

                let entry = grouped.entry(key).or_insert_with(|| GroceryItem {
                    name: ingredient.name.trim().to_string(),
                    category: ingredient.category,
                    total_quantity: 0.0,
                    unit,
                    source_dishes: Vec::new(),
                    is_stocked: false,
                });
                entry.total_quantity += magnitude;
                if !entry.source_dishes.contains(&dish.name) {
                    entry.source_dishes.push(dish.name.clone());
                }
            }
        }
    }

    let mut items: Vec<GroceryItem> = grouped.into_values().collect();
    for item in &mut items {
        let normalized = normalize_ingredient_name(&item.name);
        item.is_stocked = stocked.iter().any(|p| *p == normalized);
    }
    items
}
