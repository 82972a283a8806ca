//! Core data model: dishes, ingredients, weekly plans and user profiles.
//!
//! Document shapes use camelCase field names to match the per-user documents
//! in the cloud store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngredientCategory {
    Produce,
    Protein,
    Dairy,
    Pantry,
    Spices,
}

impl Default for IngredientCategory {
    fn default() -> Self {
        IngredientCategory::Pantry
    }
}

/// One ingredient line of a dish. Immutable once attached: `quantity` keeps
/// the original free-text string so re-scaling stays lossless.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    pub quantity: String,
    #[serde(default)]
    pub category: IngredientCategory,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub protein: f32,
    pub carbs: f32,
    pub fat: f32,
    pub calories: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub local_name: String,
    pub description: String,
    pub cuisine: String,
    pub meal_type: String,
    #[serde(default)]
    pub macros: Macros,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub health_tags: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_staple: Option<bool>,
}

/// One day of the weekly plan. Slots hold full dish snapshots, not ids, so
/// historical plans stay meaningful when the approved set changes later.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlan {
    pub day: String,
    #[serde(default)]
    pub lunch: Option<Dish>,
    #[serde(default)]
    pub dinner: Option<Dish>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub dietary_tags: Vec<String>,
    #[serde(default)]
    pub health_tags: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
    #[serde(default)]
    pub cuisine_preferences: Vec<String>,
    #[serde(default)]
    pub daily_macro_targets: Option<Macros>,
}

/// Which plan slot a generation request targets. Drives both the prompt and
/// the exact-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationMode {
    Any,
    Lunch,
    Dinner,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Any => "any",
            GenerationMode::Lunch => "lunch",
            GenerationMode::Dinner => "dinner",
        }
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Structural contract for a generated dish candidate. Extra fields are
/// permitted and ignored; a failing candidate is dropped from the batch,
/// never surfaced as an error.
pub fn is_valid_dish(candidate: &Value) -> bool {
    let Some(obj) = candidate.as_object() else {
        return false;
    };
    let name_ok = obj
        .get("name")
        .and_then(Value::as_str)
        .map_or(false, |s| s.len() >= 2);
    let description_ok = obj
        .get("description")
        .and_then(Value::as_str)
        .map_or(false, |s| s.len() >= 10);
    name_ok
        && description_ok
        && non_empty_str(candidate, "cuisine").is_some()
        && non_empty_str(candidate, "type").is_some()
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

impl Dish {
    /// Materializes a validated candidate into a `Dish` with a fresh id.
    /// Returns `None` when the candidate fails the structural contract.
    pub fn from_candidate(candidate: &Value) -> Option<Dish> {
        if !is_valid_dish(candidate) {
            return None;
        }
        let str_field = |key: &str| {
            candidate
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let macros = candidate
            .get("macros")
            .cloned()
            .and_then(|v| serde_json::from_value::<Macros>(v).ok())
            .unwrap_or_default();
        let ingredients = candidate
            .get("ingredients")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(Ingredient {
                            name: item.get("name")?.as_str()?.to_string(),
                            quantity: item
                                .get("quantity")
                                .and_then(Value::as_str)
                                .unwrap_or("1")
                                .to_string(),
                            category: item
                                .get("category")
                                .cloned()
                                .and_then(|v| serde_json::from_value(v).ok())
                                .unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Dish {
            id: Uuid::new_v4().to_string(),
            name: str_field("name"),
            local_name: str_field("localName"),
            description: str_field("description"),
            cuisine: str_field("cuisine"),
            meal_type: str_field("type"),
            macros,
            ingredients,
            instructions: string_list(candidate, "instructions"),
            tags: string_list(candidate, "tags"),
            health_tags: string_list(candidate, "healthTags"),
            allergens: string_list(candidate, "allergens"),
            servings: candidate
                .get("servings")
                .and_then(Value::as_u64)
                .map(|v| v as u32),
            user_notes: None,
            is_staple: None,
        })
    }

    /// The descriptive text embedded for semantic duplicate checks.
    pub fn embedding_text(&self) -> String {
        format!("{}: {}", self.name, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_valid() -> Value {
        json!({
            "name": "Dal Fry",
            "description": "A delicious lentil dish",
            "cuisine": "Indian",
            "type": "Lunch"
        })
    }

    #[test]
    fn accepts_minimal_valid_candidate() {
        assert!(is_valid_dish(&minimal_valid()));
    }

    #[test]
    fn rejects_boundary_violations() {
        let mut short_name = minimal_valid();
        short_name["name"] = json!("D");
        assert!(!is_valid_dish(&short_name));

        let mut short_description = minimal_valid();
        short_description["description"] = json!("123456789"); // 9 chars
        assert!(!is_valid_dish(&short_description));

        let mut empty_cuisine = minimal_valid();
        empty_cuisine["cuisine"] = json!("");
        assert!(!is_valid_dish(&empty_cuisine));

        for missing in ["name", "description", "cuisine", "type"] {
            let mut candidate = minimal_valid();
            candidate.as_object_mut().unwrap().remove(missing);
            assert!(!is_valid_dish(&candidate), "missing {missing} must fail");
        }
    }

    #[test]
    fn rejects_non_objects() {
        assert!(!is_valid_dish(&json!(null)));
        assert!(!is_valid_dish(&json!("Dal Fry")));
        assert!(!is_valid_dish(&json!([1, 2, 3])));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let mut candidate = minimal_valid();
        candidate["unexpected"] = json!({"nested": true});
        assert!(is_valid_dish(&candidate));
    }

    #[test]
    fn from_candidate_assigns_fresh_ids() {
        let candidate = minimal_valid();
        let a = Dish::from_candidate(&candidate).unwrap();
        let b = Dish::from_candidate(&candidate).unwrap();
        assert_eq!(a.name, "Dal Fry");
        assert_eq!(a.meal_type, "Lunch");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn from_candidate_parses_ingredients_leniently() {
        let mut candidate = minimal_valid();
        candidate["ingredients"] = json!([
            {"name": "Toor Dal", "quantity": "1 cup", "category": "Pantry"},
            {"name": "Ghee"},
            {"quantity": "2 tsp"}
        ]);
        let dish = Dish::from_candidate(&candidate).unwrap();
        assert_eq!(dish.ingredients.len(), 2); // nameless entry dropped
        assert_eq!(dish.ingredients[1].quantity, "1");
    }
}
