//! Pantry inventory reconciliation.
//!
//! All operations here are pure: they take the current inventory by
//! reference and return a new vector, never mutating the input. The UI's
//! optimistic-update model depends on that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dish::IngredientCategory;
use crate::grocery::normalize_ingredient_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PantryQuantityType {
    /// In stock or not.
    Binary,
    /// Rough 1-3 level (low / some / full).
    Loose,
    /// Exact integer count.
    Discrete,
}

pub const PANTRY_LEVEL_LOW: u32 = 1;
pub const PANTRY_LEVEL_FULL: u32 = 3;

/// Invariant: `name` is unique (case-insensitive) within an inventory;
/// `add_pantry_item` upserts in place rather than ever creating a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PantryItem {
    pub id: String,
    pub name: String,
    pub quantity_type: PantryQuantityType,
    pub quantity_level: u32,
    #[serde(default)]
    pub category: IngredientCategory,
    pub added_at: DateTime<Utc>,
}

/// Partial update shape for `add_pantry_item`; unset fields keep defaults
/// (new item) or existing values (upsert).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PantryItemPatch {
    pub name: String,
    #[serde(default)]
    pub quantity_type: Option<PantryQuantityType>,
    #[serde(default)]
    pub quantity_level: Option<u32>,
    #[serde(default)]
    pub category: Option<IngredientCategory>,
}

fn new_item_id() -> String {
    Uuid::new_v4().to_string()
}

/// Migrates legacy plain-string pantry entries: dedupe by normalized name
/// first, then one binary/level-1 record per unique name. Idempotent up to
/// generated ids and timestamps.
pub fn migrate_pantry(legacy_names: &[String]) -> Vec<PantryItem> {
    let mut seen = std::collections::HashSet::new();
    let mut migrated = Vec::new();
    for name in legacy_names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !seen.insert(normalize_ingredient_name(trimmed)) {
            continue;
        }
        migrated.push(PantryItem {
            id: new_item_id(),
            name: trimmed.to_string(),
            quantity_type: PantryQuantityType::Binary,
            quantity_level: PANTRY_LEVEL_LOW,
            category: IngredientCategory::default(),
            added_at: Utc::now(),
        });
    }
    migrated
}

/// Case-insensitive upsert. On a name hit the existing record is updated in
/// place: level snaps back to full unless the patch supplies one, the
/// timestamp refreshes, the id is preserved. On a miss a new binary/level-1
/// record is created with any supplied overrides.
pub fn add_pantry_item(current: &[PantryItem], patch: PantryItemPatch) -> Vec<PantryItem> {
    let mut next: Vec<PantryItem> = current.to_vec();
    let lookup = patch.name.trim().to_lowercase();

    if let Some(existing) = next
        .iter_mut()
        .find(|item| item.name.trim().to_lowercase() == lookup)
    {
        existing.name = patch.name.trim().to_string();
        if let Some(quantity_type) = patch.quantity_type {
            existing.quantity_type = quantity_type;
        }
        existing.quantity_level = patch.quantity_level.unwrap_or(PANTRY_LEVEL_FULL);
        if let Some(category) = patch.category {
            existing.category = category;
        }
        existing.added_at = Utc::now();
    } else {
        next.push(PantryItem {
            id: new_item_id(),
            name: patch.name.trim().to_string(),
            quantity_type: patch.quantity_type.unwrap_or(PantryQuantityType::Binary),
            quantity_level: patch.quantity_level.unwrap_or(PANTRY_LEVEL_LOW),
            category: patch.category.unwrap_or_default(),
            added_at: Utc::now(),
        });
    }
    next
}

/// Removes the item with the given id. An absent id is a no-op, not an error.
pub fn deduct_pantry_item(current: &[PantryItem], id: &str) -> Vec<PantryItem> {
    current.iter().filter(|item| item.id != id).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(name: &str) -> PantryItemPatch {
        PantryItemPatch {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn migration_dedupes_by_normalized_name() {
        let legacy = vec![
            "Milk".to_string(),
            "milk ".to_string(),
            "Onions".to_string(),
            "onion".to_string(),
            "  ".to_string(),
        ];
        let migrated = migrate_pantry(&legacy);
        assert_eq!(migrated.len(), 2);
        assert!(migrated.iter().all(|i| i.quantity_type == PantryQuantityType::Binary));
        assert!(migrated.iter().all(|i| i.quantity_level == PANTRY_LEVEL_LOW));
    }

    #[test]
    fn migration_is_idempotent_up_to_ids() {
        let legacy = vec!["Milk".to_string(), "Rice".to_string(), "milk".to_string()];
        let first = migrate_pantry(&legacy);
        let second = migrate_pantry(&legacy);
        let tuples = |items: &[PantryItem]| {
            items
                .iter()
                .map(|i| (i.name.clone(), i.quantity_level, i.quantity_type))
                .collect::<Vec<_>>()
        };
        assert_eq!(tuples(&first), tuples(&second));
        // ids are freshly generated on each run
        assert_ne!(first[0].id, second[0].id);
    }

    #[test]
    fn upsert_hits_case_insensitively_and_resets_level() {
        let existing = PantryItem {
            id: "id-1".to_string(),
            name: "milk".to_string(),
            quantity_type: PantryQuantityType::Loose,
            quantity_level: PANTRY_LEVEL_LOW,
            category: IngredientCategory::Dairy,
            added_at: Utc::now(),
        };
        let next = add_pantry_item(&[existing], patch("Milk"));
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].name, "Milk");
        assert_eq!(next[0].id, "id-1");
        assert_eq!(next[0].quantity_level, PANTRY_LEVEL_FULL);
        // unsupplied fields keep existing values
        assert_eq!(next[0].quantity_type, PantryQuantityType::Loose);
        assert_eq!(next[0].category, IngredientCategory::Dairy);
    }

    #[test]
    fn upsert_respects_explicit_level() {
        let current = add_pantry_item(&[], patch("Milk"));
        let next = add_pantry_item(
            &current,
            PantryItemPatch {
                name: "milk".to_string(),
                quantity_level: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].quantity_level, 2);
    }

    #[test]
    fn miss_creates_binary_level_one_with_overrides() {
        let next = add_pantry_item(
            &[],
            PantryItemPatch {
                name: "Eggs".to_string(),
                quantity_type: Some(PantryQuantityType::Discrete),
                quantity_level: Some(12),
                category: Some(IngredientCategory::Protein),
            },
        );
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].quantity_type, PantryQuantityType::Discrete);
        assert_eq!(next[0].quantity_level, 12);
        assert_eq!(next[0].category, IngredientCategory::Protein);

        let plain = add_pantry_item(&[], patch("Salt"));
        assert_eq!(plain[0].quantity_type, PantryQuantityType::Binary);
        assert_eq!(plain[0].quantity_level, PANTRY_LEVEL_LOW);
    }

    #[test]
    fn operations_never_mutate_inputs() {
        let current = add_pantry_item(&[], patch("Milk"));
        let before = current.clone();
        let _ = add_pantry_item(&current, patch("milk"));
        let _ = deduct_pantry_item(&current, &current[0].id);
        assert_eq!(current.len(), before.len());
        assert_eq!(current[0].quantity_level, before[0].quantity_level);
    }

    #[test]
    fn deduct_missing_id_is_noop() {
        let current = add_pantry_item(&[], patch("Milk"));
        let next = deduct_pantry_item(&current, "no-such-id");
        assert_eq!(next.len(), 1);
        let emptied = deduct_pantry_item(&current, &current[0].id);
        assert!(emptied.is_empty());
    }
}
