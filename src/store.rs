//! Key-value document storage behind the exact-match cache and per-user
//! state. Writes use field-level merge semantics, never whole-document
//! replace, so concurrent writers touching different fields do not clobber
//! each other.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dish::{DayPlan, Dish, UserProfile};
use crate::pantry::PantryItem;

/// The full per-user persisted document, merge-written under one key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub approved_dishes: Vec<Dish>,
    #[serde(default)]
    pub weekly_plan: Vec<DayPlan>,
    #[serde(default)]
    pub pantry_stock: Vec<PantryItem>,
}

pub fn user_doc_key(user_id: &str) -> String {
    format!("users/{user_id}")
}

/// Merges `patch` into `existing` one top-level field at a time. Non-object
/// patches (or targets) fall back to replacement.
pub fn merge_fields(existing: &mut Value, patch: Value) {
    match (existing.as_object_mut(), patch) {
        (Some(target), Value::Object(fields)) => {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        (_, patch) => *existing = patch,
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn merge_set(&self, key: &str, patch: Value) -> Result<()>;
}

/// Process-local store used by tests and the CLI; the production app backs
/// this trait with the cloud document database.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<String, Value>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .documents
            .lock()
            .expect("document store poisoned")
            .get(key)
            .cloned())
    }

    async fn merge_set(&self, key: &str, patch: Value) -> Result<()> {
        let mut documents = self.documents.lock().expect("document store poisoned");
        match documents.get_mut(key) {
            Some(existing) => merge_fields(existing, patch),
            None => {
                documents.insert(key.to_string(), patch);
            }
        }
        Ok(())
    }
}
