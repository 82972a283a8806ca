//! Dish generation pipeline: exact cache, deficit computation, coalesced
//! parallel generation, structural validation, semantic dedup, and
//! best-effort persistence back into both caches.
//!
//! Batch operations degrade gracefully: a unit that fails validation or
//! exhausts its retries is logged and dropped, never surfaced as a batch
//! error. Fewer dishes than requested is an expected outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api_connection::endpoints::{JsonSchema, JsonSchemaDefinition, JsonSchemaProperty};
use crate::api_connection::{ApiConnectionError, GenerationRequest, GenerativeModel};
use crate::coalescer::RequestCoalescer;
use crate::dish::{DayPlan, Dish, GenerationMode, UserProfile};
use crate::model_policy::{select_model, token_budget, ModelChoice, TaskType};
use crate::retry::RetryPolicy;
use crate::search::{
    embed_with_cache, EmbeddingCache, Embedder, SemanticDuplicateChecker, VectorRecord,
    VectorSearch,
};
use crate::store::DocumentStore;

/// Vector-index namespace holding generated dish embeddings.
const DISH_NAMESPACE: &str = "dishes";

/// Why a single generation unit produced nothing. The batch continues either
/// way; this exists so "failed unit" is an explicit branch, not a swallowed
/// exception.
#[derive(Debug)]
pub enum UnitError {
    Call(ApiConnectionError),
    EmptyResult,
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitError::Call(err) => write!(f, "generation call failed: {}", err),
            UnitError::EmptyResult => write!(f, "model produced no usable content"),
        }
    }
}

impl std::error::Error for UnitError {}

pub struct DishPipeline {
    model: Arc<dyn GenerativeModel>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorSearch>,
    store: Arc<dyn DocumentStore>,
    embedding_cache: Arc<EmbeddingCache>,
    coalescer: Arc<RequestCoalescer<Vec<Dish>>>,
    retry: RetryPolicy,
}

/// Everything one coalesced batch execution needs, owned so the shared
/// future is `'static`.
struct BatchContext {
    model: Arc<dyn GenerativeModel>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorSearch>,
    store: Arc<dyn DocumentStore>,
    embedding_cache: Arc<EmbeddingCache>,
    retry: RetryPolicy,
    profile: UserProfile,
    mode: GenerationMode,
    deficit: usize,
    cache_key: String,
}

impl DishPipeline {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorSearch>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self::with_parts(
            model,
            embedder,
            vectors,
            store,
            Arc::new(EmbeddingCache::new()),
            Arc::new(RequestCoalescer::new()),
            RetryPolicy::default(),
        )
    }

    pub fn with_parts(
        model: Arc<dyn GenerativeModel>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorSearch>,
        store: Arc<dyn DocumentStore>,
        embedding_cache: Arc<EmbeddingCache>,
        coalescer: Arc<RequestCoalescer<Vec<Dish>>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            embedder,
            vectors,
            store,
            embedding_cache,
            coalescer,
            retry,
        }
    }

    pub fn coalescer_stats(&self) -> crate::coalescer::CoalescerStats {
        self.coalescer.stats()
    }

    pub fn clear_embedding_cache(&self) {
        self.embedding_cache.clear();
    }

    /// Generates up to `count` new dishes for the profile. Exact-cache hits
    /// are served first; only the deficit triggers model calls, and those are
    /// coalesced so concurrent identical requests share one execution.
    pub async fn generate_new_dishes(
        &self,
        count: usize,
        profile: &UserProfile,
        mode: GenerationMode,
    ) -> Vec<Dish> {
        if count == 0 {
            return Vec::new();
        }

        let cache_key = exact_cache_key(profile, mode);
        let mut dishes = self.read_exact_cache(&cache_key, count).await;
        let deficit = count.saturating_sub(dishes.len());
        if deficit == 0 {
            debug!(%cache_key, count, "request served entirely from exact cache");
            return dishes;
        }
        debug!(%cache_key, hits = dishes.len(), deficit, "computing generation deficit");

        let batch_key = format!("{cache_key}|deficit={deficit}");
        let ctx = BatchContext {
            model: Arc::clone(&self.model),
            embedder: Arc::clone(&self.embedder),
            vectors: Arc::clone(&self.vectors),
            store: Arc::clone(&self.store),
            embedding_cache: Arc::clone(&self.embedding_cache),
            retry: self.retry,
            profile: profile.clone(),
            mode,
            deficit,
            cache_key,
        };

        match self
            .coalescer
            .request(&batch_key, move || run_generation_batch(ctx))
            .await
        {
            Ok(generated) => dishes.extend(generated),
            // partial result, not a hard failure
            Err(err) => warn!(error = %err, "generation batch produced nothing"),
        }
        dishes
    }

    /// Generates per-dish cook notes for a planned week. An all-empty week
    /// short-circuits to `None` before any external call is made.
    pub async fn generate_cook_notes(&self, week: &[DayPlan]) -> anyhow::Result<Option<Vec<String>>> {
        let planned: Vec<&Dish> = week
            .iter()
            .flat_map(|day| [day.lunch.as_ref(), day.dinner.as_ref()])
            .flatten()
            .collect();
        if planned.is_empty() {
            return Ok(None);
        }

        let choice = select_model(TaskType::CookInstructionTranslation);
        let dish_list = planned
            .iter()
            .map(|d| format!("- {} ({})", d.name, d.meal_type))
            .collect::<Vec<_>>()
            .join("\n");
        let request = GenerationRequest {
            system_prompt: "You are a meal-prep assistant. For the given week of planned dishes, \
                            produce one short practical cooking note per dish (prep-ahead steps, \
                            shared components, timing). Respond ONLY with a JSON object matching \
                            the schema: { \"notes\": [string, ...] }."
                .to_string(),
            user_prompt: clamp_to_budget(dish_list, TaskType::CookInstructionTranslation),
            schema: Some(cook_notes_schema()),
            model: choice.model.to_string(),
            max_output_tokens: choice.max_output_tokens,
            temperature: 0.2,
        };

        let model = Arc::clone(&self.model);
        let value = self
            .retry
            .run(|| {
                let model = Arc::clone(&model);
                let request = request.clone();
                async move { model.generate(request).await }
            })
            .await
            .map_err(|err| anyhow::anyhow!("cook note generation failed: {err}"))?;

        let notes = value
            .as_ref()
            .and_then(|v| v.get("notes"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|notes| !notes.is_empty());
        if notes.is_none() {
            warn!("cook note response had no usable notes field");
        }
        Ok(notes)
    }

    async fn read_exact_cache(&self, cache_key: &str, count: usize) -> Vec<Dish> {
        match self.store.get(cache_key).await {
            Ok(Some(doc)) => cached_dishes(&doc).into_iter().take(count).collect(),
            Ok(None) => Vec::new(),
            Err(err) => {
                // cache is an optimization, a failed read is a cold cache
                warn!(error = %err, %cache_key, "exact cache read failed, treating as miss");
                Vec::new()
            }
        }
    }
}

fn cached_dishes(doc: &Value) -> Vec<Dish> {
    doc.get("dishes")
        .cloned()
        .and_then(|v| serde_json::from_value::<Vec<Dish>>(v).ok())
        .unwrap_or_default()
}

fn tag_fold(tags: &[String]) -> String {
    let mut folded: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    folded.sort();
    folded.dedup();
    if folded.is_empty() {
        "none".to_string()
    } else {
        folded.join("+")
    }
}

/// Exact-match cache key derived from the profile's tag sets and the
/// requested meal slot. Tag order within the profile does not matter.
pub fn exact_cache_key(profile: &UserProfile, mode: GenerationMode) -> String {
    format!(
        "dish-cache/{}/{}/{}/{}",
        tag_fold(&profile.dietary_tags),
        tag_fold(&profile.health_tags),
        tag_fold(&profile.cuisine_preferences),
        mode.as_str()
    )
}

fn clamp_to_budget(text: String, task: TaskType) -> String {
    // rough 4-chars-per-token bound on the input side
    let max_chars = token_budget(task).max_input_tokens as usize * 4;
    if text.len() <= max_chars {
        return text;
    }
    let mut clamped = text;
    let mut cut = max_chars;
    while cut > 0 && !clamped.is_char_boundary(cut) {
        cut -= 1;
    }
    clamped.truncate(cut);
    clamped
}

fn string_property(description: &str) -> JsonSchemaProperty {
    JsonSchemaProperty {
        property_type: "string".to_string(),
        description: Some(description.to_string()),
        r#enum: None,
        items: None,
    }
}

fn string_array_property(description: &str) -> JsonSchemaProperty {
    JsonSchemaProperty {
        property_type: "array".to_string(),
        description: Some(description.to_string()),
        r#enum: None,
        items: Some(Box::new(JsonSchema {
            schema_type: "string".to_string(),
            properties: None,
            required: None,
            additional_properties: None,
        })),
    }
}

fn dish_json_schema() -> JsonSchemaDefinition {
    let mut properties = HashMap::new();
    properties.insert(
        "name".to_string(),
        string_property("Name of the dish in English."),
    );
    properties.insert(
        "localName".to_string(),
        string_property("Name in the cuisine's own language, if different."),
    );
    properties.insert(
        "description".to_string(),
        string_property("One or two appetizing sentences describing the dish."),
    );
    properties.insert(
        "cuisine".to_string(),
        string_property("Cuisine the dish belongs to, e.g. 'Indian'."),
    );
    properties.insert(
        "type".to_string(),
        string_property("Meal slot: 'Lunch', 'Dinner' or 'Any'."),
    );
    properties.insert(
        "ingredients".to_string(),
        JsonSchemaProperty {
            property_type: "array".to_string(),
            description: Some(
                "Ingredient objects with string properties 'name', 'quantity' (free text like \
                 '1/2 cup') and 'category' (Produce, Protein, Dairy, Pantry or Spices)."
                    .to_string(),
            ),
            r#enum: None,
            items: Some(Box::new(JsonSchema {
                schema_type: "object".to_string(),
                properties: None,
                required: None,
                additional_properties: None,
            })),
        },
    );
    properties.insert(
        "instructions".to_string(),
        string_array_property("Step-by-step cooking instructions."),
    );
    properties.insert(
        "tags".to_string(),
        string_array_property("Dietary tags such as 'vegetarian', 'vegan'."),
    );
    properties.insert(
        "healthTags".to_string(),
        string_array_property("Health-goal tags such as 'high-protein'."),
    );
    properties.insert(
        "allergens".to_string(),
        string_array_property("Allergens present in the dish."),
    );

    JsonSchemaDefinition {
        name: "generated_dish_schema".to_string(),
        strict: Some(true),
        schema: JsonSchema {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: Some(vec![
                "name".to_string(),
                "description".to_string(),
                "cuisine".to_string(),
                "type".to_string(),
            ]),
            additional_properties: Some(false),
        },
    }
}

fn cook_notes_schema() -> JsonSchemaDefinition {
    let mut properties = HashMap::new();
    properties.insert(
        "notes".to_string(),
        string_array_property("One practical cooking note per planned dish."),
    );
    JsonSchemaDefinition {
        name: "cook_notes_schema".to_string(),
        strict: Some(true),
        schema: JsonSchema {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: Some(vec!["notes".to_string()]),
            additional_properties: Some(false),
        },
    }
}

fn build_dish_prompts(
    profile: &UserProfile,
    mode: GenerationMode,
    unit: usize,
) -> (String, String) {
    let system = "You are a recipe suggestion assistant. Invent one realistic home-cookable dish \
                  matching the user's constraints. Respond ONLY with a single JSON object matching \
                  the provided schema; no explanatory text or markdown fences."
        .to_string();

    let mut constraints = Vec::new();
    if !profile.dietary_tags.is_empty() {
        constraints.push(format!("Dietary requirements: {}.", profile.dietary_tags.join(", ")));
    }
    if !profile.allergens.is_empty() {
        constraints.push(format!(
            "Strictly exclude these allergens: {}.",
            profile.allergens.join(", ")
        ));
    }
    if !profile.cuisine_preferences.is_empty() {
        constraints.push(format!(
            "Preferred cuisines: {}.",
            profile.cuisine_preferences.join(", ")
        ));
    }
    if !profile.health_tags.is_empty() {
        constraints.push(format!("Health goals: {}.", profile.health_tags.join(", ")));
    }
    if let Some(macros) = &profile.daily_macro_targets {
        constraints.push(format!(
            "Daily targets: {:.0} kcal, {:.0}g protein, {:.0}g carbs, {:.0}g fat.",
            macros.calories, macros.protein, macros.carbs, macros.fat
        ));
    }
    match mode {
        GenerationMode::Any => {}
        slot => constraints.push(format!("The dish is for the {} slot.", slot.as_str())),
    }
    // distinct hint per deficit unit so parallel calls do not converge on the
    // same dish
    constraints.push(format!("Suggestion number {} of this batch; make it distinct.", unit + 1));

    let user = clamp_to_budget(constraints.join("\n"), TaskType::FeedGeneration);
    (system, user)
}

async fn generate_one_dish(
    model: Arc<dyn GenerativeModel>,
    retry: RetryPolicy,
    profile: UserProfile,
    mode: GenerationMode,
    choice: ModelChoice,
    unit: usize,
) -> Result<Value, UnitError> {
    let (system_prompt, user_prompt) = build_dish_prompts(&profile, mode, unit);
    let request = GenerationRequest {
        system_prompt,
        user_prompt,
        schema: Some(dish_json_schema()),
        model: choice.model.to_string(),
        max_output_tokens: choice.max_output_tokens,
        temperature: 0.7,
    };

    retry
        .run(|| {
            let model = Arc::clone(&model);
            let request = request.clone();
            async move {
                match model.generate(request).await {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => Err(UnitError::EmptyResult),
                    Err(err) => Err(UnitError::Call(err)),
                }
            }
        })
        .await
}

/// One coalesced batch execution: `deficit` parallel generation calls joined
/// all-settled, validation, semantic dedup, then spawned persistence.
async fn run_generation_batch(ctx: BatchContext) -> anyhow::Result<Vec<Dish>> {
    let choice = select_model(TaskType::FeedGeneration);

    let units = (0..ctx.deficit).map(|unit| {
        generate_one_dish(
            Arc::clone(&ctx.model),
            ctx.retry,
            ctx.profile.clone(),
            ctx.mode,
            choice,
            unit,
        )
    });

    // all-settled join: a slow or failing unit never blocks its siblings
    let mut accepted = Vec::new();
    for (unit, outcome) in join_all(units).await.into_iter().enumerate() {
        match outcome {
            Ok(candidate) => match Dish::from_candidate(&candidate) {
                Some(dish) => accepted.push(dish),
                None => debug!(unit, "dropped structurally invalid candidate"),
            },
            Err(err) => warn!(unit, error = %err, "generation unit dropped"),
        }
    }

    let checker = SemanticDuplicateChecker::new(
        Arc::clone(&ctx.embedder),
        Arc::clone(&ctx.vectors),
        Arc::clone(&ctx.embedding_cache),
    );
    let mut kept: Vec<Dish> = Vec::new();
    let mut fresh: Vec<Dish> = Vec::new();
    for dish in accepted {
        let verdict = checker.check(&dish.embedding_text(), DISH_NAMESPACE).await;
        if verdict.should_generate {
            kept.push(dish.clone());
            fresh.push(dish);
            continue;
        }
        match verdict
            .existing
            .and_then(|hit| serde_json::from_value::<Dish>(hit.metadata).ok())
        {
            Some(existing) => {
                debug!(id = %existing.id, "reusing existing near-duplicate instead of new dish");
                if !kept.iter().any(|d| d.id == existing.id) {
                    kept.push(existing);
                }
            }
            // suppressed but the match cannot be materialized: keep the new one
            None => {
                kept.push(dish.clone());
                fresh.push(dish);
            }
        }
    }

    if !fresh.is_empty() {
        // best-effort and asynchronous relative to returning results
        tokio::spawn(persist_accepted(ctx, fresh));
    }
    Ok(kept)
}

/// Writes newly accepted dishes to the exact-match document cache and the
/// vector index. Both writes are best-effort: failures are logged and the
/// already-computed result is unaffected.
async fn persist_accepted(ctx: BatchContext, dishes: Vec<Dish>) {
    let mut cached = match ctx.store.get(&ctx.cache_key).await {
        Ok(Some(doc)) => cached_dishes(&doc),
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(error = %err, "cache read before write failed, rewriting from batch only");
            Vec::new()
        }
    };
    for dish in &dishes {
        if !cached.iter().any(|existing| existing.id == dish.id) {
            cached.push(dish.clone());
        }
    }
    match serde_json::to_value(&cached) {
        Ok(value) => {
            if let Err(err) = ctx.store.merge_set(&ctx.cache_key, json!({ "dishes": value })).await
            {
                warn!(error = %err, "exact cache write failed; will self-heal on next read");
            }
        }
        Err(err) => warn!(error = %err, "failed to serialize dishes for exact cache"),
    }

    if !ctx.embedder.is_available() {
        return;
    }
    let mut records = Vec::new();
    for dish in &dishes {
        let vector = match embed_with_cache(
            ctx.embedder.as_ref(),
            &ctx.embedding_cache,
            &dish.embedding_text(),
        )
        .await
        {
            Ok(Some(vector)) => vector,
            Ok(None) => continue,
            Err(err) => {
                warn!(error = %err, dish = %dish.name, "embedding for index write failed");
                continue;
            }
        };
        match serde_json::to_value(dish) {
            Ok(metadata) => records.push(VectorRecord {
                id: dish.id.clone(),
                namespace: DISH_NAMESPACE.to_string(),
                vector,
                metadata,
            }),
            Err(err) => warn!(error = %err, dish = %dish.name, "failed to serialize dish metadata"),
        }
    }
    if !records.is_empty() {
        if let Err(err) = ctx.vectors.upsert(records).await {
            warn!(error = %err, "vector index write failed; semantic cache stays cold for batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(diet: &[&str], cuisines: &[&str]) -> UserProfile {
        UserProfile {
            dietary_tags: diet.iter().map(|s| s.to_string()).collect(),
            cuisine_preferences: cuisines.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn cache_key_ignores_tag_order_and_case() {
        let a = exact_cache_key(&profile(&["Vegan", "gluten-free"], &["indian"]), GenerationMode::Lunch);
        let b = exact_cache_key(&profile(&["gluten-free", "vegan"], &["Indian"]), GenerationMode::Lunch);
        assert_eq!(a, b);
        assert_eq!(a, "dish-cache/gluten-free+vegan/none/indian/lunch");
    }

    #[test]
    fn cache_key_distinguishes_meal_slot() {
        let p = profile(&["vegan"], &[]);
        assert_ne!(
            exact_cache_key(&p, GenerationMode::Lunch),
            exact_cache_key(&p, GenerationMode::Dinner)
        );
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        let long = "é".repeat(200_000);
        let clamped = clamp_to_budget(long, TaskType::IngredientEnrichment);
        assert!(clamped.len() <= 2048 * 4);
        assert!(clamped.is_char_boundary(clamped.len()));
    }

    #[test]
    fn dish_schema_requires_the_structural_contract_fields() {
        let schema = dish_json_schema();
        let required = schema.schema.required.unwrap();
        for field in ["name", "description", "cuisine", "type"] {
            assert!(required.iter().any(|r| r == field));
        }
    }

    #[test]
    fn unit_prompts_vary_by_index() {
        let p = profile(&["vegan"], &["indian"]);
        let (_, first) = build_dish_prompts(&p, GenerationMode::Lunch, 0);
        let (_, second) = build_dish_prompts(&p, GenerationMode::Lunch, 1);
        assert_ne!(first, second);
        assert!(first.contains("vegan"));
        assert!(first.contains("lunch"));
    }
}
