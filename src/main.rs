use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::fs;

use mealgen::api_connection::OpenRouterProvider;
use mealgen::cli::{parse_args, Command};
use mealgen::dish::{DayPlan, GenerationMode, UserProfile};
use mealgen::grocery::generate_grocery_list;
use mealgen::orchestrator::DishPipeline;
use mealgen::pantry::migrate_pantry;
use mealgen::quantity::get_scaled_quantity;
use mealgen::search::{Embedder, EmbeddingEngine, NullEmbedder, VectorIndex, EMBEDDING_DIMENSION};
use mealgen::store::InMemoryDocumentStore;

const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";

fn parse_mode(mode: &str) -> Result<GenerationMode> {
    match mode.trim().to_lowercase().as_str() {
        "any" => Ok(GenerationMode::Any),
        "lunch" => Ok(GenerationMode::Lunch),
        "dinner" => Ok(GenerationMode::Dinner),
        other => bail!("unknown mode '{other}': expected any, lunch or dinner"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = parse_args();
    match cli.command {
        Command::Scale { quantity, servings } => {
            println!("{}", get_scaled_quantity(&quantity, servings));
        }
        Command::Grocery { plan_file, pantry } => {
            let contents = fs::read_to_string(&plan_file)
                .await
                .with_context(|| format!("failed to read plan file {plan_file}"))?;
            let week: Vec<DayPlan> = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse weekly plan from {plan_file}"))?;
            let list = generate_grocery_list(&week, &pantry);
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        Command::MigratePantry { names } => {
            let migrated = migrate_pantry(&names);
            println!("{}", serde_json::to_string_pretty(&migrated)?);
        }
        Command::Generate {
            profile_file,
            count,
            mode,
        } => {
            let contents = fs::read_to_string(&profile_file)
                .await
                .with_context(|| format!("failed to read profile file {profile_file}"))?;
            let profile: UserProfile = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse profile from {profile_file}"))?;
            let mode = parse_mode(&mode)?;

            let embedder: Arc<dyn Embedder> = match EmbeddingEngine::new() {
                Ok(engine) => Arc::new(engine),
                Err(err) => {
                    eprintln!("Embedding model unavailable ({err}); semantic dedup disabled.");
                    Arc::new(NullEmbedder)
                }
            };
            let pipeline = DishPipeline::new(
                Arc::new(OpenRouterProvider::new(API_KEY_ENV_VAR)),
                embedder,
                Arc::new(VectorIndex::new(EMBEDDING_DIMENSION)),
                Arc::new(InMemoryDocumentStore::new()),
            );

            let dishes = pipeline.generate_new_dishes(count, &profile, mode).await;
            if dishes.is_empty() {
                println!("Nothing generated.");
            } else {
                println!("{}", serde_json::to_string_pretty(&dishes)?);
            }
        }
    }
    Ok(())
}
