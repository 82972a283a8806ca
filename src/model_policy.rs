//! Static model-routing policy: which model and token budget each task
//! classification gets. Pure lookup tables, total over the closed `TaskType`
//! enum; string inputs from config/CLI fail loudly on unknown task names so
//! policy gaps surface in development, not production.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    FeedGeneration,
    CookInstructionTranslation,
    IngredientEnrichment,
    ReportAnalysis,
}

pub const ALL_TASK_TYPES: &[TaskType] = &[
    TaskType::FeedGeneration,
    TaskType::CookInstructionTranslation,
    TaskType::IngredientEnrichment,
    TaskType::ReportAnalysis,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelChoice {
    pub model: &'static str,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub max_input_tokens: u32,
}

/// Output-side policy table. Total by construction: adding a `TaskType`
/// variant without an arm here is a compile error.
pub fn select_model(task: TaskType) -> ModelChoice {
    match task {
        TaskType::FeedGeneration => ModelChoice {
            model: "qwen/qwen3-32b",
            max_output_tokens: 4096,
        },
        TaskType::CookInstructionTranslation => ModelChoice {
            model: "qwen/qwen3-32b",
            max_output_tokens: 1024,
        },
        TaskType::IngredientEnrichment => ModelChoice {
            model: "qwen/qwen3-8b",
            max_output_tokens: 512,
        },
        TaskType::ReportAnalysis => ModelChoice {
            model: "qwen/qwen3-32b",
            max_output_tokens: 2048,
        },
    }
}

/// Input-side budgeting, independent of the output table.
pub fn token_budget(task: TaskType) -> TokenBudget {
    match task {
        TaskType::FeedGeneration => TokenBudget {
            max_input_tokens: 8192,
        },
        TaskType::CookInstructionTranslation => TokenBudget {
            max_input_tokens: 4096,
        },
        TaskType::IngredientEnrichment => TokenBudget {
            max_input_tokens: 2048,
        },
        TaskType::ReportAnalysis => TokenBudget {
            max_input_tokens: 16384,
        },
    }
}

/// Resolves a task name from config/CLI input. Unknown names are an explicit
/// error, never a silent default.
pub fn parse_task_type(name: &str) -> Result<TaskType> {
    match name.trim().to_lowercase().as_str() {
        "feed-generation" => Ok(TaskType::FeedGeneration),
        "cook-instruction-translation" => Ok(TaskType::CookInstructionTranslation),
        "ingredient-enrichment" => Ok(TaskType::IngredientEnrichment),
        "report-analysis" => Ok(TaskType::ReportAnalysis),
        other => bail!("unrecognized task type '{other}': no model policy entry"),
    }
}
