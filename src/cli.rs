use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scale a free-text ingredient quantity by a serving multiplier
    Scale {
        quantity: String,
        servings: f32,
    },
    /// Build a consolidated grocery list from a weekly-plan JSON file
    Grocery {
        /// Path to a JSON file holding an array of day plans
        #[arg(short = 'f', long)]
        plan_file: String,
        /// Pantry item names used for the stock check
        #[arg(short, long)]
        pantry: Vec<String>,
    },
    /// Migrate legacy plain-string pantry entries to structured records
    MigratePantry {
        names: Vec<String>,
    },
    /// Generate new dishes for a profile JSON file
    Generate {
        /// Path to a JSON file holding the user profile
        #[arg(short = 'f', long)]
        profile_file: String,
        #[arg(short, long, default_value_t = 3)]
        count: usize,
        /// Meal slot: any, lunch or dinner
        #[arg(short, long, default_value = "any")]
        mode: String,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
