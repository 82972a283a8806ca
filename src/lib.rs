pub mod api_connection;
pub mod cli;
pub mod coalescer;
pub mod dish;
pub mod grocery;
pub mod model_policy;
pub mod orchestrator;
pub mod pantry;
pub mod quantity;
pub mod retry;
pub mod search;
pub mod store;
