pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use cli::{Cli, Commands};
pub use error::AppError;
pub use models::{Config, OutputFormat};
pub use services::{ChunkedVectorStore, KeywordSearch, MetricsAggregator, SemanticMatcher, StoreBuilder};
