use anyhow::Result;
use clap::Args;

use super::{load_model_encoder, open_active_store};
use crate::cli::output::get_formatter;
use crate::error::AppError;
use crate::models::{Config, MetricFilter, OutputFormat};
use crate::services::KeywordSearch;

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'n', help = "Maximum number of keywords to return")]
    pub limit: Option<u32>,

    #[arg(
        long = "filter",
        value_name = "EXPR",
        help = "Metric filter such as 'volume>=1000' or 'competition<0.5' (repeatable)"
    )]
    pub filters: Vec<String>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    // Input errors are reported before the store or model is touched.
    let filters = args
        .filters
        .iter()
        .map(|f| f.parse::<MetricFilter>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::from)?;

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let limit = args.limit.unwrap_or(config.search.default_limit) as usize;

    if verbose {
        eprintln!("Query: \"{}\"", args.query);
        eprintln!("  Limit: {limit}");
        for filter in &filters {
            eprintln!("  Filter: {filter}");
        }
    }

    let store = open_active_store(&config)?;
    let encoder = load_model_encoder(&config)?;
    let search = KeywordSearch::from_store(store, encoder, config.scoring.clone())
        .map_err(AppError::from)?;

    let response = search
        .search(&args.query, limit, &filters)
        .await
        .map_err(AppError::from)?;

    print!("{}", formatter.format_search_response(&response));

    Ok(())
}
