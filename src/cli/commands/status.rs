use anyhow::Result;

use super::open_active_store;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

pub async fn handle_status(format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    if verbose {
        eprintln!("Data directory: {}", config.data_dir()?.display());
    }

    let store = open_active_store(&config)?;
    print!("{}", formatter.format_store_info(&store.info()));

    if store.model_id() != config.embedding.model_id {
        eprintln!();
        eprintln!(
            "Warning: store was built with '{}' but the configured model is '{}'.",
            store.model_id(),
            config.embedding.model_id
        );
        eprintln!("         Searches will be refused until the store is rebuilt.");
    }

    Ok(())
}
