use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::load_model_encoder;
use crate::cli::output::get_formatter;
use crate::error::AppError;
use crate::models::{Config, OutputFormat};
use crate::services::{DataDir, Encoder, PrecomputedEncoder, StoreBuilder, load_corpus};

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[arg(required = true, help = "Keyword corpus (.csv, .json or .jsonl)")]
    pub corpus: PathBuf,

    #[arg(
        long,
        help = "Directory with keywords_list.json and embeddings.bin to use instead of the model"
    )]
    pub precomputed: Option<PathBuf>,

    #[arg(
        long,
        requires = "precomputed",
        help = "Model id that produced the precomputed embeddings (defaults to the configured model)"
    )]
    pub model_id: Option<String>,

    #[arg(long, help = "Vectors per chunk file")]
    pub chunk_size: Option<usize>,
}

/// Model id to stamp on a store built from precomputed embeddings, and
/// whether it was assumed from the config rather than given.
fn precomputed_model_id(args: &BuildArgs, config: &Config) -> (String, bool) {
    match &args.model_id {
        Some(id) => (id.clone(), false),
        None => (config.embedding.model_id.clone(), true),
    }
}

pub async fn handle_build(args: BuildArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let chunk_size = args.chunk_size.unwrap_or(config.store.chunk_size);
    if chunk_size == 0 {
        anyhow::bail!("chunk size must be at least 1");
    }

    // Corpus problems abort before the model is loaded or anything is written.
    let corpus = load_corpus(&args.corpus).map_err(AppError::from)?;
    if verbose {
        eprintln!("Corpus: {} ({} keywords)", args.corpus.display(), corpus.len());
    }

    let encoder: Arc<dyn Encoder> = match args.precomputed {
        Some(ref dir) => {
            let (model_id, assumed) = precomputed_model_id(&args, &config);
            if assumed {
                warn!(
                    model_id = %model_id,
                    "precomputed embeddings carry no model id; assuming the configured model"
                );
            }
            let encoder =
                PrecomputedEncoder::load(dir, model_id, config.embedding.dimension as usize)
                    .map_err(AppError::from)
                    .with_context(|| {
                        format!("failed to load precomputed embeddings from {}", dir.display())
                    })?;
            info!(keywords = encoder.len(), "using precomputed embeddings");
            Arc::new(encoder)
        }
        None => load_model_encoder(&config)?,
    };

    let pb = ProgressBar::new(corpus.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    let progress = pb.clone();

    let builder = StoreBuilder::new(encoder)
        .with_chunk_size(chunk_size)
        .with_batch_size(config.embedding.batch_size as usize)
        .with_keep_generations(config.store.keep_generations as usize)
        .with_progress(move |done, _total| progress.set_position(done as u64));

    let data_dir = DataDir::new(config.data_dir()?);
    let result = builder.build(&corpus, &data_dir).await;
    pb.finish_and_clear();

    let report = result.map_err(AppError::from).context("build failed")?;
    print!("{}", formatter.format_build_report(&report));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(model_id: Option<&str>) -> BuildArgs {
        BuildArgs {
            corpus: PathBuf::from("corpus.csv"),
            precomputed: Some(PathBuf::from("dump")),
            model_id: model_id.map(str::to_string),
            chunk_size: None,
        }
    }

    #[test]
    fn test_precomputed_model_id_override() {
        let config = Config::default();
        assert_eq!(
            precomputed_model_id(&args(Some("acme/encoder-v2")), &config),
            ("acme/encoder-v2".to_string(), false)
        );
    }

    #[test]
    fn test_precomputed_model_id_falls_back_to_config() {
        let config = Config::default();
        let (model_id, assumed) = precomputed_model_id(&args(None), &config);
        assert_eq!(model_id, config.embedding.model_id);
        assert!(assumed);
    }
}
