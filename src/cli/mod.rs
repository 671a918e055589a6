//! CLI module for the keyword opportunity engine.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Semantic keyword-opportunity search over a chunked embedding store.
#[derive(Debug, Parser)]
#[command(name = "kwscout")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a new store generation from a keyword corpus
    Build(commands::BuildArgs),

    /// Find keywords similar to a query and aggregate their metrics
    Search(commands::SearchArgs),

    /// Show the active store
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
