//! storelink CLI
//!
//! Replays synchronizations of a Shopware backend against recorded API
//! responses.
//!
//! # Commands
//!
//! - `import-batch` - Search a remote model and import what it finds
//! - `import-record` - Import one remote record
//! - `export-record` - Export a binding created by the fixture imports
//! - `version` - Show version information
//!
//! The fixture file holds the backend configuration, the recorded
//! responses and the imports to run before the command.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Replays storelink synchronizations.
#[derive(Parser)]
#[command(name = "storelink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Fixture file (backend configuration and recorded responses)
    #[arg(global = true, short = 'x', long)]
    fixtures: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a remote model and import the records found
    ImportBatch {
        /// Binding model (e.g. shopware.res.partner)
        #[arg(short, long)]
        model: String,

        /// Only records changed after this date
        #[arg(long)]
        from: Option<String>,

        /// Only records changed before this date
        #[arg(long)]
        to: Option<String>,
    },

    /// Import one remote record
    ImportRecord {
        /// Binding model
        #[arg(short, long)]
        model: String,

        /// Remote id
        #[arg(short, long)]
        id: String,

        /// Import even when the record did not change
        #[arg(long)]
        force: bool,
    },

    /// Export a binding
    ExportRecord {
        /// Binding model
        #[arg(short, long)]
        model: String,

        /// Remote id of the binding
        #[arg(short, long)]
        id: String,

        /// Comma-separated fields to export (all when omitted)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::ImportBatch { model, from, to } => {
            let path = cli.fixtures.ok_or("Fixture file required for import-batch")?;
            let summary = commands::import_batch::run(&path, &model, from.as_deref(), to.as_deref())?;
            commands::print(&summary, &cli.format)?;
        }
        Commands::ImportRecord { model, id, force } => {
            let path = cli.fixtures.ok_or("Fixture file required for import-record")?;
            let summary = commands::import_record::run(&path, &model, &id, force)?;
            commands::print(&summary, &cli.format)?;
        }
        Commands::ExportRecord { model, id, fields } => {
            let path = cli.fixtures.ok_or("Fixture file required for export-record")?;
            let summary = commands::export_record::run(&path, &model, &id, &fields)?;
            commands::print(&summary, &cli.format)?;
        }
        Commands::Version => {
            println!("storelink CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("storelink engine v{}", storelink_engine::VERSION);
            println!("storelink shopware v{}", storelink_shopware::VERSION);
        }
    }

    Ok(())
}
