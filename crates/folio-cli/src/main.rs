//! Folio CLI - Books Query Catalog Runner
//!
//! Loads a query catalog and a books collection, then lists, shows or runs
//! the catalog's named queries. Results are printed as pretty JSON on
//! stdout; logs go to stderr.
//!
//! @version 0.1.0
//! @author Folio Development Team

use clap::{Parser, Subcommand};
use folio_catalog::{book_schema, books_catalog, sample_books, CatalogError, QueryCatalog};
use folio_common::{FolioConfig, FolioError};
use folio_document::{Collection, CollectionError, Document, ExplainMode, QueryError};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Parser)]
#[command(name = "folio")]
#[command(author = "Folio Development Team")]
#[command(version = "0.1.0")]
#[command(about = "Run named queries against a books collection", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON catalog file replacing the built-in books catalog
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// JSON array of books to load instead of the sample data
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Start from an empty collection
    #[arg(long)]
    no_seed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the catalog's definitions
    List,
    /// Print one definition
    Show { name: String },
    /// Execute one definition
    Run { name: String },
    /// Execute every definition in catalog order
    RunAll,
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] FolioError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("failed to load books: {0}")]
    Collection(#[from] CollectionError),

    #[error("invalid default_explain_mode: {0}")]
    ExplainMode(#[from] QueryError),

    #[error("invalid data file {path}: {reason}")]
    Data { path: PathBuf, reason: String },

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<FolioConfig, CliError> {
    let config = match &cli.config {
        Some(path) => FolioConfig::from_file(path)?,
        None => FolioConfig::default(),
    };
    let seed = config.seed_sample_data && !cli.no_seed;
    Ok(config
        .with_catalog_path(cli.catalog.clone())
        .with_data_path(cli.data.clone())
        .with_seed(seed))
}

fn run(command: Commands, config: &FolioConfig) -> Result<(), CliError> {
    let catalog = load_catalog(config)?;

    let output = match command {
        Commands::List => {
            let entries: Vec<_> = catalog
                .iter()
                .map(|d| json!({ "name": d.name, "kind": d.kind, "description": d.description }))
                .collect();
            serde_json::Value::Array(entries)
        }
        Commands::Show { name } => serde_json::to_value(catalog.get(&name)?)?,
        Commands::Run { name } => {
            let books = load_collection(config)?;
            catalog.execute(&name, &books)?.into_json()?
        }
        Commands::RunAll => {
            let books = load_collection(config)?;
            let results = catalog
                .execute_all(&books)?
                .into_iter()
                .map(|(name, output)| Ok(json!({ "name": name, "result": output.into_json()? })))
                .collect::<Result<Vec<_>, CliError>>()?;
            tracing::info!(queries = results.len(), documents = books.len(), "catalog run complete");
            serde_json::Value::Array(results)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

// =============================================================================
// Setup
// =============================================================================

fn load_catalog(config: &FolioConfig) -> Result<QueryCatalog, CliError> {
    let mode: ExplainMode = config.default_explain_mode.parse()?;
    let catalog = match &config.catalog_path {
        Some(path) => QueryCatalog::load(path)?,
        None => books_catalog()?,
    };
    tracing::debug!(definitions = catalog.len(), explain_mode = %mode, "catalog ready");
    Ok(catalog.with_default_explain_mode(mode))
}

fn load_collection(config: &FolioConfig) -> Result<Collection, CliError> {
    let books = if config.validate_schema {
        Collection::with_schema(config.collection.clone(), book_schema())
    } else {
        Collection::new(config.collection.clone())
    };
    if let Some(schema) = books.schema() {
        tracing::debug!(collection = %books.name(), schema = %schema.name(), "validating books");
    }

    if let Some(path) = &config.data_path {
        books.insert_many(read_books(path)?)?;
        tracing::info!(path = %path.display(), documents = books.len(), "loaded books");
    } else if config.seed_sample_data {
        books.insert_many(sample_books())?;
        tracing::info!(documents = books.len(), "seeded sample books");
    } else {
        tracing::warn!(collection = %books.name(), "starting with an empty collection");
    }
    Ok(books)
}

fn read_books(path: &Path) -> Result<Vec<Document>, CliError> {
    let content = std::fs::read_to_string(path).map_err(FolioError::from)?;
    serde_json::from_str(&content).map_err(|e| CliError::Data {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
