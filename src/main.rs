//! Command line interface for the degree catalog synchronization engine.

use clap::{Args, Parser, Subcommand};
use degsync::import::DegreeImporter;
use degsync::search::SearchClient;
use degsync::store::SqliteStore;
use degsync::ImportConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "degsync", version, about = "Degree program catalog synchronization")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Imports degree programs from the search service.
    Import(ImportArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Base URL of the search service to pull from
    search_url: String,

    /// API key to query the search service with
    api_key: String,

    /// Path to the local degree catalog database
    #[arg(long, default_value = "degrees.db")]
    db: PathBuf,

    /// Push description/profile data back to the search service as each
    /// record is saved
    #[arg(long)]
    writebacks: bool,

    /// Import subplans as top-level records instead of children of their plan
    #[arg(long)]
    flat_hierarchy: bool,

    /// Move stale records to the trash instead of deleting them outright
    #[arg(long)]
    trash_stale: bool,

    /// Report per-record changes in the final summary
    #[arg(short, long)]
    verbose: bool,

    /// Additional key=value filter for the program search (repeatable)
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,

    /// Public base URL used to build the profile URLs sent by writebacks
    #[arg(long)]
    site_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Import(args) => run_import(args).await,
    }
}

async fn run_import(args: ImportArgs) -> ExitCode {
    let mut config = ImportConfig::new(&args.search_url, &args.api_key);
    config.do_writebacks = args.writebacks;
    config.preserve_hierarchy = !args.flat_hierarchy;
    config.force_delete_stale = !args.trash_stale;
    config.verbose = args.verbose;
    config.site_base_url = args.site_url.clone();

    for filter in &args.filters {
        match filter.split_once('=') {
            Some((key, value)) => config
                .extra_params
                .push((key.to_string(), value.to_string())),
            None => {
                eprintln!("Error: invalid --filter '{}'; expected KEY=VALUE", filter);
                return ExitCode::from(64);
            }
        }
    }

    let store = match SqliteStore::open(&args.db) {
        Ok(store) => store,
        Err(e) => {
            error!(db = %args.db.display(), error = %e, "Failed to open catalog database");
            eprintln!("Error: {}", e);
            return ExitCode::from(4);
        }
    };

    let client = match SearchClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    info!(
        "Starting degsync v{} against {}",
        env!("CARGO_PKG_VERSION"),
        config.base_url
    );

    let mut importer = DegreeImporter::new(&config, &store, &client);
    if let Err(e) = importer.import().await {
        eprintln!("Error: {}", e);
        return ExitCode::from(e.exit_code() as u8);
    }

    match importer.stats() {
        Ok(stats) => {
            println!("{}", stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
