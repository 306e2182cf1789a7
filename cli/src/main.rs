mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{Paging, cmd_ingest, cmd_list, cmd_search, cmd_show};
use crate::config::Config;
use ladle_core::db::Database;
use ladle_core::query::RecipeFilter;

#[derive(Parser)]
#[command(
    name = "ladle",
    version,
    about = "Load a recipe dataset into SQLite and query it"
)]
struct Cli {
    /// SQLite database path (default: recipes.db in the platform data directory)
    #[arg(long, global = true, env = "LADLE_DB", value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load recipes from a JSON file (an array, or an object keyed by index)
    Ingest {
        /// Path to the recipes JSON file
        #[arg(long = "json", value_name = "PATH")]
        file: PathBuf,
        /// Output the summary as JSON
        #[arg(long = "json-output")]
        json: bool,
    },
    /// List recipes, one page at a time
    List {
        #[command(flatten)]
        paging: PagingArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single recipe by ID
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search recipes with filters
    Search {
        /// Case-insensitive substring of the title
        #[arg(long)]
        title: Option<String>,
        /// Case-insensitive substring of the cuisine
        #[arg(long)]
        cuisine: Option<String>,
        /// Minimum rating (0-5, inclusive)
        #[arg(long)]
        min_rating: Option<f64>,
        /// Maximum total time in minutes (inclusive)
        #[arg(long)]
        max_total_time: Option<i64>,
        /// Minimum calories (inclusive)
        #[arg(long)]
        min_calories: Option<i64>,
        /// Maximum calories (inclusive)
        #[arg(long)]
        max_calories: Option<i64>,
        #[command(flatten)]
        paging: PagingArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Args)]
struct PagingArgs {
    /// Page number, starting at 1
    #[arg(long, allow_negative_numbers = true)]
    page: Option<i64>,
    /// Results per page (1-100, default 20)
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,
    /// Sort key: rating, total_time, title, calories, cuisine, id
    #[arg(long)]
    sort_by: Option<String>,
    /// Sort direction: asc or desc
    #[arg(long)]
    order: Option<String>,
}

impl PagingArgs {
    fn as_paging(&self) -> Paging<'_> {
        Paging {
            page: self.page,
            limit: self.limit,
            sort_by: self.sort_by.as_deref(),
            order: self.order.as_deref(),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let db = Database::open(&config.db_path)?;
    tracing::debug!(path = %config.db_path.display(), "opened database");

    match cli.command {
        Commands::Ingest { file, json } => cmd_ingest(&db, &file, json),
        Commands::List { paging, json } => cmd_list(&db, &paging.as_paging(), json),
        Commands::Show { id, json } => cmd_show(&db, id, json),
        Commands::Search {
            title,
            cuisine,
            min_rating,
            max_total_time,
            min_calories,
            max_calories,
            paging,
            json,
        } => {
            let filter = RecipeFilter {
                title,
                cuisine,
                min_rating,
                max_total_time,
                min_calories,
                max_calories,
            };
            cmd_search(&db, &filter, &paging.as_paging(), json)
        }
        Commands::Serve { port, bind } => server::start_server(db, port, &bind).await,
    }
}
