#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for the distressed-property ingestion pipeline.

use clap::{Parser, Subcommand};
use distress_map_database::{db, paths};
use distress_map_ingest::{PipelineArgs, run_pipeline};
use distress_map_source::registry;

#[derive(Parser)]
#[command(name = "distress_map_ingest", about = "Distressed-property ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest from sources, then rescore every property
    Run {
        /// Run only a specific source (e.g. "permits")
        #[arg(long)]
        source: Option<String>,
        /// Skip fetching and re-apply scoring from the config file
        #[arg(long)]
        rescore_only: bool,
    },
    /// List all configured data sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sources => {
            println!("NAME");
            println!("{}", "-".repeat(30));
            for source in registry::all_sources(&paths::downloads_dir()) {
                println!("{}", source.source_name());
            }
        }
        Commands::Run {
            source,
            rescore_only,
        } => {
            // A store that cannot open is the one fatal, nonzero-exit
            // case; source failures inside the run are logged instead.
            let mut conn = db::open_default()?;

            let args = PipelineArgs {
                sources: source.into_iter().collect(),
                rescore_only,
            };
            run_pipeline(&mut conn, &args).await?;
        }
    }

    Ok(())
}
