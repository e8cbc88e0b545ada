use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use listing_merge::config::Config;
use listing_merge::observability::{init_logging, metrics};
use listing_merge::pipeline::processing::enrich::enrich_website;
use listing_merge::pipeline::Pipeline;
use listing_merge::server;

#[derive(Parser)]
#[command(name = "listing_merge")]
#[command(about = "Merge business listings from Google, Facebook and company websites")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./listing_merge.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every source, resolve duplicates and write the merged table
    Merge,
    /// Combine the website locality columns into a single address column
    EnrichAddress,
    /// Serve datasets and the merge trigger over HTTP
    Serve {
        /// Port to listen on, overriding config and $PORT
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();
    metrics::init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Merge => {
            println!("🔄 Running merge...");
            let report = Pipeline::run(Arc::new(config)).await.map_err(|e| {
                error!("Merge run failed: {}", e);
                e
            })?;

            println!("\n📊 Merge Results (run {}):", report.run_id);
            for source in &report.sources {
                match &source.skipped {
                    Some(reason) => println!("   {}: skipped ({})", source.source, reason),
                    None => println!(
                        "   {}: {} rows ({} malformed, {} rejected)",
                        source.source, source.rows_loaded, source.malformed_rows, source.rejected_rows
                    ),
                }
            }
            println!("   Groups: {}", report.stats.groups);
            println!("   Duplicates collapsed: {}", report.stats.duplicates_collapsed);
            println!("   Records written: {}", report.stats.output_records);
            println!("✅ Merged dataset saved as: {}", report.output.display());
        }
        Commands::EnrichAddress => {
            println!("🏠 Enriching website addresses...");
            let summary = tokio::task::spawn_blocking(move || enrich_website(&config))
                .await
                .context("Enrichment task panicked")??;
            if summary.sub_fields_found.is_empty() {
                warn!("No locality columns found; address column is empty");
            }
            println!(
                "✅ Wrote {} rows ({} malformed skipped), combined {:?}",
                summary.rows_written, summary.malformed_rows, summary.sub_fields_found
            );
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            info!("Starting HTTP server on port {}", config.server.port);
            server::start_server(Arc::new(config)).await?;
        }
    }
    Ok(())
}
