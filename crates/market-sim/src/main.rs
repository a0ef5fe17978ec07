//! Market Simulation CLI.
//!
//! Commands:
//! - run: Load a scenario, run every buyer to completion and print a summary
//! - catalog: Print the built-in product catalog

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use market_kernel::Catalog;
use market_sim::{Market, MarketConfig};

#[derive(Parser)]
#[command(name = "market-sim")]
#[command(version)]
#[command(about = "Asynchronous marketplace simulation")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario
    Run {
        /// Scenario file (TOML)
        #[arg(long, env = "MARKET_SCENARIO")]
        config: PathBuf,

        /// Override the number of buyers
        #[arg(long)]
        buyers: Option<usize>,

        /// Override the shopping cycles per buyer
        #[arg(long)]
        cycles: Option<usize>,

        /// Override the master seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write the JSON report here
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the built-in product catalog
    Catalog,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Commands::Run {
            config,
            buyers,
            cycles,
            seed,
            output,
        } => {
            let mut scenario = MarketConfig::load(&config)?;
            if let Some(buyers) = buyers {
                scenario.buyers = buyers;
            }
            if let Some(cycles) = cycles {
                scenario.purchase_cycles = cycles;
            }
            if seed.is_some() {
                scenario.seed = seed;
            }

            info!(scenario = %config.display(), "Starting market");
            let report = Market::launch(scenario).await?.run().await?;

            println!("\n=== Market Run {} ===", report.run_id);
            println!("Duration: {} ms", report.duration_ms());
            println!("Buyers: {}", report.buyers.len());
            println!("  Satisfied: {}", report.satisfied_buyers());
            println!("  Orders accepted: {}", report.orders_accepted());
            println!("  Units bought: {}", report.units_bought());
            println!("  Spent: {:.2}", report.spent());

            println!("\nSellers:");
            println!(
                "  {:>4} {:<16} {:>8} {:>8} {:>8} {:>10}",
                "Id", "Name", "Settled", "Rejected", "Units", "Revenue"
            );
            for seller in &report.sellers {
                let tally = report.journal.sellers.get(&seller.seller_id).cloned().unwrap_or_default();
                println!(
                    "  {:>4} {:<16} {:>8} {:>8} {:>8} {:>10.2}",
                    seller.seller_id,
                    seller.name,
                    tally.orders_settled,
                    tally.orders_rejected,
                    tally.units_sold,
                    tally.revenue
                );
            }

            if let Some(path) = output {
                report.save(&path)?;
                println!("\nReport saved to: {}", path.display());
            }
        }

        Commands::Catalog => {
            for name in Catalog::default().names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}
