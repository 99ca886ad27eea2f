use clap::{Parser, Subcommand};
use largest_banks_etl::config::EtlConfig;
use largest_banks_etl::infra::http_client::ReqwestFetcher;
use largest_banks_etl::logging;
use largest_banks_etl::pipeline::Pipeline;
use largest_banks_etl::query::{dump_all, query};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

#[derive(Parser)]
#[command(name = "largest_banks_etl")]
#[command(about = "Scrape the largest-banks table, convert market caps, load to CSV and SQLite")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./etl.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and the configured city lookups (default)
    Run {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one read query against the store
    Query {
        sql: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print every table and row in the store
    Inspect,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = EtlConfig::load(cli.config.as_deref())?;

    let _guard = logging::init_logging(&config.log_dir);

    let command = cli.command.unwrap_or(Commands::Run { json: false });
    let result = execute(command, &config).await;
    if let Err(e) = &result {
        error!("Run failed: {:#}", e);
    }
    result
}

async fn execute(command: Commands, config: &EtlConfig) -> anyhow::Result<()> {
    match command {
        Commands::Run { json } => run(config, json).await,
        Commands::Query { sql, json } => {
            let rows = query(&config.store_path, &sql)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print!("{}", rows);
            }
            Ok(())
        }
        Commands::Inspect => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            dump_all(&config.store_path, &mut out)?;
            Ok(())
        }
    }
}

async fn run(config: &EtlConfig, json: bool) -> anyhow::Result<()> {
    println!("🚀 Running ETL pipeline for {}", config.url);
    let fetcher = ReqwestFetcher::new(Duration::from_secs(config.http_timeout_secs))?;
    let report = Pipeline::run(config, &fetcher).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n📊 Pipeline results:");
    println!("   Rows: {}", report.rows);
    println!("   Columns: {}", report.columns.join(", "));
    println!("   CSV: {}", report.output_csv.display());
    println!(
        "   Store: {} (table {})",
        report.store_path.display(),
        report.table_name
    );
    for result in &report.lookups {
        println!("\nResults for {}:", result.lookup.city);
        print!("{}", result.rows);
    }
    Ok(())
}
