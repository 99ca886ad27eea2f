use crate::app::ports::PageFetcher;
use crate::config::EtlConfig;
use crate::error::Result;
use crate::export::write_csv;
use crate::extract::TableExtractor;
use crate::query::CityLookup;
use crate::storage::write_table;
use crate::transform::transform_with_rates_file;
use crate::types::TabularData;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Result of one city lookup.
#[derive(Debug, Serialize)]
pub struct LookupResult {
    pub lookup: CityLookup,
    pub rows: TabularData,
}

/// Result of a complete pipeline run
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub output_csv: PathBuf,
    pub load_csv: PathBuf,
    pub store_path: PathBuf,
    pub table_name: String,
    pub lookups: Vec<LookupResult>,
}

pub struct Pipeline;

impl Pipeline {
    /// Extract, transform, write the flat file, load the store, write the
    /// load copy, then run every configured lookup. The first failing stage
    /// aborts the run; outputs already written stay on disk.
    #[instrument(skip(config, fetcher), fields(url = %config.url))]
    pub async fn run(config: &EtlConfig, fetcher: &dyn PageFetcher) -> Result<PipelineReport> {
        let started_at = Utc::now();
        info!("Starting pipeline");

        let extracted = TableExtractor::new(fetcher).extract(&config.url).await?;
        info!("Columns before transform: {:?}", extracted.column_names());

        let table = transform_with_rates_file(
            extracted,
            &config.exchange_rates_csv,
            &config.market_cap_column,
        )?;

        write_csv(&table, &config.output_csv)?;
        write_table(&table, &config.store_path, &config.table_name)?;
        write_csv(&table, config.load_csv_path())?;

        let mut lookups = Vec::with_capacity(config.lookups.len());
        for cfg in &config.lookups {
            let lookup = CityLookup::from(cfg);
            let rows = lookup.run(&config.store_path, &config.table_name)?;
            info!("Lookup city={} rows={}", lookup.city, rows.row_count());
            lookups.push(LookupResult { lookup, rows });
        }

        info!("Pipeline finished");
        Ok(PipelineReport {
            url: config.url.clone(),
            started_at,
            finished_at: Utc::now(),
            rows: table.row_count(),
            columns: table.column_names().into_iter().map(String::from).collect(),
            output_csv: config.output_csv.clone(),
            load_csv: config.load_csv_path().to_path_buf(),
            store_path: config.store_path.clone(),
            table_name: config.table_name.clone(),
            lookups,
        })
    }
}
