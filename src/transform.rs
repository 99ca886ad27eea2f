use crate::config::MarketCapColumn;
use crate::constants::{converted_column_name, MIN_TRANSFORM_COLUMNS, RATE_COLUMN, TARGET_CURRENCIES};
use crate::error::{EtlError, Result};
use crate::types::{Column, TabularData, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Currency code to rate, read from a CSV whose first column is the code
/// and which carries a `Rate` column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeRates {
    rates: HashMap<String, f64>,
}

impl ExchangeRates {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            rates: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let rate_idx = headers
            .iter()
            .position(|h| h == RATE_COLUMN)
            .filter(|&i| i > 0)
            .ok_or_else(|| {
                EtlError::Schema(format!(
                    "exchange-rate file needs a currency column followed by a '{}' column, got {:?}",
                    RATE_COLUMN,
                    headers.iter().collect::<Vec<_>>()
                ))
            })?;

        let mut rates = HashMap::new();
        for record in rdr.records() {
            let record = record?;
            let code = record.get(0).unwrap_or_default().to_string();
            let raw = record.get(rate_idx).unwrap_or_default();
            let rate: f64 = raw.parse().map_err(|_| {
                EtlError::Schema(format!("rate for '{}' is not a number: '{}'", code, raw))
            })?;
            rates.insert(code, rate);
        }
        debug!("loaded {} exchange rates", rates.len());
        Ok(Self { rates })
    }

    pub fn get(&self, code: &str) -> Result<f64> {
        self.rates
            .get(code)
            .copied()
            .ok_or_else(|| EtlError::KeyLookup(code.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Rounds half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Appends the converted market-cap columns, reading market cap from the
/// third column.
pub fn transform(table: TabularData, rates: &ExchangeRates) -> Result<TabularData> {
    transform_column(table, rates, &MarketCapColumn::default())
}

/// Appends `MC_GBP_Billones`, `MC_EUR_Billones` and `MC_INR_Billones`, each
/// the market-cap column times the rate, rounded to two places. Existing
/// columns are left untouched; null market caps stay null.
#[instrument(skip(table, rates), fields(rows = table.row_count()))]
pub fn transform_column(
    mut table: TabularData,
    rates: &ExchangeRates,
    market_cap: &MarketCapColumn,
) -> Result<TabularData> {
    if table.column_count() < MIN_TRANSFORM_COLUMNS {
        return Err(EtlError::Schema(format!(
            "need at least {} columns, table has {}: {:?}",
            MIN_TRANSFORM_COLUMNS,
            table.column_count(),
            table.column_names()
        )));
    }

    let column = resolve_column(&table, market_cap)?;
    if !column.is_numeric() {
        return Err(EtlError::Schema(format!(
            "market cap column '{}' is not numeric",
            column.name
        )));
    }
    let caps: Vec<Option<f64>> = column.values.iter().map(Value::as_f64).collect();
    info!("Converting market cap column '{}'", column.name);

    for code in TARGET_CURRENCIES {
        let rate = rates.get(code)?;
        let values = caps
            .iter()
            .map(|cap| match cap {
                Some(v) => Value::Real(round2(v * rate)),
                None => Value::Null,
            })
            .collect();
        table.push_column(Column::new(converted_column_name(code), values))?;
    }

    info!("Data transformed: columns={}", table.column_count());
    Ok(table)
}

/// Loads the rate file fresh and converts.
pub fn transform_with_rates_file(
    table: TabularData,
    rates_path: &Path,
    market_cap: &MarketCapColumn,
) -> Result<TabularData> {
    info!(
        "Transforming {} rows with exchange rates from {}",
        table.row_count(),
        rates_path.display()
    );
    let rates = ExchangeRates::from_csv(rates_path)?;
    transform_column(table, &rates, market_cap)
}

fn resolve_column<'t>(table: &'t TabularData, market_cap: &MarketCapColumn) -> Result<&'t Column> {
    let found = match market_cap {
        MarketCapColumn::Index(i) => table.column(*i),
        MarketCapColumn::Name(name) => table.column_by_name(name),
    };
    found.ok_or_else(|| {
        EtlError::Schema(format!(
            "market cap column {:?} not found in {:?}",
            market_cap,
            table.column_names()
        ))
    })
}
