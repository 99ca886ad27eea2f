use crate::constants;
use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Which extracted column holds the market capitalization.
///
/// Written in TOML as either a zero-based position (`market_cap_column = 2`)
/// or a header name (`market_cap_column = "Market cap (US$ billion)"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MarketCapColumn {
    Index(usize),
    Name(String),
}

impl Default for MarketCapColumn {
    fn default() -> Self {
        MarketCapColumn::Index(constants::DEFAULT_MARKET_CAP_INDEX)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LookupConfig {
    pub city: String,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub url: String,
    pub exchange_rates_csv: PathBuf,
    pub output_csv: PathBuf,
    /// Second flat-file copy written after the store load; same as
    /// `output_csv` when unset.
    pub load_csv: Option<PathBuf>,
    pub store_path: PathBuf,
    pub table_name: String,
    pub market_cap_column: MarketCapColumn,
    pub http_timeout_secs: u64,
    pub log_dir: PathBuf,
    pub lookups: Vec<LookupConfig>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            url: constants::DEFAULT_URL.to_string(),
            exchange_rates_csv: PathBuf::from(constants::DEFAULT_EXCHANGE_RATES_CSV),
            output_csv: PathBuf::from(constants::DEFAULT_OUTPUT_CSV),
            load_csv: None,
            store_path: PathBuf::from(constants::DEFAULT_STORE_PATH),
            table_name: constants::DEFAULT_TABLE_NAME.to_string(),
            market_cap_column: MarketCapColumn::default(),
            http_timeout_secs: constants::DEFAULT_HTTP_TIMEOUT_SECS,
            log_dir: PathBuf::from(constants::DEFAULT_LOG_DIR),
            lookups: constants::default_lookups()
                .into_iter()
                .map(|(city, currency)| LookupConfig {
                    city: city.to_string(),
                    currency: currency.to_string(),
                })
                .collect(),
        }
    }
}

impl EtlConfig {
    /// Loads configuration.
    ///
    /// An explicit path must exist. Without one, `etl.toml` in the working
    /// directory is used when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Path::new(constants::DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EtlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(EtlError::Config("table_name must not be empty".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(EtlError::Config(
                "http_timeout_secs must be greater than zero".into(),
            ));
        }
        for lookup in &self.lookups {
            if !constants::TARGET_CURRENCIES.contains(&lookup.currency.as_str()) {
                return Err(EtlError::Config(format!(
                    "lookup for '{}' uses unsupported currency '{}'",
                    lookup.city, lookup.currency
                )));
            }
        }
        Ok(())
    }

    pub fn load_csv_path(&self) -> &Path {
        self.load_csv.as_deref().unwrap_or(self.output_csv.as_path())
    }
}
