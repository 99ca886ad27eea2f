/// Defaults used when no configuration file overrides them.
pub const DEFAULT_URL: &str =
    "https://web.archive.org/web/20230908091635/https://en.wikipedia.org/wiki/List_of_largest_banks";
pub const DEFAULT_CONFIG_FILE: &str = "etl.toml";
pub const DEFAULT_EXCHANGE_RATES_CSV: &str = "exchange_rate.csv";
pub const DEFAULT_OUTPUT_CSV: &str = "largest_banks_data.csv";
pub const DEFAULT_STORE_PATH: &str = "Banks.db";
pub const DEFAULT_TABLE_NAME: &str = "largest_banks";
pub const DEFAULT_MARKET_CAP_INDEX: usize = 2;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Minimum number of columns an extracted table needs before conversion.
pub const MIN_TRANSFORM_COLUMNS: usize = 3;

/// Name of the column in the exchange-rate file holding the numeric rate.
pub const RATE_COLUMN: &str = "Rate";

// Currencies appended by the transformer, in column order
pub const GBP: &str = "GBP";
pub const EUR: &str = "EUR";
pub const INR: &str = "INR";
pub const TARGET_CURRENCIES: [&str; 3] = [GBP, EUR, INR];

/// Column the city lookups match against.
pub const BANK_NAME_COLUMN: &str = "Bank name";

/// Name of the converted market-cap column for a currency code.
pub fn converted_column_name(currency: &str) -> String {
    format!("MC_{}_Billones", currency)
}

/// Default city lookups: (city, currency of the converted column).
pub fn default_lookups() -> Vec<(&'static str, &'static str)> {
    vec![("London", GBP), ("Berlin", EUR), ("New Delhi", INR)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converted_column_names_follow_currency_order() {
        let names: Vec<String> = TARGET_CURRENCIES
            .iter()
            .map(|c| converted_column_name(c))
            .collect();
        assert_eq!(
            names,
            vec!["MC_GBP_Billones", "MC_EUR_Billones", "MC_INR_Billones"]
        );
    }
}
