use crate::config::LookupConfig;
use crate::constants::{converted_column_name, BANK_NAME_COLUMN};
use crate::error::Result;
use crate::storage::{quote_ident, Store};
use crate::types::{TabularData, Value};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{info, instrument};

/// Runs one read statement verbatim against the store and returns all rows.
#[instrument(skip(store_path), fields(store = %store_path.display()))]
pub fn query(store_path: &Path, sql: &str) -> Result<TabularData> {
    info!("Running query");
    let store = Store::open_read_only(store_path)?;
    let outcome = store.select(sql);
    let closed = store.close();
    let result = outcome?;
    closed?;
    info!("Query returned {} rows", result.row_count());
    Ok(result)
}

/// Bank-name substring lookup returning the converted market cap for the
/// city's currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityLookup {
    pub city: String,
    pub currency: String,
}

impl CityLookup {
    pub fn new(city: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            currency: currency.into(),
        }
    }

    pub fn to_sql(&self, table_name: &str) -> String {
        let bank = quote_ident(BANK_NAME_COLUMN);
        format!(
            "SELECT {bank}, {} FROM {} WHERE {bank} LIKE '%{}%'",
            quote_ident(&converted_column_name(&self.currency)),
            quote_ident(table_name),
            self.city.replace('\'', "''")
        )
    }

    pub fn run(&self, store_path: &Path, table_name: &str) -> Result<TabularData> {
        query(store_path, &self.to_sql(table_name))
    }
}

impl From<&LookupConfig> for CityLookup {
    fn from(cfg: &LookupConfig) -> Self {
        CityLookup::new(cfg.city.clone(), cfg.currency.clone())
    }
}

fn render_row(row: &[&Value]) -> String {
    let cells: Vec<String> = row
        .iter()
        .map(|v| match v {
            Value::Text(s) => format!("{:?}", s),
            other => other.to_string(),
        })
        .collect();
    format!("({})", cells.join(", "))
}

/// Writes every table of the store, and every row of each, to `out`.
/// Opens the store read-only. Returns the number of tables found.
pub fn dump_all(store_path: &Path, out: &mut dyn Write) -> Result<usize> {
    let store = Store::open_read_only(store_path)?;
    let outcome = dump_tables(&store, out);
    let closed = store.close();
    let count = outcome?;
    closed?;
    Ok(count)
}

fn dump_tables(store: &Store, out: &mut dyn Write) -> Result<usize> {
    let names = store.table_names()?;
    writeln!(out, "Tables in database {}:", store.path().display())?;
    for name in &names {
        writeln!(out, "{}", name)?;
        let rows = store.select(&format!("SELECT * FROM {}", quote_ident(name)))?;
        for row in rows.rows() {
            writeln!(out, "{}", render_row(&row))?;
        }
    }
    Ok(names.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::storage::write_table;

    fn banks() -> TabularData {
        TabularData::from_rows(
            vec![
                "Bank name".into(),
                "MC_GBP_Billones".into(),
                "MC_EUR_Billones".into(),
                "MC_INR_Billones".into(),
            ],
            vec![
                vec![
                    Value::Text("HSBC London".into()),
                    Value::Real(123.45),
                    Value::Real(140.0),
                    Value::Real(12000.5),
                ],
                vec![
                    Value::Text("Deutsche Bank Berlin".into()),
                    Value::Real(50.0),
                    Value::Real(57.25),
                    Value::Real(4800.0),
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_london_lookup_returns_name_and_gbp() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        write_table(&banks(), &db, "largest_banks").unwrap();

        let result = CityLookup::new("London", "GBP")
            .run(&db, "largest_banks")
            .unwrap();
        assert_eq!(result.column_names(), vec!["Bank name", "MC_GBP_Billones"]);
        assert_eq!(result.row_count(), 1);
        assert_eq!(
            result.row(0).unwrap(),
            vec![&Value::Text("HSBC London".into()), &Value::Real(123.45)]
        );
    }

    #[test]
    fn test_lookup_sql_escapes_city() {
        let sql = CityLookup::new("St. John's", "EUR").to_sql("largest_banks");
        assert_eq!(
            sql,
            "SELECT \"Bank name\", \"MC_EUR_Billones\" FROM \"largest_banks\" WHERE \"Bank name\" LIKE '%St. John''s%'"
        );
    }

    #[test]
    fn test_missing_table_is_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        write_table(&banks(), &db, "largest_banks").unwrap();
        let err = query(&db, "SELECT * FROM nope").unwrap_err();
        assert!(matches!(err, EtlError::Query { .. }));
        let err = query(&db, "SELEC oops").unwrap_err();
        assert!(matches!(err, EtlError::Query { .. }));
    }

    #[test]
    fn test_missing_store_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = query(&dir.path().join("absent.db"), "SELECT 1").unwrap_err();
        assert!(matches!(err, EtlError::Store { .. }));
        assert!(!dir.path().join("absent.db").exists());
    }

    #[test]
    fn test_multi_statement_is_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        write_table(&banks(), &db, "largest_banks").unwrap();

        let err = query(&db, "SELECT * FROM largest_banks; SELECT 1").unwrap_err();
        assert!(matches!(err, EtlError::Query { .. }));
        let err = query(&db, "SELECT 1; DROP TABLE largest_banks").unwrap_err();
        assert!(matches!(err, EtlError::Query { .. }));

        let one = query(&db, "SELECT COUNT(*) FROM largest_banks;").unwrap();
        assert_eq!(one.row(0).unwrap()[0], &Value::Integer(2));
    }

    #[test]
    fn test_corrupt_store_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        std::fs::write(&db, vec![0x42u8; 4096]).unwrap();
        let err = query(&db, "SELECT * FROM largest_banks").unwrap_err();
        assert!(matches!(err, EtlError::Store { .. }));
    }

    #[test]
    fn test_dump_all_prints_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        write_table(&banks(), &db, "largest_banks").unwrap();

        let mut out = Vec::new();
        let tables = dump_all(&db, &mut out).unwrap();
        assert_eq!(tables, 1);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "largest_banks");
        assert_eq!(lines[2], "(\"HSBC London\", 123.45, 140.0, 12000.5)");
        assert_eq!(lines.len(), 4);

        // unchanged afterwards
        assert_eq!(query(&db, "SELECT * FROM largest_banks").unwrap(), banks());
    }
}
