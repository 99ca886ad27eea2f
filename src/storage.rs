use crate::error::{EtlError, Result};
use crate::types::{dedupe_names, TabularData, Value};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

fn value_from_sql(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(format!("<blob {} bytes>", b.len())),
    }
}

/// Double-quotes an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Failures that mean the file itself is not a usable store are store
/// errors; everything else a statement can hit is a query error.
fn query_error(err: rusqlite::Error) -> EtlError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt | ErrorCode::CannotOpen
            ) =>
        {
            EtlError::store(err)
        }
        _ => EtlError::query(err),
    }
}

/// Returns the statement text without its terminator, or `None` when `sql`
/// holds more than one statement. Quoted text and comments are skipped.
fn single_statement(sql: &str) -> Option<&str> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_comment(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i + 1, q),
            b'[' => i = skip_quoted(bytes, i + 1, b']'),
            b';' => return only_trivia(&bytes[i..]).then(|| &sql[..i]),
            _ => i += 1,
        }
    }
    Some(sql)
}

fn skip_comment(bytes: &[u8], i: usize) -> Option<usize> {
    match (bytes.get(i), bytes.get(i + 1)) {
        (Some(b'-'), Some(b'-')) => Some(
            bytes[i..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |p| i + p + 1),
        ),
        (Some(b'/'), Some(b'*')) => Some(
            bytes[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(bytes.len(), |p| i + 2 + p + 2),
        ),
        _ => None,
    }
}

fn skip_quoted(bytes: &[u8], mut i: usize, close: u8) -> usize {
    while i < bytes.len() {
        if bytes[i] == close {
            // doubled quote is an escaped quote
            if close != b']' && bytes.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn only_trivia(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_comment(bytes, i) {
            i = next;
        } else if bytes[i] == b';' || bytes[i].is_ascii_whitespace() {
            i += 1;
        } else {
            return false;
        }
    }
    true
}

/// An open handle on the SQLite store.
///
/// Every store operation opens one of these right before use and closes it
/// when done; a handle dropped on an error path is closed by `Drop`.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Opens the store, creating the file if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(EtlError::store)?;
        debug!("store opened path={}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing store without write access.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(EtlError::store)?;
        debug!("store opened read-only path={}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn.close().map_err(|(_, e)| EtlError::store(e))?;
        debug!("store closed path={}", path.display());
        Ok(())
    }

    /// Drops relation `name` if present and recreates it holding exactly
    /// `table`, all inside one transaction.
    pub fn replace_table(&mut self, name: &str, table: &TabularData) -> Result<()> {
        let quoted = quote_ident(name);
        let column_defs: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type().sql_name()))
            .collect();
        let placeholders = vec!["?"; table.column_count()].join(", ");

        let tx = self.conn.transaction().map_err(EtlError::store)?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {quoted}; CREATE TABLE {quoted} ({});",
            column_defs.join(", ")
        ))
        .map_err(EtlError::store)?;
        {
            let mut stmt = tx
                .prepare(&format!("INSERT INTO {quoted} VALUES ({placeholders})"))
                .map_err(EtlError::store)?;
            for row in table.rows() {
                stmt.execute(params_from_iter(row)).map_err(EtlError::store)?;
            }
        }
        tx.commit().map_err(EtlError::store)?;
        Ok(())
    }

    /// User tables in name order.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(EtlError::store)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(EtlError::store)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(EtlError::store)?;
        Ok(names)
    }

    /// Runs one read-only statement and materializes every row.
    pub fn select(&self, sql: &str) -> Result<TabularData> {
        let statement = single_statement(sql).ok_or_else(|| {
            EtlError::query(format!("only one statement per query is allowed: {}", sql))
        })?;
        let mut stmt = self.conn.prepare(statement).map_err(query_error)?;
        if !stmt.readonly() {
            return Err(EtlError::query(format!(
                "only read statements are allowed: {}",
                sql
            )));
        }
        let names = dedupe_names(stmt.column_names().into_iter().map(String::from).collect());
        let width = names.len();

        let mut rows = stmt.query([]).map_err(query_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(value_from_sql(row.get_ref(i).map_err(query_error)?));
            }
            out.push(values);
        }
        TabularData::from_rows(names, out)
    }
}

/// Writes `table` into relation `name` of the store at `store_path`,
/// replacing whatever was there. The store is closed on every path.
#[instrument(skip(table), fields(store = %store_path.display(), rows = table.row_count()))]
pub fn write_table(table: &TabularData, store_path: &Path, name: &str) -> Result<()> {
    info!("Saving data to SQLite table");
    let mut store = Store::open(store_path)?;
    let outcome = store.replace_table(name, table);
    let closed = store.close();
    outcome?;
    closed?;
    info!("Data saved to store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banks(names: &[&str]) -> TabularData {
        TabularData::from_rows(
            vec!["Rank".into(), "Bank name".into(), "Market cap".into()],
            names
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    vec![
                        Value::Integer(i as i64 + 1),
                        Value::Text(n.to_string()),
                        Value::Real(100.5 * (i as f64 + 1.0)),
                    ]
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_write_then_select_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        let table = banks(&["JPMorgan Chase", "HSBC London"]);
        write_table(&table, &db, "largest_banks").unwrap();

        let store = Store::open_read_only(&db).unwrap();
        let back = store.select("SELECT * FROM largest_banks").unwrap();
        store.close().unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_second_write_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        write_table(&banks(&["A", "B", "C"]), &db, "largest_banks").unwrap();
        write_table(&banks(&["Z"]), &db, "largest_banks").unwrap();

        let store = Store::open_read_only(&db).unwrap();
        let back = store.select("SELECT * FROM largest_banks").unwrap();
        assert_eq!(back, banks(&["Z"]));
        assert_eq!(store.table_names().unwrap(), vec!["largest_banks"]);
    }

    #[test]
    fn test_column_types_follow_values() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        write_table(&banks(&["A"]), &db, "t").unwrap();

        let store = Store::open_read_only(&db).unwrap();
        let info = store
            .select("SELECT name, type FROM pragma_table_info('t')")
            .unwrap();
        let types: Vec<String> = info
            .rows()
            .map(|r| r[1].render())
            .collect();
        assert_eq!(types, vec!["INTEGER", "TEXT", "REAL"]);
    }

    #[test]
    fn test_quoted_names_survive() {
        assert_eq!(quote_ident("Bank name"), "\"Bank name\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_unreachable_store_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("no_such_dir").join("Banks.db");
        let err = write_table(&banks(&["A"]), &db, "t").unwrap_err();
        assert!(matches!(err, EtlError::Store { .. }));
    }

    #[test]
    fn test_corrupt_store_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        std::fs::write(&db, vec![0x42u8; 4096]).unwrap();
        let err = write_table(&banks(&["A"]), &db, "t").unwrap_err();
        assert!(matches!(err, EtlError::Store { .. }));
    }

    #[test]
    fn test_select_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Banks.db");
        write_table(&banks(&["A"]), &db, "t").unwrap();
        let store = Store::open(&db).unwrap();
        let err = store.select("DELETE FROM t").unwrap_err();
        assert!(matches!(err, EtlError::Query { .. }));
        assert_eq!(store.select("SELECT COUNT(*) FROM t").unwrap().row(0).unwrap()[0], &Value::Integer(1));
    }

    #[test]
    fn test_single_statement_ignores_quoted_and_trailing_terminators() {
        assert_eq!(single_statement("SELECT 1"), Some("SELECT 1"));
        assert_eq!(single_statement("SELECT 1; "), Some("SELECT 1"));
        assert_eq!(single_statement("SELECT 1; -- done\n;"), Some("SELECT 1"));
        assert_eq!(
            single_statement("SELECT 'a;b', \"c;d\" FROM t"),
            Some("SELECT 'a;b', \"c;d\" FROM t")
        );
        assert_eq!(
            single_statement("SELECT 'it''s; fine'"),
            Some("SELECT 'it''s; fine'")
        );
        assert_eq!(single_statement("SELECT 1 /* ; */"), Some("SELECT 1 /* ; */"));
        assert_eq!(single_statement("SELECT 1; SELECT 2"), None);
        assert_eq!(single_statement("SELECT 1; /* x */ DROP TABLE t"), None);
    }
}
