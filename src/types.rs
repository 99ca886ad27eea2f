use crate::error::{EtlError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

// Plain or thousands-grouped number, optional fraction and exponent
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?(?:[eE][+-]?\d+)?$").unwrap()
});

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell; `None` for nulls and text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Text used when the value is written to a flat file.
    ///
    /// Reals always carry a decimal point (`80.0`) so that they read back as
    /// reals; nulls become empty fields.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => format!("{:?}", f),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            other => write!(f, "{}", other.render()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Storage class a column maps to in the relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

enum Cell {
    Empty,
    Int(i64),
    Real(f64),
    Text,
}

fn classify(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Cell::Empty;
    }
    if !NUMBER_RE.is_match(trimmed) {
        return Cell::Text;
    }
    let digits = trimmed.replace(',', "");
    let fractional = digits.contains(|c: char| c == '.' || c == 'e' || c == 'E');
    if !fractional {
        if let Ok(i) = digits.parse::<i64>() {
            return Cell::Int(i);
        }
    }
    match digits.parse::<f64>() {
        Ok(f) => Cell::Real(f),
        Err(_) => Cell::Text,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Builds a column from raw cell text, inferring one type for the whole
    /// column: integers, reals if any cell is fractional, otherwise text.
    /// Empty cells become nulls whatever the column type.
    pub fn infer(name: impl Into<String>, cells: Vec<String>) -> Self {
        let classified: Vec<Cell> = cells.iter().map(|c| classify(c)).collect();
        let any_text = classified.iter().any(|c| matches!(c, Cell::Text));
        let any_real = classified.iter().any(|c| matches!(c, Cell::Real(_)));

        let values = if any_text {
            cells
                .into_iter()
                .zip(classified)
                .map(|(raw, cell)| match cell {
                    Cell::Empty => Value::Null,
                    _ => Value::Text(raw.trim().to_string()),
                })
                .collect()
        } else {
            classified
                .into_iter()
                .map(|cell| match cell {
                    Cell::Empty => Value::Null,
                    Cell::Int(i) if any_real => Value::Real(i as f64),
                    Cell::Int(i) => Value::Integer(i),
                    Cell::Real(f) => Value::Real(f),
                    Cell::Text => Value::Null,
                })
                .collect()
        };

        Self::new(name, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when every non-null cell is a number.
    pub fn is_numeric(&self) -> bool {
        self.values
            .iter()
            .all(|v| matches!(v, Value::Null | Value::Integer(_) | Value::Real(_)))
    }

    pub fn column_type(&self) -> ColumnType {
        let mut ty = ColumnType::Integer;
        let mut seen_value = false;
        for v in &self.values {
            match v {
                Value::Null => {}
                Value::Integer(_) => seen_value = true,
                Value::Real(_) => {
                    seen_value = true;
                    ty = ColumnType::Real;
                }
                Value::Text(_) => return ColumnType::Text,
            }
        }
        if seen_value {
            ty
        } else {
            ColumnType::Text
        }
    }
}

/// Ordered, named, equal-length columns. Row order is preserved everywhere.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularData {
    columns: Vec<Column>,
}

impl TabularData {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::default();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Builds a table from row-major values.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut columns: Vec<Column> = names
            .into_iter()
            .map(|n| Column::new(n, Vec::with_capacity(rows.len())))
            .collect();
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(EtlError::Schema(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }
        Self::new(columns)
    }

    /// Appends a column at the end. Fails on a duplicate name or a length
    /// that differs from the existing columns.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.columns.iter().any(|c| c.name == column.name) {
            return Err(EtlError::Schema(format!(
                "duplicate column name '{}'",
                column.name
            )));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(EtlError::Schema(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    first.len()
                )));
            }
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        (0..self.row_count()).map(move |i| self.columns.iter().map(|c| &c.values[i]).collect())
    }

    /// Copy of the first `n` rows.
    pub fn head(&self, n: usize) -> TabularData {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.values.iter().take(n).cloned().collect()))
            .collect();
        TabularData { columns }
    }
}

impl fmt::Display for TabularData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return writeln!(f, "(empty table)");
        }
        let cells: Vec<Vec<String>> = self
            .rows()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(c.name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c.name, w = *w))
            .collect();
        writeln!(f, "{}", header.join("  ").trim_end())?;
        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:<w$}", v, w = *w))
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())?;
        }
        Ok(())
    }
}

impl Serialize for TabularData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let rows: Vec<Vec<&Value>> = self.rows().collect();
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("columns", &self.column_names())?;
        map.serialize_entry("rows", &rows)?;
        map.end()
    }
}

/// Renames repeated names `x`, `x.1`, `x.2`, ... keeping the first as is.
pub fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", name, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}
