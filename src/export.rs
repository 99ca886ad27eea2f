use crate::error::Result;
use crate::types::{Column, TabularData};
use std::fs::File;
use std::path::Path;
use tracing::{info, instrument};

/// Writes the table as comma-separated text: a header row of column names,
/// then one line per row, no index column. Any existing file is replaced.
#[instrument(skip(table), fields(path = %path.display(), rows = table.row_count()))]
pub fn write_csv(table: &TabularData, path: &Path) -> Result<()> {
    info!("Saving data to CSV file");
    let file = File::create(path)?;
    let mut wtr = csv::Writer::from_writer(file);

    wtr.write_record(table.column_names())?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|v| v.render()))?;
    }
    wtr.flush()?;

    info!("CSV file saved");
    Ok(())
}

/// Reads a file produced by [`write_csv`] back into a table, inferring
/// column types the same way extraction does.
pub fn read_csv(path: &Path) -> Result<TabularData> {
    let mut rdr = csv::Reader::from_path(path)?;
    let names: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for record in rdr.records() {
        let record = record?;
        for (column, field) in cells.iter_mut().zip(record.iter()) {
            column.push(field.to_string());
        }
    }

    let columns = names
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::infer(name, values))
        .collect();
    TabularData::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::types::Value;

    fn sample() -> TabularData {
        TabularData::from_rows(
            vec!["Rank".into(), "Bank name".into(), "MC_GBP_Billones".into()],
            vec![
                vec![
                    Value::Integer(1),
                    Value::Text("JPMorgan Chase, N.A.".into()),
                    Value::Real(346.34),
                ],
                vec![Value::Integer(2), Value::Text("HSBC London".into()), Value::Real(80.0)],
                vec![Value::Integer(3), Value::Text("Nobody".into()), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_writes_header_and_rows_without_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banks.csv");
        write_csv(&sample(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Rank,Bank name,MC_GBP_Billones");
        assert_eq!(lines[1], "1,\"JPMorgan Chase, N.A.\",346.34");
        assert_eq!(lines[2], "2,HSBC London,80.0");
        assert_eq!(lines[3], "3,Nobody,");
    }

    #[test]
    fn test_round_trip_preserves_columns_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banks.csv");
        let table = sample();
        write_csv(&table, &path).unwrap();
        assert_eq!(read_csv(&path).unwrap(), table);
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banks.csv");
        std::fs::write(&path, "stale,content\n1,2\n3,4\n5,6\n7,8\n").unwrap();
        let table = sample().head(1);
        write_csv(&table, &path).unwrap();
        assert_eq!(read_csv(&path).unwrap(), table);
    }

    #[test]
    fn test_unwritable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("banks.csv");
        let err = write_csv(&sample(), &path).unwrap_err();
        assert!(matches!(err, EtlError::Io(_)));
    }
}
