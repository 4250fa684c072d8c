use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

const MISSING_TOKENS: &[&str] = &["", "NA", "NaN", "nan", "N/A", "null", "NULL"];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub const MISSING_LABEL: &str = "NA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    pub fn numeric(&self) -> Option<&[Option<f64>]> {
        match self {
            Column::Numeric(values) => Some(values),
            Column::Text(_) => None,
        }
    }

    pub fn cell_text(&self, row: usize) -> Option<String> {
        match self {
            Column::Numeric(values) => values.get(row).copied().flatten().map(|v| v.to_string()),
            Column::Text(values) => values.get(row).cloned().flatten(),
        }
    }

    fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(values) => Column::Numeric(rows.iter().map(|&i| values[i]).collect()),
            Column::Text(values) => {
                Column::Text(rows.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }

    fn infer(cells: Vec<String>) -> Column {
        let parsed = cells
            .iter()
            .map(|cell| {
                let cell = cell.trim();
                if is_missing(cell) {
                    return Ok(None);
                }
                match cell.parse::<f64>() {
                    Ok(value) if value.is_finite() => Ok(Some(value)),
                    _ => Err(()),
                }
            })
            .collect::<Result<Vec<_>, ()>>();
        match parsed {
            Ok(values) => Column::Numeric(values),
            Err(()) => Column::Text(
                cells
                    .into_iter()
                    .map(|cell| (!is_missing(cell.trim())).then_some(cell))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedColumn {
    pub name: String,
    pub data: Column,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    index_name: String,
    index: Vec<String>,
    columns: Vec<NamedColumn>,
}

impl Table {
    pub fn new(
        index_name: impl Into<String>,
        index: Vec<String>,
        columns: Vec<(String, Column)>,
    ) -> Result<Self, KiraError> {
        let table = Self {
            index_name: index_name.into(),
            index,
            columns: columns
                .into_iter()
                .map(|(name, data)| NamedColumn { name, data })
                .collect(),
        };
        if let Some(bad) = table.columns.iter().find(|c| c.data.len() != table.index.len()) {
            return Err(KiraError::MatrixParse {
                path: "in-memory table".to_string(),
                message: format!(
                    "column {} has {} cells for {} rows",
                    bad.name,
                    bad.data.len(),
                    table.index.len()
                ),
            });
        }
        Ok(table)
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn columns(&self) -> &[NamedColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| &column.data)
    }

    pub fn is_consistent(&self) -> bool {
        self.columns
            .iter()
            .all(|column| column.data.len() == self.index.len())
    }

    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            index_name: self.index_name.clone(),
            index: rows.iter().map(|&i| self.index[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|column| NamedColumn {
                    name: column.name.clone(),
                    data: column.data.take(rows),
                })
                .collect(),
        }
    }

    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Table {
        Table {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns: names
                .iter()
                .filter_map(|name| {
                    self.columns
                        .iter()
                        .find(|column| column.name == name.as_ref())
                        .cloned()
                })
                .collect(),
        }
    }

    pub fn unique_values(&self, name: &str) -> Vec<String> {
        let Some(column) = self.column(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for row in 0..column.len() {
            let text = column
                .cell_text(row)
                .unwrap_or_else(|| MISSING_LABEL.to_string());
            if seen.insert(text.clone()) {
                values.push(text);
            }
        }
        values
    }

    /// Rows whose cell text in `name` is one of `values` (missing cells match [`MISSING_LABEL`]).
    pub fn filter_by_values(&self, name: &str, values: &[String]) -> Table {
        let Some(column) = self.column(name) else {
            return self.select_rows(&[]);
        };
        let wanted = values.iter().map(String::as_str).collect::<HashSet<_>>();
        let rows = (0..column.len())
            .filter(|&row| {
                let text = column
                    .cell_text(row)
                    .unwrap_or_else(|| MISSING_LABEL.to_string());
                wanted.contains(text.as_str())
            })
            .collect::<Vec<_>>();
        self.select_rows(&rows)
    }

    pub fn from_tsv<R: Read>(reader: R, origin: &str) -> Result<Self, KiraError> {
        let parse_err = |message: String| KiraError::MatrixParse {
            path: origin.to_string(),
            message,
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut records = reader.records();
        let header = match records.next() {
            Some(record) => record.map_err(|err| parse_err(err.to_string()))?,
            None => return Ok(Table::default()),
        };
        let rows = records
            .collect::<Result<Vec<StringRecord>, _>>()
            .map_err(|err| parse_err(err.to_string()))?;

        // R-style exports leave the index column unnamed in the header.
        let width = rows.first().map(StringRecord::len).unwrap_or(header.len());
        let (index_name, names) = if width == header.len() + 1 {
            (String::new(), header.iter().map(str::to_string).collect::<Vec<_>>())
        } else {
            (
                header.get(0).unwrap_or_default().to_string(),
                header.iter().skip(1).map(str::to_string).collect::<Vec<_>>(),
            )
        };

        let mut index = Vec::with_capacity(rows.len());
        let mut cells = vec![Vec::with_capacity(rows.len()); names.len()];
        for (line, row) in rows.iter().enumerate() {
            if row.len() > names.len() + 1 {
                return Err(parse_err(format!(
                    "line {} has {} fields, expected {}",
                    line + 2,
                    row.len(),
                    names.len() + 1
                )));
            }
            index.push(row.get(0).unwrap_or_default().trim().to_string());
            for (col, column_cells) in cells.iter_mut().enumerate() {
                column_cells.push(row.get(col + 1).unwrap_or_default().to_string());
            }
        }

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, column_cells)| (name, Column::infer(column_cells)))
            .collect();
        Table::new(index_name, index, columns)
    }

    pub fn read_matrix(path: &Path) -> Result<Self, KiraError> {
        let origin = path.display().to_string();
        let file = File::open(path).map_err(|err| KiraError::MatrixParse {
            path: origin.clone(),
            message: err.to_string(),
        })?;
        let mut reader = BufReader::new(file);
        let is_gzip = reader
            .fill_buf()
            .map(|head| head.starts_with(&GZIP_MAGIC))
            .map_err(|err| KiraError::MatrixParse {
                path: origin.clone(),
                message: err.to_string(),
            })?;
        if is_gzip {
            Self::from_tsv(MultiGzDecoder::new(reader), &origin)
        } else {
            Self::from_tsv(reader, &origin)
        }
    }
}

fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(&cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATRIX: &str = "gene_id\tSYMBOL\tS1\tS2\tS3\n\
                          ENS1\tActa2\t1.0\t2.5\tNA\n\
                          ENS2\tVim\t3\t4\t5\n";

    #[test]
    fn parse_infers_column_types() {
        let table = Table::from_tsv(MATRIX.as_bytes(), "inline").unwrap();
        assert_eq!(table.index_name(), "gene_id");
        assert_eq!(table.index(), ["ENS1", "ENS2"]);
        assert!(!table.column("SYMBOL").unwrap().is_numeric());
        assert_eq!(
            table.column("S3").unwrap().numeric().unwrap(),
            &[None, Some(5.0)]
        );
    }

    #[test]
    fn parse_header_without_index_name() {
        let text = "S1\tS2\nActa2\t1\t2\nVim\t3\t4\n";
        let table = Table::from_tsv(text.as_bytes(), "inline").unwrap();
        assert_eq!(table.index_name(), "");
        assert_eq!(table.column_names().collect::<Vec<_>>(), ["S1", "S2"]);
        assert_eq!(table.n_rows(), 2);
    }

    #[test]
    fn parse_rejects_overlong_rows() {
        let text = "id\tS1\nA\t1\nB\t1\t2\t3\n";
        assert!(Table::from_tsv(text.as_bytes(), "inline").is_err());
    }

    #[test]
    fn unique_values_keep_first_appearance_order() {
        let table = Table::new(
            "sample",
            vec!["GSM1".into(), "GSM2".into(), "GSM3".into()],
            vec![(
                "title".to_string(),
                Column::Text(vec![Some("ctrl".into()), None, Some("ctrl".into())]),
            )],
        )
        .unwrap();
        assert_eq!(table.unique_values("title"), ["ctrl", MISSING_LABEL]);
        let filtered = table.filter_by_values("title", &["ctrl".to_string()]);
        assert_eq!(filtered.index(), ["GSM1", "GSM3"]);
    }

    #[test]
    fn new_rejects_ragged_columns() {
        let result = Table::new(
            "id",
            vec!["a".into()],
            vec![("x".to_string(), Column::Numeric(vec![Some(1.0), Some(2.0)]))],
        );
        assert!(result.is_err());
    }
}
