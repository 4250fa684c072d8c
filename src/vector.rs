use std::collections::HashMap;

use serde::Serialize;

use crate::progress::{ProgressEvent, ProgressSink};
use crate::table::{Column, Table};

/// An empty vector means "gene not found"; it is never an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneVector {
    name: String,
    samples: Vec<String>,
    values: Vec<Option<f64>>,
}

impl GeneVector {
    pub fn new(name: impl Into<String>, samples: Vec<String>, values: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(samples.len(), values.len());
        Self {
            name: name.into(),
            samples,
            values,
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, sample: &str) -> Option<f64> {
        self.samples
            .iter()
            .position(|s| s == sample)
            .and_then(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.samples
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub(crate) fn as_map(&self) -> HashMap<&str, Option<f64>> {
        self.iter().collect()
    }
}

fn is_symbol_column(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.contains("SYMBOL") || upper.contains("GENE")
}

/// Locates `gene` in `matrix` and returns its per-sample expression.
///
/// The row index is searched first, then symbol-like annotation columns; matching ignores case.
/// Every numeric column is a sample, whatever its name. Duplicate rows are averaged per sample.
/// A miss is narrated as a warning and yields an empty vector.
pub fn resolve(matrix: &Table, gene: &str, sink: &dyn ProgressSink) -> GeneVector {
    if !matrix.is_consistent() {
        sink.event(ProgressEvent::error(format!(
            "matrix with {} rows is malformed, cannot look up {gene}",
            matrix.n_rows()
        )));
        return GeneVector::empty(gene);
    }

    let target = gene.to_uppercase();
    let mut rows = matrix
        .index()
        .iter()
        .enumerate()
        .filter(|(_, label)| label.to_uppercase() == target)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    if rows.is_empty() {
        for column in matrix.columns().iter().filter(|c| is_symbol_column(&c.name)) {
            rows = (0..column.data.len())
                .filter(|&row| {
                    column
                        .data
                        .cell_text(row)
                        .is_some_and(|text| text.to_uppercase() == target)
                })
                .collect();
            if !rows.is_empty() {
                break;
            }
        }
    }

    if rows.is_empty() {
        sink.event(ProgressEvent::warn(format!(
            "gene {gene} not found in matrix"
        )));
        return GeneVector::empty(gene);
    }

    let mut samples = Vec::new();
    let mut values = Vec::new();
    for column in matrix.columns() {
        let Column::Numeric(cells) = &column.data else {
            continue;
        };
        samples.push(column.name.clone());
        values.push(mean_of(rows.iter().map(|&row| cells[row])));
    }

    if samples.is_empty() {
        sink.event(ProgressEvent::warn(format!(
            "gene {gene} matched {} row(s) but carries no numeric data",
            rows.len()
        )));
        return GeneVector::empty(gene);
    }

    if rows.len() > 1 {
        sink.event(ProgressEvent::debug(format!(
            "gene {gene} matched {} rows, averaging per sample",
            rows.len()
        )));
    }
    GeneVector::new(gene, samples, values)
}

fn mean_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}
