use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::table::Table;

pub const META_KEY: &str = "meta";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BundleEntry {
    Raw { matrix: Table },
    Aligned { matrix: Table, meta: Table },
}

impl BundleEntry {
    /// The matrix to correlate on; aligned entries expose their aligned matrix.
    pub fn matrix(&self) -> &Table {
        match self {
            BundleEntry::Raw { matrix } => matrix,
            BundleEntry::Aligned { matrix, .. } => matrix,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BundleEntry::Raw { .. } => "raw",
            BundleEntry::Aligned { .. } => "aligned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub accession: String,
    pub created_at: String,
    meta: Table,
    entries: BTreeMap<String, BundleEntry>,
}

impl Bundle {
    pub fn new(accession: impl Into<String>, meta: Table) -> Self {
        Self {
            accession: accession.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            meta,
            entries: BTreeMap::new(),
        }
    }

    pub fn meta(&self) -> &Table {
        &self.meta
    }

    /// Adds a matrix; returns `false` (and drops it) when `name` is the reserved meta key.
    pub fn insert(&mut self, name: impl Into<String>, entry: BundleEntry) -> bool {
        let name = name.into();
        if name == META_KEY {
            return false;
        }
        self.entries.insert(name, entry);
        true
    }

    pub fn get(&self, name: &str) -> Option<&BundleEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &BundleEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn matrix_count(&self) -> usize {
        self.entries.len()
    }

    pub fn has_matrices(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        self.meta.is_consistent()
            && self.entries.values().all(|entry| match entry {
                BundleEntry::Raw { matrix } => matrix.is_consistent(),
                BundleEntry::Aligned { matrix, meta } => {
                    matrix.is_consistent() && meta.is_consistent()
                }
            })
    }

    pub fn manifest_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["name", "kind", "rows", "samples"])?;
        let meta_rows = self.meta.n_rows().to_string();
        let meta_columns = self.meta.n_columns().to_string();
        writer.write_record([META_KEY, "meta", meta_rows.as_str(), meta_columns.as_str()])?;
        for (name, entry) in &self.entries {
            let matrix = entry.matrix();
            let rows = matrix.n_rows().to_string();
            let samples = sample_columns(matrix).len().to_string();
            writer.write_record([name.as_str(), entry.kind(), rows.as_str(), samples.as_str()])?;
        }
        writer.into_inner().map_err(|err| err.into_error().into())
    }
}

/// Numeric columns of a matrix; these are the samples.
pub fn sample_columns(matrix: &Table) -> Vec<&str> {
    matrix
        .columns()
        .iter()
        .filter(|column| column.data.is_numeric())
        .map(|column| column.name.as_str())
        .collect()
}

/// Restricts `matrix` to the samples also present in the metadata index.
///
/// Sample order follows the metadata. Annotation (text) columns are kept ahead of the samples.
pub fn align(matrix: &Table, meta: &Table) -> BundleEntry {
    let samples = sample_columns(matrix);
    let common = meta
        .index()
        .iter()
        .filter(|sample| samples.contains(&sample.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    let keep = matrix
        .columns()
        .iter()
        .filter(|column| !column.data.is_numeric())
        .map(|column| column.name.clone())
        .chain(common.iter().cloned())
        .collect::<Vec<_>>();

    let rows = common
        .iter()
        .filter_map(|sample| meta.index().iter().position(|s| s == sample))
        .collect::<Vec<_>>();
    BundleEntry::Aligned {
        matrix: matrix.select_columns(&keep),
        meta: meta.select_rows(&rows),
    }
}
