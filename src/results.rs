use serde::{Deserialize, Serialize};

use crate::domain::CorrelationSign;
use crate::error::KiraError;

pub const SIGNIFICANCE_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub matrix: String,
    pub category: String,
    pub gene: String,
    pub r: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub accession: String,
    pub target_gene: String,
    records: Vec<CorrelationRecord>,
}

impl ResultTable {
    pub fn new(
        accession: impl Into<String>,
        target_gene: impl Into<String>,
        records: Vec<CorrelationRecord>,
    ) -> Self {
        Self {
            accession: accession.into(),
            target_gene: target_gene.into(),
            records,
        }
    }

    pub fn records(&self) -> &[CorrelationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records with `p_value < 0.05`, ascending by `r`.
    pub fn significant(&self) -> Vec<&CorrelationRecord> {
        self.significant_at(SIGNIFICANCE_THRESHOLD)
    }

    pub fn significant_at(&self, p_threshold: f64) -> Vec<&CorrelationRecord> {
        let mut selected = self
            .records
            .iter()
            .filter(|record| record.p_value < p_threshold)
            .collect::<Vec<_>>();
        selected.sort_by(|a, b| a.r.total_cmp(&b.r));
        selected
    }

    /// Significant records whose direction is one of `signs`.
    pub fn select(&self, p_threshold: f64, signs: &[CorrelationSign]) -> Vec<&CorrelationRecord> {
        self.significant_at(p_threshold)
            .into_iter()
            .filter(|record| signs.iter().any(|sign| sign.matches(record.r)))
            .collect()
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, KiraError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in &self.records {
            writer
                .serialize(record)
                .map_err(|err| KiraError::Persistence(format!("result csv: {err}")))?;
        }
        writer
            .into_inner()
            .map_err(|err| KiraError::Persistence(format!("result csv: {err}")))
    }
}
