use std::sync::Arc;

use crate::bundle::Bundle;
use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;
use crate::markers::MarkerTaxonomy;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::results::{CorrelationRecord, ResultTable};
use crate::stats::compare;
use crate::store::Store;
use crate::vector::resolve;

pub trait BundleSource {
    fn describe(&self) -> String;
    fn load(&self) -> Result<Arc<Bundle>, KiraError>;
}

#[derive(Debug, Clone)]
pub struct LiveBundle {
    bundle: Arc<Bundle>,
}

impl LiveBundle {
    pub fn new(bundle: Arc<Bundle>) -> Self {
        Self { bundle }
    }
}

impl BundleSource for LiveBundle {
    fn describe(&self) -> String {
        format!("live bundle of {}", self.bundle.accession)
    }

    fn load(&self) -> Result<Arc<Bundle>, KiraError> {
        Ok(Arc::clone(&self.bundle))
    }
}

#[derive(Debug, Clone)]
pub struct PersistedBundle {
    store: Store,
    accession: GeoSeriesAccession,
}

impl PersistedBundle {
    pub fn new(store: Store, accession: GeoSeriesAccession) -> Self {
        Self { store, accession }
    }
}

impl BundleSource for PersistedBundle {
    fn describe(&self) -> String {
        self.store.bundle_path(&self.accession).to_string()
    }

    fn load(&self) -> Result<Arc<Bundle>, KiraError> {
        let path = self.store.bundle_path(&self.accession);
        let unavailable = |cause: String| KiraError::BundleUnavailable {
            origin: path.to_string(),
            cause,
        };
        if !self.store.exists(&path) {
            return Err(unavailable("file does not exist".to_string()));
        }
        let bundle: Bundle =
            Store::read_json_gz(&path).map_err(|err| unavailable(err.to_string()))?;
        if !bundle.is_consistent() {
            return Err(unavailable("stored tables are malformed".to_string()));
        }
        if !bundle.has_matrices() {
            return Err(unavailable("bundle holds no matrices".to_string()));
        }
        Ok(Arc::new(bundle))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub storage: bool,
    /// Accept a summary computed by an earlier run for the same target gene.
    pub reuse_cached: bool,
}

pub struct CorrelationEngine<S: BundleSource> {
    source: S,
    store: Store,
    accession: GeoSeriesAccession,
    target_gene: String,
    taxonomy: MarkerTaxonomy,
    options: EngineOptions,
    result: Option<ResultTable>,
    from_cache: bool,
}

impl<S: BundleSource> CorrelationEngine<S> {
    pub fn new(
        source: S,
        store: Store,
        accession: GeoSeriesAccession,
        target_gene: impl Into<String>,
        options: EngineOptions,
    ) -> Self {
        Self {
            source,
            store,
            accession,
            target_gene: target_gene.into(),
            taxonomy: MarkerTaxonomy::default(),
            options,
            result: None,
            from_cache: false,
        }
    }

    pub fn with_taxonomy(mut self, taxonomy: MarkerTaxonomy) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn result(&self) -> Option<&ResultTable> {
        self.result.as_ref()
    }

    pub fn is_cached_result(&self) -> bool {
        self.from_cache
    }

    /// Produces the result table, computing it at most once per engine.
    ///
    /// A cached summary is preferred when allowed and computed for the same target gene.
    pub fn analyze(&mut self, sink: &dyn ProgressSink) -> Result<&ResultTable, KiraError> {
        if self.result.is_none() {
            let table = match self.load_cached(sink) {
                Some(table) => {
                    self.from_cache = true;
                    table
                }
                None => self.compute(sink)?,
            };
            self.result = Some(table);
        }
        self.result
            .as_ref()
            .ok_or_else(|| KiraError::EmptyAnalysis(self.accession.to_string()))
    }

    pub fn significant(
        &mut self,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<CorrelationRecord>, KiraError> {
        let table = self.analyze(sink)?;
        Ok(table.significant().into_iter().cloned().collect())
    }

    fn load_cached(&self, sink: &dyn ProgressSink) -> Option<ResultTable> {
        if !self.options.reuse_cached {
            return None;
        }
        let path = self.store.summary_path(&self.accession);
        if !self.store.exists(&path) {
            return None;
        }
        match Store::read_json::<ResultTable>(&path) {
            Ok(table) if table.is_empty() => {
                sink.event(ProgressEvent::warn(format!(
                    "cached summary {path} is empty, recomputing"
                )));
                None
            }
            Ok(table) if !table.target_gene.eq_ignore_ascii_case(&self.target_gene) => {
                sink.event(ProgressEvent::info(format!(
                    "cached summary was computed for {}, recomputing for {}",
                    table.target_gene, self.target_gene
                )));
                None
            }
            Ok(table) => {
                sink.event(ProgressEvent::info(format!(
                    "loaded {} cached correlations from {path}",
                    table.len()
                )));
                Some(table)
            }
            Err(err) => {
                sink.event(ProgressEvent::warn(format!(
                    "cached summary unreadable, recomputing: {err}"
                )));
                None
            }
        }
    }

    fn compute(&self, sink: &dyn ProgressSink) -> Result<ResultTable, KiraError> {
        sink.event(ProgressEvent::info(format!(
            "loading bundle from {}",
            self.source.describe()
        )));
        let bundle = self.source.load()?;
        let records = correlate(&bundle, &self.target_gene, &self.taxonomy, sink);
        if records.is_empty() {
            let message = format!(
                "{} matched no marker in the {} matrices of {}",
                self.target_gene,
                bundle.matrix_count(),
                self.accession
            );
            sink.event(ProgressEvent::error(format!("result matrix is empty: {message}")));
            return Err(KiraError::EmptyAnalysis(message));
        }
        sink.event(ProgressEvent::info(format!(
            "computed {} correlations",
            records.len()
        )));

        let table = ResultTable::new(self.accession.as_str(), self.target_gene.as_str(), records);
        if self.options.storage {
            self.persist(&table, sink);
        }
        Ok(table)
    }

    fn persist(&self, table: &ResultTable, sink: &dyn ProgressSink) {
        let json = self.store.summary_path(&self.accession);
        let csv = self.store.summary_csv_path(&self.accession);
        let result = Store::write_json(&json, table)
            .and_then(|()| table.to_csv())
            .and_then(|content| Store::write_bytes_atomic(&csv, &content));
        match result {
            Ok(()) => sink.event(ProgressEvent::info(format!("summary stored at {json}"))),
            Err(err) => sink.event(ProgressEvent::error(format!(
                "could not store summary: {err}"
            ))),
        }
    }
}

/// Correlates `target_gene` against every marker of `taxonomy` in every matrix of `bundle`.
///
/// Matrices lacking the target are skipped; marker pairs with fewer than three shared samples
/// produce no record.
pub fn correlate(
    bundle: &Bundle,
    target_gene: &str,
    taxonomy: &MarkerTaxonomy,
    sink: &dyn ProgressSink,
) -> Vec<CorrelationRecord> {
    let mut records = Vec::new();
    for (name, entry) in bundle.entries() {
        sink.event(ProgressEvent::info(format!("processing {name}")));
        let matrix = entry.matrix();
        let target = resolve(matrix, target_gene, sink);
        if target.is_empty() {
            sink.event(ProgressEvent::warn(format!(
                "{target_gene} not present in {name}, skipping"
            )));
            continue;
        }
        for (category, gene) in taxonomy.pairs() {
            let marker = resolve(matrix, gene, sink);
            if marker.is_empty() {
                continue;
            }
            match compare(&target, &marker) {
                Some(correlation) => records.push(CorrelationRecord {
                    matrix: name.to_string(),
                    category: category.to_string(),
                    gene: gene.to_string(),
                    r: correlation.r,
                    p_value: correlation.p_value,
                }),
                None => sink.event(ProgressEvent::debug(format!(
                    "{gene} in {name}: not enough shared samples"
                ))),
            }
        }
    }
    records
}
