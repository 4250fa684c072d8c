use std::time::Instant;

use serde::Serialize;

use crate::cache::{CacheGate, CachePlan};
use crate::config::ResolvedConfig;
use crate::domain::{CorrelationSign, GeoSeriesAccession};
use crate::engine::{BundleSource, CorrelationEngine, EngineOptions, LiveBundle, PersistedBundle};
use crate::error::KiraError;
use crate::geo::GeoClient;
use crate::pipeline::{AcquireOptions, AcquisitionPipeline};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::prompt::Prompter;
use crate::results::{CorrelationRecord, ResultTable};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Ignore the cached bundle and summary. Downloaded files are still reused.
    pub refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Acquired,
    ReusedBundle,
    ReusedResults,
    Computed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub accession: String,
    pub target_gene: String,
    pub acquisition: StepOutcome,
    pub analysis: StepOutcome,
    pub record_count: usize,
    pub p_threshold: f64,
    pub signs: Vec<CorrelationSign>,
    pub significant: Vec<CorrelationRecord>,
    pub bundle_path: Option<String>,
    pub summary_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub accession: String,
    pub dataset_dir: String,
    pub plan: CachePlan,
    pub bundle_path: String,
    pub summary_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignificantReport {
    pub accession: String,
    pub target_gene: String,
    pub p_threshold: f64,
    pub signs: Vec<CorrelationSign>,
    pub records: Vec<CorrelationRecord>,
}

pub struct App<G: GeoClient, P: Prompter> {
    store: Store,
    geo: G,
    prompter: P,
    config: ResolvedConfig,
}

impl<G: GeoClient, P: Prompter> App<G, P> {
    pub fn new(store: Store, geo: G, prompter: P, config: ResolvedConfig) -> Self {
        Self {
            store,
            geo,
            prompter,
            config,
        }
    }

    /// One full run: cache check, acquisition when needed, analysis and selection.
    pub fn run(self, options: RunOptions, sink: &dyn ProgressSink) -> Result<RunReport, KiraError> {
        let App {
            store,
            geo,
            prompter,
            config,
        } = self;
        let accession = config.accession.clone();
        let start = Instant::now();

        let plan = if options.refresh {
            CacheGate::bypass()
        } else {
            CacheGate::new(&store, &accession).plan()
        };
        sink.event(ProgressEvent::info(format!(
            "phase=Resolve; {accession} bundle_cached={} results_cached={}",
            plan.bundle_cached, plan.results_cached
        )));

        let engine_options = EngineOptions {
            storage: config.storage,
            reuse_cached: !options.refresh,
        };

        let (acquisition, (analysis, table)) = if plan.skip_acquisition() {
            let acquisition = if plan.skip_analysis() {
                StepOutcome::Skipped
            } else {
                StepOutcome::ReusedBundle
            };
            sink.event(ProgressEvent::info(format!(
                "using persisted artifacts of {accession}, acquisition skipped"
            )));
            let source = PersistedBundle::new(store.clone(), accession.clone());
            (
                acquisition,
                analyze(source, &store, &config, engine_options, sink)?,
            )
        } else {
            let mut pipeline = AcquisitionPipeline::new(
                store.clone(),
                geo,
                prompter,
                accession.clone(),
                AcquireOptions {
                    strict_mode: config.strict_mode,
                    storage: config.storage,
                    debug: config.debug,
                    target_gene: config.target_gene.clone(),
                },
            );
            let bundle = pipeline.acquire(sink)?;
            sink.event(ProgressEvent::info(format!(
                "bundle ready with {} matrices",
                bundle.matrix_count()
            )));
            (
                StepOutcome::Acquired,
                analyze(LiveBundle::new(bundle), &store, &config, engine_options, sink)?,
            )
        };

        let significant = table
            .select(config.p_threshold, &config.signs)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        sink.event(
            ProgressEvent::info(format!(
                "{} of {} correlations pass p < {}",
                significant.len(),
                table.len(),
                config.p_threshold
            ))
            .with_elapsed(start.elapsed()),
        );

        let bundle_path = store.bundle_path(&accession);
        let summary_path = store.summary_path(&accession);
        Ok(RunReport {
            accession: accession.to_string(),
            target_gene: config.target_gene.clone(),
            acquisition,
            analysis,
            record_count: table.len(),
            p_threshold: config.p_threshold,
            signs: config.signs.clone(),
            significant,
            bundle_path: store.exists(&bundle_path).then(|| bundle_path.to_string()),
            summary_path: store.exists(&summary_path).then(|| summary_path.to_string()),
        })
    }
}

fn analyze<S: BundleSource>(
    source: S,
    store: &Store,
    config: &ResolvedConfig,
    options: EngineOptions,
    sink: &dyn ProgressSink,
) -> Result<(StepOutcome, ResultTable), KiraError> {
    sink.event(ProgressEvent::info(format!(
        "phase=Verify; correlating {} against the marker panel",
        config.target_gene
    )));
    let mut engine = CorrelationEngine::new(
        source,
        store.clone(),
        config.accession.clone(),
        config.target_gene.as_str(),
        options,
    );
    let table = engine.analyze(sink)?.clone();
    let outcome = if engine.is_cached_result() {
        StepOutcome::ReusedResults
    } else {
        StepOutcome::Computed
    };
    Ok((outcome, table))
}

pub fn status(store: &Store, accession: &GeoSeriesAccession) -> StatusReport {
    StatusReport {
        accession: accession.to_string(),
        dataset_dir: store.dataset_dir(accession).to_string(),
        plan: CacheGate::new(store, accession).plan(),
        bundle_path: store.bundle_path(accession).to_string(),
        summary_path: store.summary_path(accession).to_string(),
    }
}

/// Significant records of a previously stored summary, without touching the network.
pub fn cached_significant(
    store: &Store,
    accession: &GeoSeriesAccession,
    p_threshold: f64,
    signs: &[CorrelationSign],
) -> Result<SignificantReport, KiraError> {
    let table: ResultTable = Store::read_json(&store.summary_path(accession))?;
    let records = table
        .select(p_threshold, signs)
        .into_iter()
        .cloned()
        .collect();
    Ok(SignificantReport {
        accession: table.accession.clone(),
        target_gene: table.target_gene.clone(),
        p_threshold,
        signs: signs.to_vec(),
        records,
    })
}
