use std::fs;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

use crate::bundle::{Bundle, BundleEntry, align};
use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;
use crate::geo::{
    GeoClient, extract_sample_metadata, extract_supplementary_urls, filter_matrix_candidates,
    normalize_url, read_soft_text, soft_family_url,
};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::prompt::Prompter;
use crate::selection::{SelectionState, file_name_from_url, select_files, select_groups};
use crate::store::Store;
use crate::table::Table;
use crate::vector::resolve;

#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub strict_mode: bool,
    pub storage: bool,
    pub debug: bool,
    /// Gene probed in every loaded matrix when `debug` is on.
    pub target_gene: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Reused(Utf8PathBuf),
    Downloaded(Utf8PathBuf),
}

impl DownloadOutcome {
    pub fn path(&self) -> &Utf8Path {
        match self {
            DownloadOutcome::Reused(path) | DownloadOutcome::Downloaded(path) => path,
        }
    }
}

pub struct AcquisitionPipeline<G: GeoClient, P: Prompter> {
    store: Store,
    geo: G,
    prompter: P,
    accession: GeoSeriesAccession,
    options: AcquireOptions,
    bundle: Option<Arc<Bundle>>,
}

impl<G: GeoClient, P: Prompter> AcquisitionPipeline<G, P> {
    pub fn new(
        store: Store,
        geo: G,
        prompter: P,
        accession: GeoSeriesAccession,
        options: AcquireOptions,
    ) -> Self {
        Self {
            store,
            geo,
            prompter,
            accession,
            options,
            bundle: None,
        }
    }

    /// Builds the bundle once; later calls return the same bundle without touching the network.
    pub fn acquire(&mut self, sink: &dyn ProgressSink) -> Result<Arc<Bundle>, KiraError> {
        if let Some(bundle) = &self.bundle {
            return Ok(Arc::clone(bundle));
        }
        let bundle = match self.build(sink) {
            Ok(bundle) => Arc::new(bundle),
            Err(err) => {
                sink.event(ProgressEvent::error(format!(
                    "acquisition of {} failed: {err}",
                    self.accession
                )));
                return Err(err);
            }
        };
        self.bundle = Some(Arc::clone(&bundle));
        Ok(bundle)
    }

    fn build(&mut self, sink: &dyn ProgressSink) -> Result<Bundle, KiraError> {
        let accession = self.accession.clone();
        self.store.ensure_dataset_dir(&accession)?;

        sink.event(ProgressEvent::info(format!(
            "phase=Resolve; fetching SOFT metadata for {accession}"
        )));
        let soft_path = self.store.soft_path(&accession);
        self.ensure_download(&soft_family_url(&accession), &soft_path, sink)?;
        let soft_text = read_soft_text(soft_path.as_std_path())?;

        let urls = extract_supplementary_urls(&soft_text);
        if urls.is_empty() {
            return Err(KiraError::GeoResolution(format!(
                "{accession} lists no supplementary files"
            )));
        }
        let candidates = filter_matrix_candidates(&urls);
        if candidates.is_empty() {
            return Err(KiraError::GeoResolution(format!(
                "none of the {} supplementary files of {accession} looks like a matrix",
                urls.len()
            )));
        }

        let mut state = SelectionState {
            files: select_files(&mut self.prompter, &candidates)?,
            ..SelectionState::default()
        };

        sink.event(ProgressEvent::info("phase=Fetch; downloading selected files"));
        let mut downloaded = Vec::new();
        for &i in &state.files {
            let url = &candidates[i];
            let name = file_name_from_url(url);
            let destination = self.store.download_path(&accession, name);
            match self.ensure_download(url, &destination, sink) {
                Ok(outcome) => downloaded.push((name.to_string(), outcome)),
                Err(err) => sink.event(ProgressEvent::warn(format!(
                    "file {name} is unavailable and will not be loaded: {err}"
                ))),
            }
        }
        if downloaded.is_empty() {
            return Err(KiraError::GeoResolution(format!(
                "none of the selected files of {accession} could be downloaded"
            )));
        }

        let meta = extract_sample_metadata(&soft_text);
        let meta = if meta.is_empty() || meta.n_columns() == 0 {
            sink.event(ProgressEvent::warn(format!(
                "{accession} carries no sample metadata, keeping every sample"
            )));
            meta
        } else {
            sink.event(ProgressEvent::info(format!(
                "sample metadata extracted, {} samples",
                meta.n_rows()
            )));
            select_groups(&mut self.prompter, &meta, &mut state)?
        };
        if let Some(column) = &state.column {
            sink.event(ProgressEvent::info(format!(
                "kept {} samples from {} group(s) of column {column}",
                meta.n_rows(),
                state.groups.len()
            )));
        }

        sink.event(ProgressEvent::info("phase=Verify; loading matrices"));
        let mut bundle = Bundle::new(accession.as_str(), meta);
        for (name, outcome) in downloaded {
            sink.event(ProgressEvent::info(format!("loading {name}")));
            let matrix = match Table::read_matrix(outcome.path().as_std_path()) {
                Ok(matrix) => matrix,
                Err(err) => {
                    sink.event(ProgressEvent::warn(format!("skipping {name}: {err}")));
                    continue;
                }
            };
            if self.options.debug {
                self.probe_target(&name, &matrix, sink);
            }
            let entry = if self.options.strict_mode {
                let entry = align(&matrix, bundle.meta());
                if let BundleEntry::Aligned { meta, .. } = &entry {
                    sink.event(ProgressEvent::info(format!(
                        "{name}: {} samples shared with the selected metadata",
                        meta.n_rows()
                    )));
                }
                entry
            } else {
                BundleEntry::Raw { matrix }
            };
            if !bundle.insert(name.as_str(), entry) {
                sink.event(ProgressEvent::warn(format!(
                    "file name {name} collides with the metadata entry, skipped"
                )));
            }
        }
        if !bundle.has_matrices() {
            return Err(KiraError::GeoResolution(format!(
                "no matrix of {accession} could be loaded"
            )));
        }

        if self.options.storage {
            self.persist(&bundle, sink);
        }
        Ok(bundle)
    }

    /// Downloads `url` to `destination` unless a file is already there.
    ///
    /// A failed transfer removes whatever partial file it left behind.
    pub fn ensure_download(
        &self,
        url: &str,
        destination: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, KiraError> {
        let name = destination.file_name().unwrap_or(destination.as_str());
        if self.store.exists(destination) {
            sink.event(ProgressEvent::info(format!(
                "file {name} already exists, skipping download"
            )));
            return Ok(DownloadOutcome::Reused(destination.to_path_buf()));
        }

        let url = normalize_url(url);
        sink.event(ProgressEvent::info(format!("geo.request {name}")));
        let start = Instant::now();
        match self.geo.download_url(&url, destination.as_std_path()) {
            Ok(()) => {
                sink.event(
                    ProgressEvent::info(format!("geo.response {name}"))
                        .with_elapsed(start.elapsed()),
                );
                Ok(DownloadOutcome::Downloaded(destination.to_path_buf()))
            }
            Err(err) => {
                if destination.as_std_path().exists() {
                    if let Err(remove_err) = fs::remove_file(destination.as_std_path()) {
                        sink.event(ProgressEvent::warn(format!(
                            "could not remove partial file {destination}: {remove_err}"
                        )));
                    }
                }
                Err(err)
            }
        }
    }

    fn probe_target(&self, name: &str, matrix: &Table, sink: &dyn ProgressSink) {
        let gene = &self.options.target_gene;
        let vector = resolve(matrix, gene, sink);
        if vector.is_empty() {
            sink.event(ProgressEvent::warn(format!(
                "debug: {gene} not present in {name}"
            )));
        } else {
            let present = vector.values().iter().flatten().count();
            sink.event(ProgressEvent::info(format!(
                "debug: {gene} located in {name}, {present}/{} samples with values",
                vector.len()
            )));
        }
    }

    fn persist(&self, bundle: &Bundle, sink: &dyn ProgressSink) {
        let path = self.store.bundle_path(&self.accession);
        match Store::write_json_gz(&path, bundle) {
            Ok(()) => sink.event(ProgressEvent::info(format!("bundle stored at {path}"))),
            Err(err) => {
                sink.event(ProgressEvent::error(format!("could not store bundle: {err}")));
                return;
            }
        }
        let manifest = self.store.bundle_manifest_path(&self.accession);
        let result = bundle
            .manifest_csv()
            .map_err(|err| KiraError::Persistence(format!("{manifest}: {err}")))
            .and_then(|content| Store::write_bytes_atomic(&manifest, &content));
        if let Err(err) = result {
            sink.event(ProgressEvent::error(format!(
                "could not store bundle manifest: {err}"
            )));
        }
    }
}
