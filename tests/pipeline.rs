mod common;

use std::sync::Arc;

use assert_matches::assert_matches;

use kira_corr::bundle::BundleEntry;
use kira_corr::domain::GeoSeriesAccession;
use kira_corr::engine::{BundleSource, PersistedBundle};
use kira_corr::error::KiraError;
use kira_corr::geo::GeoClient;
use kira_corr::pipeline::{AcquireOptions, AcquisitionPipeline};
use kira_corr::progress::EventLevel;
use kira_corr::prompt::Prompter;
use kira_corr::store::Store;

use common::{MockGeo, RecordingSink, console, temp_store};

fn accession() -> GeoSeriesAccession {
    "GSE4242".parse().unwrap()
}

fn options(strict_mode: bool, storage: bool) -> AcquireOptions {
    AcquireOptions {
        strict_mode,
        storage,
        debug: false,
        target_gene: "Polb".to_string(),
    }
}

fn pipeline<G: GeoClient, P: Prompter>(
    store: &Store,
    geo: G,
    prompter: P,
    options: AcquireOptions,
) -> AcquisitionPipeline<G, P> {
    AcquisitionPipeline::new(store.clone(), geo, prompter, accession(), options)
}

#[test]
fn acquire_builds_bundle_and_rewrites_ftp_links() {
    let (_temp, store) = temp_store();
    let geo = MockGeo::default();
    let sink = RecordingSink::default();
    let mut pipeline = pipeline(
        &store,
        geo.clone(),
        console("0\ny\n0:4\ny\n"),
        options(false, false),
    );

    let bundle = pipeline.acquire(&sink).unwrap();

    assert_eq!(bundle.matrix_count(), 1);
    assert_matches!(
        bundle.get("GSE4242_counts.txt.gz"),
        Some(BundleEntry::Raw { .. })
    );
    assert_eq!(bundle.meta().n_rows(), 5);

    let transfers = geo.transfers();
    assert_eq!(transfers.len(), 2);
    assert!(transfers.iter().all(|url| url.starts_with("https://")));
    assert!(transfers[0].ends_with("GSE4nnn/GSE4242/soft/GSE4242_family.soft.gz"));
    assert!(!store.exists(&store.bundle_path(&accession())));
}

#[test]
fn acquire_is_idempotent_within_a_pipeline() {
    let (_temp, store) = temp_store();
    let geo = MockGeo::default();
    let sink = RecordingSink::default();
    // A second prompt would hit end of input and fail.
    let mut pipeline = pipeline(
        &store,
        geo.clone(),
        console("0\ny\n0:4\ny\n"),
        options(false, false),
    );

    let first = pipeline.acquire(&sink).unwrap();
    let second = pipeline.acquire(&sink).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(geo.transfers().len(), 2);
}

#[test]
fn existing_files_are_not_downloaded_again() {
    let (_temp, store) = temp_store();
    let geo = MockGeo::default();
    let sink = RecordingSink::default();

    pipeline(&store, geo.clone(), console("0\ny\n0:4\ny\n"), options(false, false))
        .acquire(&sink)
        .unwrap();
    let after_first = geo.transfers().len();

    let bundle = pipeline(&store, geo.clone(), console("0\ny\n0:4\ny\n"), options(false, false))
        .acquire(&sink)
        .unwrap();

    assert_eq!(bundle.matrix_count(), 1);
    assert_eq!(geo.transfers().len(), after_first);
    assert!(
        sink.messages(EventLevel::Info)
            .iter()
            .any(|message| message.contains("GSE4242_counts.txt.gz already exists"))
    );
}

#[test]
fn failed_transfer_is_skipped_and_cleaned_up() {
    let (_temp, store) = temp_store();
    let geo = MockGeo::default();
    let sink = RecordingSink::default();

    let bundle = pipeline(&store, geo.clone(), console("0:1\ny\n0:4\ny\n"), options(false, false))
        .acquire(&sink)
        .unwrap();

    assert_eq!(bundle.matrix_count(), 1);
    assert!(!store.exists(&store.download_path(&accession(), "GSE4242_broken.txt.gz")));
    assert!(
        sink.messages(EventLevel::Warn)
            .iter()
            .any(|message| message.contains("GSE4242_broken.txt.gz is unavailable"))
    );
}

#[test]
fn strict_mode_aligns_matrices_to_selected_groups() {
    let (_temp, store) = temp_store();
    let sink = RecordingSink::default();

    // groups 2:4 are the three CCl4 samples
    let bundle = pipeline(
        &store,
        MockGeo::default(),
        console("0\ny\n2:4\ny\n"),
        options(true, false),
    )
    .acquire(&sink)
    .unwrap();

    let Some(BundleEntry::Aligned { matrix, meta }) = bundle.get("GSE4242_counts.txt.gz") else {
        panic!("expected an aligned entry");
    };
    assert_eq!(meta.index(), ["GSM3", "GSM4", "GSM5"]);
    assert_eq!(
        matrix.column_names().collect::<Vec<_>>(),
        ["gene_symbol", "GSM3", "GSM4", "GSM5"]
    );
}

#[test]
fn storage_persists_a_reloadable_bundle() {
    let (_temp, store) = temp_store();
    let sink = RecordingSink::default();

    let bundle = pipeline(
        &store,
        MockGeo::default(),
        console("0\ny\n0:4\ny\n"),
        options(false, true),
    )
    .acquire(&sink)
    .unwrap();

    assert!(store.exists(&store.bundle_manifest_path(&accession())));
    let reloaded = PersistedBundle::new(store.clone(), accession()).load().unwrap();
    assert_eq!(*reloaded, *bundle);
}

#[test]
fn debug_probe_reports_the_target_gene() {
    let (_temp, store) = temp_store();
    let sink = RecordingSink::default();
    let mut options = options(false, false);
    options.debug = true;

    pipeline(&store, MockGeo::default(), console("0\ny\n0:4\ny\n"), options)
        .acquire(&sink)
        .unwrap();

    assert!(
        sink.messages(EventLevel::Info)
            .iter()
            .any(|message| message.contains("debug: Polb located in GSE4242_counts.txt.gz, 5/5"))
    );
}

#[test]
fn manifest_without_matrices_fails() {
    let (_temp, store) = temp_store();
    let acc = accession();
    store.ensure_dataset_dir(&acc).unwrap();
    Store::write_bytes_atomic(
        &store.soft_path(&acc),
        b"^SERIES = GSE4242\n!Series_supplementary_file = NONE\n",
    )
    .unwrap();

    let geo = MockGeo::default();
    let err = pipeline(&store, geo.clone(), console(""), options(false, false))
        .acquire(&RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, KiraError::GeoResolution(_));
    assert!(geo.transfers().is_empty());
}
