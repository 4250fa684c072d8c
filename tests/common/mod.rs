#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use kira_corr::error::KiraError;
use kira_corr::geo::GeoClient;
use kira_corr::progress::{EventLevel, ProgressEvent, ProgressSink};
use kira_corr::prompt::Console;
use kira_corr::store::Store;

pub const SOFT: &str = "\
^SERIES = GSE4242
!Series_title = CCl4 liver fibrosis time course
!Series_supplementary_file = ftp://ftp.ncbi.nlm.nih.gov/geo/series/GSE4nnn/GSE4242/suppl/GSE4242_counts.txt.gz
!Series_supplementary_file = ftp://ftp.ncbi.nlm.nih.gov/geo/series/GSE4nnn/GSE4242/suppl/GSE4242_broken.txt.gz
!Series_supplementary_file = ftp://ftp.ncbi.nlm.nih.gov/geo/series/GSE4nnn/GSE4242/suppl/GSE4242_RAW.tar
^SAMPLE = GSM1
!Sample_title = ctrl-1
!Sample_characteristics_ch1 = treatment: oil
^SAMPLE = GSM2
!Sample_title = ctrl-2
!Sample_characteristics_ch1 = treatment: oil
^SAMPLE = GSM3
!Sample_title = ccl4-1
!Sample_characteristics_ch1 = treatment: CCl4
^SAMPLE = GSM4
!Sample_title = ccl4-2
!Sample_characteristics_ch1 = treatment: CCl4
^SAMPLE = GSM5
!Sample_title = ccl4-3
!Sample_characteristics_ch1 = treatment: CCl4
";

pub const COUNTS: &str = "\
\tgene_symbol\tGSM1\tGSM2\tGSM3\tGSM4\tGSM5
ENSMUSG01\tPolb\t1\t2\t3\t4\t5
ENSMUSG02\tActa2\t2\t4\t6\t8\t10.5
ENSMUSG03\tVim\t5\t4\t3\t2\t1
ENSMUSG04\tCol1a1\t1\t3\t2\t5\t4
ENSMUSG05\tIl6\t7\t7\t7\t7\t7
";

/// Serves the fixture SOFT file and matrix, records every transfer and fails for `broken` files
/// after leaving a partial file behind.
#[derive(Clone, Default)]
pub struct MockGeo {
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockGeo {
    pub fn transfers(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl GeoClient for MockGeo {
    fn download_url(&self, url: &str, destination: &Path) -> Result<(), KiraError> {
        self.calls.lock().unwrap().push(url.to_string());
        if url.ends_with("_family.soft.gz") {
            fs::write(destination, gzip(SOFT)).unwrap();
            return Ok(());
        }
        if url.contains("broken") {
            fs::write(destination, b"partial").unwrap();
            return Err(KiraError::GeoHttp("connection reset".to_string()));
        }
        fs::write(destination, gzip(COUNTS)).unwrap();
        Ok(())
    }
}

pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn messages(&self, level: EventLevel) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == level)
            .map(|event| event.message.clone())
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub type ScriptedConsole = Console<Cursor<&'static str>, Vec<u8>>;

pub fn console(script: &'static str) -> ScriptedConsole {
    Console::new(Cursor::new(script), Vec::new())
}

pub fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, Store::new_with_root(root))
}
