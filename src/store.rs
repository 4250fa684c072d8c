use std::fs;
use std::io::{Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::Builder;

use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;

/// On-disk layout for downloads and cached artifacts, rooted at the data directory.
#[derive(Debug, Clone)]
pub struct Store {
    data_root: Utf8PathBuf,
}

impl Store {
    pub fn new_with_root(data_root: Utf8PathBuf) -> Self {
        Self { data_root }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn dataset_dir(&self, acc: &GeoSeriesAccession) -> Utf8PathBuf {
        self.data_root.join(acc.as_str())
    }

    pub fn download_path(&self, acc: &GeoSeriesAccession, file_name: &str) -> Utf8PathBuf {
        self.dataset_dir(acc).join(file_name)
    }

    pub fn soft_path(&self, acc: &GeoSeriesAccession) -> Utf8PathBuf {
        self.dataset_dir(acc)
            .join(format!("{}_family.soft.gz", acc.as_str()))
    }

    pub fn bundle_path(&self, acc: &GeoSeriesAccession) -> Utf8PathBuf {
        self.dataset_dir(acc)
            .join("pkl")
            .join(format!("{}_processed_bundle.json.gz", acc.as_str()))
    }

    pub fn bundle_manifest_path(&self, acc: &GeoSeriesAccession) -> Utf8PathBuf {
        self.dataset_dir(acc)
            .join("csv")
            .join(format!("{}_processed_bundle.csv", acc.as_str()))
    }

    pub fn summary_path(&self, acc: &GeoSeriesAccession) -> Utf8PathBuf {
        self.dataset_dir(acc)
            .join("pkl")
            .join(format!("{}_correlation_summary.json", acc.as_str()))
    }

    pub fn summary_csv_path(&self, acc: &GeoSeriesAccession) -> Utf8PathBuf {
        self.dataset_dir(acc)
            .join("csv")
            .join(format!("{}_correlation_summary.csv", acc.as_str()))
    }

    pub fn ensure_dataset_dir(&self, acc: &GeoSeriesAccession) -> Result<(), KiraError> {
        fs::create_dir_all(self.dataset_dir(acc).as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    /// Writes `content` through a temp file in the same directory, then renames it into place.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Persistence(format!("invalid destination {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Persistence(format!("{parent}: {err}")))?;
        let mut temp = Builder::new()
            .prefix("kira-corr")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Persistence(format!("{parent}: {err}")))?;
        temp.write_all(content)
            .map_err(|err| KiraError::Persistence(format!("{path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Persistence(format!("{path}: {}", err.error)))?;
        Ok(())
    }

    pub fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), KiraError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| KiraError::Persistence(format!("{path}: {err}")))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_json_gz<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), KiraError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        serde_json::to_writer(&mut encoder, value)
            .map_err(|err| KiraError::Persistence(format!("{path}: {err}")))?;
        let content = encoder
            .finish()
            .map_err(|err| KiraError::Persistence(format!("{path}: {err}")))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, KiraError> {
        let content = fs::read(path.as_std_path()).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => KiraError::DatasetNotFound(path.to_string()),
            _ => KiraError::Filesystem(format!("{path}: {err}")),
        })?;
        serde_json::from_slice(&content)
            .map_err(|err| KiraError::Filesystem(format!("{path}: {err}")))
    }

    pub fn read_json_gz<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, KiraError> {
        let file = fs::File::open(path.as_std_path()).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => KiraError::DatasetNotFound(path.to_string()),
            _ => KiraError::Filesystem(format!("{path}: {err}")),
        })?;
        let mut content = Vec::new();
        MultiGzDecoder::new(file)
            .read_to_end(&mut content)
            .map_err(|err| KiraError::Filesystem(format!("{path}: {err}")))?;
        serde_json::from_slice(&content)
            .map_err(|err| KiraError::Filesystem(format!("{path}: {err}")))
    }
}
