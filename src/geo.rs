use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;
use crate::table::{Column, Table};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub trait GeoClient: Send + Sync {
    fn download_url(&self, url: &str, destination: &Path) -> Result<(), KiraError>;
}

#[derive(Clone)]
pub struct GeoHttpClient {
    client: Client,
}

impl GeoHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-corr/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn write_response_to_file(
        &self,
        mut response: reqwest::blocking::Response,
        destination: &Path,
    ) -> Result<(), KiraError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GEO request failed".to_string());
            return Err(KiraError::GeoStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        Ok(())
    }
}

impl GeoClient for GeoHttpClient {
    fn download_url(&self, url: &str, destination: &Path) -> Result<(), KiraError> {
        let url = normalize_url(url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        self.write_response_to_file(response, destination)
    }
}

/// Rewrites legacy `ftp://` links to their `https://` mirror.
pub fn normalize_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("ftp://") {
        return format!("https://{rest}");
    }
    url.to_string()
}

pub fn soft_family_url(accession: &GeoSeriesAccession) -> String {
    let prefix = geo_series_prefix(accession);
    format!(
        "https://ftp.ncbi.nlm.nih.gov/geo/series/{prefix}/{acc}/soft/{acc}_family.soft.gz",
        acc = accession.as_str()
    )
}

pub fn geo_series_prefix(accession: &GeoSeriesAccession) -> String {
    let digits = accession.as_str().trim_start_matches("GSE");
    if digits.len() <= 3 {
        return "GSEnnn".to_string();
    }
    let head = &digits[..digits.len() - 3];
    format!("GSE{}nnn", head)
}

pub fn read_soft_text(path: &Path) -> Result<String, KiraError> {
    let bytes = std::fs::read(path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    if !bytes.starts_with(&[0x1f, 0x8b]) {
        return String::from_utf8(bytes).map_err(|err| KiraError::GeoResolution(err.to_string()));
    }
    let mut text = String::new();
    MultiGzDecoder::new(bytes.as_slice())
        .read_to_string(&mut text)
        .map_err(|err| KiraError::GeoResolution(format!("corrupt SOFT file: {err}")))?;
    Ok(text)
}

pub fn extract_supplementary_urls(soft_text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for line in soft_text.lines() {
        if !line.starts_with("!Series_supplementary_file") {
            continue;
        }
        if let Some((_, value)) = line.split_once('=') {
            let url = value.trim();
            if !url.is_empty() && url != "NONE" {
                urls.push(url.to_string());
            }
        }
    }
    urls
}

pub fn filter_matrix_candidates(urls: &[String]) -> Vec<String> {
    urls.iter()
        .filter(|url| {
            let lower = url.to_lowercase();
            (lower.contains(".matrix") || lower.contains(".count") || lower.contains(".txt"))
                && !lower.contains("readme")
        })
        .cloned()
        .collect()
}

/// Builds the sample metadata table from the `^SAMPLE` sections of a SOFT family file.
///
/// Rows are GSM ids. `!Sample_characteristics_chN = key: value` lines become columns
/// `characteristics_chN.{i}.{key}`; other repeated attributes are joined with `"; "`.
pub fn extract_sample_metadata(soft_text: &str) -> Table {
    let mut samples: Vec<(String, HashMap<String, String>)> = Vec::new();
    let mut column_order: Vec<String> = Vec::new();
    let mut characteristic_counts: HashMap<String, usize> = HashMap::new();
    let mut in_sample = false;

    for line in soft_text.lines() {
        if let Some(rest) = line.strip_prefix('^') {
            let (kind, id) = rest.split_once('=').unwrap_or((rest, ""));
            in_sample = kind.trim() == "SAMPLE" && !id.trim().is_empty();
            if in_sample {
                samples.push((id.trim().to_string(), HashMap::new()));
                characteristic_counts.clear();
            }
            continue;
        }
        if !in_sample {
            continue;
        }
        let Some(attribute) = line.strip_prefix("!Sample_") else {
            continue;
        };
        let Some((_, fields)) = samples.last_mut() else {
            continue;
        };
        let Some((key, value)) = attribute.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        let (column, value) = if key.starts_with("characteristics_ch") {
            match value.split_once(':') {
                Some((label, inner)) => {
                    let count = characteristic_counts.entry(key.to_string()).or_insert(0);
                    let column = format!("{key}.{count}.{}", label.trim());
                    *count += 1;
                    (column, inner.trim().to_string())
                }
                None => (key.to_string(), value.to_string()),
            }
        } else {
            (key.to_string(), value.to_string())
        };

        if !column_order.contains(&column) {
            column_order.push(column.clone());
        }
        fields
            .entry(column)
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    let index = samples.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>();
    let columns = column_order
        .into_iter()
        .map(|name| {
            let values = samples
                .iter()
                .map(|(_, fields)| fields.get(&name).cloned())
                .collect();
            (name, Column::Text(values))
        })
        .collect();
    Table::new("geo_accession", index, columns).unwrap_or_default()
}
