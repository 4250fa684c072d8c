use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{CorrelationSign, GeoSeriesAccession};
use crate::error::KiraError;
use crate::geo::DEFAULT_TIMEOUT_SECS;
use crate::results::SIGNIFICANCE_THRESHOLD;

pub const CONFIG_FILE: &str = "kira-corr.json";

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub target_gene: Option<String>,
    #[serde(default)]
    pub gse_id: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub storage: Option<bool>,
    #[serde(default)]
    pub strict_mode: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub p_threshold: Option<f64>,
    #[serde(default)]
    pub signs: Option<Vec<CorrelationSign>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Config {
    /// Values set in `overrides` win over the ones read from the file.
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            schema_version: overrides.schema_version.or(self.schema_version),
            target_gene: overrides.target_gene.or(self.target_gene),
            gse_id: overrides.gse_id.or(self.gse_id),
            data_dir: overrides.data_dir.or(self.data_dir),
            storage: overrides.storage.or(self.storage),
            strict_mode: overrides.strict_mode.or(self.strict_mode),
            debug: overrides.debug.or(self.debug),
            p_threshold: overrides.p_threshold.or(self.p_threshold),
            signs: overrides.signs.or(self.signs),
            timeout_secs: overrides.timeout_secs.or(self.timeout_secs),
            log_dir: overrides.log_dir.or(self.log_dir),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub accession: GeoSeriesAccession,
    pub target_gene: String,
    pub data_dir: Utf8PathBuf,
    pub storage: bool,
    pub strict_mode: bool,
    pub debug: bool,
    pub p_threshold: f64,
    pub signs: Vec<CorrelationSign>,
    pub timeout: Duration,
    pub log_dir: Utf8PathBuf,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        Self::resolve_config(Self::read(path)?)
    }

    /// Reads the config file; without an explicit path, `kira-corr.json` in the working directory.
    pub fn read(path: Option<&str>) -> Result<Config, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(KiraError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let accession = config
            .gse_id
            .as_deref()
            .ok_or_else(|| {
                KiraError::InvalidConfig(format!(
                    "gse_id is required (set it in {CONFIG_FILE} or pass --gse)"
                ))
            })?
            .parse::<GeoSeriesAccession>()?;
        let (p_threshold, signs) = Self::selection_criteria(&config)?;

        let target_gene = config
            .target_gene
            .ok_or_else(|| {
                KiraError::InvalidConfig(format!(
                    "target_gene is required (set it in {CONFIG_FILE} or pass --gene)"
                ))
            })?
            .trim()
            .to_string();
        if target_gene.is_empty() || target_gene.contains(char::is_whitespace) {
            return Err(KiraError::InvalidGene(target_gene));
        }

        let timeout_secs = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(KiraError::InvalidConfig(
                "timeout_secs must be positive".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            accession,
            target_gene,
            data_dir: Utf8PathBuf::from(config.data_dir.unwrap_or_else(|| "data".to_string())),
            storage: config.storage.unwrap_or(true),
            strict_mode: config.strict_mode.unwrap_or(false),
            debug: config.debug.unwrap_or(false),
            p_threshold,
            signs,
            timeout: Duration::from_secs(timeout_secs),
            log_dir: Utf8PathBuf::from(
                config.log_dir.unwrap_or_else(|| "error_logs".to_string()),
            ),
        })
    }

    /// Significance threshold and correlation directions, defaulted and validated.
    pub fn selection_criteria(config: &Config) -> Result<(f64, Vec<CorrelationSign>), KiraError> {
        let p_threshold = config.p_threshold.unwrap_or(SIGNIFICANCE_THRESHOLD);
        if !(p_threshold > 0.0 && p_threshold <= 1.0) {
            return Err(KiraError::InvalidConfig(format!(
                "p_threshold must be in (0, 1], got {p_threshold}"
            )));
        }

        let signs = config.signs.clone().unwrap_or_else(default_signs);
        if signs.is_empty() {
            return Err(KiraError::InvalidConfig(
                "signs must name at least one direction".to_string(),
            ));
        }
        Ok((p_threshold, signs))
    }
}

pub fn default_signs() -> Vec<CorrelationSign> {
    vec![CorrelationSign::Positive, CorrelationSign::Negative]
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_fill_unset_fields() {
        let config = Config {
            gse_id: Some("GSE300437".to_string()),
            target_gene: Some("Polb".to_string()),
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.data_dir, "data");
        assert!(resolved.storage);
        assert!(!resolved.strict_mode);
        assert_eq!(resolved.p_threshold, 0.05);
        assert_eq!(resolved.signs, default_signs());
        assert_eq!(resolved.timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_win() {
        let file = Config {
            gse_id: Some("GSE1".to_string()),
            target_gene: Some("Polb".to_string()),
            strict_mode: Some(false),
            ..Config::default()
        };
        let overrides = Config {
            gse_id: Some("GSE2".to_string()),
            strict_mode: Some(true),
            ..Config::default()
        };
        let merged = file.merge(overrides);
        assert_eq!(merged.gse_id.as_deref(), Some("GSE2"));
        assert_eq!(merged.target_gene.as_deref(), Some("Polb"));
        assert_eq!(merged.strict_mode, Some(true));
    }

    #[test]
    fn selection_criteria_rejects_out_of_range_threshold() {
        for p in [-3.0, 0.0, 1.5, f64::NAN] {
            let config = Config {
                p_threshold: Some(p),
                ..Config::default()
            };
            assert_matches!(
                ConfigLoader::selection_criteria(&config),
                Err(KiraError::InvalidConfig(_)),
                "p_threshold {p}"
            );
        }

        let (p, signs) = ConfigLoader::selection_criteria(&Config::default()).unwrap();
        assert_eq!(p, SIGNIFICANCE_THRESHOLD);
        assert_eq!(signs, default_signs());
    }
}
