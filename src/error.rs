use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid GEO series accession: {0}")]
    InvalidExpressionAccession(String),

    #[error("invalid gene symbol: {0:?}")]
    InvalidGene(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("console input closed before a selection was made")]
    InputClosed,

    #[error("missing config file kira-corr.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("GEO request failed: {0}")]
    GeoHttp(String),

    #[error("GEO returned status {status}: {message}")]
    GeoStatus { status: u16, message: String },

    #[error("{0}")]
    GeoResolution(String),

    #[error("failed to parse matrix {path}: {message}")]
    MatrixParse { path: String, message: String },

    #[error("dataset not found locally: {0}")]
    DatasetNotFound(String),

    #[error("no bundle available from {origin}: {cause}")]
    #[diagnostic(help("run the full pipeline first, or pass --refresh to rebuild the caches"))]
    BundleUnavailable { origin: String, cause: String },

    #[error("correlation analysis produced no records: {0}")]
    EmptyAnalysis(String),

    #[error("failed to persist {0}")]
    Persistence(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
