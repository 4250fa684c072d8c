use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

static GSE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^GSE[0-9]+$").expect("static GSE pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoSeriesAccession(String);

impl GeoSeriesAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeoSeriesAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoSeriesAccession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !GSE_PATTERN.is_match(trimmed) {
            return Err(KiraError::InvalidExpressionAccession(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Direction of a correlation used when picking records for plotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationSign {
    Positive,
    Negative,
}

impl CorrelationSign {
    pub fn matches(self, r: f64) -> bool {
        match self {
            CorrelationSign::Positive => r > 0.0,
            CorrelationSign::Negative => r < 0.0,
        }
    }
}

impl fmt::Display for CorrelationSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationSign::Positive => write!(f, "positive"),
            CorrelationSign::Negative => write!(f, "negative"),
        }
    }
}
