use std::fs;

use assert_matches::assert_matches;

use kira_corr::config::{Config, ConfigLoader};
use kira_corr::domain::CorrelationSign;
use kira_corr::error::KiraError;

fn write_config(content: &str) -> (tempfile::TempDir, String) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-corr.json");
    fs::write(&path, content).unwrap();
    (temp, path.to_string_lossy().into_owned())
}

#[test]
fn resolve_config_file() {
    let (_temp, path) = write_config(
        r#"{
            "target_gene": "Polb",
            "gse_id": "GSE300437",
            "data_dir": "/tmp/kira",
            "strict_mode": true,
            "p_threshold": 0.01,
            "signs": ["negative"]
        }"#,
    );

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(resolved.accession.as_str(), "GSE300437");
    assert_eq!(resolved.data_dir, "/tmp/kira");
    assert!(resolved.strict_mode);
    assert!(resolved.storage);
    assert_eq!(resolved.p_threshold, 0.01);
    assert_eq!(resolved.signs, [CorrelationSign::Negative]);
    assert_eq!(resolved.log_dir, "error_logs");
}

#[test]
fn invalid_accession_is_rejected() {
    let (_temp, path) = write_config(r#"{"target_gene": "Polb", "gse_id": "GSM1"}"#);
    let err = ConfigLoader::resolve(Some(&path)).unwrap_err();
    assert_matches!(err, KiraError::InvalidExpressionAccession(_));
}

#[test]
fn missing_required_fields() {
    let err = ConfigLoader::resolve_config(Config {
        target_gene: Some("Polb".to_string()),
        ..Config::default()
    })
    .unwrap_err();
    assert_matches!(err, KiraError::InvalidConfig(message) if message.contains("gse_id"));

    let err = ConfigLoader::resolve_config(Config {
        gse_id: Some("GSE1".to_string()),
        target_gene: Some("  ".to_string()),
        ..Config::default()
    })
    .unwrap_err();
    assert_matches!(err, KiraError::InvalidGene(_));
}

#[test]
fn out_of_range_threshold_and_empty_signs() {
    let base = Config {
        gse_id: Some("GSE1".to_string()),
        target_gene: Some("Polb".to_string()),
        ..Config::default()
    };

    for p in [0.0, -0.1, 1.5, f64::NAN] {
        let config = Config {
            p_threshold: Some(p),
            ..base.clone()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(KiraError::InvalidConfig(_))
        );
    }

    let config = Config {
        signs: Some(Vec::new()),
        ..base
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(KiraError::InvalidConfig(_))
    );
}

#[test]
fn unreadable_and_malformed_files() {
    let err = ConfigLoader::read(Some("/nonexistent/kira-corr.json")).unwrap_err();
    assert_matches!(err, KiraError::ConfigRead(_));

    let (_temp, path) = write_config("{ not json");
    assert_matches!(ConfigLoader::read(Some(&path)), Err(KiraError::ConfigParse(_)));
}
