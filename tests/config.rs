use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;

use mets_migrate::config::{Config, ConfigLoader, ConfigOverrides, ValueEntry};
use mets_migrate::error::MigrateError;
use mets_migrate::store::ProcessProperties;

fn properties() -> ProcessProperties {
    let mut properties = ProcessProperties {
        title: "davidis_kochbuch".to_string(),
        ..ProcessProperties::default()
    };
    properties.set("PPN digital", " 1001 ");
    properties.set("PPN anchor", "");
    properties
}

#[test]
fn parse_config_with_property_references() {
    let config: Config = serde_json::from_str(
        r#"{
  "schema_version": 1,
  "download_url": "https://digital.example.org/oai?verb=GetRecord&metadataPrefix=mets&identifier={identifier}",
  "identifier": { "property": "PPN digital" },
  "anchor_identifier": { "property": "PPN anchor" },
  "ruleset": "rulesets/ruleset.xml",
  "image_retry_delay_ms": 250
}"#,
    )
    .unwrap();
    assert_matches!(config.identifier, Some(ValueEntry::Property(_)));

    let resolved = ConfigLoader::resolve_config(config, &properties()).unwrap();
    assert_eq!(resolved.identifier.as_str(), "1001");
    assert_eq!(resolved.anchor_identifier, None);
    assert_eq!(resolved.ruleset, PathBuf::from("rulesets/ruleset.xml"));
    assert_eq!(resolved.image_retry_delay, Duration::from_millis(250));
    assert_eq!(
        resolved.record_url(&resolved.identifier),
        "https://digital.example.org/oai?verb=GetRecord&metadataPrefix=mets&identifier=1001"
    );
}

#[test]
fn overrides_take_precedence() {
    let mut config: Config = serde_json::from_str(
        r#"{
  "download_url": "https://digital.example.org/oai?identifier=",
  "identifier": { "property": "PPN digital" },
  "ruleset": "ruleset.xml"
}"#,
    )
    .unwrap();
    config.apply_overrides(&ConfigOverrides {
        download_url: None,
        identifier: Some("2000_1901".to_string()),
        anchor_identifier: Some("2000".to_string()),
    });

    let resolved = ConfigLoader::resolve_config(config, &properties()).unwrap();
    assert_eq!(resolved.identifier.as_str(), "2000_1901");
    assert_eq!(resolved.anchor_identifier.as_ref().map(|id| id.as_str()), Some("2000"));
    assert_eq!(
        resolved.record_url(resolved.anchor_identifier.as_ref().unwrap()),
        "https://digital.example.org/oai?identifier=2000"
    );
}

#[test]
fn missing_values_are_reported() {
    let config = Config {
        download_url: Some(ValueEntry::Shorthand("https://digital.example.org/".to_string())),
        identifier: Some(ValueEntry::Shorthand("  ".to_string())),
        ruleset: Some(PathBuf::from("ruleset.xml")),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config, &properties()),
        Err(MigrateError::MissingIdentifier)
    );

    let config = Config {
        identifier: Some(ValueEntry::Shorthand("1001".to_string())),
        ruleset: Some(PathBuf::from("ruleset.xml")),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config, &properties()),
        Err(MigrateError::MissingDownloadUrl)
    );

    let config = Config {
        download_url: Some(ValueEntry::Shorthand("https://digital.example.org/".to_string())),
        identifier: Some(ValueEntry::Shorthand("1001".to_string())),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config, &properties()),
        Err(MigrateError::MissingRuleset)
    );
}

#[test]
fn invalid_identifier_is_rejected() {
    let config = Config {
        download_url: Some(ValueEntry::Shorthand("https://digital.example.org/".to_string())),
        identifier: Some(ValueEntry::Shorthand("1001 1002".to_string())),
        ruleset: Some(PathBuf::from("ruleset.xml")),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config, &properties()),
        Err(MigrateError::InvalidIdentifier(_))
    );
}

#[test]
fn load_reads_explicit_path() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("migrate.json");
    std::fs::write(
        &path,
        r#"{ "download_url": "https://digital.example.org/", "identifier": "1001", "ruleset": "ruleset.xml" }"#,
    )
    .unwrap();
    let config = ConfigLoader::load(path.to_str()).unwrap();
    assert_matches!(config.identifier, Some(ValueEntry::Shorthand(id)) if id == "1001");

    std::fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::load(path.to_str()),
        Err(MigrateError::ConfigParse(_))
    );

    let missing = temp.path().join("missing.json");
    assert_matches!(
        ConfigLoader::load(missing.to_str()),
        Err(MigrateError::ConfigRead(_))
    );
}
