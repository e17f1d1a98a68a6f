use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::RecordId;
use crate::error::MigrateError;
use crate::images::DEFAULT_RETRY_DELAY;
use crate::store::ProcessProperties;

pub const DEFAULT_CONFIG_FILE: &str = "mets-migrate.json";
pub const IDENTIFIER_PLACEHOLDER: &str = "{identifier}";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub download_url: Option<ValueEntry>,
    #[serde(default)]
    pub identifier: Option<ValueEntry>,
    #[serde(default)]
    pub anchor_identifier: Option<ValueEntry>,
    #[serde(default)]
    pub ruleset: Option<PathBuf>,
    #[serde(default)]
    pub image_retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ValueEntry {
    Shorthand(String),
    Property(PropertyRef),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropertyRef {
    pub property: String,
}

impl ValueEntry {
    fn resolve(&self, properties: &ProcessProperties) -> Option<String> {
        let value = match self {
            ValueEntry::Shorthand(value) => Some(value.as_str()),
            ValueEntry::Property(reference) => properties.get(&reference.property),
        };
        value
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub download_url: Option<String>,
    pub identifier: Option<String>,
    pub anchor_identifier: Option<String>,
}

impl Config {
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.download_url {
            self.download_url = Some(ValueEntry::Shorthand(url.clone()));
        }
        if let Some(id) = &overrides.identifier {
            self.identifier = Some(ValueEntry::Shorthand(id.clone()));
        }
        if let Some(id) = &overrides.anchor_identifier {
            self.anchor_identifier = Some(ValueEntry::Shorthand(id.clone()));
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub url_template: String,
    pub identifier: RecordId,
    pub anchor_identifier: Option<RecordId>,
    pub ruleset: PathBuf,
    pub image_retry_delay: Duration,
}

impl ResolvedConfig {
    /// Substitutes `{identifier}`; templates without it get the identifier appended.
    pub fn record_url(&self, id: &RecordId) -> String {
        if self.url_template.contains(IDENTIFIER_PLACEHOLDER) {
            self.url_template
                .replace(IDENTIFIER_PLACEHOLDER, id.as_str())
        } else {
            format!("{}{}", self.url_template, id.as_str())
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("mets-migrate").join(DEFAULT_CONFIG_FILE))
            .filter(|path| path.exists())
    }

    pub fn load(path: Option<&str>) -> Result<Config, MigrateError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => Self::default_path().ok_or(MigrateError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MigrateError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| MigrateError::ConfigParse(err.to_string()))
    }

    pub fn resolve(
        path: Option<&str>,
        overrides: &ConfigOverrides,
        properties: &ProcessProperties,
    ) -> Result<ResolvedConfig, MigrateError> {
        let mut config = Self::load(path)?;
        config.apply_overrides(overrides);
        Self::resolve_config(config, properties)
    }

    pub fn resolve_config(
        config: Config,
        properties: &ProcessProperties,
    ) -> Result<ResolvedConfig, MigrateError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let url_template = config
            .download_url
            .and_then(|entry| entry.resolve(properties))
            .ok_or(MigrateError::MissingDownloadUrl)?;
        let identifier: RecordId = config
            .identifier
            .and_then(|entry| entry.resolve(properties))
            .ok_or(MigrateError::MissingIdentifier)?
            .parse()?;
        let anchor_identifier = config
            .anchor_identifier
            .and_then(|entry| entry.resolve(properties))
            .map(|value| value.parse::<RecordId>())
            .transpose()?;
        let ruleset = config.ruleset.ok_or(MigrateError::MissingRuleset)?;
        let image_retry_delay = config
            .image_retry_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RETRY_DELAY);

        Ok(ResolvedConfig {
            schema_version,
            url_template,
            identifier,
            anchor_identifier,
            ruleset,
            image_retry_delay,
        })
    }
}
