use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::document::{DigitalDocument, field};
use crate::domain::RecordId;
use crate::error::MigrateError;
use crate::ruleset::Ruleset;

pub const DOCUMENT_FILE: &str = "meta.json";
pub const PROPERTIES_FILE: &str = "properties.json";
pub const FINAL_URL_PROPERTY: &str = "METS Final URL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessProperties {
    pub title: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ProcessProperties {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.properties.insert(name.to_string(), value.to_string());
    }
}

#[derive(Debug, Clone)]
pub struct ProcessInit {
    pub title: String,
    pub top_type: String,
    pub anchor_type: Option<String>,
    pub catalog_id: String,
    pub anchor_catalog_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Store {
    process_root: Utf8PathBuf,
}

impl Store {
    pub fn new(process_root: Utf8PathBuf) -> Self {
        Self { process_root }
    }

    pub fn current() -> Result<Self, MigrateError> {
        let cwd = std::env::current_dir().map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let process_root = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| MigrateError::Filesystem("invalid process path".to_string()))?;
        Ok(Self { process_root })
    }

    pub fn process_root(&self) -> &Utf8Path {
        &self.process_root
    }

    pub fn document_path(&self) -> Utf8PathBuf {
        self.process_root.join(DOCUMENT_FILE)
    }

    pub fn properties_path(&self) -> Utf8PathBuf {
        self.process_root.join(PROPERTIES_FILE)
    }

    pub fn import_dir(&self) -> Utf8PathBuf {
        self.process_root.join("import")
    }

    pub fn raw_record_path(&self, id: &RecordId) -> Utf8PathBuf {
        self.import_dir()
            .join(format!("oai_mets_{}.xml", id.file_stem()))
    }

    pub fn media_dir(&self, title: &str) -> Utf8PathBuf {
        self.process_root
            .join("images")
            .join(format!("{title}_media"))
    }

    pub fn load_document(&self) -> Result<DigitalDocument, MigrateError> {
        let path = self.document_path();
        if !path.as_std_path().exists() {
            return Err(MigrateError::DocumentNotFound(path.into_std_path_buf()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let document: DigitalDocument = serde_json::from_str(&content)
            .map_err(|err| MigrateError::InvalidDocument(err.to_string()))?;
        document.validate()?;
        Ok(document)
    }

    pub fn write_document(&self, document: &DigitalDocument) -> Result<(), MigrateError> {
        let content = serde_json::to_vec_pretty(document)
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        Self::write_file_atomic(&self.document_path(), &content)
    }

    pub fn write_raw_record(&self, id: &RecordId, xml: &str) -> Result<Utf8PathBuf, MigrateError> {
        let path = self.raw_record_path(id);
        Self::write_file_atomic(&path, xml.as_bytes())?;
        Ok(path)
    }

    pub fn load_properties(&self) -> Result<ProcessProperties, MigrateError> {
        let path = self.properties_path();
        if !path.as_std_path().exists() {
            return Ok(ProcessProperties::default());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| MigrateError::Filesystem(err.to_string()))
    }

    pub fn write_properties(&self, properties: &ProcessProperties) -> Result<(), MigrateError> {
        let content = serde_json::to_vec_pretty(properties)
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        Self::write_file_atomic(&self.properties_path(), &content)
    }

    pub fn set_property(&self, name: &str, value: &str) -> Result<(), MigrateError> {
        let mut properties = self.load_properties()?;
        properties.set(name, value);
        self.write_properties(&properties)
    }

    pub fn init_document(
        &self,
        init: &ProcessInit,
        ruleset: &Ruleset,
    ) -> Result<DigitalDocument, MigrateError> {
        if self.document_path().as_std_path().exists() {
            return Err(MigrateError::InvalidDocument(format!(
                "{} already exists",
                self.document_path()
            )));
        }
        let invalid = |reason: crate::ruleset::SkipReason| {
            MigrateError::InvalidDocument(reason.to_string())
        };

        ruleset.check_type(&init.top_type).map_err(invalid)?;
        let mut document = match &init.anchor_type {
            Some(anchor_type) => {
                ruleset.check_child(anchor_type, &init.top_type).map_err(invalid)?;
                if !ruleset.is_anchor(anchor_type) {
                    return Err(MigrateError::InvalidDocument(format!(
                        "'{anchor_type}' is not an anchor type"
                    )));
                }
                DigitalDocument::with_anchor(anchor_type, &init.top_type)
            }
            None => DigitalDocument::new(&init.top_type),
        };

        let (target, anchor) = document.import_target(ruleset)?;
        document.add_metadata(target, field::CATALOG_ID_DIGITAL, &init.catalog_id, ruleset);
        if let (Some(anchor), Some(catalog_id)) = (anchor, &init.anchor_catalog_id) {
            document.add_metadata(anchor, field::CATALOG_ID_DIGITAL, catalog_id, ruleset);
        }

        fs::create_dir_all(self.import_dir().as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        fs::create_dir_all(self.media_dir(&init.title).as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        self.write_properties(&ProcessProperties {
            title: init.title.clone(),
            properties: BTreeMap::new(),
        })?;
        self.write_document(&document)?;
        Ok(document)
    }

    fn write_file_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), MigrateError> {
        let parent = path
            .parent()
            .ok_or_else(|| MigrateError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix("mets-migrate")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
