use std::collections::HashMap;

use crate::domain::ImageDescriptor;
use crate::error::MigrateError;
use crate::xml::{self, Element};

const DEFAULT_FILE_GROUP: &str = "DEFAULT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEnvelope {
    Record(Element),
    NoRecord(String),
}

pub fn parse_envelope(content: &str) -> Result<RecordEnvelope, MigrateError> {
    let root = xml::parse(content)?;
    match root.name() {
        "mets" => Ok(RecordEnvelope::Record(root)),
        "OAI-PMH" => Ok(unwrap_oai(&root)),
        other => Ok(RecordEnvelope::NoRecord(format!(
            "unexpected root element <{other}>"
        ))),
    }
}

fn unwrap_oai(root: &Element) -> RecordEnvelope {
    let mut record = None;
    let mut errors = Vec::new();

    if let Some(error) = root.child("error") {
        errors.push(error.text().to_string());
    }
    if let Some(get_record) = root.child("GetRecord") {
        for element in get_record.children() {
            match element.name() {
                "record" => record = Some(element),
                "error" => errors.push(element.text().to_string()),
                _ => {}
            }
        }
    }
    for error in &errors {
        tracing::error!("record endpoint reported: {error}");
    }

    match record {
        Some(record) => match record.descend(&["metadata", "mets"]) {
            Some(mets) => RecordEnvelope::Record(mets.clone()),
            None => RecordEnvelope::NoRecord("record carries no METS payload".to_string()),
        },
        None if errors.is_empty() => RecordEnvelope::NoRecord("response holds no record".to_string()),
        None => RecordEnvelope::NoRecord(errors.join("; ")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLink {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default)]
pub struct MetsSections<'a> {
    pub dmd_secs: HashMap<&'a str, &'a Element>,
    pub images: Vec<ImageDescriptor>,
    pub logical: Option<&'a Element>,
    pub physical: Option<&'a Element>,
    pub struct_links: Vec<StructLink>,
}

impl<'a> MetsSections<'a> {
    pub fn from_record(mets: &'a Element) -> Self {
        let mut sections = MetsSections::default();
        for element in mets.children() {
            match (element.name(), element.attr("TYPE")) {
                ("dmdSec", _) => {
                    if let Some(id) = element.attr("ID") {
                        sections.dmd_secs.insert(id, element);
                    }
                }
                ("fileSec", _) => sections.collect_images(element),
                ("structMap", Some("LOGICAL")) => sections.logical = Some(element),
                ("structMap", Some("PHYSICAL")) => sections.physical = Some(element),
                ("structLink", _) => {
                    sections.struct_links = element
                        .children()
                        .iter()
                        .filter_map(|link| {
                            Some(StructLink {
                                from: link.attr("from")?.to_string(),
                                to: link.attr("to")?.to_string(),
                            })
                        })
                        .collect();
                }
                _ => {}
            }
        }
        sections
    }

    fn collect_images(&mut self, file_sec: &Element) {
        let groups = file_sec
            .children_named("fileGrp")
            .filter(|group| group.attr("USE") == Some(DEFAULT_FILE_GROUP));
        for group in groups {
            for file in group.children_named("file") {
                let Some(id) = file.attr("ID") else {
                    tracing::warn!("skipping file entry without ID");
                    continue;
                };
                let Some(url) = file.child("FLocat").and_then(|flocat| flocat.attr("href")) else {
                    tracing::warn!("file {id} has no location, skipping");
                    continue;
                };
                let descriptor =
                    ImageDescriptor::new(self.images.len() + 1, id, url, file.attr("MIMETYPE"));
                if !descriptor.has_local_filename() {
                    tracing::warn!("file {id} maps to unusable name {}, skipping", descriptor.filename);
                    continue;
                }
                self.images.push(descriptor);
            }
        }
    }

    pub fn is_importable(&self) -> bool {
        self.physical.is_some()
    }

    pub fn mods(&self, id: &str) -> Option<&'a Element> {
        self.dmd_secs.get(id).and_then(|dmd| mods_block(dmd))
    }
}

pub fn mods_block(dmd_sec: &Element) -> Option<&Element> {
    dmd_sec.descend(&["mdWrap", "xmlData", "mods"])
}
