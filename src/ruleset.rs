use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::error::MigrateError;
use crate::xml::{self, Element};

pub const PAGE_TYPE: &str = "page";
pub const BOUND_BOOK_TYPE: &str = "BoundBook";
pub const OTHER_TYPE: &str = "OtherDocStrct";
pub const COVER_TYPE: &str = "Cover";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("structure type '{0}' is not defined in the ruleset")]
    UnknownType(String),

    #[error("type '{child}' is not allowed as child of '{parent}'")]
    ChildNotAllowed { parent: String, child: String },

    #[error("metadata type '{field}' is not allowed inside of '{struct_type}'")]
    MetadataNotAllowed { struct_type: String, field: String },

    #[error("'{struct_type}' already holds the single allowed '{field}'")]
    CardinalityExceeded { struct_type: String, field: String },

    #[error("metadata block '{0}' is not present in the record")]
    MissingMetadataBlock(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ZeroOrOne,
    ExactlyOne,
    ZeroOrMore,
    OneOrMore,
}

impl Cardinality {
    fn parse(num: Option<&str>) -> Self {
        match num.map(str::trim) {
            Some("1o") => Cardinality::ZeroOrOne,
            Some("1m") => Cardinality::ExactlyOne,
            Some("+") => Cardinality::OneOrMore,
            _ => Cardinality::ZeroOrMore,
        }
    }

    fn admits(self, existing: usize) -> bool {
        match self {
            Cardinality::ZeroOrOne | Cardinality::ExactlyOne => existing == 0,
            Cardinality::ZeroOrMore | Cardinality::OneOrMore => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocStructRule {
    pub name: String,
    pub anchor: bool,
    metadata: HashMap<String, Cardinality>,
    children: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    docstructs: HashMap<String, DocStructRule>,
    person_types: HashSet<String>,
    mets_types: HashMap<String, String>,
}

impl Ruleset {
    pub fn load(path: &Path) -> Result<Self, MigrateError> {
        let content =
            fs::read_to_string(path).map_err(|_| MigrateError::RulesetRead(path.to_path_buf()))?;
        Self::from_xml_str(&content)
    }

    pub fn from_xml_str(content: &str) -> Result<Self, MigrateError> {
        let root = xml::parse(content).map_err(|err| MigrateError::RulesetParse(err.to_string()))?;
        if root.name() != "Preferences" {
            return Err(MigrateError::RulesetParse(format!(
                "expected <Preferences> root, found <{}>",
                root.name()
            )));
        }

        let person_types = root
            .children_named("MetadataType")
            .filter(|md| md.attr("type") == Some("person"))
            .filter_map(|md| md.child("Name"))
            .map(|name| name.text().to_string())
            .collect();

        let mut docstructs = HashMap::new();
        for element in root.children_named("DocStrctType") {
            let rule = parse_docstruct(element)?;
            docstructs.insert(rule.name.clone(), rule);
        }

        let mets_types = root
            .descend(&["Formats", "METS"])
            .map(|mets| {
                mets.children_named("DocStruct")
                    .filter_map(|ds| {
                        let mets_type = ds.child("MetsType")?.text();
                        let internal = ds.child("InternalName")?.text();
                        Some((mets_type.to_lowercase(), internal.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            docstructs,
            person_types,
            mets_types,
        })
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.docstructs.contains_key(name)
    }

    pub fn is_anchor(&self, name: &str) -> bool {
        self.docstructs
            .get(name)
            .map(|rule| rule.anchor)
            .unwrap_or(false)
    }

    pub fn is_person_type(&self, name: &str) -> bool {
        self.person_types.contains(name)
    }

    /// Maps an external structure type onto a ruleset type. Never fails: unknown
    /// types end up as [`OTHER_TYPE`].
    pub fn resolve_type(&self, mets_type: &str) -> String {
        let key = mets_type.trim().to_lowercase();
        if let Some(internal) = self.mets_types.get(&key)
            && !internal.trim().is_empty()
            && self.has_type(internal)
        {
            return internal.clone();
        }
        match key.as_str() {
            "cover_front" | "cover_back" => COVER_TYPE.to_string(),
            _ => {
                tracing::debug!("structure type {mets_type} is unknown, use '{OTHER_TYPE}'");
                OTHER_TYPE.to_string()
            }
        }
    }

    pub fn check_type(&self, name: &str) -> Result<(), SkipReason> {
        if self.has_type(name) {
            Ok(())
        } else {
            Err(SkipReason::UnknownType(name.to_string()))
        }
    }

    pub fn check_child(&self, parent: &str, child: &str) -> Result<(), SkipReason> {
        self.check_type(child)?;
        let rule = self
            .docstructs
            .get(parent)
            .ok_or_else(|| SkipReason::UnknownType(parent.to_string()))?;
        if rule.children.contains(child) {
            Ok(())
        } else {
            Err(SkipReason::ChildNotAllowed {
                parent: parent.to_string(),
                child: child.to_string(),
            })
        }
    }

    /// Checks whether one more value of `field` fits into a `struct_type` that
    /// already holds `existing` values of it. Names starting with `_` are
    /// internal and always accepted.
    pub fn check_metadata(
        &self,
        struct_type: &str,
        field: &str,
        existing: usize,
    ) -> Result<(), SkipReason> {
        if field.starts_with('_') {
            return Ok(());
        }
        let cardinality = self
            .docstructs
            .get(struct_type)
            .and_then(|rule| rule.metadata.get(field))
            .ok_or_else(|| SkipReason::MetadataNotAllowed {
                struct_type: struct_type.to_string(),
                field: field.to_string(),
            })?;
        if cardinality.admits(existing) {
            Ok(())
        } else {
            Err(SkipReason::CardinalityExceeded {
                struct_type: struct_type.to_string(),
                field: field.to_string(),
            })
        }
    }
}

fn parse_docstruct(element: &Element) -> Result<DocStructRule, MigrateError> {
    let name = element
        .child("Name")
        .map(|name| name.text().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| MigrateError::RulesetParse("DocStrctType without Name".to_string()))?;

    let metadata = element
        .children_named("metadata")
        .map(|md| (md.text().to_string(), Cardinality::parse(md.attr("num"))))
        .collect();
    let children = element
        .children_named("allowedchildtype")
        .map(|child| child.text().to_string())
        .collect();

    Ok(DocStructRule {
        name,
        anchor: element.attr("anchor") == Some("true"),
        metadata,
        children,
    })
}
