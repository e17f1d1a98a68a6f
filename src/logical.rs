use std::collections::HashMap;

use serde::Serialize;

use crate::document::{DigitalDocument, NodeId, Outcome, field};
use crate::mets::MetsSections;
use crate::mods::{ExtractReport, MetadataExtractor};
use crate::ruleset::{Ruleset, SkipReason};
use crate::xml::Element;

pub type NodeMap = HashMap<String, NodeId>;

const AGGREGATE_TYPES: [&str; 2] = ["multivolume_work", "periodical"];

#[derive(Debug, Default, Clone, Serialize)]
pub struct LogicalBuild {
    #[serde(skip)]
    pub nodes: NodeMap,
    pub created: usize,
    pub abandoned: usize,
    pub metadata: ExtractReport,
}

pub struct LogicalTreeBuilder<'a> {
    ruleset: &'a Ruleset,
    sections: &'a MetsSections<'a>,
    extractor: MetadataExtractor<'a>,
}

impl<'a> LogicalTreeBuilder<'a> {
    pub fn new(ruleset: &'a Ruleset, sections: &'a MetsSections<'a>) -> Self {
        Self {
            ruleset,
            sections,
            extractor: MetadataExtractor::new(ruleset),
        }
    }

    pub fn build(
        &self,
        document: &mut DigitalDocument,
        target: NodeId,
        struct_map: &Element,
    ) -> LogicalBuild {
        let mut build = LogicalBuild::default();
        let Some(root_div) = struct_map.child("div") else {
            tracing::warn!("logical structure map has no entries");
            return build;
        };
        let root_div = volume_entry(root_div);

        if let Some(urn) = root_div.non_blank_attr("CONTENTIDS") {
            self.add_field(document, target, field::CONTENT_URN, urn, &mut build);
        }
        if let Some(dmd_id) = root_div.non_blank_attr("DMDID") {
            self.extract(document, target, dmd_id, &mut build);
        }
        if let Some(id) = root_div.attr("ID") {
            document.node_mut(target).source_id = Some(id.to_string());
            build.nodes.insert(id.to_string(), target);
        }

        for div in root_div.children_named("div") {
            self.create_node(document, target, div, &mut build);
        }
        build
    }

    fn create_node(
        &self,
        document: &mut DigitalDocument,
        parent: NodeId,
        div: &Element,
        build: &mut LogicalBuild,
    ) {
        let type_name = self.ruleset.resolve_type(div.attr("TYPE").unwrap_or_default());
        let node = match document.add_child(parent, &type_name, self.ruleset) {
            Ok(node) => node,
            Err(reason) => {
                tracing::warn!(
                    "entry {} abandoned: {reason}",
                    div.attr("ID").unwrap_or_default()
                );
                build.abandoned += 1;
                return;
            }
        };
        build.created += 1;
        if let Some(id) = div.attr("ID") {
            document.node_mut(node).source_id = Some(id.to_string());
            build.nodes.insert(id.to_string(), node);
        }

        if let Some(dmd_id) = div.non_blank_attr("DMDID") {
            self.extract(document, node, dmd_id, build);
        } else if let Some(label) = div.non_blank_attr("LABEL") {
            self.add_field(document, node, field::TITLE, label, build);
        }
        if let Some(urn) = div.non_blank_attr("CONTENTIDS") {
            self.add_field(document, node, field::CONTENT_URN, urn, build);
        }

        for child in div.children_named("div") {
            self.create_node(document, node, child, build);
        }
    }

    fn extract(
        &self,
        document: &mut DigitalDocument,
        node: NodeId,
        dmd_id: &str,
        build: &mut LogicalBuild,
    ) {
        match self.sections.mods(dmd_id) {
            Some(mods) => {
                let report = self.extractor.extract(mods, document, node);
                build.metadata.merge(report);
            }
            None => tracing::warn!("{}", SkipReason::MissingMetadataBlock(dmd_id.to_string())),
        }
    }

    fn add_field(
        &self,
        document: &mut DigitalDocument,
        node: NodeId,
        field_type: &str,
        value: &str,
        build: &mut LogicalBuild,
    ) {
        match document.add_metadata(node, field_type, value, self.ruleset) {
            Outcome::Applied => build.metadata.applied += 1,
            Outcome::Skipped(reason) => {
                tracing::warn!("{reason}");
                build.metadata.skipped += 1;
            }
        }
    }
}

/// For a volume record the root entry stands for the whole work and only
/// points at the anchor record; the volume itself is nested one level down.
fn volume_entry(root_div: &Element) -> &Element {
    if root_div.child("mptr").is_none() {
        return root_div;
    }
    let div_type = root_div.attr("TYPE").unwrap_or_default();
    if !AGGREGATE_TYPES
        .iter()
        .any(|aggregate| aggregate.eq_ignore_ascii_case(div_type))
    {
        tracing::info!("found mptr for type {div_type}");
        return root_div;
    }
    match root_div.child("div") {
        Some(volume) => volume,
        None => {
            tracing::warn!("{div_type} entry points at its anchor but holds no volume");
            root_div
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    const RULESET: &str = r#"<Preferences>
  <DocStrctType>
    <Name>Monograph</Name>
    <allowedchildtype>Chapter</allowedchildtype>
    <allowedchildtype>Cover</allowedchildtype>
    <allowedchildtype>OtherDocStrct</allowedchildtype>
    <metadata num="1m">TitleDocMain</metadata>
  </DocStrctType>
  <DocStrctType>
    <Name>Chapter</Name>
    <allowedchildtype>Chapter</allowedchildtype>
    <metadata num="1o">TitleDocMain</metadata>
  </DocStrctType>
  <DocStrctType><Name>Cover</Name></DocStrctType>
  <DocStrctType><Name>OtherDocStrct</Name></DocStrctType>
  <DocStrctType><Name>Index</Name></DocStrctType>
  <Formats><METS>
    <DocStruct><InternalName>Chapter</InternalName><MetsType>chapter</MetsType></DocStruct>
    <DocStruct><InternalName>Index</InternalName><MetsType>index</MetsType></DocStruct>
  </METS></Formats>
</Preferences>"#;

    const RECORD: &str = r#"<mets>
  <dmdSec ID="md1"><mdWrap><xmlData><mods><titleInfo><title>Neues Kochbuch</title></titleInfo></mods></xmlData></mdWrap></dmdSec>
  <dmdSec ID="md2"><mdWrap><xmlData><mods><titleInfo><title>Suppen</title></titleInfo></mods></xmlData></mdWrap></dmdSec>
  <structMap TYPE="LOGICAL">
    <div ID="LOG_0" TYPE="monograph" DMDID="md1" CONTENTIDS="urn:nbn:de:1">
      <div ID="LOG_1" TYPE="cover_front"/>
      <div ID="LOG_2" TYPE="chapter" DMDID="md2">
        <div ID="LOG_3" TYPE="chapter" LABEL="Kalte Suppen" CONTENTIDS="urn:nbn:de:3"/>
        <div ID="LOG_4" TYPE="chapter" DMDID="md404"/>
      </div>
      <div ID="LOG_5" TYPE="index" LABEL="Register">
        <div ID="LOG_6" TYPE="chapter"/>
      </div>
      <div ID="LOG_7" TYPE="Illustration" LABEL="Tafel"/>
    </div>
  </structMap>
</mets>"#;

    #[test]
    fn builds_tree_below_target() {
        let ruleset = Ruleset::from_xml_str(RULESET).unwrap();
        let record = xml::parse(RECORD).unwrap();
        let sections = MetsSections::from_record(&record);
        let mut document = DigitalDocument::new("Monograph");
        let root = document.logical_root();

        let build = LogicalTreeBuilder::new(&ruleset, &sections).build(
            &mut document,
            root,
            sections.logical.unwrap(),
        );

        let top = document.node(root);
        assert_eq!(top.values(field::TITLE).collect::<Vec<_>>(), vec!["Neues Kochbuch"]);
        assert_eq!(top.values(field::CONTENT_URN).collect::<Vec<_>>(), vec!["urn:nbn:de:1"]);
        assert_eq!(top.source_id.as_deref(), Some("LOG_0"));

        let children: Vec<_> = top
            .children
            .iter()
            .map(|child| document.node(*child).type_name.as_str())
            .collect();
        // the index is not allowed below a monograph and is dropped with its chapter
        assert_eq!(children, vec!["Cover", "Chapter", "OtherDocStrct"]);
        assert_eq!(build.created, 5);
        assert_eq!(build.abandoned, 1);
        assert!(!build.nodes.contains_key("LOG_5"));
        assert!(!build.nodes.contains_key("LOG_6"));

        let chapter = document.node(build.nodes["LOG_2"]);
        assert_eq!(chapter.values(field::TITLE).collect::<Vec<_>>(), vec!["Suppen"]);
        assert_eq!(chapter.children.len(), 2);
        let nested = document.node(build.nodes["LOG_3"]);
        assert_eq!(nested.values(field::TITLE).collect::<Vec<_>>(), vec!["Kalte Suppen"]);
        assert_eq!(nested.values(field::CONTENT_URN).count(), 1);
        assert!(document.node(build.nodes["LOG_4"]).metadata.is_empty());
        // OtherDocStrct does not accept a title
        assert!(document.node(build.nodes["LOG_7"]).metadata.is_empty());
    }

    #[test]
    fn descends_into_volume_below_anchor_pointer() {
        let root = xml::parse(
            r#"<div ID="LOG_0" TYPE="Periodical"><mptr href="https://example.org/anchor"/>
                 <div ID="LOG_1" TYPE="volume"/>
               </div>"#,
        )
        .unwrap();
        assert_eq!(volume_entry(&root).attr("ID"), Some("LOG_1"));

        let other = xml::parse(
            r#"<div ID="LOG_0" TYPE="section"><mptr href="x"/><div ID="LOG_1"/></div>"#,
        )
        .unwrap();
        assert_eq!(volume_entry(&other).attr("ID"), Some("LOG_0"));
    }
}
