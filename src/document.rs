use serde::{Deserialize, Serialize};

use crate::error::MigrateError;
use crate::ruleset::{BOUND_BOOK_TYPE, PAGE_TYPE, Ruleset, SkipReason};

pub mod field {
    pub const CATALOG_ID_DIGITAL: &str = "CatalogIDDigital";
    pub const CATALOG_ID_SOURCE: &str = "CatalogIDSource";
    pub const PATH_IMAGE_FILES: &str = "pathimagefiles";
    pub const PHYS_PAGE_NUMBER: &str = "physPageNumber";
    pub const LOGICAL_PAGE_NUMBER: &str = "logicalPageNumber";
    pub const CONTENT_URN: &str = "_urn";
    pub const URN: &str = "URN";

    pub const TITLE: &str = "TitleDocMain";
    pub const OTHER_TITLE: &str = "OtherTitle";
    pub const SUBTITLE: &str = "TitleDocSub1";
    pub const PART_NUMBER: &str = "VolumeNumber";
    pub const PART_NAME: &str = "VolumeName";
    pub const COLLECTION: &str = "singleDigCollection";
    pub const PHYSICAL_LOCATION: &str = "PhysicalLocation";
    pub const SHELF_LOCATOR: &str = "shelfmarksource";
    pub const LANGUAGE: &str = "DocLanguage";
    pub const PUBLICATION_YEAR: &str = "PublicationYear";
    pub const PLACE_OF_PUBLICATION: &str = "PlaceOfPublication";
    pub const PUBLISHER: &str = "PublisherName";
    pub const PLACE_OF_ELECTRONIC_ORIGIN: &str = "_placeOfElectronicOrigin";
    pub const DATE_DIGITIZATION: &str = "_dateDigitization";
    pub const ELECTRONIC_PUBLISHER: &str = "_electronicPublisher";
    pub const ELECTRONIC_EDITION: &str = "_electronicEdition";
    pub const EXTENT: &str = "SizeSourcePrint";
    pub const FORMAT: &str = "FormatSourcePrint";
    pub const RESPONSIBILITY: &str = "TitleDocMainResponsibility";
    pub const SERIES_TITLE: &str = "TitleMainSeries";
    pub const SERIES_CATALOG_ID: &str = "CatalogIDMainSeries";
    pub const SERIES_ORDER: &str = "SeriesOrder";

    pub const AUTHOR: &str = "Author";
    pub const ENGRAVER: &str = "Engraver";
    pub const HONOREE: &str = "Honoree";
    pub const EDITOR: &str = "Editor";
    pub const OTHER_PERSON: &str = "OtherPerson";
}

pub const LOGICAL_PHYSICAL: &str = "logical_physical";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

impl From<Result<(), SkipReason>> for Outcome {
    fn from(value: Result<(), SkipReason>) -> Self {
        match value {
            Ok(()) => Outcome::Applied,
            Err(reason) => Outcome::Skipped(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub field_type: String,
    pub value: String,
}

impl MetadataField {
    pub fn new(field_type: &str, value: &str) -> Self {
        Self {
            field_type: field_type.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub authority: Option<String>,
    pub authority_uri: Option<String>,
    pub value_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub authority: Authority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralNode {
    pub type_name: String,
    pub source_id: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub metadata: Vec<MetadataField>,
    pub persons: Vec<Person>,
    pub references: Vec<PageId>,
}

impl StructuralNode {
    fn new(type_name: &str, parent: Option<NodeId>) -> Self {
        Self {
            type_name: type_name.to_string(),
            source_id: None,
            parent,
            children: Vec::new(),
            metadata: Vec::new(),
            persons: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn values(&self, field_type: &str) -> impl Iterator<Item = &str> {
        self.metadata
            .iter()
            .filter(move |md| md.field_type == field_type)
            .map(|md| md.value.as_str())
    }

    pub fn clear_imported_metadata(&mut self) {
        self.metadata
            .retain(|md| md.field_type == field::CATALOG_ID_DIGITAL);
        self.persons.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNode {
    pub order: u32,
    pub order_label: Option<String>,
    pub content_id: Option<String>,
    pub image_name: Option<String>,
    pub source_id: String,
    pub metadata: Vec<MetadataField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalRoot {
    pub type_name: String,
    pub metadata: Vec<MetadataField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceEdge {
    pub from: NodeId,
    pub to: PageId,
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub logical_type: String,
    pub logical_nodes: usize,
    pub root_fields: usize,
    pub root_children: usize,
    pub pages: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalDocument {
    nodes: Vec<StructuralNode>,
    #[serde(default)]
    physical: Option<PhysicalRoot>,
    #[serde(default)]
    pages: Vec<PageNode>,
}

impl DigitalDocument {
    pub fn new(top_type: &str) -> Self {
        Self {
            nodes: vec![StructuralNode::new(top_type, None)],
            physical: None,
            pages: Vec::new(),
        }
    }

    pub fn with_anchor(anchor_type: &str, volume_type: &str) -> Self {
        let mut document = Self::new(anchor_type);
        let root = document.logical_root();
        document.push_node(root, volume_type);
        document
    }

    pub fn logical_root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn import_target(&self, ruleset: &Ruleset) -> Result<(NodeId, Option<NodeId>), MigrateError> {
        let root = self.logical_root();
        if !ruleset.is_anchor(&self.node(root).type_name) {
            return Ok((root, None));
        }
        let volume = self.node(root).children.first().copied().ok_or_else(|| {
            MigrateError::InvalidDocument(format!(
                "anchor '{}' has no volume below it",
                self.node(root).type_name
            ))
        })?;
        Ok((volume, Some(root)))
    }

    pub fn node(&self, id: NodeId) -> &StructuralNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut StructuralNode {
        &mut self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn physical(&self) -> Option<&PhysicalRoot> {
        self.physical.as_ref()
    }

    pub fn pages(&self) -> &[PageNode] {
        &self.pages
    }

    pub fn page(&self, id: PageId) -> &PageNode {
        &self.pages[id.0]
    }

    pub fn page_ids(&self) -> impl Iterator<Item = PageId> {
        (0..self.pages.len()).map(PageId)
    }

    pub fn add_child(
        &mut self,
        parent: NodeId,
        type_name: &str,
        ruleset: &Ruleset,
    ) -> Result<NodeId, SkipReason> {
        ruleset.check_child(&self.node(parent).type_name, type_name)?;
        Ok(self.push_node(parent, type_name))
    }

    fn push_node(&mut self, parent: NodeId, type_name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(StructuralNode::new(type_name, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn add_metadata(
        &mut self,
        node: NodeId,
        field_type: &str,
        value: &str,
        ruleset: &Ruleset,
    ) -> Outcome {
        let target = &mut self.nodes[node.0];
        let existing = target.values(field_type).count();
        if let Err(reason) = ruleset.check_metadata(&target.type_name, field_type, existing) {
            return Outcome::Skipped(reason);
        }
        target.metadata.push(MetadataField::new(field_type, value));
        Outcome::Applied
    }

    pub fn add_person(&mut self, node: NodeId, person: Person, ruleset: &Ruleset) -> Outcome {
        let target = &mut self.nodes[node.0];
        let existing = target
            .persons
            .iter()
            .filter(|existing| existing.role == person.role)
            .count();
        if let Err(reason) = ruleset.check_metadata(&target.type_name, &person.role, existing) {
            return Outcome::Skipped(reason);
        }
        target.persons.push(person);
        Outcome::Applied
    }

    pub fn add_reference(&mut self, node: NodeId, page: PageId) -> bool {
        let references = &mut self.nodes[node.0].references;
        if references.contains(&page) {
            return false;
        }
        references.push(page);
        true
    }

    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.node(node).children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            result.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        result
    }

    pub fn edges(&self) -> impl Iterator<Item = ReferenceEdge> + '_ {
        self.nodes.iter().enumerate().flat_map(|(index, node)| {
            node.references.iter().map(move |page| ReferenceEdge {
                from: NodeId(index),
                to: *page,
                kind: LOGICAL_PHYSICAL,
            })
        })
    }

    pub fn ensure_physical_root(&mut self, media_dir: &str, ruleset: &Ruleset) {
        let physical = self.physical.get_or_insert_with(|| PhysicalRoot {
            type_name: BOUND_BOOK_TYPE.to_string(),
            metadata: Vec::new(),
        });
        let has_path = physical
            .metadata
            .iter()
            .any(|md| md.field_type == field::PATH_IMAGE_FILES);
        if has_path {
            return;
        }
        match ruleset.check_metadata(&physical.type_name, field::PATH_IMAGE_FILES, 0) {
            Ok(()) => physical
                .metadata
                .push(MetadataField::new(field::PATH_IMAGE_FILES, media_dir)),
            Err(reason) => tracing::warn!("{reason}"),
        }
    }

    pub fn add_page(&mut self, page: PageNode, ruleset: &Ruleset) -> Result<PageId, SkipReason> {
        let physical_type = self
            .physical
            .as_ref()
            .map(|physical| physical.type_name.as_str())
            .unwrap_or(BOUND_BOOK_TYPE);
        ruleset.check_child(physical_type, PAGE_TYPE)?;
        for (index, md) in page.metadata.iter().enumerate() {
            let existing = page.metadata[..index]
                .iter()
                .filter(|earlier| earlier.field_type == md.field_type)
                .count();
            ruleset.check_metadata(PAGE_TYPE, &md.field_type, existing)?;
        }
        let id = PageId(self.pages.len());
        self.pages.push(page);
        Ok(id)
    }

    /// Strips the document back to its import target (and anchor) before a new
    /// import: no children, no pages, no edges, and only the catalog identifier
    /// left in the metadata. The physical root and its fields survive.
    pub fn reset_for_import(&mut self, ruleset: &Ruleset) -> Result<(), MigrateError> {
        let (target, anchor) = self.import_target(ruleset)?;

        let mut top = self.node(target).clone();
        top.clear_imported_metadata();
        top.children.clear();
        top.references.clear();

        let nodes = match anchor {
            Some(anchor) => {
                let mut anchor = self.node(anchor).clone();
                anchor.clear_imported_metadata();
                anchor.children = vec![NodeId(1)];
                anchor.references.clear();
                anchor.parent = None;
                top.parent = Some(NodeId(0));
                vec![anchor, top]
            }
            None => {
                top.parent = None;
                vec![top]
            }
        };

        self.nodes = nodes;
        self.pages.clear();
        Ok(())
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.nodes.is_empty() {
            return Err(MigrateError::InvalidDocument(
                "document has no logical root".to_string(),
            ));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let bad_child = node.children.iter().any(|child| child.0 >= self.nodes.len());
            let bad_parent = node.parent.is_some_and(|parent| parent.0 >= self.nodes.len());
            let bad_page = node.references.iter().any(|page| page.0 >= self.pages.len());
            if bad_child || bad_parent || bad_page {
                return Err(MigrateError::InvalidDocument(format!(
                    "node {index} refers to a missing entry"
                )));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> DocumentSummary {
        let root = self.node(self.logical_root());
        DocumentSummary {
            logical_type: root.type_name.clone(),
            logical_nodes: self.nodes.len(),
            root_fields: root.metadata.len(),
            root_children: root.children.len(),
            pages: self.pages.len(),
            edges: self.edges().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const RULESET: &str = r#"<Preferences>
  <MetadataType type="person"><Name>Author</Name></MetadataType>
  <DocStrctType anchor="true">
    <Name>Periodical</Name>
    <allowedchildtype>PeriodicalVolume</allowedchildtype>
    <metadata num="1m">CatalogIDDigital</metadata>
    <metadata num="1o">TitleDocMain</metadata>
  </DocStrctType>
  <DocStrctType>
    <Name>PeriodicalVolume</Name>
    <allowedchildtype>Article</allowedchildtype>
    <metadata num="1m">CatalogIDDigital</metadata>
    <metadata num="1o">TitleDocMain</metadata>
    <metadata num="*">Author</metadata>
  </DocStrctType>
  <DocStrctType><Name>Article</Name><metadata num="1o">TitleDocMain</metadata></DocStrctType>
  <DocStrctType>
    <Name>BoundBook</Name>
    <allowedchildtype>page</allowedchildtype>
    <metadata num="1m">pathimagefiles</metadata>
  </DocStrctType>
  <DocStrctType>
    <Name>page</Name>
    <metadata num="1m">physPageNumber</metadata>
    <metadata num="1o">logicalPageNumber</metadata>
  </DocStrctType>
</Preferences>"#;

    fn ruleset() -> Ruleset {
        Ruleset::from_xml_str(RULESET).unwrap()
    }

    fn page(order: u32) -> PageNode {
        PageNode {
            order,
            order_label: None,
            content_id: None,
            image_name: None,
            source_id: format!("PHYS_{order}"),
            metadata: vec![MetadataField::new(field::PHYS_PAGE_NUMBER, &order.to_string())],
        }
    }

    #[test]
    fn import_target_skips_anchor() {
        let ruleset = ruleset();
        let document = DigitalDocument::with_anchor("Periodical", "PeriodicalVolume");
        let (target, anchor) = document.import_target(&ruleset).unwrap();
        assert_eq!(document.node(target).type_name, "PeriodicalVolume");
        assert_eq!(anchor, Some(document.logical_root()));
    }

    #[test]
    fn anchor_without_volume_is_invalid() {
        let ruleset = ruleset();
        let document = DigitalDocument::new("Periodical");
        assert_matches!(
            document.import_target(&ruleset),
            Err(MigrateError::InvalidDocument(_))
        );
    }

    #[test]
    fn reset_keeps_only_catalog_identifier() {
        let ruleset = ruleset();
        let mut document = DigitalDocument::with_anchor("Periodical", "PeriodicalVolume");
        let (volume, anchor) = document.import_target(&ruleset).unwrap();
        let anchor = anchor.unwrap();
        document.add_metadata(anchor, field::CATALOG_ID_DIGITAL, "123", &ruleset);
        document.add_metadata(anchor, field::TITLE, "Journal", &ruleset);
        document.add_metadata(volume, field::CATALOG_ID_DIGITAL, "123_1", &ruleset);
        document.add_metadata(volume, field::TITLE, "1901", &ruleset);
        let person = Person {
            role: field::AUTHOR.to_string(),
            first_name: Some("Anna".to_string()),
            last_name: Some("Seghers".to_string()),
            authority: Authority::default(),
        };
        assert!(document.add_person(volume, person, &ruleset).is_applied());
        let article = document.add_child(volume, "Article", &ruleset).unwrap();
        document.ensure_physical_root("file:///media", &ruleset);
        let first = document.add_page(page(1), &ruleset).unwrap();
        document.add_reference(article, first);

        document.reset_for_import(&ruleset).unwrap();

        assert_eq!(document.node_count(), 2);
        assert!(document.pages().is_empty());
        assert_eq!(document.edges().count(), 0);
        let (volume, anchor) = document.import_target(&ruleset).unwrap();
        let volume = document.node(volume);
        assert_eq!(volume.metadata, vec![MetadataField::new(field::CATALOG_ID_DIGITAL, "123_1")]);
        assert!(volume.persons.is_empty());
        assert!(volume.children.is_empty());
        assert_eq!(document.node(anchor.unwrap()).metadata.len(), 1);
        assert_eq!(document.physical().unwrap().metadata.len(), 1);
    }

    #[test]
    fn schema_rejections_are_outcomes() {
        let ruleset = ruleset();
        let mut document = DigitalDocument::new("PeriodicalVolume");
        let root = document.logical_root();

        assert_eq!(document.add_metadata(root, field::TITLE, "a", &ruleset), Outcome::Applied);
        assert_matches!(
            document.add_metadata(root, field::TITLE, "b", &ruleset),
            Outcome::Skipped(SkipReason::CardinalityExceeded { .. })
        );
        assert_matches!(
            document.add_metadata(root, field::PUBLISHER, "c", &ruleset),
            Outcome::Skipped(SkipReason::MetadataNotAllowed { .. })
        );
        assert_matches!(
            document.add_child(root, "PeriodicalVolume", &ruleset),
            Err(SkipReason::ChildNotAllowed { .. })
        );
        assert_eq!(document.node(root).metadata.len(), 1);
    }

    #[test]
    fn page_with_rejected_field_is_refused() {
        let ruleset = ruleset();
        let mut document = DigitalDocument::new("PeriodicalVolume");
        document.ensure_physical_root("file:///media", &ruleset);

        let mut bad = page(1);
        bad.metadata.push(MetadataField::new(field::PHYS_PAGE_NUMBER, "1"));
        assert_matches!(
            document.add_page(bad, &ruleset),
            Err(SkipReason::CardinalityExceeded { .. })
        );
        assert!(document.add_page(page(2), &ruleset).is_ok());
        assert_eq!(document.pages().len(), 1);
    }

    #[test]
    fn physical_root_path_is_added_once() {
        let ruleset = ruleset();
        let mut document = DigitalDocument::new("PeriodicalVolume");
        document.ensure_physical_root("file:///a", &ruleset);
        document.ensure_physical_root("file:///b", &ruleset);
        let physical = document.physical().unwrap();
        assert_eq!(physical.type_name, BOUND_BOOK_TYPE);
        assert_eq!(physical.metadata, vec![MetadataField::new(field::PATH_IMAGE_FILES, "file:///a")]);
    }

    #[test]
    fn references_are_deduplicated() {
        let ruleset = ruleset();
        let mut document = DigitalDocument::new("PeriodicalVolume");
        document.ensure_physical_root("file:///a", &ruleset);
        let root = document.logical_root();
        let first = document.add_page(page(1), &ruleset).unwrap();
        assert!(document.add_reference(root, first));
        assert!(!document.add_reference(root, first));
        assert_eq!(document.edges().count(), 1);
    }

    #[test]
    fn descendants_in_document_order() {
        let ruleset = ruleset();
        let mut document = DigitalDocument::with_anchor("Periodical", "PeriodicalVolume");
        let (volume, _) = document.import_target(&ruleset).unwrap();
        let a = document.add_child(volume, "Article", &ruleset).unwrap();
        let b = document.add_child(volume, "Article", &ruleset).unwrap();
        assert_eq!(document.descendants(document.logical_root()), vec![volume, a, b]);
    }
}
