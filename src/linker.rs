use serde::Serialize;

use crate::document::{DigitalDocument, NodeId};
use crate::logical::NodeMap;
use crate::mets::StructLink;
use crate::physical::PageMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub linked: usize,
    pub unknown_nodes: usize,
    pub unknown_pages: usize,
}

pub struct ReferenceLinker<'a> {
    nodes: &'a NodeMap,
    pages: &'a PageMap,
}

impl<'a> ReferenceLinker<'a> {
    pub fn new(nodes: &'a NodeMap, pages: &'a PageMap) -> Self {
        Self { nodes, pages }
    }

    pub fn link(&self, document: &mut DigitalDocument, links: &[StructLink]) -> LinkReport {
        let mut report = LinkReport::default();
        for link in links {
            let Some(node) = self.nodes.get(&link.from) else {
                // organisational entries of the source never become nodes
                tracing::debug!("ignore missing logical reference {}", link.from);
                report.unknown_nodes += 1;
                continue;
            };
            let Some(page) = self.pages.get(&link.to) else {
                report.unknown_pages += 1;
                continue;
            };
            if document.add_reference(*node, *page) {
                report.linked += 1;
            }
        }
        report
    }
}

/// Copies the edges of every node below `target` onto `target` itself.
/// Intermediate ancestors keep only their own edges. Returns the number of
/// edges added.
pub fn aggregate_pages(document: &mut DigitalDocument, target: NodeId) -> usize {
    let pages: Vec<_> = document
        .descendants(target)
        .into_iter()
        .flat_map(|node| document.node(node).references.clone())
        .collect();
    pages
        .into_iter()
        .filter(|page| document.add_reference(target, *page))
        .count()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::document::{MetadataField, PageNode, field};
    use crate::ruleset::Ruleset;

    const RULESET: &str = r#"<Preferences>
  <DocStrctType>
    <Name>Monograph</Name>
    <allowedchildtype>Chapter</allowedchildtype>
  </DocStrctType>
  <DocStrctType>
    <Name>Chapter</Name>
    <allowedchildtype>Chapter</allowedchildtype>
  </DocStrctType>
  <DocStrctType><Name>BoundBook</Name><allowedchildtype>page</allowedchildtype></DocStrctType>
  <DocStrctType><Name>page</Name><metadata num="1m">physPageNumber</metadata></DocStrctType>
</Preferences>"#;

    struct Fixture {
        document: DigitalDocument,
        nodes: NodeMap,
        pages: PageMap,
    }

    fn fixture() -> Fixture {
        let ruleset = Ruleset::from_xml_str(RULESET).unwrap();
        let mut document = DigitalDocument::new("Monograph");
        let root = document.logical_root();
        let chapter = document.add_child(root, "Chapter", &ruleset).unwrap();
        let section = document.add_child(chapter, "Chapter", &ruleset).unwrap();
        document.ensure_physical_root("file:///media", &ruleset);

        let mut pages = PageMap::new();
        for order in 1..=4u32 {
            let id = format!("PHYS_{order}");
            let page = PageNode {
                order,
                order_label: None,
                content_id: None,
                image_name: None,
                source_id: id.clone(),
                metadata: vec![MetadataField::new(field::PHYS_PAGE_NUMBER, &order.to_string())],
            };
            pages.insert(id, document.add_page(page, &ruleset).unwrap());
        }
        let nodes = NodeMap::from([
            ("LOG_0".to_string(), root),
            ("LOG_1".to_string(), chapter),
            ("LOG_2".to_string(), section),
        ]);
        Fixture {
            document,
            nodes,
            pages,
        }
    }

    fn link(from: &str, to: &str) -> StructLink {
        StructLink {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn links_known_pairs_only() {
        let Fixture {
            mut document,
            nodes,
            pages,
        } = fixture();
        let links = vec![
            link("LOG_1", "PHYS_1"),
            link("LOG_1", "PHYS_2"),
            link("LOG_1", "PHYS_2"),
            link("LOG_9", "PHYS_3"),
            link("LOG_2", "PHYS_9"),
        ];

        let report = ReferenceLinker::new(&nodes, &pages).link(&mut document, &links);

        assert_eq!(
            report,
            LinkReport {
                linked: 2,
                unknown_nodes: 1,
                unknown_pages: 1,
            }
        );
        assert_eq!(document.node(nodes["LOG_1"]).references.len(), 2);
    }

    #[test]
    fn aggregation_collects_descendants_on_target_only() {
        let Fixture {
            mut document,
            nodes,
            pages,
        } = fixture();
        let links = vec![
            link("LOG_0", "PHYS_1"),
            link("LOG_1", "PHYS_1"),
            link("LOG_1", "PHYS_2"),
            link("LOG_2", "PHYS_3"),
            link("LOG_2", "PHYS_4"),
        ];
        ReferenceLinker::new(&nodes, &pages).link(&mut document, &links);

        let root = document.logical_root();
        let added = aggregate_pages(&mut document, root);

        assert_eq!(added, 3);
        let root_pages: HashSet<_> = document.node(root).references.iter().copied().collect();
        assert_eq!(root_pages.len(), document.node(root).references.len());
        for node in document.descendants(root) {
            for page in &document.node(node).references {
                assert!(root_pages.contains(page));
            }
        }
        // the chapter between root and section is left alone
        assert_eq!(document.node(nodes["LOG_1"]).references.len(), 2);
    }
}
