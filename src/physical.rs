use std::collections::HashMap;

use crate::document::{DigitalDocument, MetadataField, PageId, PageNode, field};
use crate::domain::ImageDescriptor;
use crate::ruleset::Ruleset;
use crate::xml::Element;

pub type PageMap = HashMap<String, PageId>;

pub struct PhysicalTreeBuilder<'a> {
    ruleset: &'a Ruleset,
    images: &'a [ImageDescriptor],
}

impl<'a> PhysicalTreeBuilder<'a> {
    pub fn new(ruleset: &'a Ruleset, images: &'a [ImageDescriptor]) -> Self {
        Self { ruleset, images }
    }

    pub fn build(
        &self,
        document: &mut DigitalDocument,
        struct_map: &Element,
        media_dir: &str,
    ) -> PageMap {
        document.ensure_physical_root(&format!("file://{media_dir}"), self.ruleset);

        let mut pages = PageMap::new();
        let Some(sequence) = struct_map.child("div") else {
            tracing::warn!("physical structure map has no page sequence");
            return pages;
        };

        let mut last_order = 0;
        for div in sequence.children_named("div") {
            let order = match div.attr("ORDER").and_then(|value| value.trim().parse::<u32>().ok()) {
                Some(order) if order > last_order => order,
                other => {
                    tracing::debug!(
                        "page {} has order {other:?}, renumbered to {}",
                        div.attr("ID").unwrap_or_default(),
                        last_order + 1
                    );
                    last_order + 1
                }
            };
            let page = self.page_node(div, order);
            let source_id = page.source_id.clone();
            match document.add_page(page, self.ruleset) {
                Ok(id) => {
                    last_order = order;
                    pages.insert(source_id, id);
                }
                Err(reason) => tracing::warn!("page {source_id} skipped: {reason}"),
            }
        }
        pages
    }

    fn page_node(&self, div: &Element, order: u32) -> PageNode {
        let order_label = div.non_blank_attr("ORDERLABEL").map(str::to_string);
        let content_id = div.non_blank_attr("CONTENTIDS").map(str::to_string);
        let image_name = div
            .children_named("fptr")
            .filter_map(|fptr| fptr.attr("FILEID"))
            .find_map(|file_id| self.image_for(file_id))
            .map(|descriptor| descriptor.filename.clone());

        let mut metadata = vec![MetadataField::new(
            field::PHYS_PAGE_NUMBER,
            &order.to_string(),
        )];
        if let Some(label) = &order_label {
            metadata.push(MetadataField::new(field::LOGICAL_PAGE_NUMBER, label));
        }
        if let Some(urn) = &content_id {
            metadata.push(MetadataField::new(field::CONTENT_URN, urn));
        }

        PageNode {
            order,
            order_label,
            content_id,
            image_name,
            source_id: div.attr("ID").unwrap_or_default().to_string(),
            metadata,
        }
    }

    fn image_for(&self, file_id: &str) -> Option<&'a ImageDescriptor> {
        self.images.iter().find(|image| image.file_id == file_id)
    }
}
