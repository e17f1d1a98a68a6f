//! Small read-only element tree over quick-xml.
//!
//! Element and attribute names are stored by local name; namespace prefixes and
//! `xmlns` declarations are dropped. METS, MODS, OAI-PMH and xlink never reuse a
//! local name within the subset we consume, so this keeps lookups simple.

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::error::MigrateError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn non_blank_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).filter(|value| !value.trim().is_empty())
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn descend(&self, path: &[&str]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |element, name| element.child(name))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }
}

pub fn parse(content: &str) -> Result<Element, MigrateError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = Reader::from_str(content);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(start_element(&e)?);
            }
            Ok(Event::Empty(e)) => {
                let element = start_element(&e)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(current) = stack.last_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        current.text.push_str(&resolved);
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some(mut element) = stack.pop() {
                    element.text = element.text.trim().to_string();
                    attach(&mut stack, &mut root, element);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(MigrateError::XmlParse(format!(
                    "at position {}: {err}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(MigrateError::XmlParse(
            "unexpected end of document".to_string(),
        ));
    }
    root.ok_or_else(|| MigrateError::XmlParse("document has no root element".to_string()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn start_element(start: &BytesStart<'_>) -> Result<Element, MigrateError> {
    let name = start.name();
    let mut element = Element::new(&String::from_utf8_lossy(local_name(name.as_ref())));
    for attr in start.attributes().flatten() {
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw).map_err(|err| MigrateError::XmlParse(err.to_string()))?;
        element.attributes.push((
            String::from_utf8_lossy(local_name(key)).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(element)
}

fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x") {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_prefixed_names_by_local_name() {
        let root = parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <mets:mets xmlns:mets="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink">
              <mets:structLink>
                <mets:smLink xlink:from="LOG_1" xlink:to="PHYS_1"/>
              </mets:structLink>
            </mets:mets>"#,
        )
        .unwrap();

        assert_eq!(root.name(), "mets");
        assert_eq!(root.attr("mets"), None);
        let link = root.descend(&["structLink", "smLink"]).unwrap();
        assert_eq!(link.attr("from"), Some("LOG_1"));
        assert_eq!(link.attr("to"), Some("PHYS_1"));
    }

    #[test]
    fn resolves_entities_in_text_and_attributes() {
        let root = parse(
            r#"<mods><title lang="de">M&#252;ller &amp; S&#xF6;hne</title><url href="a?b=1&amp;c=2"/></mods>"#,
        )
        .unwrap();
        assert_eq!(root.child("title").unwrap().text(), "Müller & Söhne");
        assert_eq!(root.child("url").unwrap().attr("href"), Some("a?b=1&c=2"));
    }

    #[test]
    fn blank_attributes_are_absent() {
        let root = parse(r#"<div ID="LOG_1" LABEL="  " TYPE="chapter"/>"#).unwrap();
        assert_eq!(root.non_blank_attr("LABEL"), None);
        assert_eq!(root.non_blank_attr("TYPE"), Some("chapter"));
    }

    #[test]
    fn rejects_unbalanced_document() {
        let err = parse("<mets><dmdSec></mets>").unwrap_err();
        assert_matches!(err, MigrateError::XmlParse(_));
    }
}
