use serde::Serialize;

use crate::document::{Authority, DigitalDocument, NodeId, Outcome, Person, field};
use crate::ruleset::Ruleset;
use crate::xml::Element;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub applied: usize,
    pub skipped: usize,
}

impl ExtractReport {
    pub fn merge(&mut self, other: ExtractReport) {
        self.applied += other.applied;
        self.skipped += other.skipped;
    }
}

pub fn person_role(role_term: Option<&str>) -> &'static str {
    match role_term.map(str::trim) {
        Some("aut") => field::AUTHOR,
        Some("egr") => field::ENGRAVER,
        Some("dte") => field::HONOREE,
        Some("edt") => field::EDITOR,
        _ => field::OTHER_PERSON,
    }
}

pub struct MetadataExtractor<'a> {
    ruleset: &'a Ruleset,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(ruleset: &'a Ruleset) -> Self {
        Self { ruleset }
    }

    pub fn extract(
        &self,
        mods: &Element,
        document: &mut DigitalDocument,
        node: NodeId,
    ) -> ExtractReport {
        let mut target = Target {
            document,
            node,
            ruleset: self.ruleset,
            report: ExtractReport::default(),
        };

        for classification in mods.children_named("classification") {
            target.field(Some(classification), field::COLLECTION);
        }

        for title_info in mods.children_named("titleInfo") {
            if title_info.attr("type") == Some("alternative") {
                target.field(title_info.child("title"), field::OTHER_TITLE);
            } else {
                target.field(title_info.child("title"), field::TITLE);
                target.field(title_info.child("subTitle"), field::SUBTITLE);
                target.field(title_info.child("partNumber"), field::PART_NUMBER);
                target.field(title_info.child("partName"), field::PART_NAME);
            }
        }

        for name in mods.children_named("name") {
            if name.attr("type") == Some("personal") {
                target.person(personal_name(name));
            }
        }

        for origin_info in mods.children_named("originInfo") {
            let place = origin_info.descend(&["place", "placeTerm"]);
            if origin_info.attr("eventType") == Some("publication") {
                target.field(place, field::PLACE_OF_PUBLICATION);
                target.field(origin_info.child("publisher"), field::PUBLISHER);
                target.field(origin_info.child("dateIssued"), field::PUBLICATION_YEAR);
            } else {
                target.field(place, field::PLACE_OF_ELECTRONIC_ORIGIN);
                target.field(origin_info.child("dateIssued"), field::DATE_DIGITIZATION);
                target.field(origin_info.child("publisher"), field::ELECTRONIC_PUBLISHER);
                target.field(origin_info.child("edition"), field::ELECTRONIC_EDITION);
            }
        }

        for language in mods.children_named("language") {
            target.field(language.child("languageTerm"), field::LANGUAGE);
        }

        if let Some(description) = mods.child("physicalDescription") {
            target.field(description.child("extent"), field::EXTENT);
            for note in description.children_named("note") {
                target.field(Some(note), field::FORMAT);
            }
        }

        for identifier in mods.children_named("identifier") {
            match identifier.attr("type") {
                Some("gbv") => target.field(Some(identifier), field::CATALOG_ID_SOURCE),
                Some("urn") => target.field(Some(identifier), field::URN),
                // hbz-idn and everything else is not carried over
                _ => {}
            }
        }

        if let Some(location) = mods.child("location") {
            target.field(location.child("physicalLocation"), field::PHYSICAL_LOCATION);
            target.field(location.child("shelfLocator"), field::SHELF_LOCATOR);
        }

        for note in mods.children_named("note") {
            if note.attr("type") == Some("statement of responsibility") {
                target.field(Some(note), field::RESPONSIBILITY);
            }
        }

        for related in mods.children_named("relatedItem") {
            if related.attr("type") == Some("series") {
                target.field(related.descend(&["titleInfo", "title"]), field::SERIES_TITLE);
                target.field(
                    related.descend(&["recordInfo", "recordIdentifier"]),
                    field::SERIES_CATALOG_ID,
                );
                target.field(related.descend(&["part", "detail", "number"]), field::SERIES_ORDER);
            }
        }

        target.report
    }
}

fn personal_name(name: &Element) -> Person {
    let role_term = name
        .child("role")
        .and_then(|role| role.children().first())
        .map(Element::text);

    let mut first_name = None;
    let mut last_name = None;
    for part in name.children_named("namePart") {
        let value = Some(part.text().to_string());
        if part.attr("type") == Some("family") {
            last_name = value;
        } else {
            first_name = value;
        }
    }

    Person {
        role: person_role(role_term).to_string(),
        first_name,
        last_name,
        authority: Authority {
            authority: name.attr("authority").map(str::to_string),
            authority_uri: name.attr("authorityURI").map(str::to_string),
            value_uri: name.attr("valueURI").map(str::to_string),
        },
    }
}

struct Target<'d> {
    document: &'d mut DigitalDocument,
    node: NodeId,
    ruleset: &'d Ruleset,
    report: ExtractReport,
}

impl Target<'_> {
    fn field(&mut self, element: Option<&Element>, field_type: &str) {
        let Some(element) = element else {
            return;
        };
        let outcome =
            self.document
                .add_metadata(self.node, field_type, element.text(), self.ruleset);
        self.record(outcome);
    }

    fn person(&mut self, person: Person) {
        let outcome = self.document.add_person(self.node, person, self.ruleset);
        self.record(outcome);
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Applied => self.report.applied += 1,
            Outcome::Skipped(reason) => {
                tracing::warn!("{reason}");
                self.report.skipped += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    const RULESET: &str = r#"<Preferences>
  <MetadataType type="person"><Name>Author</Name></MetadataType>
  <MetadataType type="person"><Name>Editor</Name></MetadataType>
  <MetadataType type="person"><Name>OtherPerson</Name></MetadataType>
  <DocStrctType>
    <Name>Monograph</Name>
    <metadata num="1m">TitleDocMain</metadata>
    <metadata num="1o">TitleDocSub1</metadata>
    <metadata num="*">OtherTitle</metadata>
    <metadata num="*">singleDigCollection</metadata>
    <metadata num="1o">PlaceOfPublication</metadata>
    <metadata num="1o">PublisherName</metadata>
    <metadata num="1o">PublicationYear</metadata>
    <metadata num="*">DocLanguage</metadata>
    <metadata num="1o">SizeSourcePrint</metadata>
    <metadata num="*">FormatSourcePrint</metadata>
    <metadata num="1o">CatalogIDSource</metadata>
    <metadata num="1o">URN</metadata>
    <metadata num="1o">PhysicalLocation</metadata>
    <metadata num="1o">shelfmarksource</metadata>
    <metadata num="1o">TitleDocMainResponsibility</metadata>
    <metadata num="1o">TitleMainSeries</metadata>
    <metadata num="1o">CatalogIDMainSeries</metadata>
    <metadata num="1o">SeriesOrder</metadata>
    <metadata num="*">Author</metadata>
    <metadata num="*">Editor</metadata>
    <metadata num="*">OtherPerson</metadata>
  </DocStrctType>
</Preferences>"#;

    const MODS: &str = r#"<mods:mods xmlns:mods="http://www.loc.gov/mods/v3">
  <mods:classification authority="ZVDD">Kochbücher</mods:classification>
  <mods:classification>Haushalt</mods:classification>
  <mods:titleInfo><mods:title>Neues Kochbuch</mods:title><mods:subTitle>für Haushaltungen</mods:subTitle></mods:titleInfo>
  <mods:titleInfo type="alternative"><mods:title>Kochbuch</mods:title></mods:titleInfo>
  <mods:name type="personal" authority="gnd" authorityURI="http://d-nb.info/gnd/" valueURI="http://d-nb.info/gnd/118">
    <mods:namePart type="family">Davidis</mods:namePart>
    <mods:namePart type="given">Henriette</mods:namePart>
    <mods:role><mods:roleTerm type="code" authority="marcrelator">aut</mods:roleTerm></mods:role>
  </mods:name>
  <mods:name type="personal">
    <mods:namePart>Anonymus</mods:namePart>
  </mods:name>
  <mods:name type="corporate"><mods:namePart>Verlag</mods:namePart></mods:name>
  <mods:originInfo eventType="publication">
    <mods:place><mods:placeTerm type="text">Bielefeld</mods:placeTerm></mods:place>
    <mods:publisher>Velhagen &amp; Klasing</mods:publisher>
    <mods:dateIssued>1845</mods:dateIssued>
  </mods:originInfo>
  <mods:originInfo eventType="digitization">
    <mods:dateIssued>2012</mods:dateIssued>
  </mods:originInfo>
  <mods:language><mods:languageTerm type="code">ger</mods:languageTerm></mods:language>
  <mods:physicalDescription>
    <mods:extent>XVI, 400 S.</mods:extent>
    <mods:note>8°</mods:note>
  </mods:physicalDescription>
  <mods:identifier type="gbv">12345678X</mods:identifier>
  <mods:identifier type="urn">urn:nbn:de:hbz:6-1</mods:identifier>
  <mods:identifier type="hbz-idn">HT000</mods:identifier>
  <mods:identifier type="doi">10.1/abc</mods:identifier>
  <mods:location>
    <mods:physicalLocation>ULB Münster</mods:physicalLocation>
    <mods:shelfLocator>X 123</mods:shelfLocator>
  </mods:location>
  <mods:note type="statement of responsibility">von Henriette Davidis</mods:note>
  <mods:note>ohne Typ</mods:note>
  <mods:relatedItem type="series">
    <mods:titleInfo><mods:title>Hausbücher</mods:title></mods:titleInfo>
    <mods:recordInfo><mods:recordIdentifier>S1</mods:recordIdentifier></mods:recordInfo>
    <mods:part><mods:detail><mods:number>3</mods:number></mods:detail></mods:part>
  </mods:relatedItem>
  <mods:relatedItem type="host"><mods:titleInfo><mods:title>ignored</mods:title></mods:titleInfo></mods:relatedItem>
</mods:mods>"#;

    #[test]
    fn person_roles() {
        assert_eq!(person_role(Some("aut")), "Author");
        assert_eq!(person_role(Some("edt")), "Editor");
        assert_eq!(person_role(Some("dte")), "Honoree");
        assert_eq!(person_role(Some("egr")), "Engraver");
        assert_eq!(person_role(Some("ill")), "OtherPerson");
        assert_eq!(person_role(None), "OtherPerson");
    }

    #[test]
    fn extracts_full_record() {
        let ruleset = Ruleset::from_xml_str(RULESET).unwrap();
        let mods = xml::parse(MODS).unwrap();
        let mut document = DigitalDocument::new("Monograph");
        let root = document.logical_root();

        let report = MetadataExtractor::new(&ruleset).extract(&mods, &mut document, root);

        let node = document.node(root);
        let value = |name: &str| node.values(name).collect::<Vec<_>>();
        assert_eq!(value(field::COLLECTION), vec!["Kochbücher", "Haushalt"]);
        assert_eq!(value(field::TITLE), vec!["Neues Kochbuch"]);
        assert_eq!(value(field::SUBTITLE), vec!["für Haushaltungen"]);
        assert_eq!(value(field::OTHER_TITLE), vec!["Kochbuch"]);
        assert_eq!(value(field::PUBLISHER), vec!["Velhagen & Klasing"]);
        assert_eq!(value(field::PUBLICATION_YEAR), vec!["1845"]);
        assert_eq!(value(field::CATALOG_ID_SOURCE), vec!["12345678X"]);
        assert_eq!(value(field::URN), vec!["urn:nbn:de:hbz:6-1"]);
        assert_eq!(value(field::SHELF_LOCATOR), vec!["X 123"]);
        assert_eq!(value(field::RESPONSIBILITY), vec!["von Henriette Davidis"]);
        assert_eq!(value(field::SERIES_TITLE), vec!["Hausbücher"]);
        assert_eq!(value(field::SERIES_CATALOG_ID), vec!["S1"]);
        assert_eq!(value(field::SERIES_ORDER), vec!["3"]);
        assert_eq!(value(field::DATE_DIGITIZATION), vec!["2012"]);
        assert_eq!(node.metadata.len(), 20);

        assert_eq!(node.persons.len(), 2);
        let author = &node.persons[0];
        assert_eq!(author.role, "Author");
        assert_eq!(author.last_name.as_deref(), Some("Davidis"));
        assert_eq!(author.first_name.as_deref(), Some("Henriette"));
        assert_eq!(author.authority.authority.as_deref(), Some("gnd"));
        assert_eq!(author.authority.value_uri.as_deref(), Some("http://d-nb.info/gnd/118"));
        let other = &node.persons[1];
        assert_eq!(other.role, "OtherPerson");
        assert_eq!(other.first_name.as_deref(), Some("Anonymus"));
        assert_eq!(other.last_name, None);

        assert_eq!(report.skipped, 0);
        assert_eq!(report.applied, 22);
    }

    #[test]
    fn rejected_fields_do_not_stop_extraction() {
        let ruleset = Ruleset::from_xml_str(
            r#"<Preferences>
  <DocStrctType><Name>Chapter</Name><metadata num="1o">TitleDocMain</metadata></DocStrctType>
</Preferences>"#,
        )
        .unwrap();
        let mods = xml::parse(MODS).unwrap();
        let mut document = DigitalDocument::new("Chapter");
        let root = document.logical_root();

        let report = MetadataExtractor::new(&ruleset).extract(&mods, &mut document, root);

        // the title and the internal digitization date
        assert_eq!(report.applied, 2);
        assert!(report.skipped > 10);
        assert_eq!(document.node(root).metadata.len(), 2);
        assert!(document.node(root).persons.is_empty());
    }
}
