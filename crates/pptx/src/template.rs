//! Built-in starter package: one master, three layouts, one theme and no
//! slides. Used for new decks and whenever a deck has no source package.

use crate::package::{write_parts, CONTENT_TYPES_PART, ROOT_RELS_PART};
use slidemaker_core::types::RawPart;
use slidemaker_core::Result;
use std::sync::Arc;

const PARTS: &[(&str, &str)] = &[
    (CONTENT_TYPES_PART, include_str!("../templates/content_types.xml")),
    (ROOT_RELS_PART, include_str!("../templates/root.rels")),
    ("ppt/presentation.xml", include_str!("../templates/presentation.xml")),
    (
        "ppt/_rels/presentation.xml.rels",
        include_str!("../templates/presentation.xml.rels"),
    ),
    (
        "ppt/slideMasters/slideMaster1.xml",
        include_str!("../templates/slideMaster1.xml"),
    ),
    (
        "ppt/slideMasters/_rels/slideMaster1.xml.rels",
        include_str!("../templates/slideMaster1.xml.rels"),
    ),
    (
        "ppt/slideLayouts/slideLayout1.xml",
        include_str!("../templates/slideLayout1.xml"),
    ),
    (
        "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
        include_str!("../templates/slideLayout.xml.rels"),
    ),
    (
        "ppt/slideLayouts/slideLayout2.xml",
        include_str!("../templates/slideLayout2.xml"),
    ),
    (
        "ppt/slideLayouts/_rels/slideLayout2.xml.rels",
        include_str!("../templates/slideLayout.xml.rels"),
    ),
    (
        "ppt/slideLayouts/slideLayout3.xml",
        include_str!("../templates/slideLayout3.xml"),
    ),
    (
        "ppt/slideLayouts/_rels/slideLayout3.xml.rels",
        include_str!("../templates/slideLayout.xml.rels"),
    ),
    ("ppt/theme/theme1.xml", include_str!("../templates/theme1.xml")),
    ("ppt/presProps.xml", include_str!("../templates/presProps.xml")),
    ("ppt/viewProps.xml", include_str!("../templates/viewProps.xml")),
    ("ppt/tableStyles.xml", include_str!("../templates/tableStyles.xml")),
];

/// Starter parts, in archive order.
pub(crate) fn parts() -> Vec<RawPart> {
    PARTS
        .iter()
        .map(|(name, content)| RawPart {
            name: name.to_string(),
            data: Arc::from(content.as_bytes()),
        })
        .collect()
}

/// The starter package as PPTX bytes.
pub fn package() -> Result<Vec<u8>> {
    write_parts(PARTS.iter().map(|(name, content)| (*name, content.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{parse_relationships, read_parts, ContentTypes};
    use crate::xml;

    #[test]
    fn test_template_parts_are_well_formed() {
        for part in parts() {
            let text = std::str::from_utf8(&part.data).unwrap();
            assert!(xml::parse(text).is_ok(), "{} does not parse", part.name);
        }
    }

    #[test]
    fn test_every_part_has_a_content_type() {
        let all = parts();
        let types = ContentTypes::parse(&all[0].data).unwrap();
        for part in &all {
            assert!(
                types.content_type_for(&part.name).is_some(),
                "{} has no content type",
                part.name
            );
        }
    }

    #[test]
    fn test_package_round_trips_through_zip() {
        let bytes = package().unwrap();
        let read = read_parts(&bytes).unwrap();
        assert_eq!(read.len(), PARTS.len());
        assert_eq!(read[0].name, CONTENT_TYPES_PART);

        let master_rels = read
            .iter()
            .find(|p| p.name == "ppt/slideMasters/_rels/slideMaster1.xml.rels")
            .unwrap();
        let rels = parse_relationships(&master_rels.name, &master_rels.data).unwrap();
        assert_eq!(rels.len(), 4);
    }
}
