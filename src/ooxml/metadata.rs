//! Core properties part (`docProps/core.xml`).

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::NsReader;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};

use crate::common::error::{Error, Result};
use crate::common::metadata::DocumentMetadata;

const NS_DC: &[u8] = b"http://purl.org/dc/elements/1.1/";
const NS_DCTERMS: &[u8] = b"http://purl.org/dc/terms/";
const NS_CP: &[u8] =
    b"http://schemas.openxmlformats.org/package/2006/metadata/core-properties";

/// Map a resolved element to the metadata field it carries. Elements bound
/// to a foreign namespace are ignored; sloppy producers that never declare
/// their prefixes fall back to local-name matching.
fn field_for(ns: &ResolveResult<'_>, local: &[u8]) -> Option<&'static str> {
    match ns {
        ResolveResult::Bound(Namespace(bound)) => match (*bound, local) {
            (NS_DC, b"creator") => Some("creator"),
            (NS_DC, b"title") => Some("title"),
            (NS_DC, b"subject") => Some("subject"),
            (NS_DC, b"description") => Some("description"),
            (NS_CP, b"lastModifiedBy") => Some("contributor"),
            (NS_DCTERMS, b"created") => Some("created"),
            (NS_DCTERMS, b"modified") => Some("modified"),
            _ => None,
        },
        ResolveResult::Unbound | ResolveResult::Unknown(_) => match local {
            b"creator" => Some("creator"),
            b"title" => Some("title"),
            b"subject" => Some("subject"),
            b"description" => Some("description"),
            b"lastModifiedBy" => Some("contributor"),
            b"created" => Some("created"),
            b"modified" => Some("modified"),
            _ => None,
        },
    }
}

/// Parse the Dublin-Core style core-properties XML into document metadata.
/// Blank elements are omitted; an unparseable timestamp is an error naming
/// the field.
pub fn parse_core_properties(xml: &str) -> Result<DocumentMetadata> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut meta = DocumentMetadata::default();
    let mut buf = Vec::new();
    let mut current: Option<&'static str> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let (ns, local) = reader.resolve_element(e.name());
                current = field_for(&ns, local.as_ref());
                text.clear();
            }
            Event::Text(e) => {
                if current.is_some() {
                    text.push_str(&e.xml_content()?);
                }
            }
            Event::End(_) => {
                if let Some(field) = current.take() {
                    apply_field(&mut meta, field, text.trim())?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(meta)
}

fn apply_field(meta: &mut DocumentMetadata, field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    match field {
        "creator" => DocumentMetadata::set_text(&mut meta.creator, value.to_string()),
        "title" => DocumentMetadata::set_text(&mut meta.title, value.to_string()),
        "subject" => DocumentMetadata::set_text(&mut meta.subject, value.to_string()),
        "description" => DocumentMetadata::set_text(&mut meta.description, value.to_string()),
        "contributor" => DocumentMetadata::set_text(&mut meta.contributor, value.to_string()),
        "created" => meta.created = Some(parse_timestamp(value, "created")?),
        "modified" => meta.modified = Some(parse_timestamp(value, "modified")?),
        _ => {}
    }
    Ok(())
}

/// W3CDTF timestamps, with or without an explicit zone.
fn parse_timestamp(s: &str, field: &'static str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    Err(Error::MetadataFormat {
        field,
        value: s.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CORE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"
                   xmlns:dc="http://purl.org/dc/elements/1.1/"
                   xmlns:dcterms="http://purl.org/dc/terms/"
                   xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
    <dc:title>Report</dc:title>
    <dc:creator>Jane</dc:creator>
    <dc:subject>Quarterly numbers</dc:subject>
    <dc:description>Draft</dc:description>
    <cp:lastModifiedBy>Joe</cp:lastModifiedBy>
    <dcterms:created xsi:type="dcterms:W3CDTF">2023-10-10T14:30:00Z</dcterms:created>
    <dcterms:modified xsi:type="dcterms:W3CDTF">2023-10-11T09:00:00Z</dcterms:modified>
</cp:coreProperties>"#;

    #[test]
    fn parses_the_fixed_field_set() {
        let meta = parse_core_properties(CORE_XML).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Report"));
        assert_eq!(meta.creator.as_deref(), Some("Jane"));
        assert_eq!(meta.subject.as_deref(), Some("Quarterly numbers"));
        assert_eq!(meta.description.as_deref(), Some("Draft"));
        assert_eq!(meta.contributor.as_deref(), Some("Joe"));
        assert_eq!(
            meta.created,
            Some(Utc.with_ymd_and_hms(2023, 10, 10, 14, 30, 0).unwrap())
        );
        assert!(meta.modified.is_some());
    }

    #[test]
    fn nonstandard_prefixes_resolve_by_namespace() {
        let xml = r#"<a:coreProperties
            xmlns:a="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"
            xmlns:b="http://purl.org/dc/elements/1.1/"
            xmlns:x="urn:unrelated">
            <b:creator>Jane</b:creator>
            <a:lastModifiedBy>Joe</a:lastModifiedBy>
            <x:title>Not ours</x:title>
        </a:coreProperties>"#;
        let meta = parse_core_properties(xml).unwrap();
        assert_eq!(meta.creator.as_deref(), Some("Jane"));
        assert_eq!(meta.contributor.as_deref(), Some("Joe"));
        // Bound to a foreign namespace, so not a title.
        assert!(meta.title.is_none());
    }

    #[test]
    fn blank_elements_are_omitted() {
        let xml = r#"<cp:coreProperties><dc:title>  </dc:title></cp:coreProperties>"#;
        let meta = parse_core_properties(xml).unwrap();
        assert!(meta.title.is_none());
        assert!(!meta.has_data());
    }

    #[test]
    fn bad_timestamp_names_the_field() {
        let xml =
            r#"<cp:coreProperties><dcterms:created>soon</dcterms:created></cp:coreProperties>"#;
        let err = parse_core_properties(xml).unwrap_err();
        assert!(matches!(
            err,
            Error::MetadataFormat {
                field: "created",
                ..
            }
        ));
    }

    #[test]
    fn naive_timestamps_assume_utc() {
        let xml = r#"<cp:coreProperties><dcterms:modified>2023-01-02T03:04:05</dcterms:modified></cp:coreProperties>"#;
        let meta = parse_core_properties(xml).unwrap();
        assert_eq!(
            meta.modified,
            Some(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap())
        );
    }
}
