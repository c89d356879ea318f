//! Shared strings part (`xl/sharedStrings.xml`).
//!
//! Each `<si>` entry is one shared string; rich-text entries split the text
//! across `<r><t>` runs, which are concatenated back into one string.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::common::error::Result;

/// Parse the shared-strings part into an index-ordered table.
pub fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut buf = Vec::new();

    let mut in_si = false;
    let mut in_text = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_text = true,
                _ => {}
            },
            Event::Text(e) => {
                if in_text {
                    current.push_str(&e.xml_content()?);
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"t" => in_text = false,
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_rich_entries() {
        let xml = r#"<?xml version="1.0"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3">
  <si><t>Alpha</t></si>
  <si><r><t>Be</t></r><r><t>ta</t></r></si>
  <si><t xml:space="preserve"> Gamma </t></si>
</sst>"#;
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["Alpha", "Beta", " Gamma "]);
    }

    #[test]
    fn empty_table() {
        let xml = r#"<sst count="0" uniqueCount="0"/>"#;
        assert!(parse_shared_strings(xml).unwrap().is_empty());
    }
}
