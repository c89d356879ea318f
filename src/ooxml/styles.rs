//! Styles part (`xl/styles.xml`).
//!
//! Cells reference styles by index into `<cellXfs>`; each `<xf>` there names
//! a number format by id. Only the format id matters for extraction, since
//! it decides date versus plain numeric rendering.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::common::datevalue::StyleTable;
use crate::common::error::Result;

/// Parse the styles part into the cell-style table.
pub fn parse_styles(xml: &str) -> Result<StyleTable> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut in_cell_xfs = false;
    let mut format_ids = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let mut format_id = 0u16;
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"numFmtId" {
                            format_id = attr
                                .unescape_value()?
                                .parse()
                                .unwrap_or(0);
                        }
                    }
                    format_ids.push(format_id);
                }
                _ => {}
            },
            Event::End(ref e) => {
                if e.name().as_ref() == b"cellXfs" {
                    in_cell_xfs = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(StyleTable::new(format_ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_xfs_only() {
        let xml = r#"<?xml version="1.0"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <cellStyleXfs count="1"><xf numFmtId="44"/></cellStyleXfs>
  <cellXfs count="3">
    <xf numFmtId="0" fontId="0"/>
    <xf numFmtId="14" applyNumberFormat="1"/>
    <xf fontId="1"/>
  </cellXfs>
</styleSheet>"#;
        let table = parse_styles(xml).unwrap();
        assert_eq!(table.len(), 3);
        assert!(!table.is_date(0).unwrap());
        assert!(table.is_date(1).unwrap());
        assert!(!table.is_date(2).unwrap());
    }

    #[test]
    fn absent_cell_xfs_is_empty() {
        let table = parse_styles(r#"<styleSheet/>"#).unwrap();
        assert!(table.is_empty());
    }
}
