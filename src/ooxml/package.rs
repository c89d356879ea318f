//! ZIP/OPC package access and the per-sheet drive loop.
//!
//! The workbook part lists sheets in document order; each sheet's part path
//! comes from the workbook relationships. Shared strings and styles are
//! loaded eagerly because cells reference them by bare index.

use std::collections::HashMap;
use std::io::{BufReader, Read, Seek};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use super::metadata::parse_core_properties;
use super::shared_strings::parse_shared_strings;
use super::sheet::{SheetContext, parse_worksheet};
use super::styles::parse_styles;
use crate::common::datevalue::StyleTable;
use crate::common::error::{Error, Result};
use crate::common::limits::{ExtractOptions, Flow, TraversalState};
use crate::common::metadata::DocumentMetadata;
use crate::common::sink::{Extraction, TextSink};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const STYLES_PART: &str = "xl/styles.xml";
const CORE_PROPERTIES_PART: &str = "docProps/core.xml";

/// One entry of the workbook's sheet list.
#[derive(Debug, Clone)]
pub struct SheetRef {
    pub name: String,
    pub rel_id: String,
}

/// Parsed workbook part.
#[derive(Debug)]
pub struct Workbook {
    pub sheets: Vec<SheetRef>,
    pub date_1904: bool,
}

/// Open package over a seekable reader.
pub struct XlsxPackage<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> XlsxPackage<R> {
    pub fn open(reader: R) -> Result<Self> {
        Ok(Self {
            archive: ZipArchive::new(reader)?,
        })
    }

    /// Read a part to a string; a missing part is `None`, not an error.
    fn read_part(&mut self, path: &str) -> Result<Option<String>> {
        match self.archive.by_name(path) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)?;
                Ok(Some(content))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse the workbook part. Its absence means the archive is not a
    /// spreadsheet package at all.
    pub fn workbook(&mut self) -> Result<Workbook> {
        let xml = self.read_part(WORKBOOK_PART)?.ok_or_else(|| {
            Error::ContainerFormat("package has no workbook part".to_string())
        })?;

        let mut reader = Reader::from_str(&xml);
        let mut buf = Vec::new();
        let mut sheets = Vec::new();
        let mut date_1904 = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                    b"sheet" => {
                        let mut name = String::new();
                        let mut rel_id = String::new();
                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"name" => name = attr.unescape_value()?.into_owned(),
                                b"r:id" => rel_id = attr.unescape_value()?.into_owned(),
                                _ => {}
                            }
                        }
                        sheets.push(SheetRef { name, rel_id });
                    }
                    b"workbookPr" => {
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key.as_ref() == b"date1904" {
                                let value = attr.unescape_value()?;
                                date_1904 = value == "1" || value == "true";
                            }
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Workbook { sheets, date_1904 })
    }

    /// Map relationship ids to part paths inside the archive.
    pub fn workbook_relationships(&mut self) -> Result<HashMap<String, String>> {
        let Some(xml) = self.read_part(WORKBOOK_RELS_PART)? else {
            return Ok(HashMap::new());
        };

        let mut reader = Reader::from_str(&xml);
        let mut buf = Vec::new();
        let mut rels = HashMap::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    if e.name().as_ref() == b"Relationship" {
                        let mut id = String::new();
                        let mut target = String::new();
                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"Id" => id = attr.unescape_value()?.into_owned(),
                                b"Target" => target = attr.unescape_value()?.into_owned(),
                                _ => {}
                            }
                        }
                        if !id.is_empty() {
                            rels.insert(id, resolve_target(&target));
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }
}

/// Relationship targets are relative to `xl/` unless package-absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }
}

/// Bounded text extraction over a modern package.
pub fn extract_package_text<R: Read + Seek>(
    reader: R,
    options: &ExtractOptions,
) -> Result<Extraction> {
    let mut package = XlsxPackage::open(reader)?;
    let workbook = package.workbook()?;
    let rels = package.workbook_relationships()?;

    let shared_strings = match package.read_part(SHARED_STRINGS_PART)? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let styles = match package.read_part(STYLES_PART)? {
        Some(xml) => parse_styles(&xml)?,
        None => StyleTable::default(),
    };
    let context = SheetContext {
        shared_strings: &shared_strings,
        styles: &styles,
        date_1904: workbook.date_1904,
    };

    let mut sink = TextSink::new(options);
    let mut state = TraversalState::new();

    for sheet in &workbook.sheets {
        if options.admit_sheet(&state) != Flow::Continue {
            debug!(
                sheets = state.sheets_visited,
                "sheet budget reached, stopping document"
            );
            sink.mark_truncated();
            break;
        }
        state.enter_sheet();
        sink.push_sheet_name(&sheet.name);

        let path = rels.get(&sheet.rel_id).ok_or_else(|| {
            Error::ContainerFormat(format!(
                "sheet {:?} has no relationship {:?}",
                sheet.name, sheet.rel_id
            ))
        })?;
        let part = package.archive.by_name(path).map_err(|_| {
            Error::ContainerFormat(format!("missing worksheet part {path:?}"))
        })?;
        let mut reader = Reader::from_reader(BufReader::new(part));

        match parse_worksheet(&mut reader, &context, options, &mut state, &mut sink)? {
            Flow::Continue | Flow::StopSheet => {}
            Flow::StopDocument => break,
        }
    }

    debug!(
        sheets = state.sheets_visited,
        cells = state.cells_total,
        "package extraction complete"
    );
    Ok(sink.finish())
}

/// Core-properties metadata from a modern package. A package without the
/// part yields empty metadata.
pub fn extract_package_metadata<R: Read + Seek>(reader: R) -> Result<DocumentMetadata> {
    let mut package = XlsxPackage::open(reader)?;
    match package.read_part(CORE_PROPERTIES_PART)? {
        Some(xml) => parse_core_properties(&xml),
        None => Ok(DocumentMetadata::default()),
    }
}
