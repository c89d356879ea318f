//! sheetskim - bounded text and metadata extraction from Excel spreadsheets.
//!
//! Supports both the legacy OLE compound-file format (.xls, BIFF records)
//! and the modern ZIP/OPC package format (.xlsx, SpreadsheetML). Extraction
//! streams through the file under configurable traversal limits and never
//! fails because a document is large: hitting a cap simply stops the walk
//! and marks the output truncated.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use sheetskim::{ExtractOptions, extract_text};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("report.xlsx")?;
//! let extraction = extract_text(file, &ExtractOptions::default())?;
//! println!("{}", extraction.text);
//! if extraction.truncated {
//!     println!("(output truncated by traversal limits)");
//! }
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod ole;
pub mod ooxml;

use std::io::{Read, Seek, SeekFrom};

use common::detection::{Container, detect};

pub use common::error::{Error, Result, TableKind};
pub use common::limits::ExtractOptions;
pub use common::metadata::DocumentMetadata;
pub use common::sink::Extraction;

use ole::file::CompoundFile;
use ole::properties::{SUMMARY_INFORMATION, parse_summary_information};
use ole::xls::{WORKBOOK_STREAM_NAMES, extract_workbook_stream};
use ooxml::{extract_package_metadata, extract_package_text};

/// Sniff the container by magic bytes, leaving the reader rewound.
fn detect_container<R: Read + Seek>(reader: &mut R) -> Result<Option<Container>> {
    let mut magic = [0u8; 8];
    let mut filled = 0;
    while filled < magic.len() {
        let n = reader.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    reader.seek(SeekFrom::Start(0))?;
    Ok(detect(&magic[..filled]))
}

/// Extract visible cell text and sheet names under the given limits.
///
/// Empty input yields an empty, non-truncated extraction. Input that is
/// neither an OLE compound file nor a ZIP package is a
/// [`Error::ContainerFormat`] fault.
pub fn extract_text<R: Read + Seek>(
    mut reader: R,
    options: &ExtractOptions,
) -> Result<Extraction> {
    match detect_container(&mut reader)? {
        Some(Container::Ole) => {
            let mut file = CompoundFile::open(reader)?;
            for name in WORKBOOK_STREAM_NAMES {
                if let Some(stream) = file.open_stream(name)? {
                    return extract_workbook_stream(&stream, options);
                }
            }
            Err(Error::ContainerFormat(
                "compound file has no workbook stream".to_string(),
            ))
        }
        Some(Container::Zip) => extract_package_text(reader, options),
        None => {
            let end = reader.seek(SeekFrom::End(0))?;
            if end == 0 {
                return Ok(Extraction::empty());
            }
            Err(Error::ContainerFormat(
                "unrecognized container magic".to_string(),
            ))
        }
    }
}

/// Extract document metadata (author, title, timestamps, ...).
///
/// A recognized container without a metadata part yields empty metadata;
/// only a malformed container or a malformed metadata payload is an error.
pub fn extract_metadata<R: Read + Seek>(mut reader: R) -> Result<DocumentMetadata> {
    match detect_container(&mut reader)? {
        Some(Container::Ole) => {
            let mut file = CompoundFile::open(reader)?;
            match file.open_stream(SUMMARY_INFORMATION)? {
                Some(stream) => parse_summary_information(&stream),
                None => Ok(DocumentMetadata::default()),
            }
        }
        Some(Container::Zip) => extract_package_metadata(reader),
        None => {
            let end = reader.seek(SeekFrom::End(0))?;
            if end == 0 {
                return Ok(DocumentMetadata::default());
            }
            Err(Error::ContainerFormat(
                "unrecognized container magic".to_string(),
            ))
        }
    }
}
