//! Modern ZIP/OPC spreadsheet packages.

pub mod metadata;
pub mod package;
pub mod shared_strings;
pub mod sheet;
pub mod styles;

pub use package::{XlsxPackage, extract_package_metadata, extract_package_text};
