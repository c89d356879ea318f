//! OLE2 compound-file container and the legacy workbook format inside it.

pub mod codepage;
pub mod consts;
pub mod file;
pub mod properties;
pub mod xls;

pub use file::CompoundFile;
pub use properties::{SUMMARY_INFORMATION, parse_summary_information};
