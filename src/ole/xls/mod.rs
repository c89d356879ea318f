//! Legacy binary workbook parsing: the BIFF record stream and the bounded
//! extraction pass over it.

pub mod extractor;
pub mod records;

pub use extractor::{WORKBOOK_STREAM_NAMES, extract_workbook_stream};
pub use records::{RecordIter, SharedStringTable};
