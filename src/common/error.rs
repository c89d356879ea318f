//! Unified error type for both container formats.
//!
//! Reaching an extraction bound is deliberately *not* represented here: a
//! bounded stop is a normal, possibly-truncated completion signalled through
//! [`crate::common::limits::Flow`], never through an error.

use thiserror::Error;

/// Which lookup table a bad index referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    SharedString,
    Style,
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::SharedString => f.write_str("shared-string"),
            TableKind::Style => f.write_str("style"),
        }
    }
}

/// Main error type for extraction operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Read failure on the underlying byte source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container is unreadable or structurally corrupt.
    #[error("invalid container: {0}")]
    ContainerFormat(String),

    /// A cell referenced a shared-string or style index outside the loaded
    /// table. Indicates a non-conformant document; never silently defaulted.
    #[error("unresolved {kind} index {index} (table holds {len} entries)")]
    Resolution {
        kind: TableKind,
        index: usize,
        len: usize,
    },

    /// A core-property timestamp could not be parsed.
    #[error("unparseable {field} timestamp: {value:?}")]
    MetadataFormat { field: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::ContainerFormat(other.to_string()),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::ContainerFormat(format!("XML error: {err}"))
    }
}

impl From<quick_xml::encoding::EncodingError> for Error {
    fn from(err: quick_xml::encoding::EncodingError) -> Self {
        Error::ContainerFormat(format!("XML text decoding error: {err}"))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::ContainerFormat(format!("XML attribute error: {err}"))
    }
}
