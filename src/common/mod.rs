//! Common types and utilities shared by the legacy and modern readers.

// Submodule declarations
pub mod datevalue;
pub mod detection;
pub mod error;
pub mod limits;
pub mod metadata;
pub mod sink;

// Re-exports for convenience
pub use detection::{Container, detect};
pub use error::{Error, Result, TableKind};
pub use limits::{ExtractOptions, Flow, TraversalState};
pub use metadata::DocumentMetadata;
pub use sink::{Extraction, TextSink, Token};
