//! Unified document metadata.
//!
//! Both container formats surface the same fixed Dublin-Core-like field set;
//! the legacy property-set reader and the core-properties XML reader each
//! fill in what their container carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard document properties shared by both container formats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Document author.
    pub creator: Option<String>,
    /// Document title.
    pub title: Option<String>,
    /// Document subject.
    pub subject: Option<String>,
    /// Comments/description.
    pub description: Option<String>,
    /// Last person to modify the document.
    pub contributor: Option<String>,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
}

impl DocumentMetadata {
    /// Store a string field, treating empty strings as absent.
    pub(crate) fn set_text(slot: &mut Option<String>, value: String) {
        if !value.is_empty() {
            *slot = Some(value);
        }
    }

    /// Returns true if at least one field is populated.
    pub fn has_data(&self) -> bool {
        self.creator.is_some()
            || self.title.is_some()
            || self.subject.is_some()
            || self.description.is_some()
            || self.contributor.is_some()
            || self.created.is_some()
            || self.modified.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_data_reflects_population() {
        let empty = DocumentMetadata::default();
        assert!(!empty.has_data());

        let with_title = DocumentMetadata {
            title: Some("Report".to_string()),
            ..Default::default()
        };
        assert!(with_title.has_data());
    }

    #[test]
    fn empty_strings_are_absent() {
        let mut meta = DocumentMetadata::default();
        DocumentMetadata::set_text(&mut meta.creator, String::new());
        assert!(meta.creator.is_none());
        DocumentMetadata::set_text(&mut meta.creator, "Jane".to_string());
        assert_eq!(meta.creator.as_deref(), Some("Jane"));
    }
}
