//! Page records: one row of the document table.
//!
//! Each page owns a scanned image and the texts produced for it by the
//! transcription pipeline. Text fields default to the empty string so that
//! "not yet produced" is never confused with an absent value.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which text field a page currently presents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    #[default]
    None,
    Original,
    Corrected,
    Formatted,
    Separated,
    Translation,
}

impl TextField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Original => "original",
            Self::Corrected => "corrected",
            Self::Formatted => "formatted",
            Self::Separated => "separated",
            Self::Translation => "translation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "original" | "original_text" => Some(Self::Original),
            "corrected" | "corrected_text" => Some(Self::Corrected),
            "formatted" | "formatted_text" => Some(Self::Formatted),
            "separated" | "separated_text" => Some(Self::Separated),
            "translation" => Some(Self::Translation),
            _ => None,
        }
    }
}

impl std::fmt::Display for TextField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One page of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Stable ordering key, unique within a store.
    pub index: u32,
    /// Display label (e.g. `0008_p008` for imported pages).
    #[serde(default)]
    pub label: String,
    /// Page image, relative to the project root or absolute.
    #[serde(default)]
    pub image_path: PathBuf,
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub corrected: String,
    #[serde(default)]
    pub formatted: String,
    #[serde(default)]
    pub separated: String,
    #[serde(default)]
    pub translation: String,
    /// Field currently presented for this page.
    #[serde(default)]
    pub active_text: TextField,
    /// Relevance classification, if one has been assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<String>,
    /// Extracted metadata headers (Document Type, Author, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl PageRecord {
    /// Create an empty page with the given index and image.
    pub fn new(index: u32, image_path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            label: (index + 1).to_string(),
            image_path: image_path.into(),
            ..Self::default()
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Read a text field. `TextField::None` reads as empty.
    pub fn text(&self, field: TextField) -> &str {
        match field {
            TextField::None => "",
            TextField::Original => &self.original,
            TextField::Corrected => &self.corrected,
            TextField::Formatted => &self.formatted,
            TextField::Separated => &self.separated,
            TextField::Translation => &self.translation,
        }
    }

    /// Write a text field and make it the active one.
    ///
    /// Writing `TextField::None` is ignored.
    pub fn set_text(&mut self, field: TextField, text: impl Into<String>) {
        let text = text.into();
        match field {
            TextField::None => return,
            TextField::Original => self.original = text,
            TextField::Corrected => self.corrected = text,
            TextField::Formatted => self.formatted = text,
            TextField::Separated => self.separated = text,
            TextField::Translation => self.translation = text,
        }
        self.active_text = field;
    }

    /// Text of the currently active field.
    pub fn active(&self) -> &str {
        self.text(self.active_text)
    }

    /// Most refined transcription available: corrected, else original.
    pub fn best_text(&self) -> &str {
        if !self.corrected.trim().is_empty() {
            &self.corrected
        } else {
            &self.original
        }
    }

    /// Whether the page has an image reference at all.
    pub fn has_image(&self) -> bool {
        !self.image_path.as_os_str().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_text_updates_active_field() {
        let mut page = PageRecord::new(0, "images/0001.jpg");
        assert_eq!(page.active_text, TextField::None);
        assert_eq!(page.active(), "");

        page.set_text(TextField::Original, "Dear Sir");
        assert_eq!(page.original, "Dear Sir");
        assert_eq!(page.active_text, TextField::Original);

        page.set_text(TextField::None, "ignored");
        assert_eq!(page.active_text, TextField::Original);
    }

    #[test]
    fn test_best_text_prefers_corrected() {
        let mut page = PageRecord::new(3, "");
        page.original = "Dcar Sir".to_string();
        assert_eq!(page.best_text(), "Dcar Sir");

        page.corrected = "Dear Sir".to_string();
        assert_eq!(page.best_text(), "Dear Sir");

        page.corrected = "   ".to_string();
        assert_eq!(page.best_text(), "Dcar Sir");
        assert!(!page.has_image());
    }

    #[test]
    fn test_text_field_round_trip_names() {
        for field in [
            TextField::None,
            TextField::Original,
            TextField::Corrected,
            TextField::Formatted,
            TextField::Separated,
            TextField::Translation,
        ] {
            assert_eq!(TextField::from_str(field.as_str()), Some(field));
        }
        assert_eq!(TextField::from_str("Corrected_Text"), Some(TextField::Corrected));
        assert_eq!(TextField::from_str("bogus"), None);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let page: PageRecord = serde_json::from_str(r#"{"index": 4}"#).unwrap();
        assert_eq!(page.index, 4);
        assert_eq!(page.original, "");
        assert_eq!(page.active_text, TextField::None);
        assert!(page.metadata.is_none());
    }
}
