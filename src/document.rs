use crate::page::Page;
use crate::security::SecuritySettings;
use std::collections::BTreeMap;
use std::fmt;

/// Free-form document information strings, written to the PDF Info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
    pub creator: String,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.author.is_empty()
            && self.subject.is_empty()
            && self.keywords.is_empty()
            && self.creator.is_empty()
    }
}

/// Non-fatal findings recorded while rendering. These ride on the produced
/// document for the caller to inspect; they are never serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderWarning {
    /// A `page-break-inside: avoid` block was taller than one page and had to
    /// be split anyway.
    ForcedSplit { page: usize },
    /// JavaScript was requested but the engine does not execute scripts.
    ScriptsIgnored { count: usize },
    /// A sub-resource could not be loaded; the render degraded and continued.
    SubResource { url: String, cause: String },
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderWarning::ForcedSplit { page } => write!(
                f,
                "break-inside: avoid block exceeded one page; force-split on page {}",
                page + 1
            ),
            RenderWarning::ScriptsIgnored { count } => {
                write!(f, "{} script element(s) present; scripts are not executed", count)
            }
            RenderWarning::SubResource { url, cause } => {
                write!(f, "sub-resource {} skipped: {}", url, cause)
            }
        }
    }
}

/// The unit every operation acts on: an ordered page list plus metadata,
/// security settings and form-field state.
///
/// A document exclusively owns its pages. Moving a page into another document
/// is always a deep copy, so mutating either side afterwards never affects the
/// other. Page indices are stable within one in-memory session but not across
/// operations that add or remove pages; callers re-resolve indices after
/// mutation.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
    pub metadata: Metadata,
    pub security: Option<SecuritySettings>,
    pub form_fields: BTreeMap<String, String>,
    /// Transient render findings; not part of the serialized document.
    pub warnings: Vec<RenderWarning>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn push_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn set_form_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.form_fields.insert(name.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Command;
    use crate::types::{Pt, Rotation, Size};

    #[test]
    fn pages_are_exclusively_owned() {
        let mut page = Page::new(Size::a4(), Rotation::None);
        page.push(Command::DrawString {
            x: Pt::ZERO,
            y: Pt::ZERO,
            text: "one".to_string(),
        });
        let mut original = Document::new();
        original.push_page(page);

        let mut copy = original.clone();
        copy.pages[0].push(Command::DrawString {
            x: Pt::ZERO,
            y: Pt::ZERO,
            text: "two".to_string(),
        });

        assert_eq!(original.pages[0].commands.len(), 1);
        assert_eq!(copy.pages[0].commands.len(), 2);
    }

    #[test]
    fn form_fields_are_unique_by_name() {
        let mut doc = Document::new();
        doc.set_form_field("email", "a@example.com");
        doc.set_form_field("email", "b@example.com");
        assert_eq!(doc.form_fields.len(), 1);
        assert_eq!(doc.form_fields["email"], "b@example.com");
    }
}
