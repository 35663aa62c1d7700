//! Structural edits on existing documents. Everything here is a pure
//! in-memory transformation: no locking, safe to run in parallel across
//! distinct documents, and inputs are never mutated unless the operation says
//! so.

use crate::document::Document;
use crate::error::ManipulationError;
use crate::metrics::{self, FontId};
use crate::page::Command;
use crate::types::{Color, Pt, Size};

/// Concatenate all pages of all inputs, in the given order, into a new
/// document. Inputs are read-only; every output page is a deep copy, so later
/// mutation of the result never touches the inputs. The output page order is
/// exactly the concatenation order, never reordered.
///
/// Metadata is taken from the first input; security settings are not carried
/// over and must be re-applied to the merged document.
pub fn merge(documents: &[&Document]) -> Result<Document, ManipulationError> {
    if documents.is_empty() {
        return Err(ManipulationError::EmptyInput { operation: "merge" });
    }
    let mut out = Document::new();
    out.metadata = documents[0].metadata.clone();
    for doc in documents {
        for page in &doc.pages {
            out.push_page(page.clone());
        }
        for (name, value) in &doc.form_fields {
            out.form_fields
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
    Ok(out)
}

/// Build a new document from the given pages of `doc`. Indices may repeat and
/// reorder; each occurrence is an independent deep copy.
pub fn copy_pages(doc: &Document, indices: &[usize]) -> Result<Document, ManipulationError> {
    let page_count = doc.page_count();
    for &index in indices {
        if index >= page_count {
            return Err(ManipulationError::IndexOutOfRange {
                operation: "copy_pages",
                index,
                page_count,
            });
        }
    }
    let mut out = Document::new();
    out.metadata = doc.metadata.clone();
    for &index in indices {
        out.push_page(doc.pages[index].clone());
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HorizontalAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalAlign {
    Top,
    #[default]
    Middle,
    Bottom,
}

/// Whether the stamp is composited beneath or above existing page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkLayer {
    Below,
    #[default]
    Above,
}

#[derive(Debug, Clone)]
pub struct WatermarkOptions {
    pub text: String,
    pub font_size: Pt,
    /// 0..=100; values outside are clamped.
    pub opacity: u8,
    pub rotation_deg: f32,
    pub horizontal: HorizontalAlign,
    pub vertical: VerticalAlign,
    pub layer: WatermarkLayer,
    pub color: Color,
}

impl WatermarkOptions {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: Pt::from_f32(48.0),
            opacity: 15,
            rotation_deg: 0.0,
            horizontal: HorizontalAlign::default(),
            vertical: VerticalAlign::default(),
            layer: WatermarkLayer::default(),
            color: Color::GRAY,
        }
    }
}

const EDGE_INSET: f32 = 36.0;

/// Stamp the fragment once per page at the same logical position. Mutates the
/// document in place.
pub fn apply_watermark(doc: &mut Document, options: &WatermarkOptions) {
    if options.text.is_empty() {
        return;
    }
    let opacity = options.opacity.min(100) as f32 / 100.0;
    for page in &mut doc.pages {
        let size = page.size();
        let stamp = stamp_commands(options, size, opacity);
        match options.layer {
            WatermarkLayer::Above => page.commands.extend(stamp),
            WatermarkLayer::Below => {
                let mut commands = stamp;
                commands.append(&mut page.commands);
                page.commands = commands;
            }
        }
    }
}

fn stamp_commands(options: &WatermarkOptions, size: Size, opacity: f32) -> Vec<Command> {
    let width = metrics::measure(&options.text, FontId::Helvetica, options.font_size);
    let x = match options.horizontal {
        HorizontalAlign::Left => Pt::from_f32(EDGE_INSET),
        HorizontalAlign::Center => ((size.width - width) * 0.5f32).max(Pt::ZERO),
        HorizontalAlign::Right => (size.width - width - Pt::from_f32(EDGE_INSET)).max(Pt::ZERO),
    };
    let y = match options.vertical {
        VerticalAlign::Top => size.height - Pt::from_f32(EDGE_INSET) - options.font_size,
        VerticalAlign::Middle => size.height * 0.5f32,
        VerticalAlign::Bottom => Pt::from_f32(EDGE_INSET),
    };
    vec![
        Command::SaveState,
        Command::SetOpacity {
            fill: opacity,
            stroke: opacity,
        },
        Command::SetFillColor(options.color),
        Command::SetFontName(FontId::Helvetica.base_name().to_string()),
        Command::SetFontSize(options.font_size),
        Command::Translate(x, y),
        Command::Rotate(options.rotation_deg),
        Command::DrawString {
            x: Pt::ZERO,
            y: Pt::ZERO,
            text: options.text.clone(),
        },
        Command::RestoreState,
    ]
}

/// One string per requested page, in the order requested; `None` means all
/// pages in document order. Text comes back in glyph placement order, which
/// for complex layouts may differ from semantic source order.
pub fn extract_text(
    doc: &Document,
    page_indices: Option<&[usize]>,
) -> Result<Vec<String>, ManipulationError> {
    let page_count = doc.page_count();
    match page_indices {
        None => Ok(doc.pages.iter().map(|page| page.text()).collect()),
        Some(indices) => {
            let mut out = Vec::with_capacity(indices.len());
            for &index in indices {
                let page = doc.pages.get(index).ok_or(ManipulationError::IndexOutOfRange {
                    operation: "extract_text",
                    index,
                    page_count,
                })?;
                out.push(page.text());
            }
            Ok(out)
        }
    }
}

/// The explicit escape hatch from page-geometry immutability.
pub fn set_page_size(
    doc: &mut Document,
    index: usize,
    size: Size,
) -> Result<(), ManipulationError> {
    let page_count = doc.page_count();
    let page = doc
        .pages
        .get_mut(index)
        .ok_or(ManipulationError::IndexOutOfRange {
            operation: "set_page_size",
            index,
            page_count,
        })?;
    page.set_size(size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;
    use crate::types::Rotation;

    fn doc_with_pages(texts: &[&str]) -> Document {
        let mut doc = Document::new();
        for text in texts {
            let mut page = Page::new(Size::a4(), Rotation::None);
            page.push(Command::DrawString {
                x: Pt::from_f32(50.0),
                y: Pt::from_f32(700.0),
                text: text.to_string(),
            });
            doc.push_page(page);
        }
        doc
    }

    #[test]
    fn merge_concatenates_in_order() {
        let a = doc_with_pages(&["a1", "a2"]);
        let b = doc_with_pages(&["b1"]);
        let c = doc_with_pages(&["c1", "c2"]);
        let merged = merge(&[&a, &b, &c]).unwrap();
        let texts = extract_text(&merged, None).unwrap();
        assert_eq!(texts, vec!["a1", "a2", "b1", "c1", "c2"]);
    }

    #[test]
    fn merge_output_is_independent_of_inputs() {
        let a = doc_with_pages(&["a1"]);
        let mut merged = merge(&[&a]).unwrap();
        merged.pages[0].push(Command::DrawString {
            x: Pt::ZERO,
            y: Pt::ZERO,
            text: "extra".to_string(),
        });
        assert_eq!(a.pages[0].commands.len(), 1);
    }

    #[test]
    fn empty_merge_fails() {
        assert_eq!(
            merge(&[]).unwrap_err(),
            ManipulationError::EmptyInput { operation: "merge" }
        );
    }

    #[test]
    fn copy_pages_allows_duplicates_and_reorder() {
        let doc = doc_with_pages(&["p0", "p1", "p2"]);
        let out = copy_pages(&doc, &[2, 0, 2]).unwrap();
        let texts = extract_text(&out, None).unwrap();
        assert_eq!(texts, vec!["p2", "p0", "p2"]);
    }

    #[test]
    fn copy_pages_rejects_out_of_range() {
        let doc = doc_with_pages(&["p0"]);
        let err = copy_pages(&doc, &[1]).unwrap_err();
        assert_eq!(
            err,
            ManipulationError::IndexOutOfRange {
                operation: "copy_pages",
                index: 1,
                page_count: 1,
            }
        );
    }

    #[test]
    fn watermark_stamps_every_page() {
        let mut doc = doc_with_pages(&["one", "two"]);
        apply_watermark(&mut doc, &WatermarkOptions::text("DRAFT"));
        for page in &doc.pages {
            assert!(page.text().contains("DRAFT"));
            assert!(page
                .commands
                .iter()
                .any(|c| matches!(c, Command::SetOpacity { .. })));
        }
    }

    #[test]
    fn watermark_below_goes_beneath_content() {
        let mut doc = doc_with_pages(&["body"]);
        let options = WatermarkOptions {
            layer: WatermarkLayer::Below,
            ..WatermarkOptions::text("UNDER")
        };
        apply_watermark(&mut doc, &options);
        assert_eq!(doc.pages[0].commands[0], Command::SaveState);
        // The original content command comes after the stamp.
        assert!(doc.pages[0]
            .commands
            .iter()
            .position(|c| matches!(c, Command::DrawString { text, .. } if text == "body"))
            .unwrap()
            > doc.pages[0]
                .commands
                .iter()
                .position(|c| matches!(c, Command::DrawString { text, .. } if text == "UNDER"))
                .unwrap());
    }

    #[test]
    fn extract_text_subset() {
        let doc = doc_with_pages(&["p0", "p1", "p2"]);
        assert_eq!(extract_text(&doc, Some(&[1])).unwrap(), vec!["p1"]);
        assert!(extract_text(&doc, Some(&[3])).is_err());
    }

    #[test]
    fn set_page_size_is_the_only_geometry_mutation() {
        let mut doc = doc_with_pages(&["p0"]);
        set_page_size(&mut doc, 0, Size::letter()).unwrap();
        assert_eq!(doc.pages[0].size(), Size::letter());
        assert!(set_page_size(&mut doc, 1, Size::a4()).is_err());
    }
}
