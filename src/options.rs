use crate::types::{Margins, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaperSize {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    /// Explicit dimensions in millimetres.
    Custom {
        width_mm: u32,
        height_mm: u32,
    },
}

impl PaperSize {
    pub fn size(self) -> Size {
        match self {
            PaperSize::A4 => Size::a4(),
            PaperSize::A3 => Size::a3(),
            PaperSize::A5 => Size::a5(),
            PaperSize::Letter => Size::letter(),
            PaperSize::Legal => Size::legal(),
            PaperSize::Custom {
                width_mm,
                height_mm,
            } => Size::from_mm(width_mm as f32, height_mm as f32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CssMediaType {
    #[default]
    Print,
    Screen,
}

/// Margins in millimetres, converted to points at render time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginsMm {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Default for MarginsMm {
    fn default() -> Self {
        Self {
            top: 10.0,
            bottom: 10.0,
            left: 10.0,
            right: 10.0,
        }
    }
}

impl MarginsMm {
    pub fn to_points(self) -> Margins {
        Margins::from_mm(self.top, self.bottom, self.left, self.right)
    }
}

/// Configuration consumed by one render call. Not persisted; every option maps
/// onto one layout-engine parameter and omitted options take engine defaults.
#[derive(Debug, Clone)]
pub struct RenderingOptions {
    pub paper_size: PaperSize,
    pub orientation: Orientation,
    pub margins: MarginsMm,
    /// Header/footer template fragments. Recognized placeholders: `{page}`,
    /// `{total-pages}`, `{date}`, `{time}`, `{url}`, `{html-title}`.
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    pub enable_javascript: bool,
    /// Deterministic extra wait after DOM-ready, for script-driven content.
    /// Not a quiescence detector; callers set a sufficiently large delay.
    pub render_delay_ms: u64,
    /// Upper bound for the whole render, including the delay.
    pub timeout_ms: u64,
    pub css_media_type: CssMediaType,
    pub viewport_width: u32,
    /// Base for resolving relative resource references. Falls back to the
    /// source file's directory for file sources, else references stay
    /// unresolved and degrade.
    pub base_url: Option<String>,
}

impl Default for RenderingOptions {
    fn default() -> Self {
        Self {
            paper_size: PaperSize::default(),
            orientation: Orientation::default(),
            margins: MarginsMm::default(),
            header_template: None,
            footer_template: None,
            enable_javascript: false,
            render_delay_ms: 0,
            timeout_ms: 30_000,
            css_media_type: CssMediaType::default(),
            viewport_width: 1280,
            base_url: None,
        }
    }
}

impl RenderingOptions {
    /// Physical page size after applying orientation.
    pub fn page_size(&self) -> Size {
        let size = self.paper_size.size();
        match self.orientation {
            Orientation::Portrait => size,
            Orientation::Landscape => size.rotated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_swaps_dimensions() {
        let options = RenderingOptions {
            orientation: Orientation::Landscape,
            ..RenderingOptions::default()
        };
        let size = options.page_size();
        assert!(size.width > size.height);
    }

    #[test]
    fn custom_paper_size_in_mm() {
        let paper = PaperSize::Custom {
            width_mm: 100,
            height_mm: 200,
        };
        let size = paper.size();
        assert_eq!(size.width.to_milli_i64(), Size::from_mm(100.0, 200.0).width.to_milli_i64());
    }
}
