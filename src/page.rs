use crate::types::{Color, Pt, Rotation, Size};

/// One drawing instruction in a page content stream. The set is closed: the
/// writer can encode every variant and the reader maps recognized PDF content
/// operators back onto it.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    Translate(Pt, Pt),
    Rotate(f32),
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    // Applies both fill and stroke alpha (ca/CA). Values outside 0..1 are clamped.
    SetOpacity { fill: f32, stroke: f32 },
    SetFontName(String),
    SetFontSize(Pt),
    Rect { x: Pt, y: Pt, width: Pt, height: Pt },
    MoveTo { x: Pt, y: Pt },
    LineTo { x: Pt, y: Pt },
    ClosePath,
    Fill,
    Stroke,
    DrawString { x: Pt, y: Pt, text: String },
}

/// A single page: geometry set at creation, plus the owned content stream.
/// Geometry and rotation never change after construction except through
/// `manipulate::set_page_size`.
#[derive(Debug, Clone)]
pub struct Page {
    size: Size,
    rotation: Rotation,
    pub commands: Vec<Command>,
}

impl Page {
    pub fn new(size: Size, rotation: Rotation) -> Self {
        Self {
            size,
            rotation,
            commands: Vec::new(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub(crate) fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Text in glyph placement order: strings are concatenated in the order
    /// they were drawn, with a newline whenever the baseline moves and a space
    /// between runs on the same baseline. For complex layouts this order may
    /// differ from semantic source order; that is inherent to extraction from
    /// placed glyphs.
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut last_baseline: Option<i64> = None;
        for command in &self.commands {
            let Command::DrawString { y, text, .. } = command else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let baseline = y.to_milli_i64();
            match last_baseline {
                None => {}
                Some(prev) if prev == baseline => out.push(' '),
                Some(_) => out.push('\n'),
            }
            out.push_str(text);
            last_baseline = Some(baseline);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(page: &mut Page, x: f32, y: f32, text: &str) {
        page.push(Command::DrawString {
            x: Pt::from_f32(x),
            y: Pt::from_f32(y),
            text: text.to_string(),
        });
    }

    #[test]
    fn text_joins_runs_and_lines() {
        let mut page = Page::new(Size::a4(), Rotation::None);
        draw(&mut page, 50.0, 780.0, "Hello");
        draw(&mut page, 120.0, 780.0, "world");
        draw(&mut page, 50.0, 760.0, "next line");
        assert_eq!(page.text(), "Hello world\nnext line");
    }

    #[test]
    fn text_ignores_graphics() {
        let mut page = Page::new(Size::letter(), Rotation::None);
        page.push(Command::SetLineWidth(Pt::from_f32(1.0)));
        page.push(Command::Stroke);
        assert_eq!(page.text(), "");
    }
}
