//! Advance-width metrics for the base-14 Helvetica family.
//!
//! The built-in flow engine and the writer only emit these fonts, so the
//! tables cover the printable ASCII range; anything outside it is measured as
//! a question mark. Widths are in 1/1000 em, straight from the Adobe AFM
//! files.

use crate::types::Pt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontId {
    #[default]
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
}

impl FontId {
    pub fn base_name(self) -> &'static str {
        match self {
            FontId::Helvetica => "Helvetica",
            FontId::HelveticaBold => "Helvetica-Bold",
            FontId::HelveticaOblique => "Helvetica-Oblique",
            FontId::HelveticaBoldOblique => "Helvetica-BoldOblique",
        }
    }

    pub fn from_name(raw: &str) -> FontId {
        match raw {
            "Helvetica-Bold" => FontId::HelveticaBold,
            "Helvetica-Oblique" => FontId::HelveticaOblique,
            "Helvetica-BoldOblique" => FontId::HelveticaBoldOblique,
            _ => FontId::Helvetica,
        }
    }

    pub fn with_bold(self, bold: bool) -> FontId {
        match (self, bold) {
            (FontId::Helvetica | FontId::HelveticaBold, false) => FontId::Helvetica,
            (FontId::Helvetica | FontId::HelveticaBold, true) => FontId::HelveticaBold,
            (_, false) => FontId::HelveticaOblique,
            (_, true) => FontId::HelveticaBoldOblique,
        }
    }

    pub fn with_italic(self, italic: bool) -> FontId {
        match (self, italic) {
            (FontId::Helvetica | FontId::HelveticaOblique, false) => FontId::Helvetica,
            (FontId::Helvetica | FontId::HelveticaOblique, true) => FontId::HelveticaOblique,
            (_, false) => FontId::HelveticaBold,
            (_, true) => FontId::HelveticaBoldOblique,
        }
    }
}

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

fn char_width_milli_em(ch: char, font: FontId) -> u32 {
    let table = match font {
        FontId::Helvetica | FontId::HelveticaOblique => &HELVETICA_WIDTHS,
        FontId::HelveticaBold | FontId::HelveticaBoldOblique => &HELVETICA_BOLD_WIDTHS,
    };
    let code = ch as u32;
    if (0x20..0x7F).contains(&code) {
        table[(code - 0x20) as usize] as u32
    } else {
        table[('?' as u32 - 0x20) as usize] as u32
    }
}

/// Advance width of `text` set in `font` at `size`.
pub fn measure(text: &str, font: FontId, size: Pt) -> Pt {
    let milli_em: u64 = text
        .chars()
        .map(|ch| char_width_milli_em(ch, font) as u64)
        .sum();
    // width = size * milli_em / 1000, carried out in milli-points.
    Pt::from_milli_i64(((size.to_milli_i64() as i128 * milli_em as i128) / 1000) as i64)
}

/// Baseline-to-baseline distance the flow engine uses for a given font size.
pub fn line_height(size: Pt) -> Pt {
    size * 1.2f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_widths() {
        // "Hi" in Helvetica 10pt: (722 + 222) / 1000 * 10 = 9.44pt.
        let w = measure("Hi", FontId::Helvetica, Pt::from_f32(10.0));
        assert_eq!(w.to_milli_i64(), 9440);
    }

    #[test]
    fn bold_is_wider() {
        let size = Pt::from_f32(12.0);
        let regular = measure("layout", FontId::Helvetica, size);
        let bold = measure("layout", FontId::HelveticaBold, size);
        assert!(bold > regular);
    }

    #[test]
    fn non_ascii_measures_as_replacement() {
        let size = Pt::from_f32(10.0);
        assert_eq!(
            measure("\u{00e9}", FontId::Helvetica, size),
            measure("?", FontId::Helvetica, size)
        );
    }
}
