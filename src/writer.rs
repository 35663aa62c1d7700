//! Serialization of a [`Document`] into PDF 1.7 bytes: classic cross-reference
//! table, flate-compressed content streams, base-14 Helvetica resources, an
//! optional Info dictionary, AcroForm text fields, and RC4-128 encryption via
//! the standard security handler when security settings carry a password.

use crate::crypt::StandardSecurity;
use crate::document::Document;
use crate::error::CodecError;
use crate::page::Command;
use crate::types::{Color, Pt};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;

const PDF_CATALOG_ID: u32 = 1;
const PDF_PAGES_ID: u32 = 2;
const PDF_RESOURCES_ID: u32 = 3;

/// Serialize the document. Fails with [`CodecError::EmptyDocument`] when there
/// are no pages; everything else is infallible in-memory work apart from
/// compression I/O.
pub fn write_document(doc: &Document) -> Result<Vec<u8>, CodecError> {
    if doc.pages.is_empty() {
        return Err(CodecError::EmptyDocument);
    }

    let fonts = collect_fonts(doc);
    let gstates = collect_gstates(doc);

    // Content streams are serialized up front so the file identifier can be
    // derived from actual content, keeping output stable across runs.
    let contents: Vec<Vec<u8>> = doc
        .pages
        .iter()
        .map(|page| serialize_commands(&page.commands, &fonts, &gstates))
        .collect();
    let doc_id = file_identifier(doc, &contents);

    let security = doc.security.as_ref().map(|settings| {
        StandardSecurity::for_write(
            settings.owner_password.as_deref(),
            settings.user_password.as_deref(),
            settings.permissions.to_p(),
            doc_id.clone(),
        )
    });

    // Fixed id layout: catalog, pages, resources, fonts, graphics states,
    // then a page/content pair per page, field annotations, Info, Encrypt.
    let mut next_id = PDF_RESOURCES_ID + 1;
    let mut alloc = |count: u32| {
        let start = next_id;
        next_id += count;
        start
    };
    let font_base = alloc(fonts.len() as u32);
    let gs_base = alloc(gstates.len() as u32);
    let page_base = alloc(doc.pages.len() as u32 * 2);
    let field_base = alloc(doc.form_fields.len() as u32);
    let info_id = (!doc.metadata.is_empty()).then(|| alloc(1));
    let encrypt_id = security.is_some().then(|| alloc(1));
    let total_objects = next_id - 1;

    let mut builder = Builder::new(total_objects, security);

    let field_ids: Vec<u32> = (0..doc.form_fields.len() as u32)
        .map(|i| field_base + i)
        .collect();
    let mut catalog = format!("<< /Type /Catalog /Pages {} 0 R", PDF_PAGES_ID);
    if !field_ids.is_empty() {
        catalog.push_str(" /AcroForm << /Fields [");
        for id in &field_ids {
            catalog.push_str(&format!(" {} 0 R", id));
        }
        catalog.push_str(" ] /DA ");
        catalog.push_str(&builder.string(PDF_CATALOG_ID, b"/F1 10 Tf 0 g"));
        catalog.push_str(&format!(
            " /DR << /Font << /F1 {} 0 R >> >> /NeedAppearances true >>",
            font_base
        ));
    }
    catalog.push_str(" >>");
    builder.object(PDF_CATALOG_ID, catalog.as_bytes());

    let mut kids = String::new();
    for index in 0..doc.pages.len() as u32 {
        kids.push_str(&format!(" {} 0 R", page_base + index * 2));
    }
    builder.object(
        PDF_PAGES_ID,
        format!(
            "<< /Type /Pages /Count {} /Kids [{} ] >>",
            doc.pages.len(),
            kids
        )
        .as_bytes(),
    );

    let mut resources = String::from("<< /Font <<");
    for (index, font) in fonts.iter().enumerate() {
        resources.push_str(&format!(" /F{} {} 0 R", index + 1, font_base + index as u32));
    }
    resources.push_str(" >>");
    if !gstates.is_empty() {
        resources.push_str(" /ExtGState <<");
        for index in 0..gstates.len() {
            resources.push_str(&format!(" /GS{} {} 0 R", index + 1, gs_base + index as u32));
        }
        resources.push_str(" >>");
    }
    resources.push_str(" >>");
    builder.object(PDF_RESOURCES_ID, resources.as_bytes());

    for (index, font) in fonts.iter().enumerate() {
        builder.object(
            font_base + index as u32,
            format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                font
            )
            .as_bytes(),
        );
    }

    for (index, (fill, stroke)) in gstates.iter().enumerate() {
        builder.object(
            gs_base + index as u32,
            format!(
                "<< /Type /ExtGState /ca {} /CA {} >>",
                fmt_milli(*fill),
                fmt_milli(*stroke)
            )
            .as_bytes(),
        );
    }

    for (index, page) in doc.pages.iter().enumerate() {
        let page_id = page_base + index as u32 * 2;
        let content_id = page_id + 1;
        let size = page.size();
        let mut dict = format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Contents {} 0 R /Resources {} 0 R",
            PDF_PAGES_ID,
            fmt_pt(size.width),
            fmt_pt(size.height),
            content_id,
            PDF_RESOURCES_ID,
        );
        if page.rotation().degrees() != 0 {
            dict.push_str(&format!(" /Rotate {}", page.rotation().degrees()));
        }
        if index == 0 && !field_ids.is_empty() {
            dict.push_str(" /Annots [");
            for id in &field_ids {
                dict.push_str(&format!(" {} 0 R", id));
            }
            dict.push_str(" ]");
        }
        dict.push_str(" >>");
        builder.object(page_id, dict.as_bytes());
        builder.stream_object(content_id, &contents[index])?;
    }

    let first_page_height = doc.pages[0].size().height;
    for (slot, (name, value)) in doc.form_fields.iter().enumerate() {
        let id = field_base + slot as u32;
        let top = first_page_height - Pt::from_f32(50.0 + 20.0 * slot as f32);
        let body = format!(
            "<< /Type /Annot /Subtype /Widget /FT /Tx /T {} /V {} /F 4 /P {} 0 R \
             /Rect [36 {} 216 {}] /DA {} >>",
            builder.string(id, &winansi_bytes(name)),
            builder.string(id, &winansi_bytes(value)),
            page_base,
            fmt_pt(top - Pt::from_f32(16.0)),
            fmt_pt(top),
            builder.string(id, b"/F1 10 Tf 0 g"),
        );
        builder.object(id, body.as_bytes());
    }

    if let Some(info_id) = info_id {
        let mut info = String::from("<<");
        for (key, value) in [
            ("Title", &doc.metadata.title),
            ("Author", &doc.metadata.author),
            ("Subject", &doc.metadata.subject),
            ("Keywords", &doc.metadata.keywords),
            ("Creator", &doc.metadata.creator),
        ] {
            if !value.is_empty() {
                info.push_str(&format!(
                    " /{} {}",
                    key,
                    builder.string(info_id, &winansi_bytes(value))
                ));
            }
        }
        info.push_str(" >>");
        builder.object(info_id, info.as_bytes());
    }

    if let (Some(encrypt_id), Some(security)) = (encrypt_id, builder.security.as_ref()) {
        // The encryption dictionary itself is never encrypted.
        let body = format!(
            "<< /Filter /Standard /V 2 /R 3 /Length 128 /P {} /O <{}> /U <{}> >>",
            security.p,
            hex(&security.o),
            hex(&security.u),
        );
        builder.object(encrypt_id, body.as_bytes());
    }

    Ok(builder.finish(total_objects, info_id, encrypt_id, &doc_id))
}

struct Builder {
    out: Vec<u8>,
    offsets: Vec<usize>,
    security: Option<StandardSecurity>,
}

impl Builder {
    fn new(total_objects: u32, security: Option<StandardSecurity>) -> Self {
        Self {
            out: b"%PDF-1.7\n".to_vec(),
            offsets: vec![0; total_objects as usize + 1],
            security,
        }
    }

    fn object(&mut self, id: u32, body: &[u8]) {
        self.offsets[id as usize] = self.out.len();
        self.out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        self.out.extend_from_slice(body);
        self.out.extend_from_slice(b"\nendobj\n");
    }

    /// Compress, then encrypt if the file is encrypted, then emit.
    fn stream_object(&mut self, id: u32, data: &[u8]) -> Result<(), CodecError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let mut payload = encoder.finish()?;
        if let Some(security) = &self.security {
            payload = security.process_object(id, 0, &payload);
        }
        self.offsets[id as usize] = self.out.len();
        self.out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        self.out.extend_from_slice(
            format!("<< /Length {} /Filter /FlateDecode >>\nstream\n", payload.len()).as_bytes(),
        );
        self.out.extend_from_slice(&payload);
        self.out.extend_from_slice(b"\nendstream\nendobj\n");
        Ok(())
    }

    /// Render a string operand for the object `id`. Encrypted strings are
    /// written in hex form so cipher bytes need no escaping.
    fn string(&self, id: u32, raw: &[u8]) -> String {
        match &self.security {
            Some(security) => format!("<{}>", hex(&security.process_object(id, 0, raw))),
            None => {
                let mut out = String::from("(");
                for &byte in raw {
                    match byte {
                        b'(' | b')' | b'\\' => {
                            out.push('\\');
                            out.push(byte as char);
                        }
                        0x20..=0x7E => out.push(byte as char),
                        _ => out.push_str(&format!("\\{:03o}", byte)),
                    }
                }
                out.push(')');
                out
            }
        }
    }

    fn finish(
        mut self,
        total_objects: u32,
        info_id: Option<u32>,
        encrypt_id: Option<u32>,
        doc_id: &[u8],
    ) -> Vec<u8> {
        let xref_start = self.out.len();
        self.out
            .extend_from_slice(format!("xref\n0 {}\n", total_objects + 1).as_bytes());
        self.out.extend_from_slice(b"0000000000 65535 f \n");
        for id in 1..=total_objects {
            self.out.extend_from_slice(
                format!("{:010} 00000 n \n", self.offsets[id as usize]).as_bytes(),
            );
        }
        let mut trailer = format!(
            "trailer\n<< /Size {} /Root {} 0 R",
            total_objects + 1,
            PDF_CATALOG_ID
        );
        if let Some(id) = info_id {
            trailer.push_str(&format!(" /Info {} 0 R", id));
        }
        if let Some(id) = encrypt_id {
            trailer.push_str(&format!(" /Encrypt {} 0 R", id));
        }
        let id_hex = hex(doc_id);
        trailer.push_str(&format!(" /ID [<{}> <{}>]", id_hex, id_hex));
        trailer.push_str(&format!(" >>\nstartxref\n{}\n%%EOF", xref_start));
        self.out.extend_from_slice(trailer.as_bytes());
        self.out
    }
}

/// Base fonts referenced by the document, in first-use order. Helvetica is
/// always present as the default and as the form-field appearance font.
fn collect_fonts(doc: &Document) -> Vec<String> {
    let mut fonts = vec!["Helvetica".to_string()];
    for page in &doc.pages {
        for command in &page.commands {
            if let Command::SetFontName(name) = command {
                if !fonts.iter().any(|f| f == name) {
                    fonts.push(name.clone());
                }
            }
        }
    }
    fonts
}

/// Distinct opacity pairs in milli units, in first-use order.
fn collect_gstates(doc: &Document) -> Vec<(i32, i32)> {
    let mut gstates = Vec::new();
    for page in &doc.pages {
        for command in &page.commands {
            if let Command::SetOpacity { fill, stroke } = command {
                let key = (opacity_milli(*fill), opacity_milli(*stroke));
                if !gstates.contains(&key) {
                    gstates.push(key);
                }
            }
        }
    }
    gstates
}

fn opacity_milli(value: f32) -> i32 {
    (value.clamp(0.0, 1.0) * 1000.0).round() as i32
}

fn serialize_commands(
    commands: &[Command],
    fonts: &[String],
    gstates: &[(i32, i32)],
) -> Vec<u8> {
    let font_index = |name: &str| {
        fonts
            .iter()
            .position(|f| f == name)
            .map(|i| i + 1)
            .unwrap_or(1)
    };
    let mut out: Vec<u8> = Vec::new();
    let mut op = |text: String| {
        out.extend_from_slice(text.as_bytes());
        out.push(b'\n');
    };
    let mut font = 1usize;
    let mut font_size = Pt::from_f32(11.0);

    for command in commands {
        match command {
            Command::SaveState => op("q".to_string()),
            Command::RestoreState => op("Q".to_string()),
            Command::Translate(x, y) => {
                op(format!("1 0 0 1 {} {} cm", fmt_pt(*x), fmt_pt(*y)))
            }
            Command::Rotate(degrees) => {
                let radians = degrees.to_radians();
                let (sin, cos) = radians.sin_cos();
                op(format!(
                    "{} {} {} {} 0 0 cm",
                    fmt_f32(cos),
                    fmt_f32(sin),
                    fmt_f32(-sin),
                    fmt_f32(cos)
                ));
            }
            Command::SetFillColor(color) => op(format!("{} rg", fmt_color(*color))),
            Command::SetStrokeColor(color) => op(format!("{} RG", fmt_color(*color))),
            Command::SetLineWidth(width) => op(format!("{} w", fmt_pt(*width))),
            Command::SetOpacity { fill, stroke } => {
                let key = (opacity_milli(*fill), opacity_milli(*stroke));
                if let Some(index) = gstates.iter().position(|g| *g == key) {
                    op(format!("/GS{} gs", index + 1));
                }
            }
            Command::SetFontName(name) => font = font_index(name),
            Command::SetFontSize(size) => font_size = *size,
            Command::Rect {
                x,
                y,
                width,
                height,
            } => op(format!(
                "{} {} {} {} re",
                fmt_pt(*x),
                fmt_pt(*y),
                fmt_pt(*width),
                fmt_pt(*height)
            )),
            Command::MoveTo { x, y } => op(format!("{} {} m", fmt_pt(*x), fmt_pt(*y))),
            Command::LineTo { x, y } => op(format!("{} {} l", fmt_pt(*x), fmt_pt(*y))),
            Command::ClosePath => op("h".to_string()),
            Command::Fill => op("f".to_string()),
            Command::Stroke => op("S".to_string()),
            Command::DrawString { x, y, text } => {
                let escaped = escape_literal(&winansi_bytes(text));
                op(format!(
                    "BT /F{} {} Tf {} {} Td ({}) Tj ET",
                    font,
                    fmt_pt(font_size),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    escaped
                ));
            }
        }
    }
    out
}

fn escape_literal(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7E => out.push(byte as char),
            _ => out.push_str(&format!("\\{:03o}", byte)),
        }
    }
    out
}

/// Best-effort WinAnsi: Latin-1 code points map directly, everything beyond
/// degrades to `?`.
fn winansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if code <= 0xFF { code as u8 } else { b'?' }
        })
        .collect()
}

/// Stable identifier derived from the serialized content and metadata.
fn file_identifier(doc: &Document, contents: &[Vec<u8>]) -> Vec<u8> {
    let mut context = md5::Context::new();
    for content in contents {
        context.consume(content);
    }
    context.consume(doc.metadata.title.as_bytes());
    context.consume(doc.metadata.creator.as_bytes());
    context.consume((doc.pages.len() as u64).to_le_bytes());
    context.finalize().0.to_vec()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Points with milli precision, trailing zeros trimmed.
fn fmt_pt(value: Pt) -> String {
    fmt_milli(value.to_milli_i64() as i32)
}

fn fmt_milli(milli: i32) -> String {
    let sign = if milli < 0 { "-" } else { "" };
    let abs = (milli as i64).abs();
    let int = abs / 1000;
    let frac = abs % 1000;
    if frac == 0 {
        format!("{}{}", sign, int)
    } else {
        let mut frac = format!("{:03}", frac);
        while frac.ends_with('0') {
            frac.pop();
        }
        format!("{}{}.{}", sign, int, frac)
    }
}

fn fmt_f32(value: f32) -> String {
    let mut out = format!("{:.4}", value);
    while out.ends_with('0') {
        out.pop();
    }
    if out.ends_with('.') {
        out.pop();
    }
    if out == "-0" { "0".to_string() } else { out }
}

fn fmt_color(color: Color) -> String {
    format!(
        "{} {} {}",
        fmt_f32(color.r.clamp(0.0, 1.0)),
        fmt_f32(color.g.clamp(0.0, 1.0)),
        fmt_f32(color.b.clamp(0.0, 1.0))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;
    use crate::security::{Permissions, SecuritySettings};
    use crate::types::{Rotation, Size};

    fn one_page_doc(text: &str) -> Document {
        let mut page = Page::new(Size::a4(), Rotation::None);
        page.push(Command::DrawString {
            x: Pt::from_f32(50.0),
            y: Pt::from_f32(780.0),
            text: text.to_string(),
        });
        let mut doc = Document::new();
        doc.push_page(page);
        doc
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(matches!(
            write_document(&Document::new()),
            Err(CodecError::EmptyDocument)
        ));
    }

    #[test]
    fn output_has_header_and_eof() {
        let bytes = write_document(&one_page_doc("hi")).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7\n"));
        assert!(bytes.ends_with(b"%%EOF"));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Type /Catalog"));
        assert!(text.contains("/MediaBox [0 0 595.28 841.89]"));
        assert!(text.contains("startxref"));
    }

    #[test]
    fn output_is_deterministic() {
        let doc = one_page_doc("same input");
        assert_eq!(write_document(&doc).unwrap(), write_document(&doc).unwrap());
    }

    #[test]
    fn rotation_lands_in_page_dict() {
        let mut doc = Document::new();
        doc.push_page(Page::new(Size::a4(), Rotation::Quarter));
        let bytes = write_document(&doc).unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("/Rotate 90"));
    }

    #[test]
    fn form_fields_produce_acroform() {
        let mut doc = one_page_doc("form");
        doc.set_form_field("email", "a@example.com");
        let bytes = write_document(&doc).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/AcroForm"));
        assert!(text.contains("/FT /Tx"));
        assert!(text.contains("(email)"));
    }

    #[test]
    fn security_settings_emit_encrypt_dict() {
        let mut doc = one_page_doc("secret");
        doc.security = Some(SecuritySettings::with_user_password(
            "pw",
            Permissions::none(),
        ));
        let bytes = write_document(&doc).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Encrypt"));
        assert!(text.contains("/Filter /Standard"));
        assert!(text.contains("/V 2 /R 3"));
        // Plain text must not appear once streams are encrypted.
        assert!(!text.contains("secret"));
    }

    #[test]
    fn number_formatting_trims_zeros() {
        assert_eq!(fmt_pt(Pt::from_f32(595.28)), "595.28");
        assert_eq!(fmt_pt(Pt::from_f32(12.0)), "12");
        assert_eq!(fmt_pt(Pt::from_f32(-0.5)), "-0.5");
        assert_eq!(fmt_f32(1.0), "1");
        assert_eq!(fmt_f32(0.7071), "0.7071");
    }
}
