//! Lightweight structural inspection of PDF bytes, independent of the full
//! codec. Useful as a pre-flight check before parsing third-party files: it
//! answers "can this be read, and will it need a password" without
//! interpreting any content.

use crate::error::CodecError;
use lopdf::Document as LoDocument;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
}

pub fn inspect_bytes(bytes: &[u8]) -> Result<InspectReport, CodecError> {
    let pdf = LoDocument::load_mem(bytes)
        .map_err(|err| CodecError::corrupt("inspect", err.to_string()))?;
    Ok(InspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pdf.get_pages().len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
    })
}

pub fn inspect_path(path: &Path) -> Result<InspectReport, CodecError> {
    let data = std::fs::read(path)?;
    inspect_bytes(&data)
}

/// Check that a file is usable as a manipulation input without credentials.
pub fn require_open_input(report: &InspectReport) -> Result<(), CodecError> {
    if report.encrypted {
        return Err(CodecError::InvalidPassword);
    }
    if report.page_count == 0 {
        return Err(CodecError::EmptyDocument);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::page::{Command, Page};
    use crate::security::{Permissions, SecuritySettings};
    use crate::types::{Pt, Rotation, Size};
    use crate::writer::write_document;

    fn sample_bytes(secured: bool) -> Vec<u8> {
        let mut page = Page::new(Size::a4(), Rotation::None);
        page.push(Command::DrawString {
            x: Pt::from_f32(50.0),
            y: Pt::from_f32(780.0),
            text: "inspect me".to_string(),
        });
        let mut doc = Document::new();
        doc.push_page(page);
        if secured {
            doc.security = Some(SecuritySettings::with_user_password(
                "pw",
                Permissions::all(),
            ));
        }
        write_document(&doc).unwrap()
    }

    #[test]
    fn reports_version_and_page_count() {
        let bytes = sample_bytes(false);
        let report = inspect_bytes(&bytes).unwrap();
        assert_eq!(report.pdf_version, "1.7");
        assert_eq!(report.page_count, 1);
        assert!(!report.encrypted);
        assert_eq!(report.file_size_bytes, bytes.len());
        assert!(require_open_input(&report).is_ok());
    }

    #[test]
    fn detects_encryption() {
        let report = inspect_bytes(&sample_bytes(true)).unwrap();
        assert!(report.encrypted);
        assert!(matches!(
            require_open_input(&report),
            Err(CodecError::InvalidPassword)
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            inspect_bytes(b"plainly not a pdf"),
            Err(CodecError::CorruptInput { .. })
        ));
    }
}
