//! Deserialization of PDF 1.7 bytes back into a [`Document`]: classic
//! cross-reference tables (with `/Prev` chains), flate-compressed streams,
//! standard-handler RC4 decryption, and a content-stream interpreter that maps
//! the operator subset emitted by the writer back onto [`Command`]s.
//!
//! Inputs this crate did not produce are handled on a best-effort basis:
//! unknown content operators are skipped, while structural damage and
//! unsupported encryption surface as errors.

use crate::crypt::StandardSecurity;
use crate::document::{Document, Metadata};
use crate::error::CodecError;
use crate::page::{Command, Page};
use crate::security::{Permissions, SecuritySettings};
use crate::types::{Color, Pt, Rotation, Size};
use flate2::read::ZlibDecoder;
use std::collections::BTreeMap;
use std::io::Read;

const MAX_REF_DEPTH: usize = 32;
const MAX_TREE_DEPTH: usize = 64;

/// Parse an unencrypted document, or an encrypted one with an empty user
/// password.
pub fn read_document(bytes: &[u8]) -> Result<Document, CodecError> {
    read_with_password(bytes, "")
}

/// Parse a document, authenticating with `password` when the file is
/// encrypted. Either the user or the owner password opens the file; the
/// recovered permissions reflect the stored `/P` flags either way.
pub fn read_with_password(bytes: &[u8], password: &str) -> Result<Document, CodecError> {
    if !bytes.starts_with(b"%PDF-") {
        return Err(CodecError::corrupt("header", "missing %PDF- marker"));
    }
    let mut parser = Parser::new(bytes)?;

    let mut permissions = None;
    if let Some(encrypt_ref) = parser.trailer.get("Encrypt").cloned() {
        let encrypt = parser.resolve(encrypt_ref)?;
        let dict = as_dict(&encrypt, "encryption dictionary")?;
        let filter = dict.get("Filter").and_then(Object::as_name);
        if filter != Some("Standard") {
            return Err(CodecError::UnsupportedFeature {
                feature: format!("security handler {}", filter.unwrap_or("(none)")),
            });
        }
        let v = dict.get("V").and_then(Object::as_int).unwrap_or(0);
        let r = dict.get("R").and_then(Object::as_int).unwrap_or(0);
        if v > 2 {
            return Err(CodecError::UnsupportedFeature {
                feature: format!("encryption algorithm /V {} (AES is not supported)", v),
            });
        }
        if r != 3 {
            return Err(CodecError::UnsupportedFeature {
                feature: format!("standard security handler revision {}", r),
            });
        }
        let o = dict
            .get("O")
            .and_then(Object::as_str)
            .ok_or_else(|| CodecError::corrupt("encryption dictionary", "missing /O"))?
            .to_vec();
        let u = dict
            .get("U")
            .and_then(Object::as_str)
            .ok_or_else(|| CodecError::corrupt("encryption dictionary", "missing /U"))?
            .to_vec();
        let p = dict
            .get("P")
            .and_then(Object::as_int)
            .ok_or_else(|| CodecError::corrupt("encryption dictionary", "missing /P"))?;
        let doc_id = parser
            .trailer
            .get("ID")
            .and_then(Object::as_array)
            .and_then(|ids| ids.first())
            .and_then(Object::as_str)
            .ok_or_else(|| CodecError::corrupt("trailer", "encrypted file without /ID"))?
            .to_vec();
        let security = StandardSecurity::authenticate(&o, &u, p, &doc_id, password)?;
        permissions = Some(Permissions::from_p(p));
        parser.security = Some(security);
    }

    let root_ref = parser
        .trailer
        .get("Root")
        .cloned()
        .ok_or_else(|| CodecError::corrupt("trailer", "missing /Root"))?;
    let root = parser.resolve(root_ref)?;
    let catalog = as_dict(&root, "document catalog")?;

    let pages_ref = catalog
        .get("Pages")
        .cloned()
        .ok_or_else(|| CodecError::corrupt("document catalog", "missing /Pages"))?;
    let mut nodes = Vec::new();
    parser.collect_pages(pages_ref, Inherited::default(), 0, &mut nodes)?;

    let mut doc = Document::new();
    for node in nodes {
        doc.push_page(parser.build_page(node)?);
    }
    doc.metadata = parser.read_info()?;
    doc.form_fields = parser.read_form_fields(catalog)?;
    doc.security = permissions.map(|permissions| SecuritySettings {
        owner_password: None,
        user_password: (!password.is_empty()).then(|| password.to_string()),
        permissions,
    });
    Ok(doc)
}

// ---------------------------------------------------------------------------
// Object model

#[derive(Debug, Clone, PartialEq)]
enum Object {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Name(String),
    Str(Vec<u8>),
    Array(Vec<Object>),
    Dict(BTreeMap<String, Object>),
    Stream {
        dict: BTreeMap<String, Object>,
        data: Vec<u8>,
    },
    Ref(u32, u16),
}

impl Object {
    fn as_int(&self) -> Option<i64> {
        match self {
            Object::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn as_num(&self) -> Option<f64> {
        match self {
            Object::Int(v) => Some(*v as f64),
            Object::Real(v) => Some(*v),
            _ => None,
        }
    }

    fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(v) => Some(v.as_str()),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&[u8]> {
        match self {
            Object::Str(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn as_dict(&self) -> Option<&BTreeMap<String, Object>> {
        match self {
            Object::Dict(v) => Some(v),
            _ => None,
        }
    }
}

fn as_dict<'a>(
    obj: &'a Object,
    context: &str,
) -> Result<&'a BTreeMap<String, Object>, CodecError> {
    match obj {
        Object::Dict(dict) | Object::Stream { dict, .. } => Ok(dict),
        other => Err(CodecError::corrupt(
            context,
            format!("expected dictionary, found {:?}", kind(other)),
        )),
    }
}

fn kind(obj: &Object) -> &'static str {
    match obj {
        Object::Null => "null",
        Object::Bool(_) => "boolean",
        Object::Int(_) => "integer",
        Object::Real(_) => "real",
        Object::Name(_) => "name",
        Object::Str(_) => "string",
        Object::Array(_) => "array",
        Object::Dict(_) => "dictionary",
        Object::Stream { .. } => "stream",
        Object::Ref(..) => "reference",
    }
}

// ---------------------------------------------------------------------------
// Lexer

fn is_ws(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | 0x0C | b'\r' | b' ')
}

fn is_delim(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip_ws(&mut self) {
        while let Some(byte) = self.peek() {
            if is_ws(byte) {
                self.pos += 1;
            } else if byte == b'%' {
                while let Some(b) = self.peek() {
                    self.pos += 1;
                    if b == b'\n' || b == b'\r' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn read_keyword(&mut self) -> String {
        let mut out = String::new();
        while let Some(byte) = self.peek() {
            if is_ws(byte) || is_delim(byte) {
                break;
            }
            out.push(byte as char);
            self.pos += 1;
        }
        out
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), CodecError> {
        self.skip_ws();
        let found = self.read_keyword();
        if found == keyword {
            Ok(())
        } else {
            Err(CodecError::corrupt(
                "object",
                format!("expected '{}', found '{}'", keyword, found),
            ))
        }
    }

    fn read_uint(&mut self) -> Result<u64, CodecError> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(CodecError::corrupt("object", "expected an integer"));
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| CodecError::corrupt("object", "non-ASCII digits"))?;
        text.parse()
            .map_err(|_| CodecError::corrupt("object", "integer out of range"))
    }

    fn parse_object(&mut self) -> Result<Object, CodecError> {
        self.skip_ws();
        match self.peek() {
            None => Err(CodecError::corrupt("object", "unexpected end of input")),
            Some(b'/') => self.parse_name(),
            Some(b'(') => self.parse_literal_string(),
            Some(b'[') => self.parse_array(),
            Some(b'<') => {
                if self.bytes.get(self.pos + 1) == Some(&b'<') {
                    self.parse_dict()
                } else {
                    self.parse_hex_string()
                }
            }
            Some(b) if b.is_ascii_digit() || b == b'+' || b == b'-' || b == b'.' => {
                self.parse_number_or_ref()
            }
            Some(_) => {
                let keyword = self.read_keyword();
                match keyword.as_str() {
                    "true" => Ok(Object::Bool(true)),
                    "false" => Ok(Object::Bool(false)),
                    "null" => Ok(Object::Null),
                    other => Err(CodecError::corrupt(
                        "object",
                        format!("unexpected token '{}'", other),
                    )),
                }
            }
        }
    }

    fn parse_name(&mut self) -> Result<Object, CodecError> {
        self.pos += 1; // '/'
        let mut out = String::new();
        while let Some(byte) = self.peek() {
            if is_ws(byte) || is_delim(byte) {
                break;
            }
            self.pos += 1;
            if byte == b'#' {
                let hi = self.bump();
                let lo = self.bump();
                let decoded = match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        let hex = [hi, lo];
                        u8::from_str_radix(std::str::from_utf8(&hex).unwrap_or(""), 16).ok()
                    }
                    _ => None,
                };
                match decoded {
                    Some(byte) => out.push(byte as char),
                    None => return Err(CodecError::corrupt("name", "bad # escape")),
                }
            } else {
                out.push(byte as char);
            }
        }
        Ok(Object::Name(out))
    }

    fn parse_literal_string(&mut self) -> Result<Object, CodecError> {
        self.pos += 1; // '('
        let mut out = Vec::new();
        let mut depth = 1usize;
        loop {
            let byte = self
                .bump()
                .ok_or_else(|| CodecError::corrupt("string", "unterminated literal"))?;
            match byte {
                b'(' => {
                    depth += 1;
                    out.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(byte);
                }
                b'\\' => {
                    let escape = self
                        .bump()
                        .ok_or_else(|| CodecError::corrupt("string", "unterminated escape"))?;
                    match escape {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'(' | b')' | b'\\' => out.push(escape),
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = (escape - b'0') as u16;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(digit @ b'0'..=b'7') => {
                                        value = value * 8 + (digit - b'0') as u16;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push(value as u8);
                        }
                        other => out.push(other),
                    }
                }
                _ => out.push(byte),
            }
        }
        Ok(Object::Str(out))
    }

    fn parse_hex_string(&mut self) -> Result<Object, CodecError> {
        self.pos += 1; // '<'
        let mut digits = Vec::new();
        loop {
            let byte = self
                .bump()
                .ok_or_else(|| CodecError::corrupt("string", "unterminated hex string"))?;
            match byte {
                b'>' => break,
                b if b.is_ascii_hexdigit() => digits.push(b),
                b if is_ws(b) => {}
                other => {
                    return Err(CodecError::corrupt(
                        "string",
                        format!("invalid hex digit 0x{:02x}", other),
                    ));
                }
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }
        let mut out = Vec::with_capacity(digits.len() / 2);
        for pair in digits.chunks_exact(2) {
            let text = std::str::from_utf8(pair).unwrap_or("");
            match u8::from_str_radix(text, 16) {
                Ok(byte) => out.push(byte),
                Err(_) => return Err(CodecError::corrupt("string", "bad hex pair")),
            }
        }
        Ok(Object::Str(out))
    }

    fn parse_array(&mut self) -> Result<Object, CodecError> {
        self.pos += 1; // '['
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Object::Array(out));
                }
                Some(_) => out.push(self.parse_object()?),
                None => return Err(CodecError::corrupt("array", "unterminated array")),
            }
        }
    }

    fn parse_dict(&mut self) -> Result<Object, CodecError> {
        self.pos += 2; // '<<'
        let mut out = BTreeMap::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'>') => {
                    if self.bytes.get(self.pos + 1) == Some(&b'>') {
                        self.pos += 2;
                        return Ok(Object::Dict(out));
                    }
                    return Err(CodecError::corrupt("dictionary", "stray '>'"));
                }
                Some(b'/') => {
                    let key = match self.parse_name()? {
                        Object::Name(name) => name,
                        _ => unreachable!(),
                    };
                    let value = self.parse_object()?;
                    out.insert(key, value);
                }
                Some(other) => {
                    return Err(CodecError::corrupt(
                        "dictionary",
                        format!("expected name key, found 0x{:02x}", other),
                    ));
                }
                None => return Err(CodecError::corrupt("dictionary", "unterminated dictionary")),
            }
        }
    }

    fn parse_number_or_ref(&mut self) -> Result<Object, CodecError> {
        self.skip_ws();
        let start = self.pos;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        let mut has_dot = false;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_digit() {
                self.pos += 1;
            } else if byte == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| CodecError::corrupt("number", "non-ASCII digits"))?;
        if text.is_empty() || text == "+" || text == "-" || text == "." {
            return Err(CodecError::corrupt("number", "malformed number"));
        }
        if has_dot {
            let value: f64 = text
                .parse()
                .map_err(|_| CodecError::corrupt("number", "malformed real"))?;
            return Ok(Object::Real(value));
        }
        let value: i64 = text
            .parse()
            .map_err(|_| CodecError::corrupt("number", "integer out of range"))?;

        // "<id> <gen> R" lookahead for indirect references.
        if value >= 0 {
            let save = self.pos;
            self.skip_ws();
            let gen_start = self.pos;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos > gen_start {
                let gen_text = std::str::from_utf8(&self.bytes[gen_start..self.pos]).unwrap_or("");
                if let Ok(generation) = gen_text.parse::<u16>() {
                    self.skip_ws();
                    if self.peek() == Some(b'R') {
                        let after = self.bytes.get(self.pos + 1).copied();
                        if after.is_none_or(|b| is_ws(b) || is_delim(b)) {
                            self.pos += 1;
                            return Ok(Object::Ref(value as u32, generation));
                        }
                    }
                }
            }
            self.pos = save;
        }
        Ok(Object::Int(value))
    }
}

// ---------------------------------------------------------------------------
// File structure

struct Parser<'a> {
    bytes: &'a [u8],
    xref: BTreeMap<u32, usize>,
    trailer: BTreeMap<String, Object>,
    security: Option<StandardSecurity>,
}

impl<'a> Parser<'a> {
    fn new(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let mut parser = Self {
            bytes,
            xref: BTreeMap::new(),
            trailer: BTreeMap::new(),
            security: None,
        };
        let start = parser.find_startxref()?;
        parser.load_xref_chain(start)?;
        Ok(parser)
    }

    fn find_startxref(&self) -> Result<usize, CodecError> {
        let tail_len = self.bytes.len().min(2048);
        let tail = &self.bytes[self.bytes.len() - tail_len..];
        let marker = b"startxref";
        let at = tail
            .windows(marker.len())
            .rposition(|window| window == marker)
            .ok_or_else(|| CodecError::corrupt("trailer", "missing startxref"))?;
        let offset_pos = self.bytes.len() - tail_len + at + marker.len();
        let mut lexer = Lexer::new(self.bytes, offset_pos);
        let offset = lexer.read_uint()? as usize;
        if offset >= self.bytes.len() {
            return Err(CodecError::corrupt("trailer", "startxref beyond end of file"));
        }
        Ok(offset)
    }

    fn load_xref_chain(&mut self, start: usize) -> Result<(), CodecError> {
        let mut next = Some(start);
        let mut visited = Vec::new();
        while let Some(offset) = next {
            if visited.contains(&offset) {
                return Err(CodecError::corrupt("xref", "cyclic /Prev chain"));
            }
            visited.push(offset);
            next = self.load_xref_section(offset)?;
        }
        Ok(())
    }

    /// Parse one xref table plus its trailer; returns the /Prev offset if any.
    /// Entries already present (from newer tables) are kept.
    fn load_xref_section(&mut self, offset: usize) -> Result<Option<usize>, CodecError> {
        let mut lexer = Lexer::new(self.bytes, offset);
        lexer.skip_ws();
        if lexer.peek().is_some_and(|b| b.is_ascii_digit()) {
            // An indirect object here means a cross-reference stream.
            return Err(CodecError::UnsupportedFeature {
                feature: "cross-reference streams".to_string(),
            });
        }
        lexer.expect_keyword("xref")?;
        loop {
            lexer.skip_ws();
            if !lexer.peek().is_some_and(|b| b.is_ascii_digit()) {
                break;
            }
            let first = lexer.read_uint()? as u32;
            let count = lexer.read_uint()?;
            for index in 0..count {
                let entry_offset = lexer.read_uint()? as usize;
                let _generation = lexer.read_uint()?;
                lexer.skip_ws();
                let entry_type = lexer
                    .bump()
                    .ok_or_else(|| CodecError::corrupt("xref", "truncated entry"))?;
                if entry_type == b'n' {
                    self.xref.entry(first + index as u32).or_insert(entry_offset);
                } else if entry_type != b'f' {
                    return Err(CodecError::corrupt(
                        "xref",
                        format!("unknown entry type '{}'", entry_type as char),
                    ));
                }
            }
        }
        lexer.expect_keyword("trailer")?;
        let trailer = lexer.parse_object()?;
        let dict = as_dict(&trailer, "trailer")?;
        let prev = dict.get("Prev").and_then(Object::as_int).map(|v| v as usize);
        for (key, value) in dict {
            self.trailer
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        Ok(prev)
    }

    fn get(&self, id: u32) -> Result<Object, CodecError> {
        let offset = *self.xref.get(&id).ok_or_else(|| {
            CodecError::corrupt("xref", format!("object {} not in cross-reference table", id))
        })?;
        self.parse_indirect(offset)
    }

    fn parse_indirect(&self, offset: usize) -> Result<Object, CodecError> {
        if offset >= self.bytes.len() {
            return Err(CodecError::corrupt("xref", "object offset beyond end of file"));
        }
        let mut lexer = Lexer::new(self.bytes, offset);
        let id = lexer.read_uint()? as u32;
        let generation = lexer.read_uint()? as u16;
        lexer.expect_keyword("obj")?;
        let mut obj = lexer.parse_object()?;

        lexer.skip_ws();
        let save = lexer.pos;
        if lexer.read_keyword() == "stream" {
            let dict = match obj {
                Object::Dict(dict) => dict,
                _ => return Err(CodecError::corrupt("stream", "stream without dictionary")),
            };
            if lexer.peek() == Some(b'\r') {
                lexer.pos += 1;
            }
            if lexer.peek() == Some(b'\n') {
                lexer.pos += 1;
            }
            let length = self.stream_length(dict.get("Length"))?;
            let end = lexer.pos + length;
            if end > self.bytes.len() {
                return Err(CodecError::corrupt("stream", "stream data truncated"));
            }
            let data = self.bytes[lexer.pos..end].to_vec();
            lexer.pos = end;
            lexer.expect_keyword("endstream")?;
            obj = Object::Stream { dict, data };
        } else {
            lexer.pos = save;
        }

        if self.security.is_some() {
            self.decrypt_in_place(id, generation, &mut obj);
        }
        Ok(obj)
    }

    fn stream_length(&self, length: Option<&Object>) -> Result<usize, CodecError> {
        match length {
            Some(Object::Int(v)) if *v >= 0 => Ok(*v as usize),
            Some(Object::Ref(id, _)) => match self.length_via_ref(*id)? {
                v if v >= 0 => Ok(v as usize),
                _ => Err(CodecError::corrupt("stream", "negative /Length")),
            },
            _ => Err(CodecError::corrupt("stream", "missing /Length")),
        }
    }

    /// `/Length` may be an indirect reference to a bare integer. Parse it
    /// directly rather than through `get` to avoid re-entering stream logic.
    fn length_via_ref(&self, id: u32) -> Result<i64, CodecError> {
        let offset = *self.xref.get(&id).ok_or_else(|| {
            CodecError::corrupt("stream", format!("/Length object {} missing", id))
        })?;
        let mut lexer = Lexer::new(self.bytes, offset);
        lexer.read_uint()?;
        lexer.read_uint()?;
        lexer.expect_keyword("obj")?;
        match lexer.parse_object()? {
            Object::Int(v) => Ok(v),
            other => Err(CodecError::corrupt(
                "stream",
                format!("/Length resolves to {}", kind(&other)),
            )),
        }
    }

    fn decrypt_in_place(&self, id: u32, generation: u16, obj: &mut Object) {
        let Some(security) = &self.security else {
            return;
        };
        match obj {
            Object::Str(bytes) => *bytes = security.process_object(id, generation, bytes),
            Object::Array(items) => {
                for item in items {
                    self.decrypt_in_place(id, generation, item);
                }
            }
            Object::Dict(dict) => {
                for value in dict.values_mut() {
                    self.decrypt_in_place(id, generation, value);
                }
            }
            Object::Stream { dict, data } => {
                for value in dict.values_mut() {
                    self.decrypt_in_place(id, generation, value);
                }
                *data = security.process_object(id, generation, data);
            }
            _ => {}
        }
    }

    fn resolve(&self, mut obj: Object) -> Result<Object, CodecError> {
        for _ in 0..MAX_REF_DEPTH {
            match obj {
                Object::Ref(id, _) => obj = self.get(id)?,
                other => return Ok(other),
            }
        }
        Err(CodecError::corrupt("object", "reference chain too deep"))
    }

    fn resolve_entry(
        &self,
        dict: &BTreeMap<String, Object>,
        key: &str,
    ) -> Result<Option<Object>, CodecError> {
        match dict.get(key) {
            Some(obj) => Ok(Some(self.resolve(obj.clone())?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Page tree

    fn collect_pages(
        &self,
        node_ref: Object,
        inherited: Inherited,
        depth: usize,
        out: &mut Vec<PageNode>,
    ) -> Result<(), CodecError> {
        if depth > MAX_TREE_DEPTH {
            return Err(CodecError::corrupt("page tree", "nesting too deep"));
        }
        let node = self.resolve(node_ref)?;
        let dict = as_dict(&node, "page tree node")?;
        let mut inherited = inherited;
        if let Some(media_box) = self.resolve_entry(dict, "MediaBox")? {
            inherited.media_box = rect_from(&media_box);
        }
        if let Some(rotate) = self.resolve_entry(dict, "Rotate")? {
            inherited.rotate = rotate.as_int();
        }
        if let Some(resources) = self.resolve_entry(dict, "Resources")? {
            if let Object::Dict(resources) = resources {
                inherited.resources = Some(resources);
            }
        }

        match dict.get("Type").and_then(Object::as_name) {
            Some("Pages") | None if dict.contains_key("Kids") => {
                let kids = self
                    .resolve_entry(dict, "Kids")?
                    .ok_or_else(|| CodecError::corrupt("page tree", "missing /Kids"))?;
                let kids = kids
                    .as_array()
                    .ok_or_else(|| CodecError::corrupt("page tree", "/Kids is not an array"))?
                    .to_vec();
                for kid in kids {
                    self.collect_pages(kid, inherited.clone(), depth + 1, out)?;
                }
                Ok(())
            }
            _ => {
                let contents = dict.get("Contents").cloned();
                out.push(PageNode {
                    inherited,
                    contents,
                });
                Ok(())
            }
        }
    }

    fn build_page(&self, node: PageNode) -> Result<Page, CodecError> {
        let media_box = node
            .inherited
            .media_box
            .ok_or_else(|| CodecError::corrupt("page", "no /MediaBox in scope"))?;
        let size = Size {
            width: Pt::from_f32((media_box[2] - media_box[0]) as f32),
            height: Pt::from_f32((media_box[3] - media_box[1]) as f32),
        };
        let rotation = node
            .inherited
            .rotate
            .and_then(Rotation::from_degrees)
            .unwrap_or(Rotation::None);
        let mut page = Page::new(size, rotation);

        let Some(contents_ref) = node.contents else {
            return Ok(page);
        };
        let mut data = Vec::new();
        match self.resolve(contents_ref)? {
            Object::Stream { dict, data: raw } => {
                data.extend_from_slice(&self.decode_stream(&dict, &raw)?);
            }
            Object::Array(parts) => {
                for part in parts {
                    match self.resolve(part)? {
                        Object::Stream { dict, data: raw } => {
                            data.extend_from_slice(&self.decode_stream(&dict, &raw)?);
                            data.push(b'\n');
                        }
                        other => {
                            return Err(CodecError::corrupt(
                                "page",
                                format!("content element is {}", kind(&other)),
                            ));
                        }
                    }
                }
            }
            Object::Null => {}
            other => {
                return Err(CodecError::corrupt(
                    "page",
                    format!("/Contents is {}", kind(&other)),
                ));
            }
        }
        page.commands = self.interpret_content(&data, node.inherited.resources.as_ref())?;
        Ok(page)
    }

    fn decode_stream(
        &self,
        dict: &BTreeMap<String, Object>,
        data: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        let filter = self.resolve_entry(dict, "Filter")?;
        let names: Vec<String> = match filter {
            None | Some(Object::Null) => Vec::new(),
            Some(Object::Name(name)) => vec![name],
            Some(Object::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_name().map(str::to_string))
                .collect(),
            Some(other) => {
                return Err(CodecError::corrupt(
                    "stream",
                    format!("/Filter is {}", kind(&other)),
                ));
            }
        };
        let mut data = data.to_vec();
        for name in names {
            if name != "FlateDecode" {
                return Err(CodecError::UnsupportedFeature {
                    feature: format!("stream filter /{}", name),
                });
            }
            let mut decoder = ZlibDecoder::new(data.as_slice());
            let mut inflated = Vec::new();
            decoder
                .read_to_end(&mut inflated)
                .map_err(|err| CodecError::corrupt("stream", format!("flate error: {}", err)))?;
            data = inflated;
        }
        Ok(data)
    }

    // -----------------------------------------------------------------------
    // Content streams

    fn interpret_content(
        &self,
        data: &[u8],
        resources: Option<&BTreeMap<String, Object>>,
    ) -> Result<Vec<Command>, CodecError> {
        let fonts = self.font_map(resources)?;
        let gstates = self.gstate_map(resources)?;

        let mut commands = Vec::new();
        let mut lexer = Lexer::new(data, 0);
        let mut stack: Vec<Object> = Vec::new();
        let mut line_x = 0.0f64;
        let mut line_y = 0.0f64;
        let mut leading = 0.0f64;

        loop {
            lexer.skip_ws();
            let Some(byte) = lexer.peek() else {
                break;
            };
            let starts_object = matches!(byte, b'/' | b'(' | b'<' | b'[')
                || byte.is_ascii_digit()
                || matches!(byte, b'+' | b'-' | b'.');
            if starts_object {
                stack.push(lexer.parse_object()?);
                continue;
            }

            let op = lexer.read_keyword();
            if op.is_empty() {
                // Stray delimiter; skip it rather than loop forever.
                lexer.pos += 1;
                stack.clear();
                continue;
            }
            let nums: Vec<f64> = stack.iter().filter_map(Object::as_num).collect();
            match op.as_str() {
                "q" => commands.push(Command::SaveState),
                "Q" => commands.push(Command::RestoreState),
                "cm" => {
                    if let [a, b, c, d, e, f] = nums[..] {
                        if a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0 {
                            commands.push(Command::Translate(
                                Pt::from_f32(e as f32),
                                Pt::from_f32(f as f32),
                            ));
                        } else if e == 0.0 && f == 0.0 {
                            let degrees = (b.atan2(a)).to_degrees() as f32;
                            commands.push(Command::Rotate(degrees));
                        }
                    }
                }
                "rg" => {
                    if let [r, g, b] = nums[..] {
                        commands.push(Command::SetFillColor(Color::rgb(
                            r as f32, g as f32, b as f32,
                        )));
                    }
                }
                "RG" => {
                    if let [r, g, b] = nums[..] {
                        commands.push(Command::SetStrokeColor(Color::rgb(
                            r as f32, g as f32, b as f32,
                        )));
                    }
                }
                "g" => {
                    if let [v] = nums[..] {
                        let v = v as f32;
                        commands.push(Command::SetFillColor(Color::rgb(v, v, v)));
                    }
                }
                "G" => {
                    if let [v] = nums[..] {
                        let v = v as f32;
                        commands.push(Command::SetStrokeColor(Color::rgb(v, v, v)));
                    }
                }
                "w" => {
                    if let [v] = nums[..] {
                        commands.push(Command::SetLineWidth(Pt::from_f32(v as f32)));
                    }
                }
                "gs" => {
                    if let Some(Object::Name(name)) = stack.last() {
                        if let Some((fill, stroke)) = gstates.get(name) {
                            commands.push(Command::SetOpacity {
                                fill: *fill,
                                stroke: *stroke,
                            });
                        }
                    }
                }
                "BT" => {
                    line_x = 0.0;
                    line_y = 0.0;
                    leading = 0.0;
                }
                "ET" => {}
                "Tf" => {
                    if let [Object::Name(resource), size] = &stack[..] {
                        let base = fonts
                            .get(resource)
                            .cloned()
                            .unwrap_or_else(|| resource.clone());
                        commands.push(Command::SetFontName(base));
                        if let Some(size) = size.as_num() {
                            commands.push(Command::SetFontSize(Pt::from_f32(size as f32)));
                        }
                    }
                }
                "TL" => {
                    if let [v] = nums[..] {
                        leading = v;
                    }
                }
                "Td" => {
                    if let [tx, ty] = nums[..] {
                        line_x += tx;
                        line_y += ty;
                    }
                }
                "TD" => {
                    if let [tx, ty] = nums[..] {
                        leading = -ty;
                        line_x += tx;
                        line_y += ty;
                    }
                }
                "Tm" => {
                    if let [_, _, _, _, e, f] = nums[..] {
                        line_x = e;
                        line_y = f;
                    }
                }
                "T*" => line_y -= leading,
                "Tj" => {
                    if let Some(Object::Str(bytes)) = stack.last() {
                        push_text(&mut commands, line_x, line_y, bytes);
                    }
                }
                "'" => {
                    line_y -= leading;
                    if let Some(Object::Str(bytes)) = stack.last() {
                        push_text(&mut commands, line_x, line_y, bytes);
                    }
                }
                "\"" => {
                    line_y -= leading;
                    if let Some(Object::Str(bytes)) = stack.last() {
                        push_text(&mut commands, line_x, line_y, bytes);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = stack.last() {
                        let mut text = Vec::new();
                        for item in items {
                            if let Object::Str(bytes) = item {
                                text.extend_from_slice(bytes);
                            }
                        }
                        push_text(&mut commands, line_x, line_y, &text);
                    }
                }
                "re" => {
                    if let [x, y, width, height] = nums[..] {
                        commands.push(Command::Rect {
                            x: Pt::from_f32(x as f32),
                            y: Pt::from_f32(y as f32),
                            width: Pt::from_f32(width as f32),
                            height: Pt::from_f32(height as f32),
                        });
                    }
                }
                "m" => {
                    if let [x, y] = nums[..] {
                        commands.push(Command::MoveTo {
                            x: Pt::from_f32(x as f32),
                            y: Pt::from_f32(y as f32),
                        });
                    }
                }
                "l" => {
                    if let [x, y] = nums[..] {
                        commands.push(Command::LineTo {
                            x: Pt::from_f32(x as f32),
                            y: Pt::from_f32(y as f32),
                        });
                    }
                }
                "h" => commands.push(Command::ClosePath),
                "f" | "F" | "f*" => commands.push(Command::Fill),
                "S" => commands.push(Command::Stroke),
                "s" => {
                    commands.push(Command::ClosePath);
                    commands.push(Command::Stroke);
                }
                "B" | "B*" => {
                    commands.push(Command::Fill);
                    commands.push(Command::Stroke);
                }
                // Anything else (clipping, inline images, unknown extensions)
                // is skipped.
                _ => {}
            }
            stack.clear();
        }
        Ok(commands)
    }

    fn font_map(
        &self,
        resources: Option<&BTreeMap<String, Object>>,
    ) -> Result<BTreeMap<String, String>, CodecError> {
        let mut map = BTreeMap::new();
        let Some(resources) = resources else {
            return Ok(map);
        };
        let Some(fonts) = self.resolve_entry(resources, "Font")? else {
            return Ok(map);
        };
        if let Object::Dict(fonts) = fonts {
            for (resource, value) in fonts {
                let font = self.resolve(value.clone())?;
                if let Some(base) = font
                    .as_dict()
                    .and_then(|d| d.get("BaseFont"))
                    .and_then(Object::as_name)
                {
                    map.insert(resource, base.to_string());
                }
            }
        }
        Ok(map)
    }

    fn gstate_map(
        &self,
        resources: Option<&BTreeMap<String, Object>>,
    ) -> Result<BTreeMap<String, (f32, f32)>, CodecError> {
        let mut map = BTreeMap::new();
        let Some(resources) = resources else {
            return Ok(map);
        };
        let Some(states) = self.resolve_entry(resources, "ExtGState")? else {
            return Ok(map);
        };
        if let Object::Dict(states) = states {
            for (resource, value) in states {
                let state = self.resolve(value.clone())?;
                if let Some(dict) = state.as_dict() {
                    let fill = dict.get("ca").and_then(Object::as_num).unwrap_or(1.0) as f32;
                    let stroke = dict.get("CA").and_then(Object::as_num).unwrap_or(1.0) as f32;
                    map.insert(resource, (fill, stroke));
                }
            }
        }
        Ok(map)
    }

    // -----------------------------------------------------------------------
    // Metadata and forms

    fn read_info(&self) -> Result<Metadata, CodecError> {
        let mut metadata = Metadata::default();
        let Some(info) = self.trailer.get("Info").cloned() else {
            return Ok(metadata);
        };
        let info = self.resolve(info)?;
        let Some(dict) = info.as_dict() else {
            return Ok(metadata);
        };
        let get = |key: &str| {
            dict.get(key)
                .and_then(Object::as_str)
                .map(text_from_pdf_bytes)
                .unwrap_or_default()
        };
        metadata.title = get("Title");
        metadata.author = get("Author");
        metadata.subject = get("Subject");
        metadata.keywords = get("Keywords");
        metadata.creator = get("Creator");
        Ok(metadata)
    }

    fn read_form_fields(
        &self,
        catalog: &BTreeMap<String, Object>,
    ) -> Result<BTreeMap<String, String>, CodecError> {
        let mut fields = BTreeMap::new();
        let Some(acroform) = self.resolve_entry(catalog, "AcroForm")? else {
            return Ok(fields);
        };
        let Some(dict) = acroform.as_dict() else {
            return Ok(fields);
        };
        let Some(list) = self.resolve_entry(dict, "Fields")? else {
            return Ok(fields);
        };
        let Some(list) = list.as_array() else {
            return Ok(fields);
        };
        for entry in list {
            let field = self.resolve(entry.clone())?;
            let Some(field) = field.as_dict() else {
                continue;
            };
            let Some(name) = field.get("T").and_then(Object::as_str) else {
                continue;
            };
            let value = match field.get("V") {
                Some(Object::Str(bytes)) => text_from_pdf_bytes(bytes),
                Some(Object::Name(name)) => name.clone(),
                _ => String::new(),
            };
            fields.insert(text_from_pdf_bytes(name), value);
        }
        Ok(fields)
    }
}

#[derive(Debug, Clone, Default)]
struct Inherited {
    media_box: Option<[f64; 4]>,
    rotate: Option<i64>,
    resources: Option<BTreeMap<String, Object>>,
}

struct PageNode {
    inherited: Inherited,
    contents: Option<Object>,
}

fn rect_from(obj: &Object) -> Option<[f64; 4]> {
    let items = obj.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_num()?;
    }
    Some(out)
}

fn push_text(commands: &mut Vec<Command>, x: f64, y: f64, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    commands.push(Command::DrawString {
        x: Pt::from_f32(x as f32),
        y: Pt::from_f32(y as f32),
        text: text_from_pdf_bytes(bytes),
    });
}

/// Latin-1 by default, UTF-16BE when the string carries a byte-order mark.
fn text_from_pdf_bytes(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let mut out = String::new();
        for pair in bytes[2..].chunks_exact(2) {
            let code = ((pair[0] as u32) << 8) | pair[1] as u32;
            out.extend(char::from_u32(code));
        }
        out
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{Permissions, SecuritySettings};
    use crate::writer::write_document;

    fn sample_doc() -> Document {
        let mut doc = Document::new();
        for (index, line) in ["first page", "second page"].iter().enumerate() {
            let mut page = Page::new(Size::a4(), Rotation::None);
            page.push(Command::SetFontName("Helvetica-Bold".to_string()));
            page.push(Command::SetFontSize(Pt::from_f32(14.0)));
            page.push(Command::DrawString {
                x: Pt::from_f32(50.0),
                y: Pt::from_f32(780.0 - index as f32),
                text: line.to_string(),
            });
            doc.push_page(page);
        }
        doc.metadata.title = "Sample".to_string();
        doc.metadata.creator = "platen".to_string();
        doc
    }

    #[test]
    fn round_trip_preserves_structure() {
        let doc = sample_doc();
        let bytes = write_document(&doc).unwrap();
        let back = read_document(&bytes).unwrap();
        assert_eq!(back.page_count(), 2);
        assert_eq!(back.pages[0].size(), Size::a4());
        assert_eq!(back.pages[0].text(), "first page");
        assert_eq!(back.pages[1].text(), "second page");
        assert_eq!(back.metadata.title, "Sample");
        assert_eq!(back.metadata.creator, "platen");
    }

    #[test]
    fn round_trip_preserves_fonts_and_rotation() {
        let mut doc = sample_doc();
        doc.pages[0] = {
            let mut page = Page::new(Size::letter(), Rotation::Half);
            page.push(Command::SetFontName("Helvetica-Oblique".to_string()));
            page.push(Command::SetFontSize(Pt::from_f32(9.0)));
            page.push(Command::DrawString {
                x: Pt::from_f32(10.0),
                y: Pt::from_f32(10.0),
                text: "tilted".to_string(),
            });
            page
        };
        let bytes = write_document(&doc).unwrap();
        let back = read_document(&bytes).unwrap();
        assert_eq!(back.pages[0].rotation(), Rotation::Half);
        assert_eq!(back.pages[0].size(), Size::letter());
        assert!(back.pages[0]
            .commands
            .iter()
            .any(|c| matches!(c, Command::SetFontName(n) if n == "Helvetica-Oblique")));
    }

    #[test]
    fn round_trip_preserves_graphics() {
        let mut page = Page::new(Size::a4(), Rotation::None);
        page.push(Command::SaveState);
        page.push(Command::SetOpacity {
            fill: 0.25,
            stroke: 0.25,
        });
        page.push(Command::SetFillColor(Color::rgb(1.0, 0.0, 0.5)));
        page.push(Command::Rect {
            x: Pt::from_f32(10.0),
            y: Pt::from_f32(20.0),
            width: Pt::from_f32(100.0),
            height: Pt::from_f32(50.0),
        });
        page.push(Command::Fill);
        page.push(Command::RestoreState);
        let mut doc = Document::new();
        doc.push_page(page);

        let bytes = write_document(&doc).unwrap();
        let back = read_document(&bytes).unwrap();
        let commands = &back.pages[0].commands;
        assert!(commands.contains(&Command::SaveState));
        assert!(commands
            .iter()
            .any(|c| matches!(c, Command::SetOpacity { fill, .. } if (*fill - 0.25).abs() < 0.01)));
        assert!(commands.iter().any(|c| matches!(c, Command::Rect { .. })));
        assert!(commands.contains(&Command::Fill));
        assert!(commands.contains(&Command::RestoreState));
    }

    #[test]
    fn form_fields_round_trip() {
        let mut doc = sample_doc();
        doc.set_form_field("email", "a@example.com");
        doc.set_form_field("name", "Ada");
        let bytes = write_document(&doc).unwrap();
        let back = read_document(&bytes).unwrap();
        assert_eq!(back.form_fields["email"], "a@example.com");
        assert_eq!(back.form_fields["name"], "Ada");
    }

    #[test]
    fn encrypted_round_trip_with_user_password() {
        let mut doc = sample_doc();
        doc.security = Some(SecuritySettings::with_user_password(
            "hunter2",
            Permissions {
                print: false,
                ..Permissions::all()
            },
        ));
        let bytes = write_document(&doc).unwrap();

        assert!(matches!(
            read_document(&bytes),
            Err(CodecError::InvalidPassword)
        ));
        assert!(matches!(
            read_with_password(&bytes, "wrong"),
            Err(CodecError::InvalidPassword)
        ));

        let back = read_with_password(&bytes, "hunter2").unwrap();
        assert_eq!(back.pages[0].text(), "first page");
        assert_eq!(back.metadata.title, "Sample");
        let security = back.security.unwrap();
        assert!(!security.permissions.print);
        assert!(security.permissions.copy_content);
    }

    #[test]
    fn owner_password_opens_restricted_file() {
        let mut doc = sample_doc();
        doc.security = Some(SecuritySettings {
            owner_password: Some("admin".to_string()),
            user_password: None,
            permissions: Permissions::none(),
        });
        let bytes = write_document(&doc).unwrap();
        // Empty user password: opens without credentials.
        assert!(read_document(&bytes).is_ok());
        assert!(read_with_password(&bytes, "admin").is_ok());
    }

    #[test]
    fn garbage_is_corrupt_input() {
        assert!(matches!(
            read_document(b"not a pdf at all"),
            Err(CodecError::CorruptInput { .. })
        ));
        let mut truncated = write_document(&sample_doc()).unwrap();
        truncated.truncate(truncated.len() / 2);
        assert!(read_document(&truncated).is_err());
    }

    #[test]
    fn latin1_and_utf16_strings_decode() {
        assert_eq!(text_from_pdf_bytes(b"caf\xe9"), "café");
        assert_eq!(
            text_from_pdf_bytes(&[0xFE, 0xFF, 0x00, 0x41, 0x30, 0x42]),
            "Aあ"
        );
    }
}
