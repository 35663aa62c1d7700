//! The layout-engine boundary and the built-in block-flow engine.
//!
//! The renderer drives anything implementing [`LayoutEngine`] through the
//! navigate / wait-ready / rasterize contract, so a browser-grade engine can
//! sit behind the same trait via FFI or a process boundary. The crate ships
//! [`FlowEngine`], a deterministic block-flow layout over kuchiki-parsed HTML:
//! block elements, inline bold/italic, greedy line breaking against Helvetica
//! metrics, and CSS page-break directives. It does not execute scripts, fetch
//! sub-resources or rasterize images; those degrade with recorded warnings.

use crate::document::RenderWarning;
use crate::error::RenderError;
use crate::metrics::{self, FontId};
use crate::options::CssMediaType;
use crate::page::Command;
use crate::types::{Margins, Pt, Size};
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use std::time::{Duration, Instant};

/// Page geometry the engine paginates against. Band heights are already
/// carved out of the content area; the renderer draws the bands itself.
#[derive(Debug, Clone)]
pub struct PageGeometry {
    pub page_size: Size,
    pub margins: Margins,
    pub header_height: Pt,
    pub footer_height: Pt,
    pub viewport_width: u32,
    pub media_type: CssMediaType,
}

impl PageGeometry {
    pub fn content_width(&self) -> Pt {
        self.page_size.width - self.margins.left - self.margins.right
    }

    pub fn content_height(&self) -> Pt {
        self.page_size.height
            - self.margins.top
            - self.margins.bottom
            - self.header_height
            - self.footer_height
    }
}

/// Markup handed to `navigate`, already fetched and decoded by the renderer.
#[derive(Debug, Clone)]
pub struct NavigationTarget {
    pub html: String,
    /// Display URL for the `{url}` placeholder; empty for inline strings.
    pub url: String,
    /// Base for relative sub-resource references: `RenderingOptions::base_url`
    /// if supplied, else the source file's directory, else none (references
    /// stay unresolved and degrade).
    pub base: Option<String>,
}

/// One rasterized page: content-area commands in PDF page coordinates.
#[derive(Debug, Clone, Default)]
pub struct EnginePage {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub pages: Vec<EnginePage>,
    pub title: String,
    pub warnings: Vec<RenderWarning>,
}

/// The embedded layout engine contract. One instance serves at most one
/// in-flight render at a time; the pool enforces that exclusivity.
pub trait LayoutEngine: Send {
    fn navigate(&mut self, target: NavigationTarget) -> Result<(), RenderError>;

    /// Block until the engine reports DOM-ready and `render_delay` has
    /// elapsed, or fail with `Timeout` once `deadline` passes. The delay is a
    /// plain deterministic wait, not a quiescence detector.
    fn wait_ready(
        &mut self,
        enable_javascript: bool,
        render_delay: Duration,
        deadline: Instant,
    ) -> Result<(), RenderError>;

    fn rasterize_to_pages(&mut self, geometry: &PageGeometry) -> Result<EngineOutput, RenderError>;
}

const BODY_SIZE: f32 = 11.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BreakRule {
    #[default]
    Auto,
    Always,
    Avoid,
}

#[derive(Debug, Clone, Copy)]
struct InlineStyle {
    font: FontId,
    size: Pt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone)]
enum InlineItem {
    Word { text: String, font: FontId, size: Pt },
    HardBreak,
}

#[derive(Debug, Clone)]
enum BlockKind {
    Text { items: Vec<InlineItem> },
    Rule,
}

#[derive(Debug, Clone)]
struct FlowBlock {
    kind: BlockKind,
    size: Pt,
    align: TextAlign,
    indent: Pt,
    space_before: Pt,
    space_after: Pt,
    break_before: BreakRule,
    break_after: BreakRule,
    avoid_inside: bool,
}

/// Declarations recognized from an inline `style` attribute. The engine
/// consumes this handful directly instead of carrying a CSS parser.
#[derive(Debug, Clone, Copy, Default)]
struct StyleAttr {
    break_before: Option<BreakRule>,
    break_after: Option<BreakRule>,
    avoid_inside: bool,
    font_size: Option<Pt>,
    bold: Option<bool>,
    italic: Option<bool>,
    align: Option<TextAlign>,
}

fn parse_break_value(value: &str) -> Option<BreakRule> {
    match value {
        "always" | "page" | "left" | "right" => Some(BreakRule::Always),
        "avoid" | "avoid-page" => Some(BreakRule::Avoid),
        "auto" => Some(BreakRule::Auto),
        _ => None,
    }
}

fn parse_style_attr(raw: &str) -> StyleAttr {
    let mut out = StyleAttr::default();
    for declaration in raw.split(';') {
        let Some((name, value)) = declaration.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_ascii_lowercase();
        match name.as_str() {
            "page-break-before" | "break-before" => {
                out.break_before = parse_break_value(&value).or(out.break_before);
            }
            "page-break-after" | "break-after" => {
                out.break_after = parse_break_value(&value).or(out.break_after);
            }
            "page-break-inside" | "break-inside" => {
                if matches!(parse_break_value(&value), Some(BreakRule::Avoid)) {
                    out.avoid_inside = true;
                }
            }
            "font-size" => out.font_size = parse_font_size(&value),
            "font-weight" => {
                out.bold = Some(value == "bold" || value.parse::<u32>().is_ok_and(|w| w >= 600));
            }
            "font-style" => out.italic = Some(value == "italic" || value == "oblique"),
            "text-align" => {
                out.align = match value.as_str() {
                    "left" => Some(TextAlign::Left),
                    "center" => Some(TextAlign::Center),
                    "right" => Some(TextAlign::Right),
                    _ => None,
                };
            }
            _ => {}
        }
    }
    out
}

fn parse_font_size(value: &str) -> Option<Pt> {
    if let Some(px) = value.strip_suffix("px") {
        return px.trim().parse::<f32>().ok().map(|v| Pt::from_f32(v * 0.75));
    }
    if let Some(pt) = value.strip_suffix("pt") {
        return pt.trim().parse::<f32>().ok().map(Pt::from_f32);
    }
    None
}

fn element_style_attr(node: &NodeRef) -> StyleAttr {
    if let NodeData::Element(el) = node.data() {
        let attrs = el.attributes.borrow();
        if let Some(style) = attrs.get("style") {
            return parse_style_attr(style);
        }
    }
    StyleAttr::default()
}

fn local_name(node: &NodeRef) -> Option<String> {
    match node.data() {
        NodeData::Element(el) => Some(el.name.local.as_ref().to_ascii_lowercase()),
        _ => None,
    }
}

/// The built-in deterministic flow engine.
#[derive(Default)]
pub struct FlowEngine {
    target: Option<NavigationTarget>,
}

impl FlowEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LayoutEngine for FlowEngine {
    fn navigate(&mut self, target: NavigationTarget) -> Result<(), RenderError> {
        self.target = Some(target);
        Ok(())
    }

    fn wait_ready(
        &mut self,
        _enable_javascript: bool,
        render_delay: Duration,
        deadline: Instant,
    ) -> Result<(), RenderError> {
        // Parsing is synchronous, so DOM-ready is immediate; only the explicit
        // delay remains. A delay that cannot complete before the deadline is a
        // timeout, reported with the time actually spent.
        let now = Instant::now();
        if now + render_delay > deadline {
            let remaining = deadline.saturating_duration_since(now);
            std::thread::sleep(remaining);
            return Err(RenderError::Timeout {
                elapsed_ms: render_delay.as_millis() as u64,
            });
        }
        std::thread::sleep(render_delay);
        Ok(())
    }

    fn rasterize_to_pages(&mut self, geometry: &PageGeometry) -> Result<EngineOutput, RenderError> {
        let target = self.target.as_ref().ok_or_else(|| RenderError::InvalidMarkup {
            source: String::new(),
            cause: "rasterize called before navigate".to_string(),
        })?;

        let dom = kuchiki::parse_html().one(target.html.as_str());
        let mut collector = BlockCollector::default();
        collector.scan_head(&dom);
        if let Ok(mut bodies) = dom.select("body") {
            if let Some(body) = bodies.next() {
                collector.collect_children(body.as_node(), &base_style(), TextAlign::Left, Pt::ZERO);
            }
        }
        collector.flush();

        let mut paginator = Paginator::new(geometry);
        for block in &collector.blocks {
            paginator.place(block);
        }
        let (pages, mut warnings) = paginator.finish();
        warnings.extend(collector.warnings);

        Ok(EngineOutput {
            pages,
            title: collector.title,
            warnings,
        })
    }
}

fn base_style() -> InlineStyle {
    InlineStyle {
        font: FontId::Helvetica,
        size: Pt::from_f32(BODY_SIZE),
    }
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<FlowBlock>,
    pending: Option<FlowBlock>,
    title: String,
    warnings: Vec<RenderWarning>,
    script_count: usize,
}

impl BlockCollector {
    fn scan_head(&mut self, dom: &NodeRef) {
        if let Ok(mut titles) = dom.select("title") {
            if let Some(title) = titles.next() {
                self.title = normalize_whitespace(&title.as_node().text_contents());
            }
        }
        if let Ok(scripts) = dom.select("script") {
            self.script_count = scripts.count();
        }
        if let Ok(links) = dom.select("link[rel][href]") {
            for link in links {
                let attrs = link.attributes.borrow();
                let rel = attrs.get("rel").unwrap_or("").to_ascii_lowercase();
                if rel.contains("stylesheet") {
                    let href = attrs.get("href").unwrap_or("").to_string();
                    self.warnings.push(RenderWarning::SubResource {
                        url: href,
                        cause: "external stylesheets are not fetched by the flow engine"
                            .to_string(),
                    });
                }
            }
        }
        if self.script_count > 0 {
            self.warnings.push(RenderWarning::ScriptsIgnored {
                count: self.script_count,
            });
        }
    }

    fn collect_children(
        &mut self,
        node: &NodeRef,
        inherited: &InlineStyle,
        align: TextAlign,
        indent: Pt,
    ) {
        for child in node.children() {
            self.collect_node(&child, inherited, align, indent);
        }
    }

    fn collect_node(
        &mut self,
        node: &NodeRef,
        inherited: &InlineStyle,
        align: TextAlign,
        indent: Pt,
    ) {
        match node.data() {
            NodeData::Text(text) => {
                let text = text.borrow();
                self.push_words(&text, inherited);
            }
            NodeData::Element(_) => {
                let name = match local_name(node) {
                    Some(name) => name,
                    None => return,
                };
                let attr = element_style_attr(node);
                match name.as_str() {
                    "script" | "style" | "head" | "noscript" | "template" => {}
                    "img" => {
                        let src = match node.data() {
                            NodeData::Element(el) => el
                                .attributes
                                .borrow()
                                .get("src")
                                .unwrap_or("")
                                .to_string(),
                            _ => String::new(),
                        };
                        self.warnings.push(RenderWarning::SubResource {
                            url: src,
                            cause: "image rendering is not supported by the flow engine"
                                .to_string(),
                        });
                    }
                    "br" => self.push_item(InlineItem::HardBreak),
                    "hr" => {
                        self.flush();
                        self.blocks.push(FlowBlock {
                            kind: BlockKind::Rule,
                            size: Pt::from_f32(1.0),
                            align,
                            indent,
                            space_before: Pt::from_f32(6.0),
                            space_after: Pt::from_f32(6.0),
                            break_before: attr.break_before.unwrap_or_default(),
                            break_after: attr.break_after.unwrap_or_default(),
                            avoid_inside: false,
                        });
                    }
                    "b" | "strong" => {
                        let style = apply_attr(
                            InlineStyle {
                                font: inherited.font.with_bold(true),
                                ..*inherited
                            },
                            &attr,
                        );
                        self.collect_children(node, &style, align, indent);
                    }
                    "i" | "em" => {
                        let style = apply_attr(
                            InlineStyle {
                                font: inherited.font.with_italic(true),
                                ..*inherited
                            },
                            &attr,
                        );
                        self.collect_children(node, &style, align, indent);
                    }
                    "span" | "a" | "u" | "small" | "code" | "label" => {
                        let style = apply_attr(*inherited, &attr);
                        self.collect_children(node, &style, align, indent);
                    }
                    "ul" | "ol" => {
                        self.flush();
                        let style = apply_attr(*inherited, &attr);
                        let mut ordinal = 0usize;
                        for child in node.children() {
                            if local_name(&child).as_deref() == Some("li") {
                                ordinal += 1;
                                let marker = if name == "ol" {
                                    format!("{}.", ordinal)
                                } else {
                                    "\u{2022}".to_string()
                                };
                                self.open_list_item(
                                    &child,
                                    &style,
                                    align,
                                    indent + Pt::from_f32(18.0),
                                    marker,
                                );
                            }
                        }
                    }
                    _ => {
                        // Generic block container: p, div, h1..h6, section,
                        // table rows flattened as text, and anything unknown.
                        self.open_block(node, &name, inherited, &attr, align, indent);
                    }
                }
            }
            _ => {}
        }
    }

    fn open_block(
        &mut self,
        node: &NodeRef,
        name: &str,
        inherited: &InlineStyle,
        attr: &StyleAttr,
        align: TextAlign,
        indent: Pt,
    ) {
        self.flush();
        let (size, bold, space_before, space_after) = match name {
            "h1" => (24.0, true, 14.0, 8.0),
            "h2" => (18.0, true, 12.0, 6.0),
            "h3" => (14.0, true, 10.0, 5.0),
            "h4" => (12.0, true, 8.0, 4.0),
            "h5" => (11.0, true, 8.0, 4.0),
            "h6" => (10.0, true, 8.0, 4.0),
            "blockquote" => (BODY_SIZE, false, 6.0, 6.0),
            "pre" => (10.0, false, 6.0, 6.0),
            _ => (BODY_SIZE, false, 6.0, 6.0),
        };
        let mut style = InlineStyle {
            font: inherited.font.with_bold(bold),
            size: Pt::from_f32(size),
        };
        style = apply_attr(style, attr);
        let align = attr.align.unwrap_or(align);
        let indent = if name == "blockquote" {
            indent + Pt::from_f32(24.0)
        } else {
            indent
        };

        self.pending = Some(FlowBlock {
            kind: BlockKind::Text { items: Vec::new() },
            size: style.size,
            align,
            indent,
            space_before: Pt::from_f32(space_before),
            space_after: Pt::from_f32(space_after),
            break_before: attr.break_before.unwrap_or_default(),
            break_after: attr.break_after.unwrap_or_default(),
            avoid_inside: attr.avoid_inside,
        });

        if name == "pre" {
            self.push_preformatted(&node.text_contents(), &style);
        } else {
            self.collect_children(node, &style, align, indent);
        }
        self.flush();
    }

    fn open_list_item(
        &mut self,
        node: &NodeRef,
        style: &InlineStyle,
        align: TextAlign,
        indent: Pt,
        marker: String,
    ) {
        self.flush();
        let attr = element_style_attr(node);
        let style = apply_attr(*style, &attr);
        self.pending = Some(FlowBlock {
            kind: BlockKind::Text { items: Vec::new() },
            size: style.size,
            align,
            indent,
            space_before: Pt::from_f32(2.0),
            space_after: Pt::from_f32(2.0),
            break_before: attr.break_before.unwrap_or_default(),
            break_after: attr.break_after.unwrap_or_default(),
            avoid_inside: attr.avoid_inside,
        });
        self.push_item(InlineItem::Word {
            text: marker,
            font: style.font,
            size: style.size,
        });
        self.collect_children(node, &style, align, indent);
        self.flush();
    }

    fn push_preformatted(&mut self, text: &str, style: &InlineStyle) {
        let mut first = true;
        for line in text.lines() {
            if !first {
                self.push_item(InlineItem::HardBreak);
            }
            first = false;
            for word in line.split_whitespace() {
                self.push_item(InlineItem::Word {
                    text: word.to_string(),
                    font: style.font,
                    size: style.size,
                });
            }
        }
    }

    fn push_words(&mut self, text: &str, style: &InlineStyle) {
        for word in text.split_whitespace() {
            self.push_item(InlineItem::Word {
                text: word.to_string(),
                font: style.font,
                size: style.size,
            });
        }
    }

    fn push_item(&mut self, item: InlineItem) {
        // Stray inline content outside any block opens an implicit paragraph.
        let pending = self.pending.get_or_insert_with(|| FlowBlock {
            kind: BlockKind::Text { items: Vec::new() },
            size: Pt::from_f32(BODY_SIZE),
            align: TextAlign::Left,
            indent: Pt::ZERO,
            space_before: Pt::from_f32(6.0),
            space_after: Pt::from_f32(6.0),
            break_before: BreakRule::Auto,
            break_after: BreakRule::Auto,
            avoid_inside: false,
        });
        if let BlockKind::Text { items } = &mut pending.kind {
            items.push(item);
        }
    }

    fn flush(&mut self) {
        if let Some(block) = self.pending.take() {
            let keep = match &block.kind {
                BlockKind::Text { items } => items
                    .iter()
                    .any(|item| matches!(item, InlineItem::Word { .. })),
                BlockKind::Rule => true,
            };
            if keep {
                self.blocks.push(block);
            }
        }
    }
}

fn apply_attr(mut style: InlineStyle, attr: &StyleAttr) -> InlineStyle {
    if let Some(size) = attr.font_size {
        style.size = size;
    }
    if let Some(bold) = attr.bold {
        style.font = style.font.with_bold(bold);
    }
    if let Some(italic) = attr.italic {
        style.font = style.font.with_italic(italic);
    }
    style
}

fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
struct Run {
    font: FontId,
    size: Pt,
    text: String,
}

#[derive(Debug, Clone, Default)]
struct Line {
    runs: Vec<Run>,
    width: Pt,
}

impl Line {
    fn push_word(&mut self, text: &str, font: FontId, size: Pt) {
        match self.runs.last_mut() {
            Some(last) if last.font == font && last.size == size => {
                last.text.push(' ');
                last.text.push_str(text);
            }
            Some(last) => {
                last.text.push(' ');
                self.runs.push(Run {
                    font,
                    size,
                    text: text.to_string(),
                });
            }
            None => self.runs.push(Run {
                font,
                size,
                text: text.to_string(),
            }),
        }
        self.width = self
            .runs
            .iter()
            .map(|run| metrics::measure(&run.text, run.font, run.size))
            .sum();
    }

    fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

fn break_into_lines(items: &[InlineItem], max_width: Pt) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current = Line::default();
    for item in items {
        match item {
            InlineItem::HardBreak => {
                lines.push(std::mem::take(&mut current));
            }
            InlineItem::Word { text, font, size } => {
                if !current.is_empty() {
                    let mut trial = current.clone();
                    trial.push_word(text, *font, *size);
                    if trial.width > max_width {
                        lines.push(std::mem::take(&mut current));
                        current.push_word(text, *font, *size);
                        continue;
                    }
                    current = trial;
                } else {
                    // A single word wider than the line still gets placed; it
                    // overflows rather than disappearing.
                    current.push_word(text, *font, *size);
                }
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct Paginator<'a> {
    geometry: &'a PageGeometry,
    pages: Vec<EnginePage>,
    current: EnginePage,
    /// Distance consumed from the top of the content area.
    cursor: Pt,
    at_page_top: bool,
    current_font: Option<(FontId, Pt)>,
    warnings: Vec<RenderWarning>,
}

impl<'a> Paginator<'a> {
    fn new(geometry: &'a PageGeometry) -> Self {
        Self {
            geometry,
            pages: Vec::new(),
            current: EnginePage::default(),
            cursor: Pt::ZERO,
            at_page_top: true,
            current_font: None,
            warnings: Vec::new(),
        }
    }

    fn remaining(&self) -> Pt {
        self.geometry.content_height() - self.cursor
    }

    fn break_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.cursor = Pt::ZERO;
        self.at_page_top = true;
        self.current_font = None;
    }

    fn place(&mut self, block: &FlowBlock) {
        if block.break_before == BreakRule::Always && !self.at_page_top {
            self.break_page();
        }
        if !self.at_page_top {
            self.cursor += block.space_before;
        }

        match &block.kind {
            BlockKind::Rule => self.place_rule(block),
            BlockKind::Text { items } => {
                let max_width = (self.geometry.content_width() - block.indent).max(Pt::from_f32(1.0));
                let lines = break_into_lines(items, max_width);
                self.place_lines(block, &lines);
            }
        }

        self.cursor += block.space_after;
        if block.break_after == BreakRule::Always {
            self.break_page();
        }
    }

    fn place_rule(&mut self, block: &FlowBlock) {
        let height = Pt::from_f32(1.0);
        if self.remaining() < height && !self.at_page_top {
            self.break_page();
        }
        let geometry = self.geometry;
        let y = self.baseline(Pt::ZERO);
        let x0 = geometry.margins.left + block.indent;
        let x1 = geometry.page_size.width - geometry.margins.right;
        self.current.commands.push(Command::SetLineWidth(height));
        self.current.commands.push(Command::MoveTo { x: x0, y });
        self.current.commands.push(Command::LineTo { x: x1, y });
        self.current.commands.push(Command::Stroke);
        self.cursor += height;
        self.at_page_top = false;
    }

    fn place_lines(&mut self, block: &FlowBlock, lines: &[Line]) {
        if lines.is_empty() {
            return;
        }
        let line_height = metrics::line_height(block.size);
        let block_height = line_height * lines.len() as i32;
        let page_height = self.geometry.content_height();

        if block.avoid_inside && block_height > self.remaining() {
            if block_height <= page_height {
                // Fits on a fresh page; keep it unsplit.
                self.break_page();
            } else if !self.at_page_top {
                self.break_page();
            }
        }

        let mut forced_split_pending = block.avoid_inside && block_height > page_height;

        for line in lines {
            if self.remaining() < line_height {
                if forced_split_pending {
                    let warning = RenderWarning::ForcedSplit {
                        page: self.pages.len(),
                    };
                    log::warn!("{}", warning);
                    self.warnings.push(warning);
                    forced_split_pending = false;
                }
                self.break_page();
            }
            self.emit_line(block, line, line_height);
        }
    }

    fn emit_line(&mut self, block: &FlowBlock, line: &Line, line_height: Pt) {
        if line.is_empty() {
            self.cursor += line_height;
            self.at_page_top = false;
            return;
        }
        let geometry = self.geometry;
        let free = geometry.content_width() - block.indent - line.width;
        let x_start = geometry.margins.left
            + block.indent
            + match block.align {
                TextAlign::Left => Pt::ZERO,
                TextAlign::Center => (free * 0.5f32).max(Pt::ZERO),
                TextAlign::Right => free.max(Pt::ZERO),
            };
        // Baseline sits at ~80% of the font size below the line top.
        let y = self.baseline(block.size * 0.8f32);

        let mut x = x_start;
        for run in &line.runs {
            if self.current_font != Some((run.font, run.size)) {
                self.current
                    .commands
                    .push(Command::SetFontName(run.font.base_name().to_string()));
                self.current.commands.push(Command::SetFontSize(run.size));
                self.current_font = Some((run.font, run.size));
            }
            self.current.commands.push(Command::DrawString {
                x,
                y,
                text: run.text.clone(),
            });
            x += metrics::measure(&run.text, run.font, run.size);
        }
        self.cursor += line_height;
        self.at_page_top = false;
    }

    fn baseline(&self, descent_from_top: Pt) -> Pt {
        self.geometry.page_size.height
            - self.geometry.margins.top
            - self.geometry.header_height
            - self.cursor
            - descent_from_top
    }

    fn finish(mut self) -> (Vec<EnginePage>, Vec<RenderWarning>) {
        // Always at least one page, even for an empty body.
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        (self.pages, self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RenderingOptions;

    fn geometry() -> PageGeometry {
        let options = RenderingOptions::default();
        PageGeometry {
            page_size: options.page_size(),
            margins: options.margins.to_points(),
            header_height: Pt::ZERO,
            footer_height: Pt::ZERO,
            viewport_width: options.viewport_width,
            media_type: options.css_media_type,
        }
    }

    fn rasterize(html: &str) -> EngineOutput {
        let mut engine = FlowEngine::new();
        engine
            .navigate(NavigationTarget {
                html: html.to_string(),
                url: String::new(),
                base: None,
            })
            .unwrap();
        engine.rasterize_to_pages(&geometry()).unwrap()
    }

    fn page_text(page: &EnginePage) -> String {
        let mut out = String::new();
        for command in &page.commands {
            if let Command::DrawString { text, .. } = command {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
        }
        out
    }

    #[test]
    fn single_heading_is_one_page() {
        let output = rasterize("<h1>Hello</h1>");
        assert_eq!(output.pages.len(), 1);
        assert_eq!(page_text(&output.pages[0]), "Hello");
    }

    #[test]
    fn title_is_captured() {
        let output = rasterize("<html><head><title> My  Report </title></head><body><p>x</p></body></html>");
        assert_eq!(output.title, "My Report");
    }

    #[test]
    fn explicit_break_starts_new_page() {
        let output = rasterize(
            "<p>first</p><p style=\"page-break-before: always\">second</p>",
        );
        assert_eq!(output.pages.len(), 2);
        assert_eq!(page_text(&output.pages[0]), "first");
        assert_eq!(page_text(&output.pages[1]), "second");
    }

    #[test]
    fn long_content_paginates() {
        let mut html = String::new();
        for i in 0..200 {
            html.push_str(&format!("<p>paragraph number {}</p>", i));
        }
        let output = rasterize(&html);
        assert!(output.pages.len() > 1);
    }

    #[test]
    fn pagination_is_deterministic() {
        let mut html = String::new();
        for i in 0..150 {
            html.push_str(&format!("<p>row {} with some trailing words</p>", i));
        }
        let a = rasterize(&html);
        let b = rasterize(&html);
        assert_eq!(a.pages.len(), b.pages.len());
        for (left, right) in a.pages.iter().zip(&b.pages) {
            assert_eq!(page_text(left), page_text(right));
        }
    }

    #[test]
    fn avoid_block_moves_to_next_page_when_it_fits() {
        let mut html = String::new();
        // Fill most of the first page, then an avoid block taller than the
        // space left but shorter than a full page.
        for _ in 0..55 {
            html.push_str("<p>filler</p>");
        }
        html.push_str("<div style=\"page-break-inside: avoid\">");
        for i in 0..10 {
            html.push_str(&format!("<span>kept-{} </span><br>", i));
        }
        html.push_str("</div>");
        let output = rasterize(&html);
        assert!(output.pages.len() >= 2);
        // The kept block must be whole on one page.
        let with_kept: Vec<_> = output
            .pages
            .iter()
            .filter(|page| page_text(page).contains("kept-0"))
            .collect();
        assert_eq!(with_kept.len(), 1);
        assert!(page_text(with_kept[0]).contains("kept-9"));
    }

    #[test]
    fn oversized_avoid_block_is_force_split_with_warning() {
        let mut html = String::from("<div style=\"page-break-inside: avoid\">");
        for i in 0..400 {
            html.push_str(&format!("<span>line-{}</span><br>", i));
        }
        html.push_str("</div>");
        let output = rasterize(&html);
        assert!(output.pages.len() > 1);
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, RenderWarning::ForcedSplit { .. })));
    }

    #[test]
    fn scripts_and_stylesheets_warn_but_render() {
        let output = rasterize(
            "<head><link rel=\"stylesheet\" href=\"a.css\"><script>1</script></head><body><p>ok</p></body>",
        );
        assert_eq!(output.pages.len(), 1);
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, RenderWarning::ScriptsIgnored { .. })));
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, RenderWarning::SubResource { .. })));
    }

    #[test]
    fn bold_and_italic_switch_fonts() {
        let output = rasterize("<p>plain <b>bold</b> <i>italic</i></p>");
        let fonts: Vec<_> = output.pages[0]
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::SetFontName(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert!(fonts.contains(&"Helvetica".to_string()));
        assert!(fonts.contains(&"Helvetica-Bold".to_string()));
        assert!(fonts.contains(&"Helvetica-Oblique".to_string()));
    }
}
