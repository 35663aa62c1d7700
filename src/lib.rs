mod crypt;
mod document;
mod engine;
mod error;
mod inspect;
mod manipulate;
mod metrics;
mod options;
mod page;
mod pool;
mod reader;
mod render;
mod security;
mod template;
mod types;
mod writer;

pub use document::{Document, Metadata, RenderWarning};
pub use engine::{
    EngineOutput, EnginePage, FlowEngine, LayoutEngine, NavigationTarget, PageGeometry,
};
pub use error::{CodecError, ManipulationError, PlatenError, RenderError, SecurityWarning};
pub use inspect::{InspectReport, inspect_bytes, inspect_path, require_open_input};
pub use manipulate::{
    HorizontalAlign, VerticalAlign, WatermarkLayer, WatermarkOptions, apply_watermark, copy_pages,
    extract_text, merge, set_page_size,
};
pub use metrics::FontId;
pub use options::{CssMediaType, MarginsMm, Orientation, PaperSize, RenderingOptions};
pub use page::{Command, Page};
pub use pool::{EngineLease, EnginePool};
pub use reader::{read_document, read_with_password};
pub use render::{RenderSource, Renderer};
pub use security::{Permissions, SecuritySettings, secure};
pub use template::{BandContext, BandTemplate, BandToken};
pub use types::{Color, Margins, Pt, Rotation, Size};
pub use writer::write_document;

use std::path::PathBuf;
use std::sync::Arc;

/// One-stop entry point bundling an engine pool, a renderer and default
/// rendering options. Construct once, share across threads, render many.
pub struct Platen {
    pool: Arc<EnginePool>,
    renderer: Renderer,
    options: RenderingOptions,
}

impl Platen {
    pub fn new() -> Self {
        PlatenBuilder::new().build()
    }

    pub fn builder() -> PlatenBuilder {
        PlatenBuilder::new()
    }

    pub fn options(&self) -> &RenderingOptions {
        &self.options
    }

    pub fn render_html(&self, html: &str) -> Result<Document, PlatenError> {
        Ok(self
            .renderer
            .render(&RenderSource::Html(html.to_string()), &self.options)?)
    }

    pub fn render_file(&self, path: impl Into<PathBuf>) -> Result<Document, PlatenError> {
        Ok(self
            .renderer
            .render(&RenderSource::File(path.into()), &self.options)?)
    }

    pub fn render_url(&self, url: &str) -> Result<Document, PlatenError> {
        Ok(self
            .renderer
            .render(&RenderSource::Url(url.to_string()), &self.options)?)
    }

    /// Render with explicit per-job options instead of the instance defaults.
    pub fn render_with(
        &self,
        source: &RenderSource,
        options: &RenderingOptions,
    ) -> Result<Document, PlatenError> {
        Ok(self.renderer.render(source, options)?)
    }

    pub fn render_batch(
        &self,
        jobs: &[(RenderSource, RenderingOptions)],
    ) -> Vec<Result<Document, RenderError>> {
        self.renderer.render_batch(jobs)
    }

    pub fn write(&self, doc: &Document) -> Result<Vec<u8>, PlatenError> {
        Ok(writer::write_document(doc)?)
    }

    pub fn read(&self, bytes: &[u8]) -> Result<Document, PlatenError> {
        Ok(reader::read_document(bytes)?)
    }

    pub fn read_with_password(
        &self,
        bytes: &[u8],
        password: &str,
    ) -> Result<Document, PlatenError> {
        Ok(reader::read_with_password(bytes, password)?)
    }

    /// Shut the engine pool down. In-flight renders finish; waiting renders
    /// fail with `PoolClosed`.
    pub fn close(&self) {
        self.pool.close();
    }
}

impl Default for Platen {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PlatenBuilder {
    capacity: usize,
    factory: Box<dyn Fn() -> Box<dyn LayoutEngine> + Send + Sync>,
    options: RenderingOptions,
}

impl PlatenBuilder {
    pub fn new() -> Self {
        Self {
            capacity: 2,
            factory: Box::new(|| Box::new(FlowEngine::new())),
            options: RenderingOptions::default(),
        }
    }

    /// Maximum number of concurrent engine instances.
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Swap the built-in flow engine for another `LayoutEngine`
    /// implementation, e.g. one backed by a headless browser.
    pub fn engine(
        mut self,
        factory: impl Fn() -> Box<dyn LayoutEngine> + Send + Sync + 'static,
    ) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub fn default_options(mut self, options: RenderingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Platen {
        let pool = EnginePool::new(self.capacity, self.factory);
        Platen {
            renderer: Renderer::new(Arc::clone(&pool)),
            pool,
            options: self.options,
        }
    }
}

impl Default for PlatenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_write_read_round_trip() {
        let platen = Platen::new();
        let doc = platen
            .render_html("<h1>Invoice</h1><p>Total: 12,50</p>")
            .unwrap();
        let bytes = platen.write(&doc).unwrap();
        let back = platen.read(&bytes).unwrap();
        assert_eq!(back.page_count(), doc.page_count());
        assert!(back.pages[0].text().contains("Invoice"));
        assert!(back.pages[0].text().contains("Total: 12,50"));
    }

    #[test]
    fn secure_write_read_reports_permissions() {
        let platen = Platen::new();
        let mut doc = platen.render_html("<p>confidential</p>").unwrap();
        secure(
            &mut doc,
            SecuritySettings::with_user_password(
                "x",
                Permissions {
                    print: false,
                    ..Permissions::all()
                },
            ),
        );
        let bytes = platen.write(&doc).unwrap();

        assert!(matches!(
            platen.read(&bytes),
            Err(PlatenError::Codec(CodecError::InvalidPassword))
        ));
        let back = platen.read_with_password(&bytes, "x").unwrap();
        assert!(back.pages[0].text().contains("confidential"));
        let security = back.security.unwrap();
        assert!(!security.permissions.print);
        assert!(security.permissions.copy_content);
    }

    #[test]
    fn merged_render_outputs_serialize() {
        let platen = Platen::new();
        let a = platen.render_html("<p>alpha</p>").unwrap();
        let b = platen.render_html("<p>beta</p>").unwrap();
        let merged = merge(&[&a, &b]).unwrap();
        let bytes = platen.write(&merged).unwrap();
        let back = platen.read(&bytes).unwrap();
        assert_eq!(back.page_count(), 2);
        assert!(back.pages[0].text().contains("alpha"));
        assert!(back.pages[1].text().contains("beta"));
    }

    #[test]
    fn watermark_survives_serialization() {
        let platen = Platen::new();
        let mut doc = platen.render_html("<p>body</p>").unwrap();
        apply_watermark(&mut doc, &WatermarkOptions::text("DRAFT"));
        let bytes = platen.write(&doc).unwrap();
        let back = platen.read(&bytes).unwrap();
        assert!(back.pages[0].text().contains("DRAFT"));
        assert!(back.pages[0].text().contains("body"));
    }

    #[test]
    fn inspect_agrees_with_writer() {
        let platen = Platen::new();
        let doc = platen.render_html("<p>one page</p>").unwrap();
        let bytes = platen.write(&doc).unwrap();
        let report = inspect_bytes(&bytes).unwrap();
        assert_eq!(report.pdf_version, "1.7");
        assert_eq!(report.page_count, 1);
        assert!(!report.encrypted);
    }

    #[test]
    fn closed_platen_rejects_renders() {
        let platen = Platen::new();
        platen.close();
        assert!(matches!(
            platen.render_html("<p>late</p>"),
            Err(PlatenError::Render(RenderError::PoolClosed))
        ));
    }

    #[test]
    fn custom_default_options_apply() {
        let platen = Platen::builder()
            .pool_capacity(1)
            .default_options(RenderingOptions {
                paper_size: PaperSize::Letter,
                ..RenderingOptions::default()
            })
            .build();
        let doc = platen.render_html("<p>letter</p>").unwrap();
        assert_eq!(doc.pages[0].size(), Size::letter());
    }
}
