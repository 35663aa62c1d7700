//! Drives a layout engine from a resolved source to a finished document:
//! acquire an engine lease, navigate, wait, rasterize, then lay the
//! header/footer bands over each page with placeholder substitution.

use crate::document::Document;
use crate::engine::{NavigationTarget, PageGeometry};
use crate::error::RenderError;
use crate::metrics::{self, FontId};
use crate::options::RenderingOptions;
use crate::page::{Command, Page};
use crate::pool::EnginePool;
use crate::template::{BandContext, BandTemplate};
use crate::types::{Pt, Rotation};
use base64::Engine as _;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BAND_HEIGHT: f32 = 24.0;
const BAND_FONT_SIZE: f32 = 9.0;

/// What to render: markup held in memory, a local HTML file, or a URL.
#[derive(Debug, Clone)]
pub enum RenderSource {
    Html(String),
    File(PathBuf),
    Url(String),
}

pub struct Renderer {
    pool: Arc<EnginePool>,
}

impl Renderer {
    pub fn new(pool: Arc<EnginePool>) -> Self {
        Self { pool }
    }

    pub fn render(
        &self,
        source: &RenderSource,
        options: &RenderingOptions,
    ) -> Result<Document, RenderError> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(options.timeout_ms);

        let target = resolve_source(source, options)?;
        let source_url = target.url.clone();

        let mut lease = self.pool.acquire(deadline)?;
        let outcome = (|| {
            lease.engine().navigate(target)?;
            lease.engine().wait_ready(
                options.enable_javascript,
                Duration::from_millis(options.render_delay_ms),
                deadline,
            )?;
            let geometry = geometry_for(options);
            let output = lease.engine().rasterize_to_pages(&geometry)?;
            if Instant::now() > deadline {
                return Err(RenderError::Timeout { elapsed_ms: 0 });
            }
            Ok((geometry, output))
        })();

        let (geometry, output) = match outcome {
            Ok(value) => value,
            Err(err) => {
                // Partial navigation state is unreliable; tear the instance
                // down rather than returning it.
                lease.discard();
                let err = match err {
                    RenderError::Timeout { .. } => RenderError::Timeout {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    },
                    other => other,
                };
                return Err(err);
            }
        };
        drop(lease);

        let mut doc = Document::new();
        doc.metadata.title = output.title.clone();
        doc.metadata.creator = concat!("platen ", env!("CARGO_PKG_VERSION")).to_string();
        for engine_page in output.pages {
            let mut page = Page::new(geometry.page_size, Rotation::None);
            page.commands = engine_page.commands;
            doc.push_page(page);
        }

        apply_bands(&mut doc, options, &source_url, &output.title);

        for warning in &output.warnings {
            log::warn!("render {}: {}", display_source(source), warning);
        }
        doc.warnings = output.warnings;
        Ok(doc)
    }

    /// Render several jobs in parallel. Engine access stays pool-mediated, so
    /// parallelism above the pool capacity queues rather than oversubscribes.
    pub fn render_batch(
        &self,
        jobs: &[(RenderSource, RenderingOptions)],
    ) -> Vec<Result<Document, RenderError>> {
        jobs.par_iter()
            .map(|(source, options)| self.render(source, options))
            .collect()
    }
}

fn geometry_for(options: &RenderingOptions) -> PageGeometry {
    let has_header = options
        .header_template
        .as_deref()
        .is_some_and(|t| !t.is_empty());
    let has_footer = options
        .footer_template
        .as_deref()
        .is_some_and(|t| !t.is_empty());
    PageGeometry {
        page_size: options.page_size(),
        margins: options.margins.to_points(),
        header_height: if has_header {
            Pt::from_f32(BAND_HEIGHT)
        } else {
            Pt::ZERO
        },
        footer_height: if has_footer {
            Pt::from_f32(BAND_HEIGHT)
        } else {
            Pt::ZERO
        },
        viewport_width: options.viewport_width,
        media_type: options.css_media_type,
    }
}

fn display_source(source: &RenderSource) -> String {
    match source {
        RenderSource::Html(_) => "<inline html>".to_string(),
        RenderSource::File(path) => path.display().to_string(),
        RenderSource::Url(url) => url.clone(),
    }
}

/// Turn the caller's source into markup the engine can navigate to. Remote
/// http(s) navigation belongs to a browser-grade engine behind the
/// `LayoutEngine` trait; the built-in resolver covers inline strings, local
/// files, `file://` and `data:` URLs.
fn resolve_source(
    source: &RenderSource,
    options: &RenderingOptions,
) -> Result<NavigationTarget, RenderError> {
    match source {
        RenderSource::Html(html) => Ok(NavigationTarget {
            html: html.clone(),
            url: options.base_url.clone().unwrap_or_default(),
            base: options.base_url.clone(),
        }),
        RenderSource::File(path) => {
            let bytes = std::fs::read(path).map_err(|err| RenderError::NetworkFailure {
                url: path.display().to_string(),
                cause: err.to_string(),
            })?;
            let html = String::from_utf8(bytes).map_err(|_| RenderError::InvalidMarkup {
                source: path.display().to_string(),
                cause: "file is not valid UTF-8".to_string(),
            })?;
            let base = options.base_url.clone().or_else(|| {
                path.parent().map(|parent| parent.display().to_string())
            });
            Ok(NavigationTarget {
                html,
                url: path.display().to_string(),
                base,
            })
        }
        RenderSource::Url(url) => resolve_url(url, options),
    }
}

fn resolve_url(url: &str, options: &RenderingOptions) -> Result<NavigationTarget, RenderError> {
    if let Some(rest) = url.strip_prefix("data:") {
        let html = decode_data_url(rest).ok_or_else(|| RenderError::InvalidMarkup {
            source: "data: url".to_string(),
            cause: "malformed data url".to_string(),
        })?;
        return Ok(NavigationTarget {
            html,
            url: String::new(),
            base: options.base_url.clone(),
        });
    }
    if let Some(path) = url.strip_prefix("file://") {
        return resolve_source(&RenderSource::File(PathBuf::from(path)), options);
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Err(RenderError::NetworkFailure {
            url: url.to_string(),
            cause: "remote navigation requires a browser-grade engine behind LayoutEngine"
                .to_string(),
        });
    }
    Err(RenderError::NetworkFailure {
        url: url.to_string(),
        cause: "unsupported url scheme".to_string(),
    })
}

fn decode_data_url(rest: &str) -> Option<String> {
    let (header, payload) = rest.split_once(',')?;
    if header.ends_with(";base64") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?;
        String::from_utf8(bytes).ok()
    } else {
        // Percent-decoding limited to what data: html payloads use.
        let mut out = Vec::with_capacity(payload.len());
        let bytes = payload.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' && i + 3 <= bytes.len() {
                let hex = payload.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(out).ok()
    }
}

/// Draw header/footer text into the fixed-height bands reserved by the
/// geometry, substituting placeholders per page.
fn apply_bands(doc: &mut Document, options: &RenderingOptions, url: &str, title: &str) {
    let header = options
        .header_template
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(BandTemplate::parse);
    let footer = options
        .footer_template
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(BandTemplate::parse);
    if header.is_none() && footer.is_none() {
        return;
    }

    let ctx = BandContext::now(doc.page_count(), url.to_string(), title.to_string());
    let margins = options.margins.to_points();
    let font_size = Pt::from_f32(BAND_FONT_SIZE);

    for (index, page) in doc.pages.iter_mut().enumerate() {
        let page_number = index + 1;
        let size = page.size();
        if let Some(template) = &header {
            let text = template.resolve(page_number, &ctx);
            let y = size.height - margins.top - font_size;
            draw_band_line(page, &text, y, size.width, font_size);
        }
        if let Some(template) = &footer {
            let text = template.resolve(page_number, &ctx);
            let y = margins.bottom + font_size;
            draw_band_line(page, &text, y, size.width, font_size);
        }
    }
}

fn draw_band_line(page: &mut Page, text: &str, y: Pt, page_width: Pt, font_size: Pt) {
    if text.is_empty() {
        return;
    }
    let width = metrics::measure(text, FontId::Helvetica, font_size);
    let x = ((page_width - width) * 0.5f32).max(Pt::ZERO);
    page.push(Command::SetFontName(FontId::Helvetica.base_name().to_string()));
    page.push(Command::SetFontSize(font_size));
    page.push(Command::DrawString {
        x,
        y,
        text: text.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FlowEngine;

    fn renderer() -> Renderer {
        let _ = env_logger::builder().is_test(true).try_init();
        Renderer::new(EnginePool::new(2, || Box::new(FlowEngine::new())))
    }

    #[test]
    fn hello_renders_one_page() {
        let doc = renderer()
            .render(
                &RenderSource::Html("<h1>Hello</h1>".to_string()),
                &RenderingOptions::default(),
            )
            .unwrap();
        assert_eq!(doc.page_count(), 1);
        assert!(doc.pages[0].text().contains("Hello"));
    }

    #[test]
    fn footer_counts_pages() {
        let mut html = String::new();
        html.push_str("<p>a</p>");
        html.push_str("<p style=\"page-break-before: always\">b</p>");
        html.push_str("<p style=\"page-break-before: always\">c</p>");
        let options = RenderingOptions {
            footer_template: Some("Page {page} of {total-pages}".to_string()),
            ..RenderingOptions::default()
        };
        let doc = renderer()
            .render(&RenderSource::Html(html), &options)
            .unwrap();
        assert_eq!(doc.page_count(), 3);
        for (index, page) in doc.pages.iter().enumerate() {
            let expected = format!("Page {} of 3", index + 1);
            assert!(
                page.text().contains(&expected),
                "page {} missing footer {:?}",
                index,
                expected
            );
        }
    }

    #[test]
    fn http_source_is_a_network_failure() {
        let err = renderer()
            .render(
                &RenderSource::Url("https://example.com/".to_string()),
                &RenderingOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, RenderError::NetworkFailure { .. }));
    }

    #[test]
    fn data_url_renders() {
        let doc = renderer()
            .render(
                &RenderSource::Url("data:text/html,<p>inline</p>".to_string()),
                &RenderingOptions::default(),
            )
            .unwrap();
        assert!(doc.pages[0].text().contains("inline"));
    }

    #[test]
    fn delay_beyond_timeout_is_a_timeout() {
        let options = RenderingOptions {
            render_delay_ms: 200,
            timeout_ms: 30,
            ..RenderingOptions::default()
        };
        let err = renderer()
            .render(&RenderSource::Html("<p>x</p>".to_string()), &options)
            .unwrap_err();
        assert!(matches!(err, RenderError::Timeout { .. }));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = renderer()
            .render(
                &RenderSource::File(PathBuf::from("/nonexistent/input.html")),
                &RenderingOptions::default(),
            )
            .unwrap_err();
        match err {
            RenderError::NetworkFailure { url, .. } => assert!(url.contains("nonexistent")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn batch_renders_in_order() {
        let jobs: Vec<(RenderSource, RenderingOptions)> = (0..8)
            .map(|i| {
                (
                    RenderSource::Html(format!("<p>job {}</p>", i)),
                    RenderingOptions::default(),
                )
            })
            .collect();
        let results = renderer().render_batch(&jobs);
        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            let doc = result.as_ref().unwrap();
            assert!(doc.pages[0].text().contains(&format!("job {}", i)));
        }
    }
}
