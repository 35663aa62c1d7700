//! Header/footer band templates.
//!
//! Placeholders form a small closed union resolved at render time rather than
//! free-form interpolation, so the substitution surface stays auditable.

/// The recognized placeholder tokens. Wire-level syntax: `{page}`,
/// `{total-pages}`, `{date}`, `{time}`, `{url}`, `{html-title}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandToken {
    Page,
    TotalPages,
    Date,
    Time,
    Url,
    HtmlTitle,
}

impl BandToken {
    fn parse(raw: &str) -> Option<BandToken> {
        match raw {
            "page" => Some(BandToken::Page),
            "total-pages" => Some(BandToken::TotalPages),
            "date" => Some(BandToken::Date),
            "time" => Some(BandToken::Time),
            "url" => Some(BandToken::Url),
            "html-title" => Some(BandToken::HtmlTitle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(BandToken),
}

/// A parsed header or footer template. Parsing happens once per render;
/// resolution once per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandTemplate {
    segments: Vec<Segment>,
}

/// Runtime values the tokens resolve to. Date and time are captured once per
/// render so every page of one document agrees on them.
#[derive(Debug, Clone, Default)]
pub struct BandContext {
    pub total_pages: usize,
    pub date: String,
    pub time: String,
    pub url: String,
    pub html_title: String,
}

impl BandContext {
    pub fn now(total_pages: usize, url: String, html_title: String) -> Self {
        let now = chrono::Local::now();
        Self {
            total_pages,
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M").to_string(),
            url,
            html_title,
        }
    }
}

impl BandTemplate {
    /// Unrecognized or unclosed brace sequences stay literal.
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            literal.push_str(&rest[..start]);
            rest = &rest[start..];
            let Some(end) = rest.find('}') else {
                break;
            };
            match BandToken::parse(&rest[1..end]) {
                Some(token) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Token(token));
                }
                None => literal.push_str(&rest[..end + 1]),
            }
            rest = &rest[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// `page_number` is 1-based, matching what readers see on the page.
    pub fn resolve(&self, page_number: usize, ctx: &BandContext) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(token) => match token {
                    BandToken::Page => out.push_str(&page_number.to_string()),
                    BandToken::TotalPages => out.push_str(&ctx.total_pages.to_string()),
                    BandToken::Date => out.push_str(&ctx.date),
                    BandToken::Time => out.push_str(&ctx.time),
                    BandToken::Url => out.push_str(&ctx.url),
                    BandToken::HtmlTitle => out.push_str(&ctx.html_title),
                },
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BandContext {
        BandContext {
            total_pages: 3,
            date: "2026-08-23".to_string(),
            time: "12:00".to_string(),
            url: "https://example.com/report".to_string(),
            html_title: "Quarterly".to_string(),
        }
    }

    #[test]
    fn page_of_total() {
        let template = BandTemplate::parse("Page {page} of {total-pages}");
        assert_eq!(template.resolve(1, &ctx()), "Page 1 of 3");
        assert_eq!(template.resolve(3, &ctx()), "Page 3 of 3");
    }

    #[test]
    fn all_tokens_resolve() {
        let template = BandTemplate::parse("{date} {time} {url} {html-title}");
        assert_eq!(
            template.resolve(1, &ctx()),
            "2026-08-23 12:00 https://example.com/report Quarterly"
        );
    }

    #[test]
    fn unrecognized_tokens_stay_literal() {
        let template = BandTemplate::parse("{page} {pages} {unclosed");
        assert_eq!(template.resolve(2, &ctx()), "2 {pages} {unclosed");
    }
}
